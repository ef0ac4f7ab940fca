//! Preview URL canonicalization.
//!
//! Two spellings of the same page must land on the same cache and failure key, so
//! every preview request goes through [`canonicalize`] before anything else.

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("URL has no host")]
    MissingHost,

    #[error("URL carries credentials")]
    Credentials,

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<UrlError> for mediarepo_core::Error {
    fn from(err: UrlError) -> Self {
        mediarepo_core::Error::InvalidInput(err.to_string())
    }
}

/// Canonicalize a preview URL.
///
/// 1. Trim surrounding whitespace
/// 2. Default the scheme to `https://` when none is given
/// 3. Only `http` and `https` are accepted, and a host is required
/// 4. Userinfo is rejected outright
/// 5. Lowercase the host, drop the default port and the fragment
///
/// The query string is kept verbatim; reordering it could change what the origin serves.
pub fn canonicalize(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };
    let mut parsed = url::Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    let host = parsed.host_str().filter(|h| !h.is_empty()).ok_or(UrlError::MissingHost)?.to_lowercase();
    if !parsed.username().is_empty() || parsed.password().is_some() {
        return Err(UrlError::Credentials);
    }

    parsed.set_host(Some(&host)).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    parsed.set_fragment(None);

    Ok(parsed)
}
