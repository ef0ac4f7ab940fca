//! HTTP plumbing shared by the download and preview pipelines.
//!
//! ### Size Ceilings
//! - A declared `Content-Length` over the ceiling is rejected before the body is read.
//! - Bodies are read chunk by chunk and abandoned as soon as they overrun the ceiling,
//!   so a missing or lying `Content-Length` cannot force an unbounded read.
//! - A ceiling of `0` means unbounded.
//!
//! ### Redirects
//! - Origin downloads follow up to [`MAX_REDIRECTS`] redirects automatically.
//! - Preview fetches use [`build_guarded_client`], which follows nothing on its own;
//!   the caller walks the chain so each hop can be checked against the network policy.
//!
//! ### Headers
//! - `Content-Disposition` filenames are best effort: `filename*` (RFC 5987) wins over
//!   `filename`, and anything unparsable yields no filename.

pub mod remote;
pub mod ssrf;
pub mod url;

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use reqwest::header::{self, HeaderMap};
use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder, Response};

pub use remote::{DirectResolver, OriginResolver, RemoteFetcher, RemoteMedia};
pub use ssrf::{NetworkError, NetworkPolicy, PolicyResolver};
pub use self::url::{UrlError, canonicalize};

use mediarepo_core::Error;
use mediarepo_core::config::HttpConfig;

/// Maximum number of redirects followed by any pipeline.
pub const MAX_REDIRECTS: usize = 5;

fn client_builder(config: &HttpConfig) -> ClientBuilder {
    Client::builder()
        .user_agent(&config.user_agent)
        .timeout(config.timeout())
        .use_rustls_tls()
}

/// Build the HTTP client used for origin downloads.
pub fn build_http_client(config: &HttpConfig) -> Result<Client, Error> {
    client_builder(config)
        .redirect(Policy::limited(MAX_REDIRECTS))
        .build()
        .map_err(|e| Error::Upstream(format!("failed to build HTTP client: {e}")))
}

/// Build the HTTP client for user-supplied destinations.
///
/// Redirects are not followed and every lookup goes through `resolver`.
pub fn build_guarded_client(config: &HttpConfig, resolver: Arc<PolicyResolver>) -> Result<Client, Error> {
    client_builder(config)
        .redirect(Policy::none())
        .dns_resolver(resolver)
        .build()
        .map_err(|e| Error::Upstream(format!("failed to build HTTP client: {e}")))
}

/// Value of a header as a string, if present and visible ASCII.
pub fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Parse the declared `Content-Length`.
///
/// Returns `Ok(None)` when the header is absent and `Malformed` when it is present
/// but not a non-negative integer.
pub fn declared_length(headers: &HeaderMap) -> Result<Option<u64>, Error> {
    let Some(value) = headers.get(header::CONTENT_LENGTH) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Some)
        .ok_or_else(|| Error::Malformed(format!("unparsable content-length: {value:?}")))
}

/// Reject a declared length over `max_bytes` before any body byte is consumed.
pub fn check_declared_length(declared: u64, max_bytes: u64) -> Result<(), Error> {
    if max_bytes > 0 && declared > max_bytes {
        return Err(Error::TooLarge(format!("{declared} bytes exceeds {max_bytes}")));
    }
    Ok(())
}

/// Read a response body, failing `TooLarge` once more than `max_bytes` arrive.
pub async fn read_capped(mut response: Response, max_bytes: u64) -> Result<Bytes, Error> {
    let mut body = BytesMut::new();

    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| Error::Upstream(format!("failed to read response: {e}")))?
    {
        if max_bytes > 0 && (body.len() + chunk.len()) as u64 > max_bytes {
            return Err(Error::TooLarge(format!("body exceeds {max_bytes} bytes")));
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body.freeze())
}

/// Extract a filename from a `Content-Disposition` value.
pub fn content_disposition_filename(value: &str) -> Option<String> {
    let mut parts = split_params(value).into_iter();
    let disposition = parts.next()?.trim();
    if disposition.is_empty() || disposition.contains('=') {
        return None;
    }

    let mut plain = None;
    let mut extended = None;
    for param in parts {
        let Some((name, raw)) = param.split_once('=') else {
            continue;
        };
        match name.trim().to_ascii_lowercase().as_str() {
            "filename" => plain = unquote(raw.trim()),
            "filename*" => extended = decode_extended(raw.trim()),
            _ => {}
        }
    }

    extended.or(plain).filter(|name| !name.is_empty())
}

/// Split on `;` outside of quoted strings.
fn split_params(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (i, c) in value.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                parts.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&value[start..]);
    parts
}

fn unquote(raw: &str) -> Option<String> {
    let Some(inner) = raw.strip_prefix('"') else {
        return Some(raw.to_string());
    };
    let inner = inner.strip_suffix('"')?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            out.extend(chars.next());
        } else {
            out.push(c);
        }
    }
    Some(out)
}

/// Decode an RFC 5987 `charset'language'percent-encoded` value.
fn decode_extended(raw: &str) -> Option<String> {
    let mut parts = raw.splitn(3, '\'');
    let charset = parts.next()?.to_ascii_lowercase();
    let _language = parts.next()?;
    let encoded = parts.next()?;

    match charset.as_str() {
        "utf-8" | "us-ascii" => urlencoding::decode(encoded).ok().map(|s| s.into_owned()),
        "iso-8859-1" => Some(
            urlencoding::decode_binary(encoded.as_bytes())
                .iter()
                .map(|&b| char::from(b))
                .collect(),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediarepo_core::{AppConfig, SharedConfig};
    use reqwest::header::HeaderValue;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_declared_length() {
        let mut headers = HeaderMap::new();
        assert_eq!(declared_length(&headers), Ok(None));

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("1024"));
        assert_eq!(declared_length(&headers), Ok(Some(1024)));

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("lots"));
        assert!(matches!(declared_length(&headers), Err(Error::Malformed(_))));
    }

    #[test]
    fn test_check_declared_length() {
        let ceiling = 104_857_600;
        assert!(check_declared_length(ceiling, ceiling).is_ok());
        assert!(matches!(check_declared_length(101 * 1024 * 1024, ceiling), Err(Error::TooLarge(_))));
        assert!(check_declared_length(u64::MAX, 0).is_ok());
    }

    #[test]
    fn test_filename_plain() {
        assert_eq!(content_disposition_filename("attachment; filename=cat.png"), Some("cat.png".into()));
        assert_eq!(content_disposition_filename("inline; filename=\"my cat.png\""), Some("my cat.png".into()));
        assert_eq!(content_disposition_filename("inline; FILENAME=\"a;b.png\""), Some("a;b.png".into()));
        assert_eq!(content_disposition_filename("inline; filename=\"say \\\"hi\\\".txt\""), Some("say \"hi\".txt".into()));
    }

    #[test]
    fn test_filename_extended_wins() {
        let value = "attachment; filename=\"fallback.txt\"; filename*=UTF-8''%E2%82%AC%20rates.txt";
        assert_eq!(content_disposition_filename(value), Some("€ rates.txt".into()));

        let latin1 = "attachment; filename*=iso-8859-1'en'%A3%20rates.txt";
        assert_eq!(content_disposition_filename(latin1), Some("£ rates.txt".into()));
    }

    #[test]
    fn test_filename_absent_or_malformed() {
        assert_eq!(content_disposition_filename("attachment"), None);
        assert_eq!(content_disposition_filename(""), None);
        assert_eq!(content_disposition_filename("filename=cat.png"), None);
        assert_eq!(content_disposition_filename("attachment; filename=\"unterminated"), None);
        assert_eq!(content_disposition_filename("attachment; filename=\"\""), None);
    }

    #[tokio::test]
    async fn test_guarded_client_refuses_blocked_lookups() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        let url = format!("http://localhost:{}/", server.address().port());

        let blocking = Arc::new(SharedConfig::new(AppConfig::default()));
        let client = build_guarded_client(&HttpConfig::default(), Arc::new(PolicyResolver::new(blocking))).unwrap();
        assert!(client.get(&url).send().await.is_err());

        let mut open = AppConfig::default();
        open.url_previews.allowed_networks.clear();
        open.url_previews.disallowed_networks.clear();
        let open = Arc::new(SharedConfig::new(open));
        let client = build_guarded_client(&HttpConfig::default(), Arc::new(PolicyResolver::new(open))).unwrap();
        assert!(client.get(&url).send().await.unwrap().status().is_success());
    }

    #[tokio::test]
    async fn test_guarded_client_does_not_follow_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/from"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/to"))
            .mount(&server)
            .await;
        Mock::given(method("GET")).and(path("/to")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&server).await;

        let config = Arc::new(SharedConfig::new(AppConfig::default()));
        let client = build_guarded_client(&HttpConfig::default(), Arc::new(PolicyResolver::new(config))).unwrap();
        let response = client.get(format!("{}/from", server.uri())).send().await.unwrap();
        assert_eq!(response.status().as_u16(), 302);
    }

    #[tokio::test]
    async fn test_read_capped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/body"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; 64]))
            .mount(&server)
            .await;

        let client = build_http_client(&HttpConfig::default()).unwrap();
        let url = format!("{}/body", server.uri());

        let body = read_capped(client.get(&url).send().await.unwrap(), 64).await.unwrap();
        assert_eq!(body.len(), 64);

        let result = read_capped(client.get(&url).send().await.unwrap(), 63).await;
        assert!(matches!(result, Err(Error::TooLarge(_))));

        let body = read_capped(client.get(&url).send().await.unwrap(), 0).await.unwrap();
        assert_eq!(body.len(), 64);
    }
}
