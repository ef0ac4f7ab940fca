//! SSRF (Server-Side Request Forgery) protection for preview fetches.
//!
//! Preview URLs come from end users, so before a page or an image is requested the
//! destination host is resolved and every address it resolves to is checked against
//! the configured CIDR lists. Disallowed ranges win over allowed ones.
//!
//! The check happens twice: once per URL (every redirect hop included) before the
//! request is sent, and again in [`PolicyResolver`] on the addresses the connection
//! actually uses, since the client performs its own lookup.
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use ipnet::IpNet;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use url::{Host, Url};

use mediarepo_core::config::UrlPreviewsConfig;
use mediarepo_core::{Error, SharedConfig};

/// Error type for network policy failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    #[error("blocked scheme: {0}")]
    BlockedScheme(String),

    #[error("blocked IP: {0}")]
    BlockedIp(IpAddr),

    #[error("DNS resolution failed: {0}")]
    DnsError(String),

    #[error("invalid network {0:?}: {1}")]
    InvalidNetwork(String, String),
}

impl From<NetworkError> for Error {
    fn from(err: NetworkError) -> Self {
        match err {
            NetworkError::InvalidNetwork(..) => Error::InvalidInput(err.to_string()),
            _ => Error::Forbidden(err.to_string()),
        }
    }
}

/// CIDR allow and deny lists applied to preview destinations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkPolicy {
    allowed: Vec<IpNet>,
    disallowed: Vec<IpNet>,
}

impl NetworkPolicy {
    /// Parse the allow and deny lists. An empty allow list allows everything not denied.
    pub fn new<S: AsRef<str>>(allowed: &[S], disallowed: &[S]) -> Result<Self, NetworkError> {
        Ok(Self { allowed: parse_networks(allowed)?, disallowed: parse_networks(disallowed)? })
    }

    pub fn from_config(config: &UrlPreviewsConfig) -> Result<Self, NetworkError> {
        Self::new(&config.allowed_networks, &config.disallowed_networks)
    }

    /// A policy that lets every address through.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Check a single address against the lists.
    pub fn check_ip(&self, ip: IpAddr) -> Result<(), NetworkError> {
        let ip = canonical_ip(ip);
        if self.disallowed.iter().any(|net| net.contains(&ip)) {
            return Err(NetworkError::BlockedIp(ip));
        }
        if !self.allowed.is_empty() && !self.allowed.iter().any(|net| net.contains(&ip)) {
            return Err(NetworkError::BlockedIp(ip));
        }
        Ok(())
    }

    /// Resolve the URL's host and check every address it resolves to.
    pub async fn check_url(&self, url: &Url) -> Result<(), NetworkError> {
        match url.scheme() {
            "http" | "https" => {}
            scheme => return Err(NetworkError::BlockedScheme(scheme.to_string())),
        }

        let port = url.port_or_known_default().unwrap_or(80);
        match url.host() {
            Some(Host::Ipv4(ip)) => self.check_ip(IpAddr::V4(ip)),
            Some(Host::Ipv6(ip)) => self.check_ip(IpAddr::V6(ip)),
            Some(Host::Domain(domain)) => self.resolve(domain, port).await.map(|_| ()),
            None => Err(NetworkError::DnsError("URL has no host".to_string())),
        }
    }

    /// Look up `host` and return its addresses, failing if any of them is blocked.
    pub async fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, NetworkError> {
        let addrs: Vec<_> = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| NetworkError::DnsError(format!("{host}: {e}")))?
            .collect();
        if addrs.is_empty() {
            return Err(NetworkError::DnsError(format!("{host}: no addresses")));
        }
        addrs.iter().try_for_each(|addr| self.check_ip(addr.ip()))?;
        Ok(addrs)
    }
}

/// DNS resolver for the preview client.
///
/// Applies the network policy of the current configuration to every lookup the
/// client makes, so a host cannot pass the URL check and then resolve elsewhere
/// when the connection is opened.
pub struct PolicyResolver {
    config: Arc<SharedConfig>,
}

impl PolicyResolver {
    pub fn new(config: Arc<SharedConfig>) -> Self {
        Self { config }
    }
}

impl Resolve for PolicyResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(resolve_allowed(Arc::clone(&self.config), name))
    }
}

async fn resolve_allowed(
    config: Arc<SharedConfig>, name: Name,
) -> Result<Addrs, Box<dyn std::error::Error + Send + Sync>> {
    let policy = NetworkPolicy::from_config(&config.snapshot().url_previews)?;
    let addrs = policy.resolve(name.as_str(), 0).await.inspect_err(|e| {
        tracing::warn!(host = name.as_str(), error = %e, "refusing to connect");
    })?;
    Ok(Box::new(addrs.into_iter()))
}

fn parse_networks<S: AsRef<str>>(networks: &[S]) -> Result<Vec<IpNet>, NetworkError> {
    networks
        .iter()
        .map(|n| {
            let n = n.as_ref().trim();
            n.parse::<IpNet>().map_err(|e| NetworkError::InvalidNetwork(n.to_string(), e.to_string()))
        })
        .collect()
}

/// IPv4-mapped IPv6 addresses are checked as the IPv4 address they carry.
fn canonical_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
        v4 => v4,
    }
}
