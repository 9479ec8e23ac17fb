//! Permission gate for host-function calls.
//!
//! Every call a sandboxed worker makes through a host function is checked
//! against a [`HostCallGate`] before the host performs it. Test
//! implementations ([`AllowAllGate`], [`DenyAllGate`]) are provided, and
//! [`HostAllowListGate`] enforces the configured host allow-list.

use async_trait::async_trait;

/// Permission check for host-function calls.
#[async_trait]
pub trait HostCallGate: Send + Sync {
    /// Check whether `worker` may issue an HTTP request.
    async fn check_http_request(&self, worker: &str, method: &str, url: &str)
    -> Result<(), String>;
}

/// Gate that permits every call (for testing and trusted workers).
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllGate;

#[async_trait]
impl HostCallGate for AllowAllGate {
    async fn check_http_request(
        &self,
        _worker: &str,
        _method: &str,
        _url: &str,
    ) -> Result<(), String> {
        Ok(())
    }
}

/// Gate that denies every call (for testing).
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAllGate;

#[async_trait]
impl HostCallGate for DenyAllGate {
    async fn check_http_request(
        &self,
        worker: &str,
        method: &str,
        url: &str,
    ) -> Result<(), String> {
        Err(format!("worker '{worker}' denied: {method} {url} (DenyAllGate)"))
    }
}

/// Gate that allows requests only to listed hosts.
///
/// An entry matches the host itself and any subdomain of it; `"*"` matches
/// everything. An empty list allows everything.
#[derive(Debug, Clone, Default)]
pub struct HostAllowListGate {
    hosts: Vec<String>,
}

impl HostAllowListGate {
    /// Create a gate from a list of host names.
    #[must_use]
    pub fn new(hosts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            hosts: hosts
                .into_iter()
                .map(|h| h.into().to_ascii_lowercase())
                .collect(),
        }
    }

    fn allows(&self, host: &str) -> bool {
        if self.hosts.is_empty() {
            return true;
        }
        let host = host.to_ascii_lowercase();
        self.hosts.iter().any(|d| {
            d == "*"
                || host == *d
                || host
                    .strip_suffix(d.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

#[async_trait]
impl HostCallGate for HostAllowListGate {
    async fn check_http_request(
        &self,
        worker: &str,
        _method: &str,
        url: &str,
    ) -> Result<(), String> {
        let parsed = url::Url::parse(url).map_err(|e| format!("invalid URL: {e}"))?;
        let host = parsed.host_str().unwrap_or_default();
        if self.allows(host) {
            Ok(())
        } else {
            Err(format!(
                "worker '{worker}' denied: network access to '{host}' is not allowed"
            ))
        }
    }
}
