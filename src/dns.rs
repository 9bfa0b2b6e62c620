//! DNS existence probing.
//!
//! Used by the URL normalizer's TLD probing and by the crawler's
//! DNS-error fallbacks: both only need to know whether a host name
//! currently resolves to an address.

use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use tracing::debug;

/// A-record prober backed by the system-independent default resolver
/// configuration. `disabled()` yields a prober whose lookups always fail,
/// which tests use to exercise probe-exhaustion paths without network.
pub struct DnsProber {
    resolver: Option<TokioAsyncResolver>,
}

impl DnsProber {
    pub fn new() -> Self {
        Self {
            resolver: Some(TokioAsyncResolver::tokio(
                ResolverConfig::default(),
                ResolverOpts::default(),
            )),
        }
    }

    /// A prober with no backing resolver; every lookup fails.
    pub fn disabled() -> Self {
        Self { resolver: None }
    }

    /// True when the host resolves to at least one address.
    pub async fn resolves(&self, host: &str) -> bool {
        let Some(resolver) = &self.resolver else {
            return false;
        };
        match resolver.lookup_ip(host).await {
            Ok(lookup) => {
                let found = lookup.iter().next().is_some();
                debug!("DNS probe for '{}': resolved={}", host, found);
                found
            }
            Err(e) => {
                debug!("DNS probe for '{}' failed: {}", host, e);
                false
            }
        }
    }
}

impl Default for DnsProber {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_prober_never_resolves() {
        let prober = DnsProber::disabled();
        assert!(!prober.resolves("example.com").await);
        assert!(!prober.resolves("definitely-not-a-host.invalid").await);
    }
}
