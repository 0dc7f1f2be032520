use std::net::IpAddr;

use async_trait::async_trait;
use hickory_resolver::{Resolver, TokioResolver};

#[cfg(test)]
use mockall::automock;

use crate::error::TamperError;

/// Upstream DNS lookups, abstracted for testing
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DnsResolver: Send + Sync + 'static {
    async fn lookup(&self, domain: &str) -> Result<Vec<IpAddr>, TamperError>;
}

/// Resolver using the system DNS configuration
pub struct SystemDnsResolver {
    resolver: TokioResolver,
}

impl SystemDnsResolver {
    pub fn new() -> Result<Self, TamperError> {
        let resolver = Resolver::builder_tokio()
            .map_err(|source| TamperError::DnsResolverInit { source })?
            .build();
        Ok(Self { resolver })
    }
}

#[async_trait]
impl DnsResolver for SystemDnsResolver {
    /// Resolve `domain` to every IPv4 and IPv6 address upstream returns
    ///
    /// # Examples
    /// ```no_run
    /// use tamper::net::{DnsResolver, SystemDnsResolver};
    ///
    /// # async fn example() {
    /// let resolver = SystemDnsResolver::new().unwrap();
    /// let ips = resolver.lookup("example.com").await.unwrap();
    /// # }
    /// ```
    async fn lookup(&self, domain: &str) -> Result<Vec<IpAddr>, TamperError> {
        let response = self
            .resolver
            .lookup_ip(domain)
            .await
            .map_err(|source| TamperError::DnsLookup {
                domain: domain.to_string(),
                source,
            })?;
        let ips: Vec<IpAddr> = response.iter().collect();
        log::debug!("upstream answered {domain} with {ips:?}");
        Ok(ips)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_localhost() {
        let resolver = SystemDnsResolver::new().unwrap();
        let ips = resolver.lookup("localhost").await.unwrap();
        assert!(ips.iter().any(IpAddr::is_loopback));
    }
}
