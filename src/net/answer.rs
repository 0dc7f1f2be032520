use std::net::IpAddr;

use super::resolver::DnsResolver;
use crate::{
    error::TamperError,
    policy::{DomainAction, DomainPolicy},
};

/// Answers DNS questions the way a resolved domain policy asks.
pub struct DnsAnswerer<R> {
    resolver: R,
    proxy_ips: Vec<IpAddr>,
}

impl<R: DnsResolver> DnsAnswerer<R> {
    /// `proxy_ips` is the answer for domains pointed at the proxy.
    pub fn new(resolver: R, proxy_ips: Vec<IpAddr>) -> Self {
        Self {
            resolver,
            proxy_ips,
        }
    }

    /// Addresses for `domain` under `policy`. No policy means an upstream lookup.
    pub async fn answer(
        &self,
        domain: &str,
        policy: Option<&DomainPolicy>,
    ) -> Result<Vec<IpAddr>, TamperError> {
        let Some(policy) = policy else {
            return self.resolver.lookup(domain).await;
        };

        if let Some(delay) = policy.delay() {
            let wait = delay.sample();
            log::debug!("delaying answer for {domain} by {wait:?}");
            tokio::time::sleep(wait).await;
        }

        match policy.action() {
            DomainAction::Block => Err(TamperError::DomainBlocked {
                domain: domain.to_string(),
            }),
            DomainAction::Null => Ok(Vec::new()),
            DomainAction::Proxy => {
                if self.proxy_ips.is_empty() {
                    log::warn!("{domain} points at the proxy but no proxy address is configured");
                }
                Ok(self.proxy_ips.clone())
            }
            DomainAction::None if !policy.ips().is_empty() => Ok(policy.next_ips()),
            DomainAction::None => self.resolver.lookup(domain).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::resolver::MockDnsResolver;
    use crate::policy::{Policy, Registry};
    use std::time::Duration;
    use tokio::time::Instant;

    fn domain(command: &str) -> DomainPolicy {
        match Registry::with_defaults().factory(command).unwrap() {
            Policy::Domain(policy) => policy,
            other => panic!("expected domain policy, got {other:?}"),
        }
    }

    fn upstream(times: usize) -> MockDnsResolver {
        let mut resolver = MockDnsResolver::new();
        resolver
            .expect_lookup()
            .times(times)
            .returning(|_| Ok(vec!["8.8.8.8".parse().unwrap()]));
        resolver
    }

    fn ips(list: &[&str]) -> Vec<IpAddr> {
        list.iter().map(|ip| ip.parse().unwrap()).collect()
    }

    #[tokio::test]
    async fn no_policy_asks_upstream() {
        let answerer = DnsAnswerer::new(upstream(1), Vec::new());
        assert_eq!(answerer.answer("g.cn", None).await.unwrap(), ips(&["8.8.8.8"]));
    }

    #[tokio::test]
    async fn block_is_an_error() {
        let answerer = DnsAnswerer::new(upstream(0), Vec::new());
        let policy = domain("domain block g.cn");
        let result = answerer.answer("g.cn", Some(&policy)).await;
        assert!(matches!(result, Err(TamperError::DomainBlocked { domain }) if domain == "g.cn"));
    }

    #[tokio::test]
    async fn null_and_proxy() {
        let answerer = DnsAnswerer::new(upstream(0), ips(&["10.0.0.1"]));
        let null = domain("domain null g.cn");
        assert!(answerer.answer("g.cn", Some(&null)).await.unwrap().is_empty());

        let proxy = domain("domain proxy g.cn");
        assert_eq!(answerer.answer("g.cn", Some(&proxy)).await.unwrap(), ips(&["10.0.0.1"]));
    }

    #[tokio::test]
    async fn explicit_addresses_rotate() {
        let answerer = DnsAnswerer::new(upstream(0), Vec::new());
        let policy = domain("domain circular n 2 g.cn 1.1.1.1,2.2.2.2,3.3.3.3");
        let mut answers = Vec::new();
        for _ in 0..3 {
            answers.push(answerer.answer("g.cn", Some(&policy)).await.unwrap());
        }
        assert_eq!(
            answers,
            vec![
                ips(&["1.1.1.1", "2.2.2.2"]),
                ips(&["3.3.3.3", "1.1.1.1"]),
                ips(&["2.2.2.2", "3.3.3.3"]),
            ]
        );
    }

    #[tokio::test]
    async fn limit_zero_answers_nothing() {
        let answerer = DnsAnswerer::new(upstream(0), Vec::new());
        let policy = domain("domain n 0 g.cn 192.168.1.1,192.168.1.2");
        assert!(answerer.answer("g.cn", Some(&policy)).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn delay_then_upstream() {
        let answerer = DnsAnswerer::new(upstream(1), Vec::new());
        let policy = domain("domain delay 2s g.cn");
        let start = Instant::now();
        answerer.answer("g.cn", Some(&policy)).await.unwrap();
        assert_eq!(Instant::now() - start, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn upstream_errors_propagate() {
        let mut resolver = MockDnsResolver::new();
        resolver
            .expect_lookup()
            .returning(|domain| Err(TamperError::DomainBlocked { domain: domain.to_string() }));
        let answerer = DnsAnswerer::new(resolver, Vec::new());
        assert!(answerer.answer("g.cn", None).await.is_err());
    }
}
