use std::net::IpAddr;

use parking_lot::Mutex;
use rand::seq::SliceRandom;

use super::{
    delay::{DelayKind, DelayPolicy},
    leaf::{DeletePolicy, Marker, Scope},
    model::{Describe, Policy},
    registry::Registry,
    tokens::{Tokens, quote},
};
use crate::{error::TamperError, pattern::DomainPattern};

/// How DNS questions for a domain are answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DomainAction {
    /// Explicit addresses if configured, upstream otherwise.
    #[default]
    None,
    Block,
    /// Point the domain at the proxy itself.
    Proxy,
    /// Answer without addresses.
    Null,
}

impl DomainAction {
    fn from_marker(marker: Marker) -> Option<Self> {
        match marker {
            Marker::Default => Some(DomainAction::None),
            Marker::Block => Some(DomainAction::Block),
            Marker::Proxy => Some(DomainAction::Proxy),
            Marker::Null => Some(DomainAction::Null),
            _ => None,
        }
    }

    fn marker(self) -> Option<Marker> {
        match self {
            DomainAction::None => None,
            DomainAction::Block => Some(Marker::Block),
            DomainAction::Proxy => Some(Marker::Proxy),
            DomainAction::Null => Some(Marker::Null),
        }
    }
}

#[derive(Debug, Clone)]
pub enum DomainTarget {
    /// `all`: the catch-all policy.
    All,
    Pattern(DomainPattern),
}

impl DomainTarget {
    pub fn as_str(&self) -> &str {
        match self {
            DomainTarget::All => "all",
            DomainTarget::Pattern(pattern) => pattern.as_str(),
        }
    }

    pub fn matches(&self, domain: &str) -> bool {
        match self {
            DomainTarget::All => true,
            DomainTarget::Pattern(pattern) => pattern.matches(domain),
        }
    }
}

/// Per-domain DNS policy.
///
/// With `shuffle` the address list is permuted once when the policy is built.
/// With `circular` each [`DomainPolicy::next_ips`] call hands out the next
/// window of `n` addresses.
#[derive(Debug)]
pub struct DomainPolicy {
    action: DomainAction,
    delay: Option<DelayPolicy>,
    shuffle: bool,
    circular: bool,
    n: Option<usize>,
    target: DomainTarget,
    /// Addresses in the order they were written.
    ips: Vec<IpAddr>,
    /// Addresses in hand-out order.
    order: Vec<IpAddr>,
    cursor: Mutex<usize>,
}

impl Clone for DomainPolicy {
    fn clone(&self) -> Self {
        Self {
            action: self.action,
            delay: self.delay.clone(),
            shuffle: self.shuffle,
            circular: self.circular,
            n: self.n,
            target: self.target.clone(),
            ips: self.ips.clone(),
            order: self.order.clone(),
            cursor: Mutex::new(*self.cursor.lock()),
        }
    }
}

impl DomainPolicy {
    pub fn new(target: DomainTarget, ips: Vec<IpAddr>) -> Self {
        Self {
            action: DomainAction::None,
            delay: None,
            shuffle: false,
            circular: false,
            n: None,
            target,
            order: ips.clone(),
            ips,
            cursor: Mutex::new(0),
        }
    }

    /// Parse the part of a domain command after the `domain` keyword.
    pub fn parse(registry: &Registry, tokens: &mut Tokens) -> Result<Self, TamperError> {
        let mut action: Option<Marker> = None;
        let mut delay: Option<DelayPolicy> = None;
        let mut shuffle = false;
        let mut circular = false;
        let mut n = None;

        while let Some(token) = tokens.peek() {
            if !matches!(
                token,
                "default" | "block" | "proxy" | "null" | "delay" | "shuffle" | "circular" | "n"
            ) {
                break;
            }

            match registry.build(tokens)? {
                Policy::Marker(Marker::Shuffle) => shuffle = true,
                Policy::Marker(Marker::Circular) => circular = true,
                Policy::Marker(marker) if DomainAction::from_marker(marker).is_some() => {
                    if let Some(first) = action {
                        return Err(TamperError::Conflict {
                            slot: "action",
                            first: first.command(),
                            second: marker.command(),
                        });
                    }
                    action = Some(marker);
                }
                Policy::Delay(policy) if policy.kind == DelayKind::Delay && !policy.body => {
                    if let Some(first) = &delay {
                        return Err(TamperError::Conflict {
                            slot: "delay",
                            first: first.command(),
                            second: policy.command(),
                        });
                    }
                    delay = Some(policy);
                }
                Policy::Delay(policy) => {
                    return Err(TamperError::invalid(
                        "domain",
                        &policy.command(),
                        "only a plain delay applies to dns answers",
                    ));
                }
                Policy::N(limit) => n = Some(limit.n),
                other => {
                    return Err(TamperError::internal(format!(
                        "'{}' reached the domain option parser",
                        other.command()
                    )));
                }
            }
        }

        let target = match tokens.expect("domain", "a domain name or all")?.as_str() {
            "all" => DomainTarget::All,
            pattern => DomainTarget::Pattern(DomainPattern::parse(pattern)?),
        };

        let ips = match tokens.next_token() {
            Some(list) => parse_ip_list(&list)?,
            None => Vec::new(),
        };
        tokens.finish("domain")?;

        let mut policy = DomainPolicy::new(target, ips);
        policy.action = action
            .and_then(DomainAction::from_marker)
            .unwrap_or_default();
        policy.delay = delay;
        policy.circular = circular;
        policy.n = n;
        if shuffle {
            policy.shuffle = true;
            policy.order.shuffle(&mut rand::thread_rng());
        }
        Ok(policy)
    }

    /// Replace this policy with a reissued command for the same domain.
    ///
    /// When both are circular with the same written addresses and shuffle flag,
    /// the hand-out order and rotation position survive.
    pub fn update(&mut self, other: &DomainPolicy) {
        let keep_rotation =
            self.ips == other.ips && self.shuffle == other.shuffle && self.circular && other.circular;
        if !keep_rotation {
            *self = other.clone();
            return;
        }
        let order = std::mem::take(&mut self.order);
        let cursor = *self.cursor.get_mut();
        *self = other.clone();
        self.order = order;
        *self.cursor.get_mut() = cursor;
    }

    pub fn action(&self) -> DomainAction {
        self.action
    }

    pub fn delay(&self) -> Option<&DelayPolicy> {
        self.delay.as_ref()
    }

    pub fn target(&self) -> &DomainTarget {
        &self.target
    }

    pub fn ips(&self) -> &[IpAddr] {
        &self.ips
    }

    pub fn is_circular(&self) -> bool {
        self.circular
    }

    pub fn limit(&self) -> Option<usize> {
        self.n
    }

    pub fn matches(&self, domain: &str) -> bool {
        self.target.matches(domain)
    }

    /// Addresses to answer with for one query.
    ///
    /// Returns the first `n` addresses (all when `n` is unset), or the next
    /// rotating window of `n` addresses when `circular` is set.
    pub fn next_ips(&self) -> Vec<IpAddr> {
        let len = self.order.len();
        let count = self.n.unwrap_or(len).min(len);
        if count == 0 {
            return Vec::new();
        }
        if !self.circular {
            return self.order[..count].to_vec();
        }

        let mut cursor = self.cursor.lock();
        let start = *cursor;
        let window = (0..count).map(|i| self.order[(start + i) % len]).collect();
        *cursor = (start + count) % len;
        window
    }
}

fn parse_ip_list(list: &str) -> Result<Vec<IpAddr>, TamperError> {
    list.split(',')
        .map(|item| {
            item.trim()
                .parse::<IpAddr>()
                .map_err(|_| TamperError::invalid("domain", item, "not an IP address"))
        })
        .collect()
}

impl Describe for DomainPolicy {
    fn keyword(&self) -> &'static str {
        "domain"
    }

    fn command(&self) -> String {
        let mut parts = vec!["domain".to_string()];
        if let Some(marker) = self.action.marker() {
            parts.push(marker.command());
        }
        if let Some(delay) = &self.delay {
            parts.push(delay.command());
        }
        if self.shuffle {
            parts.push(Marker::Shuffle.command());
        }
        if let Some(n) = self.n {
            parts.push(format!("n {n}"));
        }
        if self.circular {
            parts.push(Marker::Circular.command());
        }
        parts.push(quote(self.target.as_str()).into_owned());
        if !self.ips.is_empty() {
            let ips: Vec<String> = self.ips.iter().map(IpAddr::to_string).collect();
            parts.push(ips.join(","));
        }
        parts.join(" ")
    }

    fn comment(&self) -> String {
        let mut parts = Vec::new();
        match self.action {
            DomainAction::None => {}
            DomainAction::Block => parts.push("block".to_string()),
            DomainAction::Proxy => parts.push("resolve to the proxy".to_string()),
            DomainAction::Null => parts.push(Marker::Null.comment()),
        }
        if let Some(delay) = &self.delay {
            parts.push(delay.comment());
        }
        if !self.ips.is_empty() {
            let ips: Vec<String> = self.ips.iter().map(IpAddr::to_string).collect();
            let mut answer = format!("answer {}", ips.join(","));
            if let Some(n) = self.n {
                answer.push_str(&format!(" ({n} at a time)"));
            }
            if self.shuffle {
                answer.push_str(", shuffled");
            }
            if self.circular {
                answer.push_str(", rotating");
            }
            parts.push(answer);
        }
        if parts.is_empty() {
            parts.push("resolve upstream".to_string());
        }
        format!("{}: {}", self.target.as_str(), parts.join("; "))
    }
}

pub(super) fn build_domain(
    registry: &Registry,
    _keyword: &str,
    tokens: &mut Tokens,
) -> Result<Policy, TamperError> {
    if tokens.accept("delete") {
        return DeletePolicy::parse(Scope::Domain, tokens).map(Policy::Delete);
    }
    DomainPolicy::parse(registry, tokens).map(Policy::Domain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::{collections::HashSet, sync::Arc, thread};

    fn domain(command: &str) -> DomainPolicy {
        match Registry::with_defaults().factory(command).unwrap() {
            Policy::Domain(policy) => policy,
            other => panic!("expected domain policy, got {other:?}"),
        }
    }

    fn ip(text: &str) -> IpAddr {
        text.parse().unwrap()
    }

    #[test]
    fn circular_rotation_cycles_windows() {
        let policy = domain("domain circular n 2 g.cn 10.0.0.1,10.0.0.2,10.0.0.3");
        let (a, b, c) = (ip("10.0.0.1"), ip("10.0.0.2"), ip("10.0.0.3"));
        assert_eq!(policy.next_ips(), vec![a, b]);
        assert_eq!(policy.next_ips(), vec![c, a]);
        assert_eq!(policy.next_ips(), vec![b, c]);
        assert_eq!(policy.next_ips(), vec![a, b]);
    }

    #[test]
    fn zero_limit_returns_nothing() {
        let policy = domain("domain n 0 g.cn 192.168.1.1,192.168.1.2");
        for _ in 0..3 {
            assert!(policy.next_ips().is_empty());
        }
    }

    #[test]
    fn non_circular_returns_same_prefix() {
        let policy = domain("domain n 1 g.cn 10.0.0.1,10.0.0.2");
        assert_eq!(policy.next_ips(), vec![ip("10.0.0.1")]);
        assert_eq!(policy.next_ips(), vec![ip("10.0.0.1")]);
    }

    #[test]
    fn unset_limit_returns_all() {
        let policy = domain("domain g.cn 10.0.0.1,::1");
        assert_eq!(policy.next_ips(), vec![ip("10.0.0.1"), ip("::1")]);
    }

    #[test]
    fn limit_larger_than_list_is_clamped() {
        let policy = domain("domain circular n 5 g.cn 10.0.0.1,10.0.0.2");
        assert_eq!(policy.next_ips().len(), 2);
        assert_eq!(policy.next_ips(), vec![ip("10.0.0.1"), ip("10.0.0.2")]);
    }

    #[test]
    fn shuffle_permutes_once() {
        let list: Vec<String> = (1..=20).map(|i| format!("10.0.0.{i}")).collect();
        let command = format!("domain shuffle g.cn {}", list.join(","));
        let policy = domain(&command);

        let first = policy.next_ips();
        assert_eq!(first, policy.next_ips());
        let written: HashSet<IpAddr> = policy.ips().iter().copied().collect();
        let handed: HashSet<IpAddr> = first.into_iter().collect();
        assert_eq!(written, handed);
        // Serialization keeps the written order so the command round-trips.
        assert_eq!(policy.command(), command);
    }

    #[test]
    fn concurrent_rotation_hands_out_every_window_once() {
        let policy = Arc::new(domain("domain circular n 1 g.cn 10.0.0.1,10.0.0.2,10.0.0.3,10.0.0.4"));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let policy = Arc::clone(&policy);
                thread::spawn(move || (0..100).map(|_| policy.next_ips()[0]).collect::<Vec<_>>())
            })
            .collect();

        let mut counts = std::collections::HashMap::new();
        for handle in handles {
            for ip in handle.join().unwrap() {
                *counts.entry(ip).or_insert(0) += 1;
            }
        }
        assert_eq!(counts.len(), 4);
        assert!(counts.values().all(|count| *count == 100));
    }

    #[rstest]
    #[case("domain g.cn")]
    #[case("domain block g.cn")]
    #[case("domain proxy *.g.cn")]
    #[case("domain null all")]
    #[case("domain delay rand 2s g.cn")]
    #[case("domain n 2 circular g.cn 1.1.1.1,2.2.2.2,3.3.3.3")]
    #[case("domain all 127.0.0.1")]
    fn test_domain_round_trip(#[case] command: &str) {
        let policy = domain(command);
        assert_eq!(policy.command(), command);
        assert_eq!(domain(&policy.command()).command(), command);
    }

    #[test]
    fn default_action_is_not_written() {
        assert_eq!(domain("domain default g.cn").command(), "domain g.cn");
    }

    #[rstest]
    #[case("domain g.cn 1.1.1.1,nope")]
    #[case("domain g.cn 300.1.1.1")]
    #[case("domain timeout 1s g.cn")]
    #[case("domain delay body 1s g.cn")]
    fn test_domain_invalid_value(#[case] command: &str) {
        assert!(matches!(
            Registry::with_defaults().factory(command),
            Err(TamperError::InvalidValue { .. })
        ));
    }

    #[test]
    fn domain_errors() {
        let registry = Registry::with_defaults();
        assert!(matches!(
            registry.factory("domain block proxy g.cn"),
            Err(TamperError::Conflict { .. })
        ));
        assert!(matches!(
            registry.factory("domain shuffle"),
            Err(TamperError::MissingArgument { .. })
        ));
        assert!(matches!(
            registry.factory("domain n -1 g.cn"),
            Err(TamperError::OutOfRange { .. })
        ));
        assert!(matches!(
            registry.factory("domain g.cn 1.1.1.1 extra"),
            Err(TamperError::TooManyArguments { .. })
        ));
    }

    #[test]
    fn delete_round_trip() {
        let policy = Registry::with_defaults().factory("domain delete g.cn").unwrap();
        assert_eq!(policy.command(), "domain delete g.cn");
    }

    #[test]
    fn update_keeps_rotation_for_same_list() {
        let mut policy = domain("domain circular n 1 g.cn 10.0.0.1,10.0.0.2");
        policy.next_ips();
        policy.update(&domain("domain delay 1s circular n 1 g.cn 10.0.0.1,10.0.0.2"));
        assert_eq!(policy.next_ips(), vec![ip("10.0.0.2")]);
        assert!(policy.delay().is_some());

        policy.update(&domain("domain circular n 1 g.cn 10.0.0.3,10.0.0.4"));
        assert_eq!(policy.next_ips(), vec![ip("10.0.0.3")]);
    }

    #[test]
    fn reissued_shuffle_continues_rotation() {
        let command = "domain shuffle circular n 1 g.cn 10.0.0.1,10.0.0.2,10.0.0.3,10.0.0.4,10.0.0.5,10.0.0.6";
        let mut policy = domain(command);
        policy.next_ips();
        policy.next_ips();
        let expected = policy.clone();

        policy.update(&domain(command));

        for _ in 0..8 {
            assert_eq!(policy.next_ips(), expected.next_ips());
        }
    }

    #[test]
    fn dropping_shuffle_restarts_in_written_order() {
        let mut policy = domain("domain shuffle circular n 1 g.cn 10.0.0.1,10.0.0.2,10.0.0.3");
        policy.next_ips();
        policy.update(&domain("domain circular n 1 g.cn 10.0.0.1,10.0.0.2,10.0.0.3"));
        assert_eq!(policy.next_ips(), vec![ip("10.0.0.1")]);
        assert_eq!(policy.next_ips(), vec![ip("10.0.0.2")]);
    }

    #[test]
    fn comment_describes_answer() {
        assert_eq!(
            domain("domain circular n 2 g.cn 1.1.1.1,2.2.2.2").comment(),
            "g.cn: answer 1.1.1.1,2.2.2.2 (2 at a time), rotating"
        );
        assert_eq!(domain("domain g.cn").comment(), "g.cn: resolve upstream");
    }
}
