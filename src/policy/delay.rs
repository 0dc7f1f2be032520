use std::time::Duration;

use rand::Rng;

use super::{
    model::{Describe, Policy},
    registry::Registry,
    tokens::Tokens,
};
use crate::{
    error::TamperError,
    value::{format_duration, parse_duration},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayKind {
    /// Swallow responses for a window after the first request.
    Drop,
    /// Wait before writing.
    Delay,
    /// Reset the connection once the response has taken this long.
    Timeout,
}

impl DelayKind {
    pub fn keyword(self) -> &'static str {
        match self {
            DelayKind::Drop => "drop",
            DelayKind::Delay => "delay",
            DelayKind::Timeout => "timeout",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "drop" => Some(DelayKind::Drop),
            "delay" => Some(DelayKind::Delay),
            "timeout" => Some(DelayKind::Timeout),
            _ => None,
        }
    }
}

/// Longest accepted duration. Any `Instant` this far ahead is representable.
pub const MAX_DELAY: Duration = Duration::from_secs(366 * 24 * 60 * 60);

/// `(drop|delay|timeout) [body] [rand] <duration>`
#[derive(Debug, Clone, PartialEq)]
pub struct DelayPolicy {
    pub kind: DelayKind,
    pub body: bool,
    pub rand: bool,
    /// Seconds.
    pub duration: f64,
}

impl DelayPolicy {
    pub fn new(kind: DelayKind, duration: f64) -> Self {
        Self {
            kind,
            body: false,
            rand: false,
            duration,
        }
    }

    /// The configured duration, clamped to [`MAX_DELAY`].
    pub fn duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.duration.clamp(0.0, MAX_DELAY.as_secs_f64()))
            .unwrap_or(Duration::ZERO)
    }

    /// The configured duration, scaled by `uniform(0, 1)` when `rand` is set.
    pub fn sample(&self) -> Duration {
        if self.rand {
            let factor: f64 = rand::thread_rng().gen_range(0.0..1.0);
            self.duration().mul_f64(factor)
        } else {
            self.duration()
        }
    }
}

impl Describe for DelayPolicy {
    fn keyword(&self) -> &'static str {
        self.kind.keyword()
    }

    fn command(&self) -> String {
        let duration = format_duration(self.duration);
        let mut parts: Vec<&str> = vec![self.kind.keyword()];
        if self.body {
            parts.push("body");
        }
        if self.rand {
            parts.push("rand");
        }
        parts.push(&duration);
        parts.join(" ")
    }

    fn comment(&self) -> String {
        let duration = format_duration(self.duration);
        let amount = if self.rand {
            format!("a random time up to {duration}")
        } else {
            duration
        };
        let scope = if self.body { " the body" } else { "" };
        match self.kind {
            DelayKind::Drop if self.duration == 0.0 => format!("drop{scope} the first request"),
            DelayKind::Drop => format!("drop{scope} requests for {amount} after the first"),
            DelayKind::Delay => format!("delay{scope} {amount}"),
            DelayKind::Timeout => format!("time out{scope} after {amount}"),
        }
    }
}

pub(super) fn build_delay(
    _registry: &Registry,
    keyword: &str,
    tokens: &mut Tokens,
) -> Result<Policy, TamperError> {
    let kind = DelayKind::from_keyword(keyword).ok_or_else(|| TamperError::UnknownKeyword {
        keyword: keyword.to_string(),
    })?;

    let mut policy = DelayPolicy::new(kind, 0.0);
    policy.body = tokens.accept("body");
    policy.rand = tokens.accept("rand");

    let raw = tokens.expect(keyword, "a duration like 1s or 500ms")?;
    policy.duration = parse_duration(&raw).map_err(|reason| TamperError::invalid(keyword, &raw, reason))?;
    if policy.duration > MAX_DELAY.as_secs_f64() {
        return Err(TamperError::out_of_range(keyword, &raw, "duration must be at most 366 days"));
    }
    Ok(Policy::Delay(policy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn build(command: &str) -> Result<Policy, TamperError> {
        Registry::with_defaults().factory(command)
    }

    #[rstest]
    #[case("delay 1s")]
    #[case("delay body 500ms")]
    #[case("delay rand 1.5m")]
    #[case("delay body rand 2h")]
    #[case("timeout 30s")]
    #[case("timeout body 10s")]
    #[case("drop 0ms")]
    #[case("drop 1m")]
    fn test_delay_round_trip(#[case] command: &str) {
        let policy = build(command).unwrap();
        assert_eq!(policy.command(), command);
    }

    #[test]
    fn duration_is_normalized() {
        assert_eq!(build("delay 90").unwrap().command(), "delay 1.5m");
        assert_eq!(build("drop 0").unwrap().command(), "drop 0ms");
    }

    #[test]
    fn flags_are_parsed() {
        let Policy::Delay(policy) = build("timeout body rand 2s").unwrap() else {
            panic!("expected delay policy");
        };
        assert_eq!(policy.kind, DelayKind::Timeout);
        assert!(policy.body);
        assert!(policy.rand);
        assert_eq!(policy.duration(), Duration::from_secs(2));
    }

    #[rstest]
    #[case("delay")]
    #[case("delay body")]
    #[case("timeout body rand")]
    fn test_missing_duration(#[case] command: &str) {
        assert!(matches!(build(command), Err(TamperError::MissingArgument { .. })));
    }

    #[test]
    fn malformed_duration() {
        assert!(matches!(build("delay soon"), Err(TamperError::InvalidValue { .. })));
    }

    #[rstest]
    #[case("delay 1e300h")]
    #[case("delay rand 1e308h")]
    #[case("timeout 1e20s")]
    #[case("drop body 8785h")]
    fn test_out_of_range(#[case] command: &str) {
        assert!(matches!(build(command), Err(TamperError::OutOfRange { .. })));
    }

    #[test]
    fn longest_duration_is_accepted() {
        let Policy::Delay(policy) = build("timeout 8784h").unwrap() else {
            panic!("expected delay policy");
        };
        assert_eq!(policy.duration(), MAX_DELAY);
    }

    #[test]
    fn oversized_duration_is_clamped() {
        let mut policy = DelayPolicy::new(DelayKind::Delay, 1e300);
        assert_eq!(policy.duration(), MAX_DELAY);
        policy.rand = true;
        assert!(policy.sample() <= MAX_DELAY);
        assert_eq!(DelayPolicy::new(DelayKind::Delay, f64::NAN).duration(), Duration::ZERO);
    }

    #[test]
    fn rand_sample_stays_within_bounds() {
        let mut policy = DelayPolicy::new(DelayKind::Delay, 2.0);
        policy.rand = true;
        for _ in 0..100 {
            assert!(policy.sample() <= Duration::from_secs(2));
        }
        policy.rand = false;
        assert_eq!(policy.sample(), Duration::from_secs(2));
    }

    #[test]
    fn comments_describe_behavior() {
        assert_eq!(DelayPolicy::new(DelayKind::Drop, 0.0).comment(), "drop the first request");
        assert_eq!(DelayPolicy::new(DelayKind::Delay, 1.0).comment(), "delay 1s");
        assert_eq!(DelayPolicy::new(DelayKind::Timeout, 60.0).comment(), "time out after 1m");
    }
}
