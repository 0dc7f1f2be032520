use std::{collections::HashMap, io};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::Sink;
use crate::policy::DelayPolicy;

/// Remembers when each drop target was first requested.
///
/// A zero duration drops the first request only. Otherwise every request
/// within the duration of the first one is dropped.
#[derive(Debug, Default)]
pub struct DropTracker {
    first_seen: Mutex<HashMap<String, Instant>>,
}

impl DropTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn should_drop(&self, target: &str, policy: &DelayPolicy) -> bool {
        self.should_drop_at(target, policy, Instant::now())
    }

    pub fn should_drop_at(&self, target: &str, policy: &DelayPolicy, now: Instant) -> bool {
        let mut first_seen = self.first_seen.lock();
        let Some(first) = first_seen.get(target) else {
            first_seen.insert(target.to_string(), now);
            log::debug!("dropping first request for {target}");
            return true;
        };
        policy.duration > 0.0 && now.saturating_duration_since(*first) < policy.duration()
    }

    /// Forget `target`, so the next request counts as the first again.
    pub fn reset(&self, target: &str) {
        self.first_seen.lock().remove(target);
    }

    pub fn clear(&self) {
        self.first_seen.lock().clear();
    }
}

/// Swallows all output.
#[derive(Debug)]
pub struct DropStage<S> {
    inner: S,
}

impl<S> DropStage<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: Sink> Sink for DropStage<S> {
    async fn write(&mut self, _data: &[u8]) -> io::Result<()> {
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    async fn reset(&mut self) -> io::Result<()> {
        self.inner.reset().await
    }

    fn divisible(&self) -> bool {
        self.inner.divisible()
    }
}
