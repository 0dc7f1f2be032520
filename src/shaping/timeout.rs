use std::{io, time::Duration};

use async_trait::async_trait;
use tokio::time::Instant;

use super::Sink;
use crate::policy::MAX_DELAY;

/// Writes are cut into slices of this size so the deadline is checked often.
const SLICE: usize = 4 * 1024;

/// Resets the connection once the response has taken longer than the limit.
#[derive(Debug)]
pub struct TimeoutStage<S> {
    inner: S,
    deadline: Instant,
    expired: bool,
}

impl<S: Sink> TimeoutStage<S> {
    /// The clock starts now. Limits past [`MAX_DELAY`] are cut down to it.
    pub fn new(inner: S, limit: Duration) -> Self {
        let now = Instant::now();
        Self {
            inner,
            deadline: now.checked_add(limit.min(MAX_DELAY)).unwrap_or(now),
            expired: false,
        }
    }

    async fn expire(&mut self) -> io::Error {
        if !self.expired {
            self.expired = true;
            log::debug!("response timed out, resetting connection");
            if let Err(e) = self.inner.reset().await {
                log::warn!("failed to reset timed out connection: {e}");
            }
        }
        io::Error::new(io::ErrorKind::TimedOut, "response timed out")
    }

    async fn write_slice(&mut self, slice: &[u8]) -> io::Result<()> {
        if self.expired || Instant::now() >= self.deadline {
            return Err(self.expire().await);
        }
        match tokio::time::timeout_at(self.deadline, self.inner.write(slice)).await {
            Ok(result) => result,
            Err(_) => Err(self.expire().await),
        }
    }
}

#[async_trait]
impl<S: Sink> Sink for TimeoutStage<S> {
    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        if !self.inner.divisible() {
            return self.write_slice(data).await;
        }
        for slice in data.chunks(SLICE) {
            self.write_slice(slice).await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        if self.expired || Instant::now() >= self.deadline {
            return Err(self.expire().await);
        }
        self.inner.flush().await
    }

    async fn reset(&mut self) -> io::Result<()> {
        self.expired = true;
        self.inner.reset().await
    }

    fn divisible(&self) -> bool {
        self.inner.divisible()
    }
}
