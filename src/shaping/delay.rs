use std::{io, time::Duration};

use async_trait::async_trait;

use super::Sink;

/// Waits once before the first write or flush reaches the inner sink.
///
/// In body mode the first flush marks the end of the header block and the wait
/// happens before the next write instead.
#[derive(Debug)]
pub struct DelayStage<S> {
    inner: S,
    wait: Option<Duration>,
    in_body: bool,
}

impl<S> DelayStage<S> {
    pub fn new(inner: S, wait: Duration) -> Self {
        Self {
            inner,
            wait: Some(wait),
            in_body: true,
        }
    }

    pub fn body(inner: S, wait: Duration) -> Self {
        Self {
            inner,
            wait: Some(wait),
            in_body: false,
        }
    }

    async fn settle(&mut self) {
        if let Some(wait) = self.wait.take() {
            tokio::time::sleep(wait).await;
        }
    }
}

#[async_trait]
impl<S: Sink> Sink for DelayStage<S> {
    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        if self.in_body {
            self.settle().await;
        }
        self.inner.write(data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        if self.in_body {
            self.settle().await;
        }
        self.inner.flush().await?;
        self.in_body = true;
        Ok(())
    }

    async fn reset(&mut self) -> io::Result<()> {
        self.inner.reset().await
    }

    fn divisible(&self) -> bool {
        self.inner.divisible()
    }
}
