use std::{io, time::Duration};

use async_trait::async_trait;
use tokio::time::{Instant, sleep, sleep_until};

use super::Sink;
use crate::policy::MAX_DELAY;

/// How long to wait when the byte budget is used up.
const PAUSE: Duration = Duration::from_millis(500);

/// A window this old with unused budget starts over, so idle time is not banked.
const IDLE_RESET: Duration = Duration::from_secs(5);

/// Unused budget worth less than this much sending time is not idleness.
/// A writer kept busy at the full rate always trails its budget by up to one
/// [`PAUSE`], which must not trigger a reset.
const IDLE_SLACK: Duration = Duration::from_secs(1);

/// Limits throughput to a fixed number of bytes per second.
#[derive(Debug)]
pub struct SpeedStage<S> {
    inner: S,
    bytes_per_sec: f64,
    written: u64,
    window_start: Instant,
}

impl<S> SpeedStage<S> {
    pub fn new(inner: S, bytes_per_sec: f64) -> Self {
        Self {
            inner,
            bytes_per_sec,
            written: 0,
            window_start: Instant::now(),
        }
    }

    fn budget(&self, elapsed: Duration) -> f64 {
        elapsed.as_secs_f64() * self.bytes_per_sec
    }
}

impl<S: Sink> SpeedStage<S> {
    /// The write cannot be split: hold the caller until the bytes would have
    /// trickled out at the configured rate.
    async fn write_whole(&mut self, data: &[u8]) -> io::Result<()> {
        let now = Instant::now();
        let wait = Duration::try_from_secs_f64(data.len() as f64 / self.bytes_per_sec)
            .map_or(MAX_DELAY, |wait| wait.min(MAX_DELAY));
        let deadline = now.checked_add(wait).unwrap_or(now);
        self.inner.write(data).await?;
        sleep_until(deadline).await;
        Ok(())
    }

    async fn write_metered(&mut self, data: &[u8]) -> io::Result<()> {
        let mut rest = data;
        while !rest.is_empty() {
            let now = Instant::now();
            let mut elapsed = now.saturating_duration_since(self.window_start);
            let unused = self.budget(elapsed) - self.written as f64;
            if elapsed > IDLE_RESET && unused > self.budget(IDLE_SLACK) {
                self.written = 0;
                self.window_start = now;
                elapsed = Duration::ZERO;
            }

            let allowed = (self.budget(elapsed) - self.written as f64).floor();
            if allowed < 1.0 {
                sleep(PAUSE).await;
                continue;
            }

            let take = (allowed as usize).min(rest.len());
            let (head, tail) = rest.split_at(take);
            self.inner.write(head).await?;
            self.inner.flush().await?;
            self.written += take as u64;
            rest = tail;
        }
        Ok(())
    }
}

#[async_trait]
impl<S: Sink> Sink for SpeedStage<S> {
    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        if self.inner.divisible() {
            self.write_metered(data).await
        } else {
            self.write_whole(data).await
        }
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().await
    }

    async fn reset(&mut self) -> io::Result<()> {
        self.inner.reset().await
    }

    fn divisible(&self) -> bool {
        self.inner.divisible()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shaping::testing::RecordingSink;

    #[tokio::test(start_paused = true)]
    async fn metered_writes_follow_the_rate() {
        let (sink, log) = RecordingSink::new();
        let start = Instant::now();
        let mut stage = SpeedStage::new(sink, 1024.0);

        stage.write(&[0u8; 2048]).await.unwrap();

        let elapsed = Instant::now() - start;
        assert!(elapsed >= Duration::from_millis(1500), "{elapsed:?}");
        assert!(elapsed <= Duration::from_millis(2500), "{elapsed:?}");
        assert_eq!(log.bytes().len(), 2048);
        assert!(log.write_sizes().iter().all(|size| *size <= 1024));
    }

    #[tokio::test(start_paused = true)]
    async fn no_write_exceeds_budget() {
        let (sink, log) = RecordingSink::new();
        let start = Instant::now();
        let mut stage = SpeedStage::new(sink, 100.0);
        stage.write(&[0u8; 1000]).await.unwrap();

        let mut total = 0.0;
        for (data, at) in log.writes() {
            total += data.len() as f64;
            assert!(total <= (at - start).as_secs_f64() * 100.0 + 1.0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn idle_time_is_not_banked() {
        let (sink, log) = RecordingSink::new();
        let mut stage = SpeedStage::new(sink, 100.0);
        stage.write(&[0u8; 50]).await.unwrap();

        sleep(Duration::from_secs(60)).await;
        let resumed = Instant::now();
        stage.write(&[0u8; 1000]).await.unwrap();

        // Without the reset the whole kilobyte would go out at once.
        assert!(Instant::now() - resumed >= Duration::from_secs(9));
        assert!(log.write_sizes().iter().skip(1).all(|size| *size < 1000));
    }

    #[tokio::test(start_paused = true)]
    async fn steady_writer_keeps_full_rate() {
        let (sink, log) = RecordingSink::new();
        let start = Instant::now();
        let mut stage = SpeedStage::new(sink, 100.0);

        stage.write(&[0u8; 2000]).await.unwrap();

        // Resetting at every pause would cost one pause per window.
        let elapsed = Instant::now() - start;
        assert!(elapsed <= Duration::from_millis(20_500), "{elapsed:?}");
        assert!(elapsed >= Duration::from_millis(19_500), "{elapsed:?}");
        assert_eq!(log.bytes().len(), 2000);
    }

    #[tokio::test(start_paused = true)]
    async fn indivisible_write_waits_afterwards() {
        let (sink, log) = RecordingSink::indivisible();
        let start = Instant::now();
        let mut stage = SpeedStage::new(sink, 1000.0);

        stage.write(&[0u8; 3000]).await.unwrap();

        assert_eq!(log.write_sizes(), vec![3000]);
        assert_eq!(log.writes()[0].1, start);
        assert_eq!(Instant::now() - start, Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn indivisible_wait_is_capped() {
        let (sink, log) = RecordingSink::indivisible();
        let start = Instant::now();
        let mut stage = SpeedStage::new(sink, 1e-300);

        stage.write(b"hello").await.unwrap();

        assert_eq!(log.bytes(), b"hello".to_vec());
        assert_eq!(Instant::now() - start, MAX_DELAY);
    }
}
