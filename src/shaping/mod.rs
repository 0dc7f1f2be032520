//! Stream decorators that reshape an outbound response.
//!
//! Every stage wraps a [`Sink`] and is itself a [`Sink`], so stages stack.
//! Write failures from the wrapped sink propagate unchanged and nothing is retried.

pub mod chunked;
pub mod delay;
pub mod drop;
pub mod sink;
pub mod speed;
pub mod timeout;

pub use chunked::ChunkedStage;
pub use delay::DelayStage;
pub use drop::{DropStage, DropTracker};
pub use sink::{Sink, TcpSink, WriterSink};
pub use speed::SpeedStage;
pub use timeout::TimeoutStage;

use crate::policy::{ChunkedMode, DelayKind, DelayPolicy, UrlPolicy};

/// Wrap `sink` in the stages a resolved policy asks for.
///
/// From the outside in: drop, the delay-family stage, the body delay-family
/// stage, forced chunking, speed limiting. `dropping` is the caller's
/// [`DropTracker`] verdict for this request. A body delay waits for the first
/// flush, which the pipeline issues after the header block.
pub fn shape<S: Sink + 'static>(policy: &UrlPolicy, dropping: bool, sink: S) -> Box<dyn Sink> {
    let mut sink: Box<dyn Sink> = Box::new(sink);

    if let Some(rate) = policy.speed() {
        sink = Box::new(SpeedStage::new(sink, rate));
    }

    if let Some(chunked) = policy.chunked() {
        match &chunked.mode {
            ChunkedMode::Blocks(count) => sink = Box::new(ChunkedStage::blocks(sink, *count)),
            ChunkedMode::Sizes(sizes) => sink = Box::new(ChunkedStage::sizes(sink, sizes.clone())),
            ChunkedMode::Default | ChunkedMode::On | ChunkedMode::Off => {}
        }
    }

    if let Some(body) = policy.body_policy() {
        sink = wrap_delay_family(sink, body);
    }
    if let Some(delay) = policy.delay_policy() {
        sink = wrap_delay_family(sink, delay);
    }

    if dropping {
        sink = Box::new(DropStage::new(sink));
    }
    sink
}

fn wrap_delay_family(sink: Box<dyn Sink>, policy: &DelayPolicy) -> Box<dyn Sink> {
    match policy.kind {
        DelayKind::Delay if policy.body => Box::new(DelayStage::body(sink, policy.sample())),
        DelayKind::Delay => Box::new(DelayStage::new(sink, policy.sample())),
        DelayKind::Timeout => Box::new(TimeoutStage::new(sink, policy.sample())),
        // Drop decides the whole response up front, see DropTracker.
        DelayKind::Drop => sink,
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{Event, RecordingSink};
    use super::*;
    use crate::policy::Registry;
    use std::time::Duration;
    use tokio::time::Instant;

    fn url(command: &str) -> UrlPolicy {
        Registry::with_defaults().factory_url(command).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn plain_policy_passes_through() {
        let (sink, log) = RecordingSink::new();
        let mut shaped = shape(&url("url g.cn"), false, sink);
        shaped.write(b"hello").await.unwrap();
        shaped.flush().await.unwrap();
        assert_eq!(log.events(), vec![Event::Write(b"hello".to_vec()), Event::Flush]);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_suppresses_everything() {
        let (sink, log) = RecordingSink::new();
        let mut shaped = shape(&url("url drop 1s speed 1KB/s g.cn"), true, sink);
        shaped.write(b"hello").await.unwrap();
        shaped.flush().await.unwrap();
        assert!(log.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn delay_then_chunk() {
        let (sink, log) = RecordingSink::new();
        let start = Instant::now();
        let mut shaped = shape(&url("url delay 2s chunked block 2 g.cn"), false, sink);
        shaped.write(&[7u8; 10]).await.unwrap();

        assert_eq!(log.write_sizes(), vec![5, 5]);
        let writes = log.writes();
        assert!(writes[0].1 - start >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_over_slow_speed_resets() {
        let (sink, log) = RecordingSink::new();
        let mut shaped = shape(&url("url timeout 1s speed 1KB/s g.cn"), false, sink);
        let err = shaped.write(&[0u8; 8 * 1024]).await.unwrap_err();

        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
        assert_eq!(log.events().last(), Some(&Event::Reset));
        assert!(log.bytes().len() < 8 * 1024);
    }
}
