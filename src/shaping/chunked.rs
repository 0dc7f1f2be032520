use std::io;

use async_trait::async_trait;

use super::Sink;
use crate::value::ChunkSizes;

#[derive(Debug)]
enum Framing {
    /// Split the stream into `count` roughly equal pieces of what has been seen so far.
    Blocks { count: usize, written: usize },
    Sizes(ChunkSizes),
}

/// Forces chunk boundaries by flushing after every piece.
#[derive(Debug)]
pub struct ChunkedStage<S> {
    inner: S,
    framing: Framing,
}

impl<S> ChunkedStage<S> {
    pub fn blocks(inner: S, count: usize) -> Self {
        Self {
            inner,
            framing: Framing::Blocks {
                count: count.max(1),
                written: 0,
            },
        }
    }

    pub fn sizes(inner: S, sizes: Vec<i64>) -> Self {
        Self {
            inner,
            framing: Framing::Sizes(ChunkSizes::new(sizes)),
        }
    }
}

/// End of the first of `count` even pieces of `total` that reaches past `written`.
///
/// Requires `written < total`. Piece `k` ends at `total * k / count`.
fn next_boundary(written: usize, total: usize, count: usize) -> usize {
    let (written, total, count) = (written as u128, total as u128, count as u128);
    let k = ((written + 1) * count).div_ceil(total);
    (total * k / count) as usize
}

#[async_trait]
impl<S: Sink> Sink for ChunkedStage<S> {
    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let Self { inner, framing } = self;
        match framing {
            Framing::Blocks { count, written } => {
                let total = *written + data.len();
                let mut offset = 0;
                while *written < total {
                    let end = next_boundary(*written, total, *count);
                    let n = end - *written;
                    inner.write(&data[offset..offset + n]).await?;
                    inner.flush().await?;
                    offset += n;
                    *written += n;
                }
            }
            Framing::Sizes(sizes) => {
                let mut rest = data;
                while !rest.is_empty() {
                    let take = sizes.next_size().map_or(rest.len(), |size| size.min(rest.len()));
                    let (head, tail) = rest.split_at(take);
                    inner.write(head).await?;
                    inner.flush().await?;
                    rest = tail;
                }
            }
        }
        Ok(())
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
