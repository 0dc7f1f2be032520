use std::io;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    net::TcpStream,
};

/// Destination of a response byte stream.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Sink: Send {
    /// Write all of `data`.
    async fn write(&mut self, data: &[u8]) -> io::Result<()>;

    async fn flush(&mut self) -> io::Result<()>;

    /// Abort the connection without a graceful close.
    async fn reset(&mut self) -> io::Result<()>;

    /// Whether one write may be split into several smaller ones.
    fn divisible(&self) -> bool {
        true
    }
}

#[async_trait]
impl<S: Sink + ?Sized> Sink for Box<S> {
    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        (**self).write(data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        (**self).flush().await
    }

    async fn reset(&mut self) -> io::Result<()> {
        (**self).reset().await
    }

    fn divisible(&self) -> bool {
        (**self).divisible()
    }
}

/// Adapts any tokio writer. A reset only shuts the writer down.
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
    divisible: bool,
}

impl<W> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            divisible: true,
        }
    }

    /// Writes must reach the writer whole, as with a framed transport.
    pub fn indivisible(writer: W) -> Self {
        Self {
            writer,
            divisible: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> Sink for WriterSink<W> {
    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.writer.write_all(data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.writer.flush().await
    }

    async fn reset(&mut self) -> io::Result<()> {
        self.writer.shutdown().await
    }

    fn divisible(&self) -> bool {
        self.divisible
    }
}

/// Client TCP connection. A reset closes it with an RST.
#[derive(Debug)]
pub struct TcpSink {
    stream: Option<TcpStream>,
}

impl TcpSink {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    fn stream(&mut self) -> io::Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "connection was reset"))
    }
}

#[async_trait]
impl Sink for TcpSink {
    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream()?.write_all(data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.stream()?.flush().await
    }

    async fn reset(&mut self) -> io::Result<()> {
        let Some(stream) = self.stream.take() else {
            return Ok(());
        };
        abort(stream)
    }
}

/// Zero linger turns the close into an RST.
#[cfg(unix)]
fn abort(stream: TcpStream) -> io::Result<()> {
    use nix::sys::socket::{setsockopt, sockopt::Linger};

    let linger = libc::linger {
        l_onoff: 1,
        l_linger: 0,
    };
    setsockopt(&stream, Linger, &linger).map_err(io::Error::from)?;
    log::debug!("resetting connection to {:?}", stream.peer_addr().ok());
    drop(stream);
    Ok(())
}

#[cfg(not(unix))]
fn abort(stream: TcpStream) -> io::Result<()> {
    drop(stream);
    Ok(())
}
