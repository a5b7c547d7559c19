//! Async transport over TCP or TLS.
//!
//! Wraps a connected stream in the [`LineCodec`] and exposes plain
//! read-line/send-line calls so the client loop never touches framing.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_util::codec::Framed;
use tracing::warn;

use crate::error::{ProtocolError, Result};
use crate::line::LineCodec;

/// A framed connection to an IRC server.
pub enum Transport {
    /// Plain TCP.
    Tcp {
        framed: Framed<TcpStream, LineCodec>,
    },
    /// Client-side TLS.
    Tls {
        framed: Framed<TlsStream<TcpStream>, LineCodec>,
    },
}

impl Transport {
    /// Wrap a connected TCP stream.
    pub fn tcp(stream: TcpStream) -> Self {
        if let Err(e) = enable_keepalive(&stream) {
            warn!("failed to enable TCP keepalive: {}", e);
        }
        Self::Tcp {
            framed: Framed::new(stream, LineCodec::new()),
        }
    }

    /// Wrap an established client-side TLS stream.
    pub fn tls(stream: TlsStream<TcpStream>) -> Self {
        if let Err(e) = enable_keepalive(stream.get_ref().0) {
            warn!("failed to enable TCP keepalive: {}", e);
        }
        Self::Tls {
            framed: Framed::new(stream, LineCodec::new()),
        }
    }

    /// True when the connection is encrypted.
    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Tls { .. })
    }

    /// Read the next line from the server.
    ///
    /// Returns `Ok(None)` when the connection closed cleanly.
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        match self {
            Self::Tcp { framed } => framed.next().await.transpose(),
            Self::Tls { framed } => framed.next().await.transpose(),
        }
    }

    /// Write one line, flushing it to the socket.
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        match self {
            Self::Tcp { framed } => framed.send(line.to_string()).await,
            Self::Tls { framed } => framed.send(line.to_string()).await,
        }
    }
}

fn enable_keepalive(stream: &TcpStream) -> Result<(), ProtocolError> {
    use socket2::{SockRef, TcpKeepalive};
    use std::time::Duration;

    let sock = SockRef::from(stream);
    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(120))
        .with_interval(Duration::from_secs(30));

    sock.set_tcp_keepalive(&keepalive)?;
    Ok(())
}
