//! Scripted test server.
//!
//! Listens on a loopback port and hands out one [`TestSession`] per
//! accepted bot connection. Sessions exchange raw IRC lines so tests
//! can assert on the exact bytes the bot writes.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;

const RECV_TIMEOUT: Duration = Duration::from_secs(10);

/// A listening fake IRC server.
pub struct TestServer {
    listener: TcpListener,
}

impl TestServer {
    /// Bind to an OS-assigned loopback port.
    pub async fn bind() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        Ok(Self { listener })
    }

    /// The port the server is listening on.
    pub fn port(&self) -> anyhow::Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    /// Wait for the bot to connect.
    pub async fn accept(&self) -> anyhow::Result<TestSession> {
        let (stream, _) = timeout(RECV_TIMEOUT, self.listener.accept()).await??;

        // Split stream for reading and writing
        let (read_half, write_half) = stream.into_split();
        Ok(TestSession {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
        })
    }
}

/// One accepted bot connection.
pub struct TestSession {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
}

impl TestSession {
    /// Send a raw IRC line to the bot.
    pub async fn send_raw(&mut self, line: &str) -> anyhow::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        if !line.ends_with("\r\n") {
            self.writer.write_all(b"\r\n").await?;
        }
        self.writer.flush().await?;
        Ok(())
    }

    /// Receive a single line from the bot.
    pub async fn recv(&mut self) -> anyhow::Result<String> {
        self.recv_timeout(RECV_TIMEOUT).await
    }

    /// Receive a line with a timeout.
    pub async fn recv_timeout(&mut self, dur: Duration) -> anyhow::Result<String> {
        let mut line = String::new();
        let n = timeout(dur, self.reader.read_line(&mut line)).await??;
        if n == 0 {
            anyhow::bail!("bot closed the connection");
        }
        Ok(line.trim_end().to_string())
    }

    /// Receive lines until one satisfies the predicate, returning it.
    #[allow(dead_code)]
    pub async fn recv_until<F>(&mut self, mut predicate: F) -> anyhow::Result<String>
    where
        F: FnMut(&str) -> bool,
    {
        loop {
            let line = self.recv().await?;
            if predicate(&line) {
                return Ok(line);
            }
        }
    }

    /// Drive the bot through registration: consume NICK and USER, then
    /// confirm with a 001 from the given server name.
    pub async fn register(&mut self, server_name: &str, nick: &str) -> anyhow::Result<()> {
        let line = self.recv().await?;
        if line != format!("NICK {nick}") {
            anyhow::bail!("expected NICK {nick}, got {line:?}");
        }
        let line = self.recv().await?;
        if !line.starts_with("USER ") {
            anyhow::bail!("expected USER, got {line:?}");
        }
        self.send_raw(&format!(":{server_name} 001 {nick} :Welcome"))
            .await
    }
}
