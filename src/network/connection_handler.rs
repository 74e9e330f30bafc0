use std::io;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Echoes a single message per connection.
///
/// Holds no per-connection state, so one copy is shared by every accepted socket.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionHandler {
    buffer_size: usize,
}

impl Default for ConnectionHandler {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

impl ConnectionHandler {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
        }
    }

    /// One read, then one write of the trimmed text back to the same stream.
    ///
    /// Returns the echoed payload, or `None` when the peer closed without sending anything.
    /// The stream is dropped on return; a second message on it is never answered.
    pub async fn handle<S>(&self, mut stream: S) -> Result<Option<String>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut input_buf = BytesMut::with_capacity(self.buffer_size);

        // Bounded to buffer_size even if BytesMut hands out more spare capacity.
        let n = (&mut stream)
            .take(self.buffer_size as u64)
            .read_buf(&mut input_buf)
            .await
            .context("Failed to read message")?;

        if n == 0 {
            tracing::debug!("Peer closed before sending data");
            return Ok(None);
        }

        let response = echo_payload(&input_buf[..n])?;
        tracing::info!(bytes = n, message = %response, "Received message");

        let mut output_buf = BytesMut::with_capacity(self.buffer_size);
        output_buf.put_slice(response.as_bytes());

        stream
            .write_all(&output_buf)
            .await
            .context("Failed to write echo reply")?;
        stream.flush().await.context("Failed to flush echo reply")?;

        Ok(Some(response))
    }
}

/// Decode exactly the received bytes and strip surrounding whitespace.
pub fn echo_payload(received: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(received).context("Received bytes are not valid UTF-8")?;
    Ok(text.trim().to_owned())
}

/// Task body for one accepted connection. Failures stay local to the connection.
pub async fn run_connection<S>(stream: S, peer: SocketAddr, handler: ConnectionHandler)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match handler.handle(stream).await {
        Ok(Some(_)) => tracing::debug!(peer = %peer, "Echo completed"),
        Ok(None) => tracing::debug!(peer = %peer, "Connection closed without data"),
        Err(error) if is_client_disconnect(&error) => {
            tracing::debug!(peer = %peer, "Client disconnected: {error:#}");
        }
        Err(error) => {
            tracing::error!(peer = %peer, "Connection error: {error:#}");
        }
    }
}

/// Expected client disconnects are not errors but normal cases.
pub fn is_client_disconnect(error: &anyhow::Error) -> bool {
    error.downcast_ref::<io::Error>().is_some_and(|io_err| {
        matches!(
            io_err.kind(),
            io::ErrorKind::UnexpectedEof
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
        )
    })
}
