use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use bytes::BytesMut;
use rand::Rng;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Companion client: one connection per request, one reply per connection.
#[derive(Debug, Clone, Copy)]
pub struct EchoClient {
    address: SocketAddr,
    buffer_size: usize,
    reply_timeout: Duration,
}

pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Two-digit-style request text: the sum of a number in `0..10` and one in `1..=10`.
pub fn random_expression<R: Rng>(rng: &mut R) -> String {
    let left: u32 = rng.gen_range(0..10);
    let right: u32 = rng.gen_range(1..=10);
    (left + right).to_string()
}

impl EchoClient {
    pub fn new(address: SocketAddr, buffer_size: usize) -> Self {
        Self {
            address,
            buffer_size: buffer_size.max(1),
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }

    /// Deadline for a whole round trip: connect, send and the single reply read.
    pub fn with_reply_timeout(mut self, reply_timeout: Duration) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }

    /// Connect, send `request`, and return the trimmed reply.
    ///
    /// A server that stalls or never answers fails the round trip once the deadline passes.
    pub async fn exchange(&self, request: &str) -> Result<String> {
        tokio::time::timeout(self.reply_timeout, self.round_trip(request))
            .await
            .with_context(|| format!("No reply within {:?}", self.reply_timeout))?
    }

    async fn round_trip(&self, request: &str) -> Result<String> {
        let mut stream = TcpStream::connect(self.address)
            .await
            .with_context(|| format!("Failed to connect to {}", self.address))?;

        stream
            .write_all(request.as_bytes())
            .await
            .context("Failed to send request")?;

        // One read, as on the server side; the socket may stay open after the reply.
        let mut reply = BytesMut::with_capacity(self.buffer_size);
        (&mut stream)
            .take(self.buffer_size as u64)
            .read_buf(&mut reply)
            .await
            .context("Failed to read reply")?;

        let reply = String::from_utf8_lossy(&reply).trim().to_owned();
        tracing::info!(request, reply = %reply, "Received reply");
        Ok(reply)
    }

    /// Runs `iterations` round trips and returns how many replies matched their request.
    ///
    /// Fails if any round trip could not complete.
    pub async fn run(&self, iterations: usize, parallel: bool) -> Result<usize> {
        let requests: Vec<String> = {
            let mut rng = rand::thread_rng();
            (0..iterations).map(|_| random_expression(&mut rng)).collect()
        };

        let outcomes = if parallel {
            futures::future::join_all(requests.iter().map(|request| self.exchange(request))).await
        } else {
            let mut outcomes = Vec::with_capacity(requests.len());
            for request in &requests {
                outcomes.push(self.exchange(request).await);
            }
            outcomes
        };

        let mut matched = 0;
        let mut failed = 0;
        for (request, outcome) in requests.iter().zip(outcomes) {
            match outcome {
                Ok(reply) if reply == *request => matched += 1,
                Ok(reply) => {
                    tracing::warn!(request = %request, reply = %reply, "Reply does not match request")
                }
                Err(error) => {
                    failed += 1;
                    tracing::error!(request = %request, "Round trip failed: {error:#}");
                }
            }
        }

        if failed > 0 {
            bail!("{failed} of {iterations} round trips failed");
        }

        tracing::info!(matched, iterations, "Client finished");
        Ok(matched)
    }
}
