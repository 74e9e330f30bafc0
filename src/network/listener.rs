use std::future::Future;
use std::io;
use std::net::{SocketAddr, TcpListener as StdTcpListener};

use anyhow::Context;
use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};

use crate::network::backoff::AcceptBackoff;
use crate::network::connection_handler::{ConnectionHandler, run_connection};

const LISTEN_BACKLOG: i32 = 1024;

// Build a nonblocking std::net::TcpListener with SO_REUSEADDR so a restarted server can rebind
// while old connections sit in TIME_WAIT.
pub fn build_tcp_listener(addr: SocketAddr) -> anyhow::Result<StdTcpListener> {
    let domain = match addr {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    socket.set_reuse_address(true)?;

    socket
        .bind(&addr.into())
        .with_context(|| format!("Failed to bind {addr}"))?;
    socket.listen(LISTEN_BACKLOG)?;
    let listener: StdTcpListener = socket.into();

    // Required for integrating with Tokio via TcpListener::from_std,
    // which expects a nonblocking socket so the runtime can drive it with readiness-based I/O.
    listener.set_nonblocking(true)?;

    Ok(listener)
}

/// Binds the server endpoint. Must be called inside a Tokio runtime.
pub fn bind(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::from_std(build_tcp_listener(addr)?)
        .context("Can't convert from STD listener to Tokio")?;
    tracing::info!(address = %listener.local_addr()?, "Server listening");
    Ok(listener)
}

/// Source of accepted connections.
#[async_trait]
pub trait Acceptor: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn accept(&self) -> io::Result<(Self::Stream, SocketAddr)>;
}

#[async_trait]
impl Acceptor for TcpListener {
    type Stream = TcpStream;

    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}

/// Keeps exactly one accept pending and hands each new connection to its own task.
pub struct Listener<A> {
    acceptor: A,
    handler: ConnectionHandler,
    backoff: AcceptBackoff,
}

impl<A: Acceptor> Listener<A> {
    pub fn new(acceptor: A, handler: ConnectionHandler, backoff: AcceptBackoff) -> Self {
        Self {
            acceptor,
            handler,
            backoff,
        }
    }

    /// Accepts until `shutdown` resolves and returns how many connections were accepted.
    ///
    /// A failed accept is logged and re-armed after a backoff delay; it never stops the loop.
    pub async fn run<F>(mut self, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut accepted = 0usize;

        loop {
            let result = tokio::select! {
                _ = &mut shutdown => break,
                result = self.acceptor.accept() => result,
            };

            match result {
                Ok((stream, peer)) => {
                    self.backoff.reset();
                    accepted += 1;
                    tracing::debug!(peer = %peer, "Accepted connection");

                    // The next loop iteration re-arms the accept while this one is served.
                    tokio::spawn(run_connection(stream, peer, self.handler));
                }
                Err(error) => {
                    let delay = self.backoff.next_delay();
                    tracing::warn!(error = %error, retry_in = ?delay, "TCP accept failed");

                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        tracing::info!(accepted, "Listener stopped");
        accepted
    }
}
