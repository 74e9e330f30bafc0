use clap::{Parser, ValueEnum};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "echo-aio",
    about = "Asynchronous TCP echo server and its companion client"
)]
pub struct StartupArguments {
    #[arg(long = "mode", value_enum, default_value_t = Mode::Server, help = "Run mode: server or client")]
    pub mode: Mode,

    #[arg(
        long = "address",
        default_value = "0.0.0.0:8888",
        help = "Socket address to bind (server) or connect to (client), e.g. 0.0.0.0:8888"
    )]
    pub address: SocketAddr,

    #[arg(long = "buffer-size", default_value_t = 1024, value_parser = clap::value_parser!(u32).range(1..), help = "Capacity in bytes of each read/write buffer")]
    pub buffer_size: u32,

    #[arg(long = "workers", default_value_t = StartupArguments::default_workers(), help = "Worker threads in the shared pool; can also be set via ECHO_WORKERS env var")]
    pub workers: usize,

    #[arg(long = "iterations", default_value_t = 10, help = "Client only: number of request/reply round trips")]
    pub iterations: usize,

    #[arg(long = "parallel", help = "Client only: run all round trips concurrently")]
    pub parallel: bool,

    #[arg(long = "reply-timeout-ms", default_value_t = 5000, help = "Client only: deadline for each round trip")]
    pub reply_timeout_ms: u64,

    #[arg(long = "accept-backoff-initial-ms", default_value_t = 10, help = "First delay before re-arming a failed accept")]
    pub accept_backoff_initial_ms: u64,

    #[arg(long = "accept-backoff-max-ms", default_value_t = 1000, help = "Upper bound for the accept retry delay")]
    pub accept_backoff_max_ms: u64,

    #[arg(long = "log-level", default_value = "info", help = "Log level, overridden by RUST_LOG")]
    pub log_level: String,
}

impl StartupArguments {
    /// Returns the default worker count, preferring ECHO_WORKERS env var, then CPU count, then 4.
    fn default_workers() -> usize {
        std::env::var("ECHO_WORKERS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
            .unwrap_or(4)
    }

    /// Parse command line arguments using clap.
    ///
    /// Usage:
    ///     --mode=server|client --address=0.0.0.0:8888 --buffer-size=1024
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size as usize
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms.max(1))
    }

    pub fn accept_backoff_bounds(&self) -> (Duration, Duration) {
        let initial = Duration::from_millis(self.accept_backoff_initial_ms.max(1));
        let max = Duration::from_millis(self.accept_backoff_max_ms).max(initial);
        (initial, max)
    }

    /// Address the client dials. A wildcard bind host is not dialable, so it maps to loopback.
    pub fn connect_address(&self) -> SocketAddr {
        let ip = match self.address.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        };
        SocketAddr::new(ip, self.address.port())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    #[value(name = "server")]
    Server,
    #[value(name = "client")]
    Client,
}
