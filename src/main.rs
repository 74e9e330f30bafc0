use anyhow::Context;
use tracing_subscriber::EnvFilter;

mod client;
mod network;
mod shutdown;
mod startup_arguments;

use crate::client::EchoClient;
use crate::network::backoff::AcceptBackoff;
use crate::network::connection_handler::ConnectionHandler;
use crate::network::listener::{Listener, bind};
use crate::startup_arguments::{Mode, StartupArguments};

fn main() -> anyhow::Result<()> {
    let arguments = StartupArguments::parse_args();

    init_logging(&arguments.log_level);

    tracing::info!("Program arguments: {arguments:?}");

    // Shared worker pool: every accept, read and write completion runs on these threads.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(arguments.workers.max(1))
        .thread_name("echo-worker")
        .enable_io()
        .enable_time()
        .build()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(async move {
        match arguments.mode {
            Mode::Server => run_server(&arguments).await,
            Mode::Client => run_client(&arguments).await,
        }
    })
}

fn init_logging(log_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .init();
}

async fn run_server(arguments: &StartupArguments) -> anyhow::Result<()> {
    let shutdown = shutdown::shutdown_signal();
    let listener = bind(arguments.address)?;

    let (initial, max) = arguments.accept_backoff_bounds();
    let handler = ConnectionHandler::new(arguments.buffer_size());

    let accepted = Listener::new(listener, handler, AcceptBackoff::new(initial, max))
        .run(shutdown)
        .await;

    tracing::info!(accepted, "Server stopped");
    Ok(())
}

async fn run_client(arguments: &StartupArguments) -> anyhow::Result<()> {
    let client = EchoClient::new(arguments.connect_address(), arguments.buffer_size())
        .with_reply_timeout(arguments.reply_timeout());
    let matched = client.run(arguments.iterations, arguments.parallel).await?;

    if matched != arguments.iterations {
        tracing::warn!(
            matched,
            iterations = arguments.iterations,
            "Some replies did not match their request"
        );
    }
    Ok(())
}
