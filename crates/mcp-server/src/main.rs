use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use zettel_memory_mcp::config::{Cli, Command, Config, Mode};
use zettel_memory_mcp::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.clone().unwrap_or(Command::Server);

    if matches!(command, Command::Version) {
        println!("zettel-memory {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = Config::resolve(&cli.opts)?;
    init_tracing(&config);

    match command {
        Command::Server => server::run(config).await,
        Command::Healthcheck => server::healthcheck(config).await,
        Command::Version => unreachable!("handled above"),
    }
}

/// Logs go to stderr; stdout carries the JSON-RPC stream.
fn init_tracing(config: &Config) {
    let default_level = if config.verbose || config.mode == Mode::Dev {
        "debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
