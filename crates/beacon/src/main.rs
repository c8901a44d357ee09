use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{LevelFilter, debug, info};
use tokio::net::TcpListener;

use beacon::api::{AppState, create_router};
use beacon::runtime::ScriptedRuntime;
use beacon::settings::Settings;
use beacon::stream::StreamCoordinator;

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.common);

    let settings = Settings::load(cli.common.config.as_deref())
        .context("failed to load configuration")?;
    debug!("resolved settings: {:#?}", settings);

    match cli.command {
        Command::Serve(cmd) => serve(settings, cmd),
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Beacon - agent activity streaming server.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the streaming server
    Serve(ServeCommand),
}

#[derive(Debug, Clone, Args)]
struct ServeCommand {
    /// Override the bind host
    #[arg(long)]
    host: Option<String>,
    /// Override the bind port
    #[arg(long)]
    port: Option<u16>,
}

fn init_logging(opts: &CommonOpts) {
    let level = if opts.quiet {
        LevelFilter::Error
    } else {
        match opts.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level.as_str()))
        .init();

    // HTTP layer logs through tracing.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.as_str())),
        )
        .try_init();
}

#[tokio::main]
async fn serve(mut settings: Settings, cmd: ServeCommand) -> Result<()> {
    if let Some(host) = cmd.host {
        settings.server.host = host;
    }
    if let Some(port) = cmd.port {
        settings.server.port = port;
    }

    let coordinator = StreamCoordinator::new(settings.stream.clone());
    let runtime = Arc::new(ScriptedRuntime::echo());
    let state = AppState::new(coordinator.clone(), runtime, settings.clone());
    let router = create_router(state);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("invalid bind address")?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("listening on {}", addr);

    axum::serve(listener, router).await.context("server error")?;

    coordinator.shutdown();
    Ok(())
}
