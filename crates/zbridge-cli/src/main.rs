use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use zbridge_config::{BridgeConfig, ConfigLoader};

mod commands;

/// Inspect and drive the ZeroMQ bridge.
///
/// EXAMPLES:
///     zbridge version                              Show the loaded library version
///     zbridge caps --json                          List version-dependent features
///     zbridge --backend memory caps                Inspect the in-process backend
///     zbridge device queue inproc://a inproc://b   Run a queue device
///
/// ENVIRONMENT VARIABLES:
///     ZBRIDGE_BACKEND     native or memory
///     ZBRIDGE_LIBRARY     Library name or path (default: zmq)
///     ZBRIDGE_IO_THREADS  I/O threads for new contexts
///     ZBRIDGE_LOG         Log filter when RUST_LOG is unset
#[derive(Parser)]
#[command(name = "zbridge")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Transport backend, overriding configuration
    #[arg(long, global = true, value_parser = ["native", "memory"])]
    backend: Option<String>,

    /// Native library name or path, overriding configuration
    #[arg(long, global = true)]
    library: Option<String>,

    /// Read this configuration file instead of searching for zbridge.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the version of the loaded messaging library
    Version,

    /// List the version-dependent features of the loaded library
    ///
    /// EXAMPLES:
    ///     zbridge caps          Human-readable table
    ///     zbridge caps --json   Machine-readable report
    Caps {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Bind two sockets and forward messages between them until stopped
    ///
    /// queue binds ROUTER/DEALER, forwarder binds SUB/PUB (subscribed to
    /// everything), streamer binds PULL/PUSH.
    ///
    /// EXAMPLES:
    ///     zbridge device queue tcp://*:5559 tcp://*:5560
    Device {
        /// Device type: queue, forwarder or streamer
        kind: String,
        /// Endpoint the frontend socket binds
        frontend: String,
        /// Endpoint the backend socket binds
        #[arg(id = "backend_endpoint", value_name = "BACKEND")]
        backend_endpoint: String,
    },
}

fn load_config(cli: &Cli) -> Result<BridgeConfig> {
    let mut loader = ConfigLoader::new();
    let loaded = match &cli.config {
        Some(path) => loader
            .load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => loader
            .load_from_directory(&std::env::current_dir()?)
            .context("Failed to load configuration")?,
    };

    let mut config = loaded.config;
    if let Some(backend) = &cli.backend {
        config.set_backend(backend.clone());
    }
    if let Some(library) = &cli.library {
        config.set_library(library.clone());
    }
    Ok(config)
}

fn init_logging(config: &BridgeConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_filter()));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(&config);

    match cli.command {
        Commands::Version => commands::version::run(&config)?,
        Commands::Caps { json } => commands::caps::run(&config, json)?,
        Commands::Device {
            kind,
            frontend,
            backend_endpoint,
        } => commands::device::run(&config, &kind, &frontend, &backend_endpoint)?,
    }

    Ok(())
}
