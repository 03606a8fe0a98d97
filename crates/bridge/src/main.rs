//! docbridge
//!
//! Runs the document bridge on a local socket, or calls a running one.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use bridge::config::Config;
use bridge::host::local::LocalContentHost;
use bridge::host::surface::ChannelSurface;
use bridge::host::terminal::{spawn_stdin_lines, TerminalPicker};
use bridge::ipc::{IpcClient, IpcServer};
use bridge::{Dispatcher, SelectionSession};
use clap::{Parser, Subcommand};
use protocol::{ByteRange, DocumentHandle};
use tokio::io::AsyncWriteExt;
use tracing_subscriber::EnvFilter;

/// docbridge - choose documents and read them through opaque handles.
#[derive(Parser, Debug)]
#[command(name = "docbridge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the bridge with the local host and a terminal picker
    Serve {
        /// Directory picked paths are resolved against
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },

    /// Ask the running bridge to pick documents
    Pick {
        /// Allow only one document
        #[arg(long)]
        single: bool,
    },

    /// Show a document's name and size
    Metadata {
        /// Document handle
        handle: String,
    },

    /// Read a document, or a range of it
    Read {
        /// Document handle
        handle: String,

        /// Bytes to skip before reading
        #[arg(long)]
        offset: Option<u64>,

        /// Maximum bytes to read; reads the whole document when omitted
        #[arg(long)]
        length: Option<u32>,

        /// Write content to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(config_path) => Config::load(config_path)?,
        None => Config::load_default()?,
    };
    config.apply_env_overrides();
    config.validate()?;

    let level = if cli.verbose {
        "debug"
    } else {
        config.bridge.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve { root } => serve(config, root).await,
        Commands::Pick { single } => {
            let mut client = connect(&config).await?;
            let allow_multiple = single.then_some(false);
            let handles = client
                .pick_documents(allow_multiple)
                .await
                .context("Picker call failed")?;
            if handles.is_empty() {
                eprintln!("Selection cancelled");
            }
            for handle in handles {
                println!("{handle}");
            }
            Ok(())
        }
        Commands::Metadata { handle } => {
            let mut client = connect(&config).await?;
            let metadata = client
                .get_metadata(&DocumentHandle::new(handle))
                .await
                .context("Metadata call failed")?;
            println!("name: {}", metadata.name);
            println!("size: {} bytes", metadata.size_bytes);
            Ok(())
        }
        Commands::Read {
            handle,
            offset,
            length,
            output,
        } => {
            let mut client = connect(&config).await?;
            let handle = DocumentHandle::new(handle);
            let content = match (offset, length) {
                (None, None) => client.read_all(&handle).await,
                (offset, length) => client
                    .read_range(
                        &handle,
                        ByteRange::new(offset.unwrap_or(0), length.unwrap_or(u32::MAX)),
                    )
                    .await
                    .map(Option::unwrap_or_default),
            }
            .context("Read call failed")?;

            match output {
                Some(path) => tokio::fs::write(&path, &content)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => {
                    let mut stdout = tokio::io::stdout();
                    stdout.write_all(&content).await?;
                    stdout.flush().await?;
                }
            }
            Ok(())
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

async fn connect(config: &Config) -> anyhow::Result<IpcClient> {
    let socket_path = &config.ipc.socket_path;
    IpcClient::connect(socket_path).await.with_context(|| {
        format!(
            "Bridge is not running (cannot connect to {})",
            socket_path.display()
        )
    })
}

/// Run the bridge until Ctrl+C.
async fn serve(config: Config, root: PathBuf) -> anyhow::Result<()> {
    let root = std::fs::canonicalize(&root)
        .with_context(|| format!("Invalid root directory: {}", root.display()))?;

    let host = Arc::new(LocalContentHost::new());
    let session = Arc::new(SelectionSession::new(config.picker.clone()));
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&host), Arc::clone(&session)));

    let (surface, requests) = ChannelSurface::new();
    session.attach_surface(Arc::new(surface));

    let picker = TerminalPicker::new(
        spawn_stdin_lines(),
        tokio::io::stderr(),
        root.clone(),
        host,
        Arc::clone(&session),
    );
    let picker_task = tokio::spawn(picker.run(requests));

    let server = IpcServer::bind(&config.ipc.socket_path)
        .await
        .with_context(|| {
            format!(
                "Failed to bind socket {}",
                config.ipc.socket_path.display()
            )
        })?;
    tracing::info!(root = %root.display(), "docbridge ready");

    server
        .serve(dispatcher, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    session.detach_surface();
    session.abandon();
    picker_task.abort();
    tracing::info!("docbridge stopped");
    Ok(())
}
