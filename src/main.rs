//! RemoteLink - command line endpoint
//!
//! Runs a protocol connection over UDP for bench testing remote devices.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use remotelink::config::{self, Config};
use remotelink::protocol;
use remotelink::{BinaryCallback, CommandCallback, Connection, ConnectionEvent, UdpTransport};

/// RemoteLink - framed command/binary messaging
#[derive(Parser)]
#[command(name = "remotelink")]
#[command(author = "RemoteLink Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Exchange commands and binary payloads with a remote device", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every frame received until Ctrl+C
    Listen,

    /// Send one command frame
    SendCommand {
        /// Command opcode (0-255)
        #[arg(short, long)]
        opcode: u8,

        /// Command parameter
        #[arg(long, allow_negative_numbers = true)]
        value: f32,
    },

    /// Send one binary frame
    SendBinary {
        /// Send this text as the payload
        #[arg(short, long, conflicts_with = "file", required_unless_present = "file")]
        text: Option<String>,

        /// Send the contents of this file as the payload
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show protocol information
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config()?;
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                let config = load_config(cli.config.as_deref())?;
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
        Commands::Info => print_protocol_info(),
        Commands::Listen => {
            let config = load_config(cli.config.as_deref())?;
            run_listener(config).await?;
        }
        Commands::SendCommand { opcode, value } => {
            let config = load_config(cli.config.as_deref())?;
            let connection = open_connection(&config, quiet_callbacks())?;
            let result = connection.send_command(opcode, value);
            connection.stop().await;
            result?;
            println!("Sent command {} ({})", opcode, value);
        }
        Commands::SendBinary { text, file } => {
            let config = load_config(cli.config.as_deref())?;
            let payload = match (text, file) {
                (Some(text), _) => text.into_bytes(),
                (None, Some(path)) => std::fs::read(&path)?,
                (None, None) => anyhow::bail!("Please specify --text or --file"),
            };
            let len = payload.len();

            let connection = open_connection(&config, quiet_callbacks())?;
            let result = connection.send_binary(payload);
            connection.stop().await;
            result?;
            println!("Sent {} byte binary payload", len);
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    Ok(config)
}

fn open_connection(
    config: &Config,
    (on_command, on_binary): (CommandCallback, BinaryCallback),
) -> anyhow::Result<Connection<UdpTransport>> {
    let transport = UdpTransport::bind(&config.udp)?;
    let connection = Connection::open(config.connection_config(), transport, on_command, on_binary)?;
    Ok(connection)
}

/// One-shot senders ignore anything that arrives
fn quiet_callbacks() -> (CommandCallback, BinaryCallback) {
    (
        Arc::new(|opcode: u8, value: f32| tracing::debug!("Ignoring command {} ({})", opcode, value)),
        Arc::new(|payload: &[u8]| tracing::debug!("Ignoring {} byte payload", payload.len())),
    )
}

/// Run until Ctrl+C, printing every received frame
async fn run_listener(config: Config) -> anyhow::Result<()> {
    let callbacks: (CommandCallback, BinaryCallback) = (
        Arc::new(|opcode: u8, value: f32| println!("command  opcode={} value={}", opcode, value)),
        Arc::new(|payload: &[u8]| println!("binary   {} bytes {:02x?}", payload.len(), payload)),
    );

    let mut connection = open_connection(&config, callbacks)?;
    let mut event_rx = connection
        .take_event_receiver()
        .ok_or_else(|| anyhow::anyhow!("event receiver already taken"))?;

    println!("\n========================================");
    println!("  RemoteLink Listening");
    println!("========================================");
    println!("  Local: {}", config.udp.bind);
    println!("  Peer: {}", config.udp.peer);
    println!("  Poll interval: {} ms", config.link.poll_interval_ms);
    println!("========================================");
    println!("\nPress Ctrl+C to stop.\n");

    // Announce ourselves once per second so the device sees a live link
    let mut ack_timer = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                match event {
                    ConnectionEvent::DecodeFailed { message } => {
                        tracing::debug!("Malformed frame: {}", message);
                    }
                    ConnectionEvent::FetchFailed { message } => {
                        tracing::error!("Receive error: {}", message);
                    }
                    other => tracing::debug!("Event: {:?}", other),
                }
            }
            _ = ack_timer.tick() => {
                if let Err(e) = connection.with_transport(|t| t.send_acknowledgement()) {
                    tracing::warn!("Acknowledgement not sent: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                break;
            }
        }
    }

    connection.stop().await;
    let stats = connection.stats();
    tracing::info!(
        "Received {} frames ({} malformed), sent {}",
        stats.frames_received,
        stats.decode_errors,
        stats.frames_sent
    );

    Ok(())
}

/// Print protocol information
fn print_protocol_info() {
    println!("RemoteLink Protocol Information");
    println!("===============================\n");

    println!("Protocol Version: {}", protocol::PROTOCOL_VERSION);
    println!(
        "Command frame: {} bytes (kind {:#04x})",
        protocol::Frame::command(0, 0.0).encoded_len(),
        protocol::KIND_COMMAND
    );
    println!(
        "Binary frame: {} + payload bytes (kind {:#04x}, max payload {})",
        protocol::HEADER_SIZE + protocol::BINARY_LENGTH_SIZE,
        protocol::KIND_BINARY,
        protocol::MAX_BINARY_PAYLOAD
    );
}
