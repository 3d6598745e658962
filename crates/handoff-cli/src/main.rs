mod console;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, EnvFilter};

use handoff_core::{
    spawn_drive, ActionKind, DeviceInfo, HandoffConfig, PendingAction, Role, Session, SessionState,
    StatusNotifier,
};
use storage::{LocalStorage, Storage};
use transport_lan::{LanConfig, LanTransport};

use crate::console::ConsoleSink;

#[derive(Parser, Debug)]
#[command(name = "handoff", version, about = "Nearby point-to-point file handoff")]
struct Cli {
    /// Set log level: error,warn,info,debug,trace
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Data directory for config and received files
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Network interface to announce on (default: first non-loopback IPv4)
    #[arg(long, global = true)]
    interface: Option<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize this device
    Init {
        /// Device brand, e.g. "Pixel"
        #[arg(long)]
        brand: Option<String>,

        /// Device model, e.g. "7a"
        #[arg(long)]
        model: Option<String>,

        /// Service id shared by every peer of this application
        #[arg(long)]
        service_id: Option<String>,
    },

    /// Show device information
    Info,

    /// List advertising peers on the local network
    Discover {
        /// Discovery timeout in seconds
        #[arg(long, default_value_t = 5)]
        timeout: u64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Advertise and hand a file to the next peer that asks
    Send {
        /// File to send
        #[arg(long)]
        file: PathBuf,

        /// Stop after the first successful send instead of relaying on
        #[arg(long)]
        no_chain: bool,

        /// Accept incoming requests without asking
        #[arg(long)]
        yes: bool,
    },

    /// Discover a sender and receive its file
    Receive {
        /// Directory for received files
        #[arg(long)]
        output: Option<PathBuf>,

        /// Connect to the first sender found without asking
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    fmt()
        .with_env_filter(EnvFilter::new(&cli.log_level))
        .with_target(false)
        .init();

    // Determine data directory
    let data_dir = cli.data_dir.unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".handoff")
    });

    match cli.cmd {
        Commands::Init {
            brand,
            model,
            service_id,
        } => {
            let defaults = DeviceInfo::default();
            let mut cfg = HandoffConfig::default().with_device(
                brand.unwrap_or(defaults.brand),
                model.unwrap_or(defaults.model),
            );
            cfg.data_dir = data_dir.clone();
            if let Some(service_id) = service_id {
                cfg.service_id = service_id;
            }

            cfg.ensure_data_dir()?;
            save_config(&cfg)?;

            println!("✓ Device initialized");
            println!("  Name: {}", cfg.endpoint_name());
            println!("  Service ID: {}", cfg.service_id);
            println!("  Data directory: {}", data_dir.display());
        }

        Commands::Info => {
            let cfg = load_config(&data_dir)?;

            println!("Device Information:");
            println!("  Name: {}", cfg.endpoint_name());
            println!("  Service ID: {}", cfg.service_id);
            println!("  Strategy: {}", cfg.strategy.as_str());
            println!("  Relay after send: {}", cfg.chain_after_send);
            println!("  Data directory: {}", cfg.data_dir.display());
            println!("  Incoming directory: {}", cfg.incoming_dir().display());
            println!("  Listen port: {}", cfg.listen_port);
        }

        Commands::Discover { timeout, json } => {
            let cfg = load_config(&data_dir)?;
            discover_peers(&cfg, timeout, json)?;
        }

        Commands::Send { file, no_chain, yes } => {
            let mut cfg = load_config(&data_dir)?;
            if no_chain {
                cfg.chain_after_send = false;
            }
            if !file.is_file() {
                anyhow::bail!("No such file: {}", file.display());
            }

            println!("Preparing to send: {}", file.display());
            run_session(cfg, cli.interface, None, Role::Sender, Some(file), yes).await?;
        }

        Commands::Receive { output, yes } => {
            let cfg = load_config(&data_dir)?;
            run_session(cfg, cli.interface, output, Role::Receiver, None, yes).await?;
        }
    }

    Ok(())
}

fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.json")
}

fn save_config(cfg: &HandoffConfig) -> Result<()> {
    let cfg_json = serde_json::to_string_pretty(cfg)?;
    std::fs::write(config_path(&cfg.data_dir), cfg_json).context("Failed to write config.json")?;
    Ok(())
}

fn load_config(data_dir: &Path) -> Result<HandoffConfig> {
    let cfg_path = config_path(data_dir);
    if !cfg_path.exists() {
        anyhow::bail!("Device not initialized. Run 'handoff init' first.");
    }

    let cfg_json = std::fs::read_to_string(cfg_path)?;
    let cfg: HandoffConfig = serde_json::from_str(&cfg_json).context("Invalid config.json")?;
    Ok(cfg)
}

fn discover_peers(cfg: &HandoffConfig, timeout: u64, json: bool) -> Result<()> {
    use mdns_core::{discover::browse_blocking, SERVICE_TYPE};

    let results: Vec<_> = browse_blocking(SERVICE_TYPE, Duration::from_secs(timeout))?
        .into_iter()
        .filter(|svc| svc.txt_value(transport_lan::TXT_SERVICE_ID) == Some(cfg.service_id.as_str()))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        println!("Discovered {} peer(s):", results.len());
        for svc in results {
            let name = svc.txt_value(transport_lan::TXT_NAME).unwrap_or("?");
            println!("\n  {} ({}) @ {}:{}", name, svc.instance_name, svc.host_name, svc.port);
            println!("    Addresses:");
            for addr in &svc.addresses {
                println!("      - {}", addr);
            }
        }
    }

    Ok(())
}

/// Run one session until it ends, or until Ctrl+C.
async fn run_session(
    cfg: HandoffConfig,
    interface: Option<String>,
    output: Option<PathBuf>,
    role: Role,
    file: Option<PathBuf>,
    auto: bool,
) -> Result<()> {
    let incoming_dir = output.unwrap_or_else(|| cfg.incoming_dir());
    let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new(incoming_dir)?);
    let transport = Arc::new(LanTransport::new(
        LanConfig::from_handoff(&cfg, interface),
        storage.clone(),
    ));

    let (action_tx, mut actions) = mpsc::unbounded_channel();
    let notifier = StatusNotifier::spawn(ConsoleSink::new(action_tx));
    let phase_timeout = cfg.phase_timeout();

    println!("✓ Endpoint {} ({})", transport.endpoint_id(), cfg.endpoint_name());
    let (session, events) = Session::new(cfg, transport.clone(), storage, notifier);
    session
        .start(role, file, None)
        .await
        .context("Could not start the session")?;
    println!("  Press Ctrl+C to stop");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut offered: Option<PendingAction> = None;

    let mut driver = spawn_drive(session.clone(), events, phase_timeout);

    let end = loop {
        tokio::select! {
            end = &mut driver => match end {
                Ok(end) => break Some(end),
                Err(e) => anyhow::bail!("Session driver stopped: {}", e),
            },

            Some(action) = actions.recv() => {
                if auto {
                    tokio::spawn(perform(session.clone(), action));
                } else {
                    let verb = match action.kind {
                        ActionKind::Accept => "accept",
                        ActionKind::Request => "connect to",
                    };
                    println!("  Press Enter to {} {}", verb, action.endpoint);
                    offered = Some(action);
                }
            }

            line = stdin.next_line(), if offered.is_some() => {
                match line {
                    Ok(Some(_)) => {
                        if let Some(action) = offered.take() {
                            tokio::spawn(perform(session.clone(), action));
                        }
                    }
                    Ok(None) => offered = None,
                    Err(e) => {
                        tracing::warn!("stdin: {}", e);
                        offered = None;
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                driver.abort();
                break None;
            }
        }
    };

    match end {
        Some(SessionState::Completed { endpoint }) => {
            match session.received_file().await {
                Some(path) => println!("✓ File received from {}: {}", endpoint, path.display()),
                None => println!("✓ File sent to {}", endpoint),
            }
        }
        Some(SessionState::Failed { reason }) => {
            transport.shutdown().await;
            anyhow::bail!("✗ {}", reason);
        }
        Some(other) => {
            tracing::debug!("Event stream ended while {}", other.name());
        }
        None => {
            println!("\nStopping...");
            session.shutdown().await;
        }
    }

    transport.shutdown().await;
    Ok(())
}

async fn perform(session: Arc<Session>, action: PendingAction) {
    if let Err(e) = session.perform(action).await {
        tracing::warn!("Action failed: {}", e);
        println!("✗ {}", e);
    }
}
