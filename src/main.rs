use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod db;
mod engine;
mod models;
mod observer;
mod scheduler;
mod utils;

use api::PortService;
use config::Settings;
use engine::Engine;
use models::{NoteUpdate, PortKey, Protocol, RiskLevel, ServiceType};

#[derive(Parser, Debug)]
#[command(name = "portwatch")]
#[command(about = "Tracks listening ports and their owning processes over time")]
#[command(version)]
struct Args {
    /// Database path (use :memory: for in-memory)
    #[arg(short, long)]
    database: Option<String>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<String>,

    /// Host identifier recorded with every observation
    #[arg(long)]
    host_id: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the monitoring daemon (default)
    Run {
        /// Seconds between reconciliation cycles
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Run a single reconciliation cycle and exit
    Scan,
    /// Print the merged port view
    List {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print event history for one port, newest first
    History {
        #[arg(long, default_value = "tcp")]
        protocol: String,
        port: u16,
    },
    /// Create or update the note for one port (only supplied fields change)
    Note {
        #[arg(long, default_value = "tcp")]
        protocol: String,
        port: u16,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        owner: Option<String>,
        /// web, db, tunnel, test, unknown or other
        #[arg(long)]
        service_type: Option<String>,
        /// trusted, expected or suspicious
        #[arg(long)]
        risk_level: Option<String>,
        #[arg(long)]
        pinned: Option<bool>,
        #[arg(long)]
        tags: Option<String>,
    },
    /// Hard-delete a port: runtime, its events and its note
    Delete {
        #[arg(long, default_value = "tcp")]
        protocol: String,
        port: u16,
    },
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let settings = Settings::load(args.config.as_deref())?;
    init_tracing(&settings.log_level);

    let host_id = args
        .host_id
        .clone()
        .or_else(|| settings.host_id.clone())
        .unwrap_or_else(utils::resolve_host_id);

    let db = Arc::new(db::Database::open(
        args.database.as_deref().unwrap_or(&settings.database_path),
    )?);

    let (trigger_tx, trigger_rx) = mpsc::channel(8);
    let engine = Arc::new(Engine::new(
        db.clone(),
        host_id.clone(),
        Duration::from_secs(settings.snapshot_timeout_secs),
    ));
    let service = PortService::new(db, trigger_tx.clone());

    match args.command.unwrap_or(Command::Run { interval: None }) {
        Command::Run { interval } => {
            let interval =
                Duration::from_secs(interval.unwrap_or(settings.scan_interval_secs));
            run_daemon(engine, interval, trigger_tx, trigger_rx).await
        }
        Command::Scan => {
            let stats = engine.run_cycle().await?;
            println!(
                "cycle complete: {} new, {} updated, {} events",
                stats.created, stats.updated, stats.events
            );
            Ok(())
        }
        Command::List { json } => {
            let items = service.list_ports()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else {
                print_table(&items);
            }
            Ok(())
        }
        Command::History { protocol, port } => {
            let key = PortKey::new(&host_id, Protocol::from(protocol.as_str()), port);
            let events = service.history(&key)?;
            if events.is_empty() {
                println!("no history for {}", key);
            }
            for event in events {
                println!(
                    "{}  {:<14}  pid={:<7}  {}",
                    event.timestamp.to_rfc3339(),
                    event.event_type.to_string(),
                    event.pid.map(|p| p.to_string()).unwrap_or_default(),
                    event.process_name.unwrap_or_default()
                );
            }
            Ok(())
        }
        Command::Note {
            protocol,
            port,
            title,
            description,
            owner,
            service_type,
            risk_level,
            pinned,
            tags,
        } => {
            let key = PortKey::new(&host_id, Protocol::from(protocol.as_str()), port);
            let update = NoteUpdate {
                title,
                description,
                owner,
                service_type: service_type.as_deref().map(ServiceType::from),
                risk_level: risk_level.as_deref().map(RiskLevel::from),
                is_pinned: pinned,
                tags,
            };
            let note = service.upsert_note(&key, &update)?;
            println!("{}", serde_json::to_string_pretty(&note)?);
            Ok(())
        }
        Command::Delete { protocol, port } => {
            let key = PortKey::new(&host_id, Protocol::from(protocol.as_str()), port);
            if service.delete_port(&key)? {
                println!("deleted {}", key);
            } else {
                println!("nothing to delete for {}", key);
            }
            Ok(())
        }
    }
}

async fn run_daemon(
    engine: Arc<Engine>,
    interval: Duration,
    trigger_tx: mpsc::Sender<()>,
    trigger_rx: mpsc::Receiver<()>,
) -> Result<()> {
    let scheduler_handle = tokio::spawn(scheduler::run(engine, interval, trigger_rx));

    // SIGUSR1 queues an out-of-band cycle.
    let mut usr1 = signal(SignalKind::user_defined1())?;
    let usr1_handle = tokio::spawn(async move {
        while usr1.recv().await.is_some() {
            tracing::info!("SIGUSR1 received, triggering scan");
            let _ = trigger_tx.try_send(());
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    scheduler_handle.abort();
    usr1_handle.abort();
    Ok(())
}

fn print_table(items: &[models::MergedPortItem]) {
    println!(
        "{:<12} {:<5} {:>6} {:<12} {:<11} {:<18} {:<10} {:>9}  {}",
        "HOST", "PROTO", "PORT", "STATE", "STATUS", "PROCESS", "RISK", "UPTIME", "TITLE"
    );
    for item in items {
        println!(
            "{:<12} {:<5} {:>6} {:<12} {:<11} {:<18} {:<10} {:>9}  {}",
            item.host_id,
            item.protocol.to_string(),
            item.port,
            item.current_state
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string()),
            item.derived_status.to_string(),
            item.process_name.as_deref().unwrap_or("-"),
            item.risk_level
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string()),
            item.uptime_human,
            item.title.as_deref().unwrap_or("")
        );
    }
}
