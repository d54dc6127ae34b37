use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use pqmeter_rs::logging::log_error;
use pqmeter_rs::{
    drain_events, init_logger, log_info, read_snapshot, AppConfig, DeviceConfig, ModbusLink,
    PqDeviceManager, PqError, RtuConnector, Scheduler, SqliteStore,
};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "pqmeter-cli")]
#[command(about = "Power-quality meter acquisition over Modbus RTU")]
struct Cli {
    /// JSON configuration file; built-in defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run acquisition cycles until interrupted
    Run,
    /// Read one snapshot and print it as JSON
    Snapshot {
        #[arg(short, long, default_value = "9600")]
        baud: u32,
        #[arg(short, long, default_value = "1")]
        slave: u8,
    },
    /// Drain the event buffer once and print the events as JSON
    Events {
        #[arg(short, long, default_value = "9600")]
        baud: u32,
        #[arg(short, long, default_value = "1")]
        slave: u8,
    },
    /// Register a device in the configuration store and make it active
    AddDevice {
        #[arg(short, long)]
        baud: u32,
        #[arg(short, long)]
        slave: u8,
    },
}

#[tokio::main]
async fn main() -> Result<(), PqError> {
    init_logger();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Run => {
            let manager = Arc::new(PqDeviceManager::from_config(&config)?);
            Scheduler::new(Arc::clone(&manager), config.interval())
                .run_until(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        log_error(&format!("Cannot listen for shutdown signal: {e}"));
                        std::future::pending::<()>().await;
                    }
                    log_info("Shutdown requested");
                })
                .await;
            log_info(&format!("Final stats: {:?}", manager.stats()));
        }
        Commands::Snapshot { baud, slave } => {
            let mut link = open_link(&config, baud, slave).await?;
            let snapshot = read_snapshot(&mut link).await;
            link.disconnect().await;
            print_json(&snapshot?);
        }
        Commands::Events { baud, slave } => {
            let mut link = open_link(&config, baud, slave).await?;
            let report = drain_events(&mut link, config.max_events_per_cycle).await;
            link.disconnect().await;
            let report = report?;
            print_json(&serde_json::json!({
                "termination": report.termination.to_string(),
                "events": report.events,
            }));
        }
        Commands::AddDevice { baud, slave } => {
            let store = SqliteStore::open(&config.database.path)?;
            let id = store
                .add_device(DeviceConfig {
                    baud_rate: baud,
                    slave_id: slave,
                })
                .await?;
            log_info(&format!("Device {id} is now the active device"));
        }
    }

    Ok(())
}

async fn open_link(config: &AppConfig, baud: u32, slave: u8) -> Result<ModbusLink, PqError> {
    let mut link = ModbusLink::new(Arc::new(RtuConnector::new(config.serial())), config.pacing());
    link.connect(&DeviceConfig {
        baud_rate: baud,
        slave_id: slave,
    })
    .await?;
    Ok(link)
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => log_error(&format!("Cannot render output: {e}")),
    }
}
