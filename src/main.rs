//! Survivor Ledger - Command line entry point
//!
//! Thin front end over the engine: parses arguments, runs one operation and
//! prints its result as JSON. Failures print `{"error", "status"}` on stderr,
//! where `status` is the HTTP code a service front end would answer with.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use survivor_ledger::core::error::Result;
use survivor_ledger::{Engine, EngineConfig, Inventory, Location, NewSurvivor, SurvivorId};

/// Track survivors, contamination reports and supply inventories
#[derive(Parser, Debug)]
#[command(name = "survivor-ledger")]
#[command(about = "Contamination escalation and inventory ledger for survivors")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file (overrides config and SURVIVOR_DB_PATH)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Deadline for the operation in milliseconds
    #[arg(long, global = true)]
    deadline_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database and schema if missing
    Init,
    /// Register a survivor with an initial inventory
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        age: u32,
        #[arg(long)]
        gender: String,
        #[command(flatten)]
        location: LocationArgs,
        #[command(flatten)]
        inventory: InventoryArgs,
    },
    /// Move a survivor to new coordinates
    Relocate {
        id: String,
        #[command(flatten)]
        location: LocationArgs,
    },
    /// Submit a contamination report
    Report { id: String },
    /// Request that a survivor be flagged as infected
    Flag { id: String },
    /// Replace a survivor's inventory
    Inventory {
        id: String,
        #[command(flatten)]
        inventory: InventoryArgs,
    },
    /// Show a survivor's full record
    Status { id: String },
    /// List survivors by infection status
    List {
        /// List infected survivors instead of clean ones
        #[arg(long)]
        infected: bool,
    },
}

#[derive(Args, Debug)]
struct LocationArgs {
    #[arg(long, allow_hyphen_values = true)]
    latitude: f64,
    #[arg(long, allow_hyphen_values = true)]
    longitude: f64,
}

impl From<LocationArgs> for Location {
    fn from(args: LocationArgs) -> Self {
        Location::new(args.latitude, args.longitude)
    }
}

#[derive(Args, Debug)]
struct InventoryArgs {
    #[arg(long)]
    water: String,
    #[arg(long)]
    food: String,
    #[arg(long)]
    medication: String,
    #[arg(long)]
    ammunition: String,
}

impl From<InventoryArgs> for Inventory {
    fn from(args: InventoryArgs) -> Self {
        Inventory::new(args.water, args.food, args.medication, args.ammunition)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("survivor_ledger=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::debug!("Command failed: {:?}", err);
            eprintln!("{}", json!({ "error": err.to_string(), "status": err.status_code() }));
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load_from_toml(path)?,
        None => EngineConfig::new(),
    };
    config.apply_env_overrides()?;
    if let Some(path) = &cli.database {
        config.store.database_path = path.clone();
    }
    if let Some(ms) = cli.deadline_ms {
        config.store.operation_timeout_ms = ms;
    }
    config.validate()?;
    Ok(config)
}

fn pretty<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

async fn run(cli: Cli) -> Result<String> {
    let config = load_config(&cli)?;
    let mut engine = Engine::open(&config)?;
    if let Some(ms) = cli.deadline_ms {
        engine = engine.with_deadline(Duration::from_millis(ms));
    }

    match cli.command {
        Command::Init => pretty(&json!({
            "database": engine.store().path().display().to_string(),
            "after_infection": config.reports.after_infection,
        })),
        Command::Register {
            name,
            age,
            gender,
            location,
            inventory,
        } => {
            let survivor = engine
                .survivors()
                .register(NewSurvivor {
                    name,
                    age,
                    gender,
                    location: location.into(),
                    inventory: inventory.into(),
                })
                .await?;
            pretty(&survivor)
        }
        Command::Relocate { id, location } => {
            let id: SurvivorId = id.parse()?;
            engine.survivors().update_location(id, location.into()).await?;
            pretty(&engine.survivors().get(id).await?)
        }
        Command::Report { id } => {
            let outcome = engine.infection().submit_contamination_report(id.parse()?).await?;
            pretty(&outcome)
        }
        Command::Flag { id } => {
            let outcome = engine.infection().submit_explicit_infection_flag(id.parse()?).await?;
            pretty(&outcome)
        }
        Command::Inventory { id, inventory } => {
            let receipt = engine
                .inventory()
                .update_inventory(id.parse()?, inventory.into())
                .await?;
            pretty(&receipt)
        }
        Command::Status { id } => {
            let id: SurvivorId = id.parse()?;
            let survivor = engine.survivors().get(id).await?;
            let state = survivor.state();
            let threshold_reached = engine.infection().evaluate_threshold(id).await?;
            let record = engine.inventory().current(id).await?;
            pretty(&json!({
                "survivor": survivor,
                "state": state,
                "threshold_reached": threshold_reached,
                "inventory_record": record,
            }))
        }
        Command::List { infected } => pretty(&engine.survivors().list(infected).await?),
    }
}
