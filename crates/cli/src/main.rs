//! FuelOps CLI - Database migrations and unit registration.
//!
//! # Usage
//!
//! ```bash
//! # Apply the ledger schema
//! fuelops-cli migrate
//!
//! # Register a truck
//! fuelops-cli unit create --code T1 --type truck --capacity 12000 --vehicle "MH 12 AB 1234"
//!
//! # List units, optionally by type
//! fuelops-cli unit list --type datum
//! ```
//!
//! # Environment Variables
//!
//! - `FUELOPS_DATABASE_URL` - `PostgreSQL` connection string

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use fuelops_core::UnitType;

mod commands;

#[derive(Parser)]
#[command(name = "fuelops-cli")]
#[command(author, version, about = "FuelOps ledger CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Manage storage units
    Unit {
        #[command(subcommand)]
        action: UnitAction,
    },
}

#[derive(Subcommand)]
enum UnitAction {
    /// Register a new unit
    Create {
        /// Unit code (`[A-Z0-9-]`, e.g. T1)
        #[arg(short, long)]
        code: String,

        /// Unit type (`truck`, `datum`, `storage`)
        #[arg(short = 't', long = "type")]
        unit_type: UnitType,

        /// Capacity in whole liters
        #[arg(long)]
        capacity: i32,

        /// Vehicle registration number
        #[arg(short, long)]
        vehicle: Option<String>,
    },
    /// List registered units
    List {
        /// Only units of this type
        #[arg(short = 't', long = "type")]
        unit_type: Option<UnitType>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Unit { action } => match action {
            UnitAction::Create {
                code,
                unit_type,
                capacity,
                vehicle,
            } => {
                commands::unit::create(code, unit_type, capacity, vehicle).await?;
            }
            UnitAction::List { unit_type } => commands::unit::list(unit_type).await?,
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_unit_create_parses_type() {
        let cli = Cli::try_parse_from([
            "fuelops-cli",
            "unit",
            "create",
            "--code",
            "T1",
            "--type",
            "truck",
            "--capacity",
            "12000",
        ])
        .unwrap_or_else(|e| panic!("{e}"));
        match cli.command {
            Commands::Unit {
                action:
                    UnitAction::Create {
                        unit_type,
                        capacity,
                        vehicle,
                        ..
                    },
            } => {
                assert_eq!(unit_type, UnitType::Truck);
                assert_eq!(capacity, 12000);
                assert!(vehicle.is_none());
            }
            _ => panic!("expected unit create"),
        }
    }

    #[test]
    fn test_unit_list_rejects_unknown_type() {
        assert!(Cli::try_parse_from(["fuelops-cli", "unit", "list", "--type", "barge"]).is_err());
    }
}
