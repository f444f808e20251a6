//! Unit registration commands.

use fuelops_core::UnitType;
use fuelops_core::unit::NewUnit;
use fuelops_server::services::RegistryService;

use super::{CommandError, connect};

/// Register a unit and return its ID.
pub async fn create(
    code: String,
    unit_type: UnitType,
    capacity: i32,
    vehicle: Option<String>,
) -> Result<i32, CommandError> {
    let pool = connect().await?;

    let unit = RegistryService::new(&pool)
        .create_unit(NewUnit {
            unit_code: code,
            unit_type,
            capacity_liters: capacity,
            vehicle_number: vehicle,
        })
        .await?;

    tracing::info!(
        "Unit registered! ID: {}, Code: {}, Type: {}, Capacity: {} L",
        unit.id,
        unit.unit_code,
        unit.unit_type,
        unit.capacity_liters
    );
    Ok(unit.id.as_i32())
}

/// Print registered units, one per line.
pub async fn list(unit_type: Option<UnitType>) -> Result<(), CommandError> {
    let pool = connect().await?;

    let units = RegistryService::new(&pool).list_units(unit_type).await?;

    #[allow(clippy::print_stdout)]
    {
        println!("{:<6} {:<12} {:<8} {:>10}  {:<8} VEHICLE", "ID", "CODE", "TYPE", "CAPACITY", "ACTIVE");
        for unit in &units {
            println!(
                "{:<6} {:<12} {:<8} {:>10}  {:<8} {}",
                unit.id,
                unit.unit_code,
                unit.unit_type,
                unit.capacity_liters,
                unit.active,
                unit.vehicle_number.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(())
}
