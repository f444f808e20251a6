//! Purchase lots: creation, listing and export.
//!
//! A purchase runs as:
//!
//! 1. Lock the receiving unit and its open lots
//! 2. Check the unit is active and the load fits its capacity
//! 3. Take the next sequence number for (unit, date, `PURCHASE`)
//! 4. Insert the lot with its generated code
//!
//! The sequence is read under the unit lock; the `lot_sequence_unique`
//! constraint backs it up.

use std::fmt::Write as _;

use sqlx::PgPool;
use tracing::{info, instrument};

use fuelops_core::lot::{LotBook, NewPurchase, lot_code};
use fuelops_core::{LoadType, LotId};

use super::registry::lock_unit;
use super::{ServiceError, found, local_now};
use crate::db::lots::{self, InsertLot, LotFilter, LotListing};

const CSV_HEADER: &str = "lot_code,unit_code,load_type,load_date,load_time,\
loaded_liters,used_liters,remaining_liters,stock_status";

/// Service for purchase lots.
pub struct LedgerService<'a> {
    pool: &'a PgPool,
}

impl<'a> LedgerService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Record a purchase as a new lot.
    ///
    /// # Errors
    ///
    /// - `Validation` for a non-positive volume, an inactive unit, or a load
    ///   that would exceed capacity
    /// - `NotFound` if the unit does not exist
    /// - `Conflict` if a concurrent writer took the same sequence number
    #[instrument(skip(self, input), fields(unit_id = %input.unit_id, load_date = %input.load_date))]
    pub async fn create_purchase(&self, input: NewPurchase) -> Result<LotListing, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let unit = lock_unit(&mut tx, input.unit_id).await?;
        let open = lots::lock_for_unit(&mut tx, unit.id, &[]).await?;
        let in_stock = LotBook::new(&unit, open).available();
        let volume = input.validate(&unit, in_stock)?;

        let sequence_no =
            lots::next_sequence_no(&mut tx, unit.id, input.load_date, LoadType::Purchase).await?;
        let code = lot_code(
            LoadType::Purchase,
            input.load_date,
            &unit.unit_code,
            sequence_no,
            volume,
        )?;
        let lot = lots::insert(
            &mut tx,
            &InsertLot {
                unit_id: unit.id,
                lot_code_initial: &code,
                load_type: LoadType::Purchase,
                sequence_no,
                loaded_liters: volume,
                load_date: input.load_date,
                load_time: input.load_time.unwrap_or_else(|| local_now().time()),
                source_transfer_id: None,
            },
        )
        .await?;

        tx.commit().await?;

        info!(lot_id = %lot.id, lot_code = %lot.lot_code_initial, "Purchase recorded");
        Ok(LotListing::new(lot, unit.unit_code))
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the lot does not exist.
    pub async fn get_lot(&self, id: LotId) -> Result<LotListing, ServiceError> {
        let lot = lots::get(self.pool, id).await?;
        found(lot, "lot", id)
    }

    /// # Errors
    ///
    /// Returns `ServiceError::Repository` if the query fails.
    pub async fn list_lots(&self, filter: &LotFilter) -> Result<Vec<LotListing>, ServiceError> {
        Ok(lots::list(self.pool, filter).await?)
    }

    /// Export the filtered lots as CSV, one row per lot.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Repository` if the query fails.
    #[instrument(skip(self, filter))]
    pub async fn export_lots(&self, filter: &LotFilter) -> Result<String, ServiceError> {
        let listings = self.list_lots(filter).await?;
        info!(rows = listings.len(), "Exporting lots");
        Ok(lots_csv(&listings))
    }
}

/// Render listings as CSV. Codes and unit codes are `[A-Z0-9.-]` so no
/// field needs quoting.
fn lots_csv(listings: &[LotListing]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for l in listings {
        let _ = writeln!(
            out,
            "{},{},{},{},{},{},{},{},{}",
            l.lot.lot_code_initial,
            l.unit_code,
            l.lot.load_type,
            l.lot.load_date,
            l.lot.load_time.format("%H:%M:%S"),
            l.lot.loaded_liters.normalize(),
            l.lot.used_liters.normalize(),
            l.remaining_liters.normalize(),
            l.stock_status,
        );
    }
    out
}
