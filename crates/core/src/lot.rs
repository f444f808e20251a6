//! Lot ledger: purchase lots, lot coding, and the per-unit lot book.
//!
//! A [`LotBook`] is the set of a unit's lots loaded under a row lock for the
//! duration of one write. All debit, reversal and credit arithmetic goes
//! through it so the server and the tests share one implementation of the
//! conservation rules.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::types::{Liters, LoadType, LotId, StockStatus, TransferId, UnitId};
use crate::unit::Unit;

/// Largest volume a single ledger row can carry (`NUMERIC(12,2)`).
const MAX_VOLUME: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 2);

/// A batch of fuel attributed to one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    pub id: LotId,
    pub unit_id: UnitId,
    /// Code assigned at load time, e.g. `LOT05MAR24T1A4000`.
    pub lot_code_initial: String,
    pub load_type: LoadType,
    /// 1-based position among same-type loads for the unit and date.
    pub sequence_no: i32,
    pub loaded_liters: Liters,
    pub used_liters: Liters,
    pub load_date: NaiveDate,
    pub load_time: NaiveTime,
    /// Originating transfer for `TRANSFER_IN` lots.
    pub source_transfer_id: Option<TransferId>,
    pub created_at: DateTime<Utc>,
}

impl Lot {
    /// Derived depletion state.
    #[must_use]
    pub fn stock_status(&self) -> StockStatus {
        if self.used_liters < self.loaded_liters {
            StockStatus::Active
        } else {
            StockStatus::Sold
        }
    }

    /// Volume still available in this lot, clamped to zero once sold.
    #[must_use]
    pub fn remaining(&self) -> Liters {
        match self.stock_status() {
            StockStatus::Active => self.loaded_liters - self.used_liters,
            StockStatus::Sold => Decimal::ZERO,
        }
    }

    /// Running code after the current usage: `{lot_code_initial}-{used}`.
    #[must_use]
    pub fn lot_code_after(&self) -> String {
        format!("{}-{}", self.lot_code_initial, self.used_liters.normalize())
    }

    /// Debit `volume` liters from this lot.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Validation` for a non-positive volume and
    /// `LedgerError::InsufficientStock` if the lot cannot cover it.
    pub fn debit(&mut self, volume: Liters) -> Result<StockStatus, LedgerError> {
        let volume = validate_volume(volume, "volume_liters")?;
        let remaining = self.remaining();
        if volume > remaining {
            return Err(LedgerError::InsufficientStock {
                lot_code: self.lot_code_initial.clone(),
                requested: volume,
                remaining,
            });
        }
        self.used_liters += volume;
        Ok(self.stock_status())
    }

    /// Undo a previous debit of `volume` liters.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Conflict` if the lot has less recorded usage
    /// than the reversal asks to return.
    pub fn reverse_debit(&mut self, volume: Liters) -> Result<StockStatus, LedgerError> {
        let volume = validate_volume(volume, "volume_liters")?;
        if volume > self.used_liters {
            return Err(LedgerError::conflict(format!(
                "cannot return {volume} L to lot {}: only {} L recorded as used",
                self.lot_code_initial,
                self.used_liters.normalize()
            )));
        }
        self.used_liters -= volume;
        Ok(self.stock_status())
    }
}

/// Result of a debit or reversal against one lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LotDebit {
    pub lot_id: LotId,
    pub lot_code_initial: String,
    pub used_liters: Liters,
    pub stock_status: StockStatus,
    pub lot_code_after: String,
}

impl From<&Lot> for LotDebit {
    fn from(lot: &Lot) -> Self {
        Self {
            lot_id: lot.id,
            lot_code_initial: lot.lot_code_initial.clone(),
            used_liters: lot.used_liters,
            stock_status: lot.stock_status(),
            lot_code_after: lot.lot_code_after(),
        }
    }
}

/// Input for a purchase.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPurchase {
    pub unit_id: UnitId,
    pub loaded_liters: Liters,
    pub load_date: NaiveDate,
    pub load_time: Option<NaiveTime>,
}

impl NewPurchase {
    /// Validate the purchase against the receiving unit and its current stock.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Validation` if the volume is not positive, the
    /// unit is inactive, or the load would exceed the unit's capacity.
    pub fn validate(&self, unit: &Unit, in_stock: Liters) -> Result<Liters, LedgerError> {
        let volume = validate_volume(self.loaded_liters, "loaded_liters")?;
        unit.ensure_active()?;
        unit.ensure_capacity(in_stock, volume)?;
        Ok(volume)
    }
}

/// Check that a volume is positive and fits a ledger row.
///
/// # Errors
///
/// Returns `LedgerError::Validation` naming `field` otherwise.
pub fn validate_volume(volume: Liters, field: &str) -> Result<Liters, LedgerError> {
    if volume <= Decimal::ZERO {
        return Err(LedgerError::validation(format!("{field} must be positive")));
    }
    if volume.normalize().scale() > 2 {
        return Err(LedgerError::validation(format!(
            "{field} supports at most two decimal places"
        )));
    }
    if volume > MAX_VOLUME {
        return Err(LedgerError::validation(format!("{field} is too large")));
    }
    Ok(volume)
}

/// Check that a meter reading is non-negative and fits a ledger row.
///
/// # Errors
///
/// Returns `LedgerError::Validation` naming `field` otherwise.
pub fn validate_reading(reading: Liters, field: &str) -> Result<Liters, LedgerError> {
    if reading < Decimal::ZERO {
        return Err(LedgerError::validation(format!("{field} cannot be negative")));
    }
    if reading.normalize().scale() > 2 {
        return Err(LedgerError::validation(format!(
            "{field} supports at most two decimal places"
        )));
    }
    if reading > MAX_VOLUME {
        return Err(LedgerError::validation(format!("{field} is too large")));
    }
    Ok(reading)
}

/// Spreadsheet-style sequence letters: 1 → `A`, 26 → `Z`, 27 → `AA`.
///
/// Returns `None` for a non-positive sequence number.
#[must_use]
pub fn sequence_letters(sequence_no: i32) -> Option<String> {
    let mut n = u32::try_from(sequence_no).ok().filter(|n| *n > 0)?;
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push(char::from_u32(u32::from(b'A') + n % 26)?);
        n /= 26;
    }
    Some(letters.into_iter().rev().collect())
}

/// Build a lot code: prefix + `DDMONYY` + unit code + sequence letter + volume.
///
/// Scenario: a 4000 L purchase into `T1` on 2024-03-05, first of the day,
/// is coded `LOT05MAR24T1A4000`.
///
/// # Errors
///
/// Returns `LedgerError::Validation` for a non-positive sequence number.
pub fn lot_code(
    load_type: LoadType,
    load_date: NaiveDate,
    unit_code: &str,
    sequence_no: i32,
    loaded_liters: Liters,
) -> Result<String, LedgerError> {
    let letters = sequence_letters(sequence_no)
        .ok_or_else(|| LedgerError::validation("sequence number must be positive"))?;
    Ok(format!(
        "{}{}{}{}{}",
        load_type.code_prefix(),
        load_date.format("%d%b%y").to_string().to_ascii_uppercase(),
        unit_code,
        letters,
        loaded_liters.normalize()
    ))
}

/// The lots of one unit, held under lock for a single write.
#[derive(Debug, Clone)]
pub struct LotBook {
    unit_id: UnitId,
    unit_code: String,
    lots: Vec<Lot>,
}

impl LotBook {
    /// Build a book from a unit's lots. Lots of other units are ignored.
    #[must_use]
    pub fn new(unit: &Unit, lots: Vec<Lot>) -> Self {
        let mut lots: Vec<Lot> = lots.into_iter().filter(|l| l.unit_id == unit.id).collect();
        sort_fifo(&mut lots);
        Self {
            unit_id: unit.id,
            unit_code: unit.unit_code.clone(),
            lots,
        }
    }

    #[must_use]
    pub const fn unit_id(&self) -> UnitId {
        self.unit_id
    }

    #[must_use]
    pub fn unit_code(&self) -> &str {
        &self.unit_code
    }

    #[must_use]
    pub fn lots(&self) -> &[Lot] {
        &self.lots
    }

    #[must_use]
    pub fn lot(&self, id: LotId) -> Option<&Lot> {
        self.lots.iter().find(|l| l.id == id)
    }

    /// Total volume available across every lot in the book.
    #[must_use]
    pub fn available(&self) -> Liters {
        self.lots.iter().map(Lot::remaining).sum()
    }

    /// The lot the next debit draws from: the oldest one not yet sold.
    #[must_use]
    pub fn active_lot(&self) -> Option<&Lot> {
        self.lots
            .iter()
            .find(|l| l.stock_status() == StockStatus::Active)
    }

    /// Check that the unit as a whole can supply `volume`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Overdraw` otherwise.
    pub fn ensure_available(&self, volume: Liters) -> Result<(), LedgerError> {
        let available = self.available();
        if volume > available {
            return Err(LedgerError::Overdraw {
                unit_code: self.unit_code.clone(),
                requested: volume,
                available,
            });
        }
        Ok(())
    }

    /// Debit `volume` from the active lot.
    ///
    /// Debits never span lots: if the active lot cannot cover the volume the
    /// debit fails even when later lots could.
    ///
    /// # Errors
    ///
    /// - `LedgerError::Validation` for a malformed volume
    /// - `LedgerError::Overdraw` if the unit holds no open lot
    /// - `LedgerError::InsufficientStock` if the active lot is short
    pub fn debit(&mut self, volume: Liters) -> Result<LotDebit, LedgerError> {
        let volume = validate_volume(volume, "volume_liters")?;
        let Some(index) = self
            .lots
            .iter()
            .position(|l| l.stock_status() == StockStatus::Active)
        else {
            return Err(LedgerError::Overdraw {
                unit_code: self.unit_code.clone(),
                requested: volume,
                available: Decimal::ZERO,
            });
        };
        self.debit_at(index, volume)
    }

    /// Debit `volume` from a specific lot (used when re-applying an edited record).
    ///
    /// # Errors
    ///
    /// - `LedgerError::NotFound` if the lot is not in the book
    /// - `LedgerError::InsufficientStock` if the lot is short
    pub fn debit_lot(&mut self, lot_id: LotId, volume: Liters) -> Result<LotDebit, LedgerError> {
        let index = self.index_of(lot_id)?;
        self.debit_at(index, volume)
    }

    /// Return `volume` to a lot previously debited.
    ///
    /// # Errors
    ///
    /// - `LedgerError::NotFound` if the lot is not in the book
    /// - `LedgerError::Conflict` if the lot has less usage than `volume`
    pub fn reverse_debit(&mut self, lot_id: LotId, volume: Liters) -> Result<LotDebit, LedgerError> {
        let index = self.index_of(lot_id)?;
        let lot = self
            .lots
            .get_mut(index)
            .ok_or_else(|| LedgerError::not_found("lot", lot_id))?;
        lot.reverse_debit(volume)?;
        Ok(LotDebit::from(&*lot))
    }

    /// Add a freshly created `TRANSFER_IN` lot to the book.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Validation` if the lot belongs to another unit or
    /// is not a transfer credit.
    pub fn credit(&mut self, lot: Lot) -> Result<(), LedgerError> {
        if lot.unit_id != self.unit_id {
            return Err(LedgerError::validation(format!(
                "lot {} does not belong to unit {}",
                lot.lot_code_initial, self.unit_code
            )));
        }
        if lot.load_type != LoadType::TransferIn {
            return Err(LedgerError::validation(
                "only transfer credits can be added to a lot book",
            ));
        }
        self.lots.push(lot);
        sort_fifo(&mut self.lots);
        Ok(())
    }

    /// Change the loaded volume of a transfer credit after its transfer was edited.
    ///
    /// # Errors
    ///
    /// - `LedgerError::NotFound` if the lot is not in the book
    /// - `LedgerError::Validation` if the lot is a purchase or the volume is malformed
    /// - `LedgerError::Conflict` if the destination already used more than `loaded_liters`
    pub fn adjust_credit(&mut self, lot_id: LotId, loaded_liters: Liters) -> Result<&Lot, LedgerError> {
        let loaded_liters = validate_volume(loaded_liters, "volume_liters")?;
        let index = self.index_of(lot_id)?;
        let lot = self
            .lots
            .get_mut(index)
            .ok_or_else(|| LedgerError::not_found("lot", lot_id))?;
        ensure_transfer_credit(lot)?;
        if loaded_liters < lot.used_liters {
            return Err(LedgerError::conflict(format!(
                "{} already used {} L of transfer lot {}",
                self.unit_code,
                lot.used_liters.normalize(),
                lot.lot_code_initial
            )));
        }
        lot.loaded_liters = loaded_liters;
        Ok(lot)
    }

    /// Remove an unconsumed transfer credit when its transfer is voided.
    ///
    /// # Errors
    ///
    /// - `LedgerError::NotFound` if the lot is not in the book
    /// - `LedgerError::Validation` if the lot is a purchase
    /// - `LedgerError::Conflict` if any of the credit was already used
    pub fn remove_credit(&mut self, lot_id: LotId) -> Result<Lot, LedgerError> {
        let index = self.index_of(lot_id)?;
        let lot = self
            .lots
            .get(index)
            .ok_or_else(|| LedgerError::not_found("lot", lot_id))?;
        ensure_transfer_credit(lot)?;
        if lot.used_liters > Decimal::ZERO {
            return Err(LedgerError::conflict(format!(
                "{} already used {} L of transfer lot {}",
                self.unit_code,
                lot.used_liters.normalize(),
                lot.lot_code_initial
            )));
        }
        Ok(self.lots.remove(index))
    }

    fn index_of(&self, lot_id: LotId) -> Result<usize, LedgerError> {
        self.lots
            .iter()
            .position(|l| l.id == lot_id)
            .ok_or_else(|| LedgerError::not_found("lot", lot_id))
    }

    fn debit_at(&mut self, index: usize, volume: Liters) -> Result<LotDebit, LedgerError> {
        let lot = self
            .lots
            .get_mut(index)
            .ok_or_else(|| LedgerError::conflict("lot book changed during debit"))?;
        lot.debit(volume)?;
        Ok(LotDebit::from(&*lot))
    }
}

fn ensure_transfer_credit(lot: &Lot) -> Result<(), LedgerError> {
    if lot.load_type == LoadType::TransferIn {
        Ok(())
    } else {
        Err(LedgerError::validation(format!(
            "lot {} is a purchase and cannot be adjusted",
            lot.lot_code_initial
        )))
    }
}

fn sort_fifo(lots: &mut [Lot]) {
    lots.sort_by(|a, b| {
        (a.load_date, a.load_time, a.id).cmp(&(b.load_date, b.load_time, b.id))
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use crate::types::UnitType;

    pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub(crate) fn unit(id: i32, code: &str, unit_type: UnitType) -> Unit {
        Unit {
            id: UnitId::new(id),
            unit_code: code.to_string(),
            unit_type,
            vehicle_number: None,
            capacity_liters: 20_000,
            active: true,
            created_at: DateTime::<Utc>::default(),
            updated_at: DateTime::<Utc>::default(),
        }
    }

    pub(crate) fn lot(id: i32, unit_id: i32, loaded: i64, used: i64, load_type: LoadType) -> Lot {
        Lot {
            id: LotId::new(id),
            unit_id: UnitId::new(unit_id),
            lot_code_initial: format!("LOT05MAR24T{unit_id}A{loaded}"),
            load_type,
            sequence_no: 1,
            loaded_liters: Decimal::from(loaded),
            used_liters: Decimal::from(used),
            load_date: date(2024, 3, 5),
            load_time: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            source_transfer_id: None,
            created_at: DateTime::<Utc>::default(),
        }
    }

    #[test]
    fn test_lot_code_scenario() {
        let code = lot_code(
            LoadType::Purchase,
            date(2024, 3, 5),
            "T1",
            1,
            Decimal::new(400_000, 2),
        )
        .unwrap();
        assert_eq!(code, "LOT05MAR24T1A4000");
    }

    #[test]
    fn test_lot_code_keeps_fractional_volume() {
        let code = lot_code(
            LoadType::TransferIn,
            date(2024, 12, 31),
            "D1",
            2,
            Decimal::new(15005, 1),
        )
        .unwrap();
        assert_eq!(code, "TRF31DEC24D1B1500.5");
    }

    #[test]
    fn test_sequence_letters() {
        assert_eq!(sequence_letters(1).as_deref(), Some("A"));
        assert_eq!(sequence_letters(3).as_deref(), Some("C"));
        assert_eq!(sequence_letters(26).as_deref(), Some("Z"));
        assert_eq!(sequence_letters(27).as_deref(), Some("AA"));
        assert_eq!(sequence_letters(52).as_deref(), Some("AZ"));
        assert_eq!(sequence_letters(0), None);
        assert_eq!(sequence_letters(-1), None);
    }

    #[test]
    fn test_remaining_and_status() {
        let mut l = lot(1, 1, 4000, 0, LoadType::Purchase);
        assert_eq!(l.remaining(), Decimal::from(4000));
        assert_eq!(l.stock_status(), StockStatus::Active);

        l.debit(Decimal::from(1500)).unwrap();
        assert_eq!(l.remaining(), Decimal::from(2500));
        assert_eq!(l.lot_code_after(), "LOT05MAR24T1A4000-1500");

        assert_eq!(l.debit(Decimal::from(2500)).unwrap(), StockStatus::Sold);
        assert_eq!(l.remaining(), Decimal::ZERO);
    }

    #[test]
    fn test_debit_rejects_overdraw_without_mutation() {
        let mut l = lot(1, 1, 4000, 1500, LoadType::Purchase);
        let err = l.debit(Decimal::from(3000)).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientStock { .. }));
        assert_eq!(l.used_liters, Decimal::from(1500));
    }

    #[test]
    fn test_validate_volume() {
        assert!(validate_volume(Decimal::ZERO, "v").is_err());
        assert!(validate_volume(Decimal::from(-5), "v").is_err());
        assert!(validate_volume(Decimal::new(1001, 3), "v").is_err());
        assert!(validate_volume(Decimal::new(10010, 3), "v").is_ok());
        assert!(validate_volume(Decimal::from(10_000_000_001_i64), "v").is_err());
    }

    #[test]
    fn test_validate_reading() {
        assert!(validate_reading(Decimal::ZERO, "r").is_ok());
        assert!(validate_reading(Decimal::new(999_999_999_999, 2), "r").is_ok());
        assert!(validate_reading(Decimal::new(1_000_000_000_000, 2), "r").is_err());
        assert!(validate_reading(Decimal::from(-1), "r").is_err());
        assert!(validate_reading(Decimal::new(1001, 3), "r").is_err());
    }

    #[test]
    fn test_book_debits_active_lot_only() {
        let u = unit(1, "T1", UnitType::Truck);
        let mut book = LotBook::new(
            &u,
            vec![
                lot(2, 1, 2000, 0, LoadType::TransferIn),
                lot(1, 1, 4000, 3900, LoadType::Purchase),
            ],
        );
        assert_eq!(book.available(), Decimal::from(2100));
        assert_eq!(book.active_lot().map(|l| l.id), Some(LotId::new(1)));

        let err = book.debit(Decimal::from(500)).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientStock { .. }));

        let debit = book.debit(Decimal::from(100)).unwrap();
        assert_eq!(debit.stock_status, StockStatus::Sold);
        assert_eq!(book.active_lot().map(|l| l.id), Some(LotId::new(2)));
    }

    #[test]
    fn test_book_without_lots_overdraws() {
        let u = unit(1, "T1", UnitType::Truck);
        let mut book = LotBook::new(&u, vec![]);
        let err = book.debit(Decimal::from(1)).unwrap_err();
        assert!(matches!(err, LedgerError::Overdraw { .. }));
    }

    #[test]
    fn test_book_ignores_foreign_lots() {
        let u = unit(1, "T1", UnitType::Truck);
        let book = LotBook::new(&u, vec![lot(5, 2, 1000, 0, LoadType::Purchase)]);
        assert!(book.lots().is_empty());
    }

    #[test]
    fn test_reverse_then_redebit() {
        let u = unit(1, "T1", UnitType::Truck);
        let mut book = LotBook::new(&u, vec![lot(1, 1, 4000, 1500, LoadType::Purchase)]);
        book.reverse_debit(LotId::new(1), Decimal::from(1500)).unwrap();
        assert_eq!(book.available(), Decimal::from(4000));
        let debit = book.debit_lot(LotId::new(1), Decimal::from(1200)).unwrap();
        assert_eq!(debit.lot_code_after, "LOT05MAR24T1A4000-1200");
        assert!(book.reverse_debit(LotId::new(1), Decimal::from(5000)).is_err());
    }

    #[test]
    fn test_credit_adjust_and_remove() {
        let u = unit(2, "D1", UnitType::Datum);
        let mut book = LotBook::new(&u, vec![]);
        book.credit(lot(9, 2, 1500, 0, LoadType::TransferIn)).unwrap();
        assert_eq!(book.available(), Decimal::from(1500));

        book.adjust_credit(LotId::new(9), Decimal::from(1000)).unwrap();
        assert_eq!(book.available(), Decimal::from(1000));

        book.debit(Decimal::from(200)).unwrap();
        assert!(matches!(
            book.adjust_credit(LotId::new(9), Decimal::from(100)),
            Err(LedgerError::Conflict(_))
        ));
        assert!(matches!(
            book.remove_credit(LotId::new(9)),
            Err(LedgerError::Conflict(_))
        ));

        book.reverse_debit(LotId::new(9), Decimal::from(200)).unwrap();
        let removed = book.remove_credit(LotId::new(9)).unwrap();
        assert_eq!(removed.id, LotId::new(9));
        assert_eq!(book.available(), Decimal::ZERO);
    }

    #[test]
    fn test_purchase_lots_cannot_be_adjusted() {
        let u = unit(1, "T1", UnitType::Truck);
        let mut book = LotBook::new(&u, vec![lot(1, 1, 4000, 0, LoadType::Purchase)]);
        assert!(matches!(
            book.remove_credit(LotId::new(1)),
            Err(LedgerError::Validation(_))
        ));
        assert!(book.credit(lot(3, 1, 10, 0, LoadType::Purchase)).is_err());
    }

    #[test]
    fn test_purchase_capacity_check() {
        let u = unit(1, "T1", UnitType::Truck);
        let purchase = NewPurchase {
            unit_id: u.id,
            loaded_liters: Decimal::from(4000),
            load_date: date(2024, 3, 5),
            load_time: None,
        };
        assert!(purchase.validate(&u, Decimal::ZERO).is_ok());
        assert!(purchase.validate(&u, Decimal::from(17_000)).is_err());

        let mut inactive = u;
        inactive.active = false;
        assert!(purchase.validate(&inactive, Decimal::ZERO).is_err());
    }
}
