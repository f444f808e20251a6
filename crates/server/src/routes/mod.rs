//! HTTP route handlers for the ledger service.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                       - Liveness
//! GET  /health/ready                 - Database reachable
//!
//! # Registry
//! GET  /units?type=                  - List units
//! POST /units                        - Register a unit
//! GET  /units/{id}                   - Unit detail
//! PATCH /units/{id}                  - Update code, capacity or vehicle
//! POST /units/{id}/deactivate        - Deactivate a unit
//! GET  /drivers?active_only=         - List drivers
//! POST /drivers                      - Register a driver
//! PATCH /drivers/{id}                - Update a driver
//! POST /drivers/{id}/deactivate      - Deactivate a driver
//!
//! # Lots
//! POST /lots                         - Record a purchase
//! GET  /lots/list                    - Filtered lot listing
//! GET  /lots/export                  - Same listing as CSV
//! GET  /lots/{id}                    - Lot detail
//!
//! # Ledger activity
//! POST /lots/activity                - Sale, internal transfer or testing
//! GET  /lots/activity/{id}           - Record detail
//! PATCH /lots/activity/{id}          - Edit volume or time
//! DELETE /lots/activity/{id}?reason= - Void a record
//! GET  /lots/activity/{id}/audit     - Edit and void trail
//!
//! # Trips
//! GET  /trips?truck_id&date          - Trips of a truck's day
//! POST /trips                        - Create the next trip
//! GET  /trips/{id}                   - Trip detail
//! PATCH /trips/{id}                  - Record opening/closing readings
//! DELETE /trips/{id}                 - Delete the latest trip and void its records
//!
//! # Views and reports
//! GET  /ops/day?unit_id&date         - Operations view of a day
//! GET  /ops/trip?trip_id             - Operations view of a trip
//! GET  /reconcile/daily?truck_id&date&tolerance
//! GET  /reconcile/range?truck_id&from&to&tolerance
//! GET  /reconcile/trip?trip_id&tolerance
//! GET  /stock/summary                - Live figures per active unit
//!
//! # Day-level readings
//! GET|POST|PATCH /day/dispenser      - Day opening/closing over trips
//! GET|POST|PATCH /day/odometer       - Odometer km per truck+date
//! GET|POST /day/logs                 - Derived day log and operator notes
//! POST /meter-snapshots              - Operator-reported meter reading
//! ```

pub mod activity;
pub mod day;
pub mod drivers;
pub mod health;
pub mod lots;
pub mod reports;
pub mod trips;
pub mod units;

use axum::Router;

use crate::state::AppState;

/// Build the complete ledger router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(units::router())
        .merge(drivers::router())
        .merge(lots::router())
        .merge(activity::router())
        .merge(trips::router())
        .merge(day::router())
        .merge(reports::router())
}
