//! Warehouse: items, the stock ledger and the movement log.
//!
//! [`Warehouse`] is built once at startup with the pool and the item schema
//! resolved by [`crate::schema::resolve_item_schema`]; it never looks the
//! schema up again.

pub mod item;
pub mod ledger;
pub mod movement;
pub mod report;

pub use item::{CreatedItem, Item, ItemUpdate, NewItem, UpsertAction, UpsertedItem};
pub use ledger::{apply_movement, MovementOutcome};
pub use movement::{MovementCommand, MovementKind, MovementMeta, MovementRequest, StockChange};
pub use report::{Movement, MovementFilter, WarehouseKpi};

use crate::error::ServiceError;
use crate::pool::ConnectionPool;
use crate::schema::ItemSchema;
use std::sync::Arc;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Warehouse operations over a connection pool
#[derive(Clone)]
pub struct Warehouse {
    pool: Arc<ConnectionPool>,
    schema: Arc<ItemSchema>,
    movement_page_size: u64,
}

impl Warehouse {
    pub fn new(pool: Arc<ConnectionPool>, schema: Arc<ItemSchema>, movement_page_size: u64) -> Self {
        Self {
            pool,
            schema,
            movement_page_size,
        }
    }

    pub fn schema(&self) -> &ItemSchema {
        &self.schema
    }

    /// Apply one movement in its own transaction
    ///
    /// # Errors
    ///
    /// See [`apply_movement`]; the transaction is rolled back on any error.
    pub fn record_movement(&self, cmd: &MovementCommand) -> Result<MovementOutcome, ServiceError> {
        let kind = cmd.change.kind();
        let result = self
            .pool
            .acquire()
            .map_err(ServiceError::from)
            .and_then(|conn| conn.transaction(|tx| apply_movement(tx, &self.schema, cmd)));

        match &result {
            Ok(outcome) => {
                #[cfg(feature = "metrics")]
                METRICS.record_movement(kind.as_str());
                log::info!(
                    "movement {} recorded: item {} {} {} -> {}",
                    outcome.movement_id,
                    outcome.item_id,
                    kind,
                    outcome.delta,
                    outcome.new_quantity
                );
            }
            Err(err) => {
                #[cfg(feature = "metrics")]
                METRICS.record_rejected_movement(kind.as_str(), rejection_reason(err));
                match err {
                    ServiceError::Database(_) => log::error!(
                        "movement failed: item {} {} {}: {err}",
                        cmd.item_id,
                        kind,
                        cmd.change.requested()
                    ),
                    _ => log::warn!(
                        "movement rejected: item {} {} {}: {err}",
                        cmd.item_id,
                        kind,
                        cmd.change.requested()
                    ),
                }
            }
        }
        result
    }

    /// # Errors
    ///
    /// Returns `ServiceError::Database` on driver or pool failures.
    pub fn list_items(&self) -> Result<Vec<Item>, ServiceError> {
        let conn = self.pool.acquire()?;
        Ok(item::list_items(&conn, &self.schema)?)
    }

    /// Insert an item and book its initial quantity in one transaction
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for bad input, `Database` on failures.
    pub fn create_item(&self, new_item: NewItem) -> Result<CreatedItem, ServiceError> {
        let new_item = new_item.validate()?;
        let conn = self.pool.acquire()?;
        conn.transaction(|tx| item::create_item(tx, &self.schema, &new_item))
    }

    /// Merge stock into the item with the same name, or create it
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for bad input, `Database` on failures.
    pub fn upsert_item(&self, new_item: NewItem) -> Result<UpsertedItem, ServiceError> {
        let new_item = new_item.validate()?;
        let conn = self.pool.acquire()?;
        conn.transaction(|tx| item::upsert_item(tx, &self.schema, &new_item))
    }

    /// # Errors
    ///
    /// `InvalidArgument` for bad input, `NotFound` for an unknown id.
    pub fn update_item(&self, id: i64, update: ItemUpdate) -> Result<Item, ServiceError> {
        let update = update.validate()?;
        let conn = self.pool.acquire()?;
        conn.transaction(|tx| item::update_item(tx, &self.schema, id, &update))
    }

    /// # Errors
    ///
    /// `NotFound` for an unknown id.
    pub fn delete_item(&self, id: i64) -> Result<(), ServiceError> {
        let conn = self.pool.acquire()?;
        item::delete_item(&conn, &self.schema, id)
    }

    /// # Errors
    ///
    /// Returns `ServiceError::Database` on driver or pool failures.
    pub fn low_stock(&self) -> Result<Vec<Item>, ServiceError> {
        let conn = self.pool.acquire()?;
        Ok(report::low_stock(&conn, &self.schema)?)
    }

    /// # Errors
    ///
    /// Returns `ServiceError::Database` on driver or pool failures.
    pub fn kpi(&self) -> Result<WarehouseKpi, ServiceError> {
        let conn = self.pool.acquire()?;
        Ok(report::kpi(&conn, &self.schema)?)
    }

    /// # Errors
    ///
    /// Returns `ServiceError::Database` on driver or pool failures.
    pub fn list_movements(&self, filter: &MovementFilter) -> Result<Vec<Movement>, ServiceError> {
        let conn = self.pool.acquire()?;
        Ok(report::list_movements(&conn, filter, self.movement_page_size)?)
    }
}

#[cfg(feature = "metrics")]
fn rejection_reason(err: &ServiceError) -> &'static str {
    match err {
        ServiceError::InvalidArgument(_) => "invalid_argument",
        ServiceError::NotFound(_) => "not_found",
        ServiceError::InvalidState(_) => "insufficient_stock",
        ServiceError::Conflict(_) => "conflict",
        ServiceError::Database(_) => "database",
    }
}
