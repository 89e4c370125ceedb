//! Shared application state, built once at startup.

use crate::config::AppConfig;
use crate::connection::ConnectionError;
use crate::error::ServiceError;
use crate::executor::DbError;
use crate::pool::ConnectionPool;
use crate::schema::{bootstrap_schema, resolve_item_schema, ItemSchema};
use crate::warehouse::Warehouse;
use std::fmt;
use std::sync::Arc;

/// Why the service could not start
#[derive(Debug)]
pub enum StartupError {
    Connection(ConnectionError),
    Bootstrap(DbError),
    Schema(ServiceError),
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupError::Connection(e) => write!(f, "cannot open the connection pool: {e}"),
            StartupError::Bootstrap(e) => write!(f, "schema bootstrap failed: {e}"),
            StartupError::Schema(e) => write!(f, "item schema could not be resolved: {e}"),
        }
    }
}

impl std::error::Error for StartupError {}

impl From<ConnectionError> for StartupError {
    fn from(err: ConnectionError) -> Self {
        StartupError::Connection(err)
    }
}

/// Everything a request handler needs
pub struct AppState {
    pub pool: Arc<ConnectionPool>,
    pub warehouse: Warehouse,
}

impl AppState {
    pub fn new(pool: Arc<ConnectionPool>, schema: ItemSchema, movement_page_size: u64) -> Self {
        let warehouse = Warehouse::new(Arc::clone(&pool), Arc::new(schema), movement_page_size);
        Self { pool, warehouse }
    }

    /// Open the pool, optionally bootstrap the tables, then resolve the item
    /// schema once
    ///
    /// # Errors
    ///
    /// Returns `StartupError` if any of the three steps fails.
    pub fn from_config(config: &AppConfig) -> Result<Self, StartupError> {
        let pool = Arc::new(ConnectionPool::connect(&config.database)?);
        let schema = {
            let conn = pool.acquire().map_err(StartupError::Bootstrap)?;
            if config.warehouse.bootstrap_schema {
                bootstrap_schema(&conn).map_err(StartupError::Bootstrap)?;
            }
            let schema = resolve_item_schema(&conn).map_err(StartupError::Schema)?;
            schema
        };
        Ok(Self::new(pool, schema, config.warehouse.movement_page_size))
    }
}
