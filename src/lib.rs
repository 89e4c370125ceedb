//! # Cantiere
//!
//! Business-management service for a construction company on the `may`
//! coroutine runtime: job sites, employees, work hours, schedules, payment
//! deadlines and a warehouse whose stock moves only through a transactional
//! ledger.
//!
//! The moving parts:
//!
//! - [`pool::ConnectionPool`]: bounded set of `may_postgres` connections.
//! - [`schema`]: table bootstrap and discovery of the item table's physical
//!   column names.
//! - [`warehouse`]: items, the stock ledger and the movement log.
//! - [`http`]: the REST API served with `may_minihttp`.

pub mod config;
pub mod connection;
pub mod deadlines;
pub mod employees;
pub mod error;
pub mod executor;
pub mod hours;
pub mod http;
pub mod metrics;
pub mod overview;
pub mod params;
pub mod pool;
pub mod schedules;
pub mod schema;
pub mod sites;
pub mod transaction;
pub mod warehouse;
pub mod wire;

pub use config::AppConfig;
pub use connection::{connect, ConnectionError};
pub use error::ServiceError;
pub use executor::{DbError, DbExecutor, MayPostgresExecutor};
pub use http::{ApiService, AppState};
pub use pool::{ConnectionPool, PooledConnection};
pub use schema::{bootstrap_schema, resolve_item_schema, ItemSchema};
pub use transaction::{Transaction, TransactionError};
pub use warehouse::Warehouse;
