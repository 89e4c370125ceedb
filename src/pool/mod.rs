//! Connection pool
//!
//! A fixed set of persistent `may_postgres` connections parked in a
//! coroutine-aware channel. Acquisition parks the calling coroutine, not the
//! worker thread, and gives up after the configured timeout.

mod manager;

pub use manager::{ConnectionPool, PooledConnection};
