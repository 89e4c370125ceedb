use crate::config::DatabaseConfig;
use crate::connection::{check_connection_health, connect, ConnectionError};
use crate::executor::{instrumented, DbError, DbExecutor};
use crate::transaction::{Transaction, TransactionError};
use may::sync::mpmc::{channel, Receiver, Sender};
use may_postgres::types::ToSql;
use may_postgres::{Client, Row};
use std::cell::Cell;
use std::fmt::Display;
use std::time::{Duration, Instant};

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Bounded pool of persistent connection slots
///
/// A slot whose client failed at the driver level is health-checked when it
/// comes back and reconnected from `url` if the check fails.
pub struct ConnectionPool {
    url: String,
    idle_tx: Sender<Client>,
    idle_rx: Receiver<Client>,
    size: usize,
    acquire_timeout: Duration,
}

impl ConnectionPool {
    /// Open `config.max_connections` connections up front
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError` if any slot cannot be connected; no partial
    /// pool is returned.
    pub fn connect(config: &DatabaseConfig) -> Result<Self, ConnectionError> {
        let size = usize::try_from(config.max_connections)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                ConnectionError::Other(format!(
                    "max_connections must be positive, got {}",
                    config.max_connections
                ))
            })?;

        let (idle_tx, idle_rx) = channel();
        for _ in 0..size {
            let client = connect(&config.url)?;
            idle_tx
                .send(client)
                .map_err(|_| ConnectionError::Other("pool channel closed".to_string()))?;
        }
        log::info!("connection pool ready with {size} slot(s)");

        Ok(Self {
            url: config.url.clone(),
            idle_tx,
            idle_rx,
            size,
            acquire_timeout: Duration::from_secs(config.pool_timeout_seconds),
        })
    }

    /// Number of slots in the pool
    pub fn size(&self) -> usize {
        self.size
    }

    /// Take a connection, waiting up to the configured timeout
    ///
    /// # Errors
    ///
    /// Returns `DbError::PoolTimeout` if every slot stays busy for the whole
    /// timeout.
    pub fn acquire(&self) -> Result<PooledConnection<'_>, DbError> {
        let start = Instant::now();
        let client = self.idle_rx.recv_timeout(self.acquire_timeout).map_err(|_| {
            DbError::PoolTimeout(format!(
                "no connection available after {}s ({} slot(s) busy)",
                self.acquire_timeout.as_secs(),
                self.size
            ))
        })?;

        #[cfg(feature = "metrics")]
        METRICS.observe_wait(start.elapsed());
        #[cfg(not(feature = "metrics"))]
        let _ = start;

        Ok(PooledConnection {
            client: Some(client),
            pool: self,
            suspect: Cell::new(false),
        })
    }

    fn release(&self, client: Client, suspect: bool) {
        let client = recycle(
            client,
            suspect,
            |client| matches!(check_connection_health(client), Ok(true)),
            || connect(&self.url),
        );
        if self.idle_tx.send(client).is_err() {
            log::error!("connection pool channel closed; dropping connection");
        }
    }
}

/// Keep a healthy client, otherwise open a replacement for its slot.
///
/// Only suspect clients are checked. When reconnecting fails the old client
/// goes back anyway so the pool keeps its size; the next suspect use retries.
fn recycle<C, E: Display>(
    client: C,
    suspect: bool,
    healthy: impl FnOnce(&C) -> bool,
    reconnect: impl FnOnce() -> Result<C, E>,
) -> C {
    if !suspect || healthy(&client) {
        return client;
    }
    match reconnect() {
        Ok(fresh) => {
            log::warn!("replaced a dead pooled connection");
            fresh
        }
        Err(err) => {
            log::error!("could not replace a dead pooled connection: {err}");
            client
        }
    }
}

/// A connection borrowed from the pool; returned to it on drop
pub struct PooledConnection<'p> {
    client: Option<Client>,
    pool: &'p ConnectionPool,
    /// Set after a driver error; the slot is checked before reuse
    suspect: Cell<bool>,
}

impl PooledConnection<'_> {
    /// The underlying client
    pub fn client(&self) -> &Client {
        // Only `Drop` takes the client out.
        self.client.as_ref().unwrap_or_else(|| unreachable!("pooled client taken before drop"))
    }

    /// Run `f` inside a transaction on this connection
    ///
    /// Commits when `f` succeeds. When `f` fails the transaction is rolled
    /// back and `f`'s error is returned; a failed rollback is only logged.
    ///
    /// # Errors
    ///
    /// Returns `f`'s error, or the `BEGIN`/`COMMIT` failure converted into `E`.
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<TransactionError>,
    {
        let tx = Transaction::begin(self.client()).map_err(|e| self.mark(e))?;
        match f(&tx) {
            Ok(value) => {
                tx.commit().map_err(|e| self.mark(e))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rb) = tx.rollback() {
                    log::error!("rollback failed: {rb}");
                    self.suspect.set(true);
                }
                Err(err)
            }
        }
    }

    fn mark<E>(&self, err: E) -> E {
        self.suspect.set(true);
        err
    }

    fn watched<T>(&self, result: Result<T, DbError>) -> Result<T, DbError> {
        if matches!(result, Err(DbError::PostgresError(_))) {
            self.suspect.set(true);
        }
        result
    }

    /// Run `SELECT 1` on this connection
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the check fails.
    pub fn check_health(&self) -> Result<bool, DbError> {
        check_connection_health(self.client()).map_err(|e| {
            self.suspect.set(true);
            DbError::Other(format!("Health check error: {e}"))
        })
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            self.pool.release(client, self.suspect.get());
        }
    }
}

impl DbExecutor for PooledConnection<'_> {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, DbError> {
        self.watched(instrumented(query, || self.client().execute(query, params)))
    }

    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, DbError> {
        self.watched(instrumented(query, || self.client().query_one(query, params)))
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, DbError> {
        self.watched(instrumented(query, || self.client().query(query, params)))
    }
}
