//! Shared setup for the database tests.
//!
//! Tests run only when `TEST_DATABASE_URL` points at a PostgreSQL database
//! the tests may create tables in; otherwise they return early.

#![allow(dead_code)]

use cantiere::config::{AppConfig, DatabaseConfig};
use cantiere::warehouse::{NewItem, Warehouse};
use cantiere::AppState;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct TestDatabase {
    pub state: AppState,
}

impl TestDatabase {
    /// Connected state with the schema bootstrapped, or `None` without a
    /// test database
    pub fn from_env() -> Option<Self> {
        let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
            eprintln!("TEST_DATABASE_URL not set; skipping");
            return None;
        };
        let mut config = AppConfig::default();
        config.database = DatabaseConfig {
            url,
            max_connections: 8,
            pool_timeout_seconds: 10,
        };
        config.warehouse.bootstrap_schema = true;
        let state = AppState::from_config(&config).expect("test database setup");
        Some(Self { state })
    }

    pub fn warehouse(&self) -> &Warehouse {
        &self.state.warehouse
    }

    /// New item with `quantity` on hand; returns its id
    pub fn item(&self, quantity: &str) -> i64 {
        let new_item: NewItem = serde_json::from_value(serde_json::json!({
            "nome": unique("Articolo"),
            "quantita": quantity,
            "sogliaMinima": "2",
        }))
        .expect("item json");
        self.warehouse().create_item(new_item).expect("create item").id
    }
}

/// `prefix` plus a suffix unique within this run
pub fn unique(prefix: &str) -> String {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    format!("{prefix}-{nanos}-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
}

macro_rules! require_db {
    () => {
        match common::TestDatabase::from_env() {
            Some(db) => db,
            None => return,
        }
    };
}
pub(crate) use require_db;
