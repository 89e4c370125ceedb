//! Stock ledger
//!
//! One movement is one transaction on one pooled connection:
//!
//! 1. lock the item row (`SELECT ... FOR UPDATE`);
//! 2. compute the new balance with [`StockChange::apply`];
//! 3. write the balance back;
//! 4. append the movement row and return its id.
//!
//! Concurrent movements on the same item serialize on the row lock, so two
//! unloads can never both see the same starting balance.

use crate::error::ServiceError;
use crate::executor::{DbError, DbExecutor};
use crate::schema::bootstrap::MOVEMENT_TABLE;
use crate::schema::{quote_ident, ItemSchema};
use crate::warehouse::movement::{MovementCommand, MovementKind};
use rust_decimal::Decimal;
use serde::Serialize;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Result of a committed movement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovementOutcome {
    #[serde(rename = "id")]
    pub movement_id: i64,
    #[serde(rename = "articoloId")]
    pub item_id: i64,
    #[serde(rename = "tipo", serialize_with = "kind_name")]
    pub kind: MovementKind,
    /// Signed delta applied to the item
    #[serde(rename = "quantita", with = "rust_decimal::serde::float")]
    pub delta: Decimal,
    #[serde(rename = "nuovaQuantita", with = "rust_decimal::serde::float")]
    pub new_quantity: Decimal,
}

fn kind_name<S: serde::Serializer>(kind: &MovementKind, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(kind.as_str())
}

pub(crate) fn lock_quantity_sql(schema: &ItemSchema) -> String {
    format!(
        "SELECT COALESCE({qty}, 0)::numeric FROM {table} WHERE {id} = $1::bigint FOR UPDATE",
        qty = quote_ident(&schema.quantity_column),
        table = schema.table_sql(),
        id = quote_ident(&schema.id_column),
    )
}

pub(crate) fn update_quantity_sql(schema: &ItemSchema) -> String {
    let touch = schema
        .updated_at_column
        .as_deref()
        .map(|c| format!(", {} = CURRENT_TIMESTAMP", quote_ident(c)))
        .unwrap_or_default();
    format!(
        "UPDATE {table} SET {qty} = $1::numeric{touch} WHERE {id} = $2::bigint",
        table = schema.table_sql(),
        qty = quote_ident(&schema.quantity_column),
        id = quote_ident(&schema.id_column),
    )
}

/// `created_at` is stamped at insert time, while the item row lock is held,
/// so log order matches the order balances were computed in.
pub(crate) fn insert_movement_sql() -> String {
    format!(
        "INSERT INTO {} (articolo_id, tipo, quantita, quantita_risultante, costo_unitario, \
         cantiere_id, note, data_movimento, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, clock_timestamp()) RETURNING id",
        quote_ident(MOVEMENT_TABLE)
    )
}

/// Lock the item row and read its quantity; the lock lasts until the
/// transaction ends.
///
/// # Errors
///
/// `NotFound` if no item has `item_id`.
pub fn lock_quantity(
    tx: &dyn DbExecutor,
    schema: &ItemSchema,
    item_id: i64,
) -> Result<Decimal, ServiceError> {
    let row = tx
        .query_opt(&lock_quantity_sql(schema), &[&item_id])?
        .ok_or_else(|| ServiceError::NotFound(format!("Articolo {item_id} non trovato")))?;
    let current: Decimal = row
        .try_get(0)
        .map_err(|e| DbError::ParseError(format!("item quantity: {e}")))?;
    Ok(current)
}

/// Apply a validated movement inside an open transaction
///
/// The caller owns the transaction and decides whether to commit; nothing
/// here commits or rolls back.
///
/// # Errors
///
/// `NotFound` if the item does not exist, `InvalidState`/`InvalidArgument`
/// when the balance would go negative, `Database` for driver failures.
pub fn apply_movement(
    tx: &dyn DbExecutor,
    schema: &ItemSchema,
    cmd: &MovementCommand,
) -> Result<MovementOutcome, ServiceError> {
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::movement_span(cmd.item_id, cmd.change.kind().as_str()).entered();

    let current = lock_quantity(tx, schema, cmd.item_id)?;
    let applied = cmd.change.apply(current)?;

    let updated = tx.execute(
        &update_quantity_sql(schema),
        &[&applied.new_quantity, &cmd.item_id],
    )?;
    if updated != 1 {
        return Err(DbError::QueryError(format!(
            "quantity update touched {updated} rows for item {}",
            cmd.item_id
        ))
        .into());
    }

    let kind = cmd.change.kind();
    let kind_str = kind.as_str();
    let meta = &cmd.meta;
    let row = tx.query_one(
        &insert_movement_sql(),
        &[
            &cmd.item_id,
            &kind_str,
            &applied.delta,
            &applied.new_quantity,
            &meta.unit_cost,
            &meta.site_id,
            &meta.note,
            &meta.date,
        ],
    )?;
    let movement_id: i64 = row
        .try_get(0)
        .map_err(|e| DbError::ParseError(format!("movement id: {e}")))?;

    log::debug!(
        "item {} {} {} -> {} (movement {movement_id})",
        cmd.item_id,
        kind,
        applied.delta,
        applied.new_quantity
    );

    Ok(MovementOutcome {
        movement_id,
        item_id: cmd.item_id,
        kind,
        delta: applied.delta,
        new_quantity: applied.new_quantity,
    })
}
