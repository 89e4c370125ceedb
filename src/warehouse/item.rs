//! Warehouse items over the discovered item table.
//!
//! Every statement is built from the resolved [`ItemSchema`], so the same
//! code serves `magazzino_articoli` and legacy tables alike. Quantity never
//! changes here directly: initial stock and edits go through the ledger.

use crate::error::ServiceError;
use crate::executor::{DbError, DbExecutor};
use crate::schema::{quote_ident, ItemSchema};
use crate::warehouse::ledger::{apply_movement, lock_quantity};
use crate::warehouse::movement::{check_quantity, MovementCommand, StockChange};
use crate::wire::{decimal_opt, max_len, non_blank, numeric_fits, required};
use may_postgres::types::ToSql;
use may_postgres::Row;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const MAX_TEXT_LEN: usize = 255;

/// A warehouse item as returned to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Item {
    pub id: i64,
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "categoria")]
    pub category: Option<String>,
    #[serde(rename = "quantita", with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    #[serde(rename = "sogliaMinima", with = "rust_decimal::serde::float_option")]
    pub threshold: Option<Decimal>,
    #[serde(rename = "fornitore")]
    pub supplier: Option<String>,
    pub note: Option<String>,
    #[serde(rename = "prezzoUnitario", with = "rust_decimal::serde::float_option")]
    pub unit_price: Option<Decimal>,
}

/// `POST /magazzino/articoli` body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewItem {
    #[serde(rename = "nome", alias = "nomeArticolo", default)]
    pub name: Option<String>,
    #[serde(rename = "categoria", default)]
    pub category: Option<String>,
    #[serde(rename = "quantita", default, deserialize_with = "decimal_opt")]
    pub quantity: Option<Decimal>,
    #[serde(rename = "sogliaMinima", default, deserialize_with = "decimal_opt")]
    pub threshold: Option<Decimal>,
    #[serde(rename = "fornitore", default)]
    pub supplier: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(rename = "prezzoUnitario", default, deserialize_with = "decimal_opt")]
    pub unit_price: Option<Decimal>,
}

/// `PUT /magazzino/articoli/{id}` body; absent fields stay unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemUpdate {
    #[serde(rename = "nome", alias = "nomeArticolo", default)]
    pub name: Option<String>,
    #[serde(rename = "categoria", default)]
    pub category: Option<String>,
    #[serde(rename = "quantita", default, deserialize_with = "decimal_opt")]
    pub quantity: Option<Decimal>,
    #[serde(rename = "sogliaMinima", default, deserialize_with = "decimal_opt")]
    pub threshold: Option<Decimal>,
    #[serde(rename = "fornitore", default)]
    pub supplier: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(rename = "prezzoUnitario", default, deserialize_with = "decimal_opt")]
    pub unit_price: Option<Decimal>,
}

/// `{ id, quantita }` answer to a creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedItem {
    pub id: i64,
    #[serde(rename = "quantita", with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertAction {
    Inserted,
    Updated,
}

/// `{ action, id, quantita }` answer to `POST /magazzino`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpsertedItem {
    pub action: UpsertAction,
    pub id: i64,
    #[serde(rename = "quantita", with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
}

/// Non-negative quantity or threshold that fits `NUMERIC(18,3)`
fn stock_amount(value: Option<Decimal>, field: &str) -> Result<Option<Decimal>, ServiceError> {
    match value {
        Some(v) if v.is_sign_negative() && !v.is_zero() => {
            Err(ServiceError::invalid(format!("{field} non può essere negativa")))
        }
        Some(v) => check_quantity(v, field).map(Some),
        None => Ok(None),
    }
}

fn unit_price(value: Option<Decimal>) -> Result<Option<Decimal>, ServiceError> {
    match value {
        Some(v) if v.is_sign_negative() && !v.is_zero() => {
            Err(ServiceError::invalid("prezzoUnitario non può essere negativo"))
        }
        Some(v) => numeric_fits(v, "prezzoUnitario", 16, 2).map(Some),
        None => Ok(None),
    }
}

impl NewItem {
    /// Trim and range-check every field
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when the name is missing or a number is negative.
    pub fn validate(self) -> Result<Self, ServiceError> {
        let name = required(self.name, "Nome articolo obbligatorio")?;
        Ok(Self {
            name: max_len(Some(name), MAX_TEXT_LEN, "nome")?,
            category: max_len(non_blank(self.category), MAX_TEXT_LEN, "categoria")?,
            quantity: stock_amount(self.quantity, "quantita")?,
            threshold: stock_amount(self.threshold, "sogliaMinima")?,
            supplier: max_len(non_blank(self.supplier), MAX_TEXT_LEN, "fornitore")?,
            note: max_len(non_blank(self.note), MAX_TEXT_LEN, "note")?,
            unit_price: unit_price(self.unit_price)?,
        })
    }
}

impl ItemUpdate {
    /// Trim and range-check every present field
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when nothing would change, the name is blank or a
    /// number is negative.
    pub fn validate(self) -> Result<Self, ServiceError> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(ServiceError::invalid("Nome articolo non può essere vuoto"));
            }
        }
        let update = Self {
            name: max_len(non_blank(self.name), MAX_TEXT_LEN, "nome")?,
            category: max_len(non_blank(self.category), MAX_TEXT_LEN, "categoria")?,
            quantity: stock_amount(self.quantity, "quantita")?,
            threshold: stock_amount(self.threshold, "sogliaMinima")?,
            supplier: max_len(non_blank(self.supplier), MAX_TEXT_LEN, "fornitore")?,
            note: max_len(non_blank(self.note), MAX_TEXT_LEN, "note")?,
            unit_price: unit_price(self.unit_price)?,
        };
        if update.is_empty() {
            return Err(ServiceError::invalid("Nessun campo da aggiornare"));
        }
        Ok(update)
    }

    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.category.is_none()
            && self.quantity.is_none()
            && self.threshold.is_none()
            && self.supplier.is_none()
            && self.note.is_none()
            && self.unit_price.is_none()
    }
}

fn cast_or_null(column: Option<&str>, ty: &str) -> String {
    column
        .map(|c| format!("{}::{ty}", quote_ident(c)))
        .unwrap_or_else(|| format!("NULL::{ty}"))
}

/// Projection shared by every item read, in [`item_from_row`] order
pub(crate) fn item_columns_sql(schema: &ItemSchema) -> String {
    format!(
        "{id}::bigint, {name}::text, {category}, COALESCE({qty}, 0)::numeric, {threshold}::numeric, {supplier}, {note}, {price}",
        id = quote_ident(&schema.id_column),
        name = quote_ident(&schema.name_column),
        category = cast_or_null(schema.category_column.as_deref(), "text"),
        qty = quote_ident(&schema.quantity_column),
        threshold = quote_ident(&schema.threshold_column),
        supplier = cast_or_null(schema.supplier_column.as_deref(), "text"),
        note = cast_or_null(schema.note_column.as_deref(), "text"),
        price = cast_or_null(schema.price_column.as_deref(), "numeric"),
    )
}

pub(crate) fn item_from_row(row: &Row) -> Result<Item, DbError> {
    Ok(Item {
        id: row.try_get(0)?,
        name: row.try_get::<_, Option<String>>(1)?.unwrap_or_default(),
        category: row.try_get(2)?,
        quantity: row.try_get(3)?,
        threshold: row.try_get(4)?,
        supplier: row.try_get(5)?,
        note: row.try_get(6)?,
        unit_price: row.try_get(7)?,
    })
}

/// Every item, ordered by name
///
/// # Errors
///
/// Returns `DbError` if the query fails.
pub fn list_items(executor: &dyn DbExecutor, schema: &ItemSchema) -> Result<Vec<Item>, DbError> {
    let sql = format!(
        "SELECT {} FROM {} ORDER BY {}",
        item_columns_sql(schema),
        schema.table_sql(),
        quote_ident(&schema.name_column)
    );
    executor.query_all(&sql, &[])?.iter().map(item_from_row).collect()
}

/// One item by id
///
/// # Errors
///
/// `NotFound` if the id is unknown.
pub fn get_item(executor: &dyn DbExecutor, schema: &ItemSchema, id: i64) -> Result<Item, ServiceError> {
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = $1::bigint",
        item_columns_sql(schema),
        schema.table_sql(),
        quote_ident(&schema.id_column)
    );
    let row = executor
        .query_opt(&sql, &[&id])?
        .ok_or_else(|| ServiceError::NotFound(format!("Articolo {id} non trovato")))?;
    Ok(item_from_row(&row)?)
}

/// Insert an item with zero stock, then load its initial quantity through the
/// ledger. Run it inside a transaction so both land together.
///
/// # Errors
///
/// Returns `ServiceError::Database` if either statement fails.
pub fn create_item(
    tx: &dyn DbExecutor,
    schema: &ItemSchema,
    item: &NewItem,
) -> Result<CreatedItem, ServiceError> {
    let name = item.name.clone().unwrap_or_default();
    let threshold = item.threshold.unwrap_or(Decimal::ZERO);

    let mut columns = vec![
        quote_ident(&schema.name_column),
        quote_ident(&schema.quantity_column),
        quote_ident(&schema.threshold_column),
    ];
    let mut values = vec!["$1::text".to_string(), "0".to_string(), "$2::numeric".to_string()];
    let mut params: Vec<&dyn ToSql> = vec![&name, &threshold];

    let optional = [
        (schema.category_column.as_deref(), &item.category),
        (schema.supplier_column.as_deref(), &item.supplier),
        (schema.note_column.as_deref(), &item.note),
    ];
    for (column, value) in optional {
        if let Some(column) = column {
            columns.push(quote_ident(column));
            params.push(value);
            values.push(format!("${}::text", params.len()));
        }
    }
    if let Some(column) = schema.price_column.as_deref() {
        columns.push(quote_ident(column));
        params.push(&item.unit_price);
        values.push(format!("${}::numeric", params.len()));
    }

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}::bigint",
        schema.table_sql(),
        columns.join(", "),
        values.join(", "),
        quote_ident(&schema.id_column)
    );
    let id: i64 = tx.query_one(&sql, &params)?.try_get(0).map_err(DbError::from)?;

    let mut quantity = Decimal::ZERO;
    if let Some(initial) = item.quantity.filter(|q| !q.is_zero()) {
        let mut cmd = MovementCommand::new(id, StockChange::Load(initial));
        cmd.meta.note = Some("Giacenza iniziale".to_string());
        quantity = apply_movement(tx, schema, &cmd)?.new_quantity;
    }

    log::info!("created item {id} ({name}) with quantity {quantity}");
    Ok(CreatedItem { id, quantity })
}

/// Edit descriptive fields; a new `quantita` is booked as an adjustment.
/// Run it inside a transaction.
///
/// # Errors
///
/// `NotFound` if the id is unknown.
pub fn update_item(
    tx: &dyn DbExecutor,
    schema: &ItemSchema,
    id: i64,
    update: &ItemUpdate,
) -> Result<Item, ServiceError> {
    // Locks the row and proves it exists before anything is written
    let current = lock_quantity(tx, schema, id)?;

    let mut sets = Vec::new();
    let mut params: Vec<&dyn ToSql> = Vec::new();
    let text_fields = [
        (Some(schema.name_column.as_str()), &update.name),
        (schema.category_column.as_deref(), &update.category),
        (schema.supplier_column.as_deref(), &update.supplier),
        (schema.note_column.as_deref(), &update.note),
    ];
    for (column, value) in text_fields {
        if let (Some(column), Some(_)) = (column, value) {
            params.push(value);
            sets.push(format!("{} = ${}::text", quote_ident(column), params.len()));
        }
    }
    let numeric_fields = [
        (Some(schema.threshold_column.as_str()), &update.threshold),
        (schema.price_column.as_deref(), &update.unit_price),
    ];
    for (column, value) in numeric_fields {
        if let (Some(column), Some(_)) = (column, value) {
            params.push(value);
            sets.push(format!("{} = ${}::numeric", quote_ident(column), params.len()));
        }
    }

    if !sets.is_empty() {
        if let Some(col) = &schema.updated_at_column {
            sets.push(format!("{} = CURRENT_TIMESTAMP", quote_ident(col)));
        }
        params.push(&id);
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ${}::bigint",
            schema.table_sql(),
            sets.join(", "),
            quote_ident(&schema.id_column),
            params.len()
        );
        tx.execute(&sql, &params)?;
    }

    if let Some(target) = update.quantity.filter(|t| *t != current) {
        let mut cmd = MovementCommand::new(id, StockChange::SetTo(target));
        cmd.meta.note = Some("Modifica articolo".to_string());
        apply_movement(tx, schema, &cmd)?;
    }

    get_item(tx, schema, id)
}

/// Add stock to the item with the same name (case-insensitive), or create it.
/// Run it inside a transaction.
///
/// An existing item keeps its descriptive fields unless new ones are given,
/// and its threshold only grows. The added quantity is booked as a load.
///
/// # Errors
///
/// Returns `ServiceError::Database` if a statement fails.
pub fn upsert_item(
    tx: &dyn DbExecutor,
    schema: &ItemSchema,
    item: &NewItem,
) -> Result<UpsertedItem, ServiceError> {
    let name = item.name.clone().unwrap_or_default();
    let id_col = quote_ident(&schema.id_column);
    let find = format!(
        "SELECT {id_col}::bigint, COALESCE({qty}, 0)::numeric FROM {table} \
         WHERE LOWER({name_col}) = LOWER($1::text) ORDER BY {id_col} LIMIT 1 FOR UPDATE",
        qty = quote_ident(&schema.quantity_column),
        table = schema.table_sql(),
        name_col = quote_ident(&schema.name_column),
    );
    let Some(row) = tx.query_opt(&find, &[&name])? else {
        let created = create_item(tx, schema, item)?;
        return Ok(UpsertedItem {
            action: UpsertAction::Inserted,
            id: created.id,
            quantity: created.quantity,
        });
    };
    let id: i64 = row.try_get(0).map_err(DbError::from)?;
    let mut quantity: Decimal = row.try_get(1).map_err(DbError::from)?;

    let threshold = item.threshold.unwrap_or(Decimal::ZERO);
    let threshold_col = quote_ident(&schema.threshold_column);
    let mut sets = vec![format!(
        "{threshold_col} = GREATEST(COALESCE({threshold_col}, 0), $1::numeric)"
    )];
    let mut params: Vec<&dyn ToSql> = vec![&threshold];
    let text_fields = [
        (schema.category_column.as_deref(), &item.category),
        (schema.supplier_column.as_deref(), &item.supplier),
        (schema.note_column.as_deref(), &item.note),
    ];
    for (column, value) in text_fields {
        if let Some(column) = column {
            params.push(value);
            let column = quote_ident(column);
            sets.push(format!("{column} = COALESCE(${}::text, {column})", params.len()));
        }
    }
    if let Some(column) = schema.price_column.as_deref() {
        params.push(&item.unit_price);
        let column = quote_ident(column);
        sets.push(format!("{column} = COALESCE(${}::numeric, {column})", params.len()));
    }
    params.push(&id);
    let sql = format!(
        "UPDATE {} SET {} WHERE {id_col} = ${}::bigint",
        schema.table_sql(),
        sets.join(", "),
        params.len()
    );
    tx.execute(&sql, &params)?;

    if let Some(added) = item.quantity.filter(|q| !q.is_zero()) {
        let mut cmd = MovementCommand::new(id, StockChange::Load(added));
        cmd.meta.note = Some("Carico da inserimento articolo".to_string());
        quantity = apply_movement(tx, schema, &cmd)?.new_quantity;
    }

    log::info!("merged stock into existing item {id} ({name}), quantity {quantity}");
    Ok(UpsertedItem {
        action: UpsertAction::Updated,
        id,
        quantity,
    })
}

/// Remove an item; its movements stay in the log
///
/// # Errors
///
/// `NotFound` if the id is unknown.
pub fn delete_item(executor: &dyn DbExecutor, schema: &ItemSchema, id: i64) -> Result<(), ServiceError> {
    let sql = format!(
        "DELETE FROM {} WHERE {} = $1::bigint",
        schema.table_sql(),
        quote_ident(&schema.id_column)
    );
    match executor.execute(&sql, &[&id])? {
        0 => Err(ServiceError::NotFound(format!("Articolo {id} non trovato"))),
        _ => {
            log::info!("deleted item {id}");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn schema() -> ItemSchema {
        ItemSchema {
            table: "magazzino_articoli".into(),
            id_column: "id".into(),
            name_column: "nome_articolo".into(),
            quantity_column: "quantita".into(),
            threshold_column: "soglia_minima".into(),
            category_column: Some("categoria".into()),
            supplier_column: None,
            note_column: Some("note".into()),
            price_column: None,
            updated_at_column: Some("updated_at".into()),
        }
    }

    #[test]
    fn test_projection_fills_missing_optional_columns() {
        let sql = item_columns_sql(&schema());
        assert!(sql.starts_with("\"id\"::bigint, \"nome_articolo\"::text, \"categoria\"::text"));
        assert!(sql.contains("COALESCE(\"quantita\", 0)::numeric"));
        assert!(sql.contains("NULL::text, \"note\"::text, NULL::numeric"));

        let mut priced = schema();
        priced.price_column = Some("PrezzoUnitario".into());
        assert!(item_columns_sql(&priced).ends_with("\"note\"::text, \"PrezzoUnitario\"::numeric"));
    }

    #[test]
    fn test_new_item_validation() {
        let item: NewItem = serde_json::from_str(
            r#"{"nome": "  Cemento 25kg ", "quantita": "10", "sogliaMinima": 4, "categoria": ""}"#,
        )
        .expect("json");
        let item = item.validate().expect("valid");
        assert_eq!(item.name.as_deref(), Some("Cemento 25kg"));
        assert_eq!(item.quantity, Some(Decimal::from_str("10").expect("dec")));
        assert_eq!(item.category, None);

        let missing: NewItem = serde_json::from_str(r#"{"quantita": 1}"#).expect("json");
        assert!(missing.validate().is_err());

        let negative: NewItem =
            serde_json::from_str(r#"{"nome": "x", "quantita": -1}"#).expect("json");
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_amounts_must_fit_their_columns() {
        for body in [
            r#"{"nome": "x", "quantita": 0.0004}"#,
            r#"{"nome": "x", "quantita": "1e15"}"#,
            r#"{"nome": "x", "sogliaMinima": "2,1234"}"#,
            r#"{"nome": "x", "prezzoUnitario": 1.005}"#,
            r#"{"nome": "x", "prezzoUnitario": -3}"#,
        ] {
            let item: NewItem = serde_json::from_str(body).expect("json");
            assert!(
                matches!(item.validate(), Err(ServiceError::InvalidArgument(_))),
                "{body}"
            );
        }

        let update: ItemUpdate = serde_json::from_str(r#"{"quantita": "0,0001"}"#).expect("json");
        assert!(update.validate().is_err());
        let update: ItemUpdate =
            serde_json::from_str(r#"{"quantita": "999999999999999.999"}"#).expect("json");
        assert!(update.validate().is_ok());
    }

    #[test]
    fn test_update_validation() {
        let empty: ItemUpdate = serde_json::from_str("{}").expect("json");
        assert!(empty.validate().is_err());

        let blank_name: ItemUpdate = serde_json::from_str(r#"{"nome": "  "}"#).expect("json");
        assert!(blank_name.validate().is_err());

        let qty: ItemUpdate = serde_json::from_str(r#"{"quantita": 3}"#).expect("json");
        assert!(qty.validate().is_ok());
    }

    #[test]
    fn test_item_wire_shape() {
        let item = Item {
            id: 1,
            name: "Sabbia".into(),
            category: None,
            quantity: Decimal::new(25, 1),
            threshold: None,
            supplier: Some("Edilcentro".into()),
            note: None,
            unit_price: Some(Decimal::new(1250, 2)),
        };
        let json = serde_json::to_value(&item).expect("serializes");
        assert_eq!(json["nome"], "Sabbia");
        assert_eq!(json["quantita"], 2.5);
        assert!(json["sogliaMinima"].is_null());
        assert_eq!(json["fornitore"], "Edilcentro");
        assert_eq!(json["prezzoUnitario"], 12.5);
    }

    #[test]
    fn test_upsert_wire_shape() {
        let json = serde_json::to_value(UpsertedItem {
            action: UpsertAction::Updated,
            id: 3,
            quantity: Decimal::new(12, 0),
        })
        .expect("serializes");
        assert_eq!(json, serde_json::json!({ "action": "updated", "id": 3, "quantita": 12.0 }));
    }
}
