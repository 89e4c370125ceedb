//! Read-side warehouse queries: low stock, KPI counters and the movement log.

use crate::error::ServiceError;
use crate::executor::{DbError, DbExecutor};
use crate::params::with_converted_params;
use crate::schema::bootstrap::MOVEMENT_TABLE;
use crate::schema::{quote_ident, ItemSchema};
use crate::warehouse::item::{item_columns_sql, item_from_row, Item};
use crate::wire::parse_date;
use chrono::{NaiveDate, NaiveDateTime};
use may_postgres::Row;
use rust_decimal::Decimal;
use sea_query::{Expr, ExprTrait, Order, PostgresQueryBuilder, Query, SelectStatement};
use serde::Serialize;

/// `{ articoli, sottoSoglia, valoreTotale }`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WarehouseKpi {
    #[serde(rename = "articoli")]
    pub items: i64,
    #[serde(rename = "sottoSoglia")]
    pub below_threshold: i64,
    /// Stock valued at unit price; null without a price column
    #[serde(rename = "valoreTotale", with = "rust_decimal::serde::float_option")]
    pub total_value: Option<Decimal>,
}

/// One row of the movement log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Movement {
    pub id: i64,
    #[serde(rename = "articoloId")]
    pub item_id: i64,
    #[serde(rename = "tipo")]
    pub kind: String,
    #[serde(rename = "quantita", with = "rust_decimal::serde::float")]
    pub delta: Decimal,
    #[serde(rename = "quantitaRisultante", with = "rust_decimal::serde::float")]
    pub resulting_quantity: Decimal,
    #[serde(rename = "costoUnitario", with = "rust_decimal::serde::float_option")]
    pub unit_cost: Option<Decimal>,
    #[serde(rename = "cantiereId")]
    pub site_id: Option<i64>,
    pub note: Option<String>,
    #[serde(rename = "data")]
    pub date: Option<NaiveDate>,
    #[serde(rename = "createdAt")]
    pub created_at: NaiveDateTime,
}

/// Filters of `GET /magazzino/movimenti`; both dates are inclusive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovementFilter {
    pub item_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl MovementFilter {
    /// Build a filter from raw query-string values
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a non-numeric id, a bad date or `from > to`.
    pub fn parse(
        item_id: Option<&str>,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<Self, ServiceError> {
        let blank = |v: &&str| !v.trim().is_empty();
        let item_id = item_id
            .filter(blank)
            .map(|raw| {
                raw.trim()
                    .parse::<i64>()
                    .map_err(|_| ServiceError::invalid(format!("articoloId non valido: {raw}")))
            })
            .transpose()?;
        let from = from.filter(blank).map(parse_date).transpose()?;
        let to = to.filter(blank).map(parse_date).transpose()?;
        if let (Some(f), Some(t)) = (from, to) {
            if f > t {
                return Err(ServiceError::invalid("L'intervallo di date non è valido"));
            }
        }
        Ok(Self { item_id, from, to })
    }
}

const MOVEMENT_COLUMNS: [&str; 10] = [
    "id",
    "articolo_id",
    "tipo",
    "quantita",
    "quantita_risultante",
    "costo_unitario",
    "cantiere_id",
    "note",
    "data_movimento",
    "created_at",
];

pub(crate) fn movement_query(filter: &MovementFilter, limit: u64) -> SelectStatement {
    let mut query = Query::select();
    query.columns(MOVEMENT_COLUMNS).from(MOVEMENT_TABLE);
    if let Some(id) = filter.item_id {
        query.and_where(Expr::col("articolo_id").eq(id));
    }
    if let Some(from) = filter.from {
        query.and_where(Expr::col("created_at").gte(Expr::val(from.to_string()).cast_as("date")));
    }
    if let Some(next_day) = filter.to.and_then(|to| to.succ_opt()) {
        query.and_where(Expr::col("created_at").lt(Expr::val(next_day.to_string()).cast_as("date")));
    }
    query
        .order_by("created_at", Order::Desc)
        .order_by("id", Order::Desc)
        .limit(limit);
    query
}

fn movement_from_row(row: &Row) -> Result<Movement, DbError> {
    Ok(Movement {
        id: row.try_get(0)?,
        item_id: row.try_get(1)?,
        kind: row.try_get(2)?,
        delta: row.try_get(3)?,
        resulting_quantity: row.try_get(4)?,
        unit_cost: row.try_get(5)?,
        site_id: row.try_get(6)?,
        note: row.try_get(7)?,
        date: row.try_get(8)?,
        created_at: row.try_get(9)?,
    })
}

/// Newest movements first, at most `limit` rows
///
/// # Errors
///
/// Returns `DbError` if the query fails.
pub fn list_movements(
    executor: &dyn DbExecutor,
    filter: &MovementFilter,
    limit: u64,
) -> Result<Vec<Movement>, DbError> {
    let (sql, values) = movement_query(filter, limit).build(PostgresQueryBuilder);
    with_converted_params(&values, |params| {
        executor.query_all(&sql, params)?.iter().map(movement_from_row).collect()
    })
}

/// Items at or below their threshold, most urgent first
///
/// # Errors
///
/// Returns `DbError` if the query fails.
pub fn low_stock(executor: &dyn DbExecutor, schema: &ItemSchema) -> Result<Vec<Item>, DbError> {
    let qty = quote_ident(&schema.quantity_column);
    let threshold = quote_ident(&schema.threshold_column);
    let sql = format!(
        "SELECT {columns} FROM {table} \
         WHERE {threshold} IS NOT NULL AND COALESCE({qty}, 0) <= {threshold} \
         ORDER BY COALESCE({qty}, 0)::numeric / NULLIF({threshold}, 0) ASC NULLS LAST, {name}",
        columns = item_columns_sql(schema),
        table = schema.table_sql(),
        name = quote_ident(&schema.name_column),
    );
    executor.query_all(&sql, &[])?.iter().map(item_from_row).collect()
}

pub(crate) fn kpi_sql(schema: &ItemSchema) -> String {
    let qty = quote_ident(&schema.quantity_column);
    let threshold = quote_ident(&schema.threshold_column);
    let value = schema
        .price_column
        .as_deref()
        .map(|price| format!("SUM(COALESCE({qty}, 0) * COALESCE({}, 0))::numeric", quote_ident(price)))
        .unwrap_or_else(|| "NULL::numeric".to_string());
    format!(
        "SELECT COUNT(*)::bigint, \
         COUNT(*) FILTER (WHERE {threshold} IS NOT NULL AND COALESCE({qty}, 0) <= {threshold})::bigint, \
         {value} FROM {table}",
        table = schema.table_sql(),
    )
}

/// Item count, how many are at or below threshold, and the stock value
///
/// # Errors
///
/// Returns `DbError` if the query fails.
pub fn kpi(executor: &dyn DbExecutor, schema: &ItemSchema) -> Result<WarehouseKpi, DbError> {
    let row = executor.query_one(&kpi_sql(schema), &[])?;
    Ok(WarehouseKpi {
        items: row.try_get(0)?,
        below_threshold: row.try_get(1)?,
        total_value: row.try_get(2)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_parse() {
        let filter = MovementFilter::parse(Some("12"), Some("01/03/2024"), Some("2024-03-31"))
            .expect("valid filter");
        assert_eq!(filter.item_id, Some(12));
        assert_eq!(filter.from, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(filter.to, NaiveDate::from_ymd_opt(2024, 3, 31));

        let empty = MovementFilter::parse(Some(""), None, Some(" ")).expect("blank is absent");
        assert_eq!(empty, MovementFilter::default());
    }

    #[test]
    fn test_filter_rejects_bad_input() {
        assert!(MovementFilter::parse(Some("abc"), None, None).is_err());
        assert!(MovementFilter::parse(None, Some("2024-04-02"), Some("2024-04-01")).is_err());
    }

    #[test]
    fn test_unfiltered_query_only_binds_limit() {
        let (sql, values) = movement_query(&MovementFilter::default(), 500).build(PostgresQueryBuilder);
        assert!(sql.starts_with("SELECT \"id\", \"articolo_id\""));
        assert!(sql.contains("FROM \"magazzino_movimenti\""));
        assert!(sql.contains("ORDER BY \"created_at\" DESC, \"id\" DESC"));
        assert!(!sql.contains("WHERE"));
        assert_eq!(values.iter().count(), 1);
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let filter = MovementFilter {
            item_id: Some(3),
            from: NaiveDate::from_ymd_opt(2024, 3, 1),
            to: NaiveDate::from_ymd_opt(2024, 3, 31),
        };
        let (sql, values) = movement_query(&filter, 500).build(PostgresQueryBuilder);
        assert!(sql.contains("\"created_at\" >="));
        assert!(sql.contains("\"created_at\" <"));
        let bound: Vec<String> = values.iter().map(|v| format!("{v:?}")).collect();
        assert!(bound.iter().any(|v| v.contains("2024-04-01")), "{bound:?}");
        assert_eq!(bound.len(), 4);
    }

    #[test]
    fn test_kpi_wire_shape() {
        let kpi = WarehouseKpi {
            items: 7,
            below_threshold: 2,
            total_value: Some(Decimal::new(15050, 2)),
        };
        let json = serde_json::to_value(kpi).expect("json");
        assert_eq!(
            json,
            serde_json::json!({ "articoli": 7, "sottoSoglia": 2, "valoreTotale": 150.5 })
        );

        let unpriced = WarehouseKpi { total_value: None, ..kpi };
        assert!(serde_json::to_value(unpriced).expect("json")["valoreTotale"].is_null());
    }

    #[test]
    fn test_kpi_values_stock_only_with_a_price_column() {
        let mut schema = ItemSchema {
            table: "Magazzino".into(),
            id_column: "ID".into(),
            name_column: "NomeArticolo".into(),
            quantity_column: "Giacenza".into(),
            threshold_column: "SogliaMinima".into(),
            category_column: None,
            supplier_column: None,
            note_column: None,
            price_column: None,
            updated_at_column: None,
        };
        assert!(kpi_sql(&schema).contains("NULL::numeric FROM \"Magazzino\""));

        schema.price_column = Some("PrezzoUnitario".into());
        assert!(kpi_sql(&schema)
            .contains("SUM(COALESCE(\"Giacenza\", 0) * COALESCE(\"PrezzoUnitario\", 0))::numeric"));
    }
}
