//! Payment deadlines (`scadenze`).

use crate::error::ServiceError;
use crate::executor::{DbError, DbExecutor};
use crate::wire::{decimal_opt, max_len, parse_date, required};
use chrono::{NaiveDate, NaiveDateTime};
use may_postgres::Row;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const STATUS_DUE: &str = "Da Pagare";
pub const STATUS_PAID: &str = "Pagato";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deadline {
    pub id: i64,
    #[serde(rename = "descrizione")]
    pub description: String,
    #[serde(rename = "importo", with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(rename = "dataScadenza")]
    pub due_date: NaiveDate,
    #[serde(rename = "stato")]
    pub status: String,
    #[serde(rename = "createdAt")]
    pub created_at: NaiveDateTime,
}

/// `POST /scadenze` body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewDeadline {
    #[serde(rename = "descrizione", default)]
    pub description: Option<String>,
    #[serde(rename = "importo", default, deserialize_with = "decimal_opt")]
    pub amount: Option<Decimal>,
    #[serde(rename = "dataScadenza", alias = "data", default)]
    pub due_date: Option<String>,
}

/// A checked deadline, ready to insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlineRecord {
    pub description: String,
    pub amount: Decimal,
    pub due_date: NaiveDate,
}

const MISSING_FIELDS: &str = "Descrizione, importo e data di scadenza sono obbligatori.";

impl NewDeadline {
    /// # Errors
    ///
    /// `InvalidArgument` for missing fields, a negative amount or a bad date.
    pub fn validate(self) -> Result<DeadlineRecord, ServiceError> {
        let description = required(self.description, MISSING_FIELDS)?;
        let amount = self.amount.ok_or_else(|| ServiceError::invalid(MISSING_FIELDS))?;
        if amount < Decimal::ZERO {
            return Err(ServiceError::invalid("L'importo non può essere negativo"));
        }
        let due_date = required(self.due_date, MISSING_FIELDS)?;
        Ok(DeadlineRecord {
            description: max_len(Some(description), 255, "descrizione")?.unwrap_or_default(),
            amount: amount.round_dp(2),
            due_date: parse_date(&due_date)?,
        })
    }
}

const DEADLINE_COLUMNS: &str = "id, descrizione, importo, data_scadenza, stato, created_at";

fn deadline_from_row(row: &Row) -> Result<Deadline, DbError> {
    Ok(Deadline {
        id: row.try_get(0)?,
        description: row.try_get(1)?,
        amount: row.try_get(2)?,
        due_date: row.try_get(3)?,
        status: row.try_get(4)?,
        created_at: row.try_get(5)?,
    })
}

/// Deadlines, earliest due date first
///
/// # Errors
///
/// Returns `DbError` if the query fails.
pub fn list_deadlines(executor: &dyn DbExecutor) -> Result<Vec<Deadline>, DbError> {
    let sql = format!("SELECT {DEADLINE_COLUMNS} FROM scadenze ORDER BY data_scadenza, id");
    executor.query_all(&sql, &[])?.iter().map(deadline_from_row).collect()
}

/// # Errors
///
/// Returns `DbError` if the insert fails.
pub fn create_deadline(executor: &dyn DbExecutor, record: &DeadlineRecord) -> Result<Deadline, DbError> {
    let sql = format!(
        "INSERT INTO scadenze (descrizione, importo, data_scadenza, stato) \
         VALUES ($1, $2::numeric, $3, $4) RETURNING {DEADLINE_COLUMNS}"
    );
    let row = executor.query_one(
        &sql,
        &[&record.description, &record.amount, &record.due_date, &STATUS_DUE],
    )?;
    let created = deadline_from_row(&row)?;
    log::info!("created deadline {} due {}", created.id, created.due_date);
    Ok(created)
}

/// Mark a deadline as paid
///
/// # Errors
///
/// `NotFound` for an unknown id.
pub fn mark_paid(executor: &dyn DbExecutor, id: i64) -> Result<(), ServiceError> {
    let updated = executor.execute(
        "UPDATE scadenze SET stato = $1 WHERE id = $2",
        &[&STATUS_PAID, &id],
    )?;
    if updated == 0 {
        return Err(ServiceError::NotFound("Scadenza non trovata".to_string()));
    }
    log::info!("deadline {id} marked as paid");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn new_deadline(json: &str) -> NewDeadline {
        serde_json::from_str(json).expect("valid json")
    }

    #[test]
    fn test_validate_deadline() {
        let record = new_deadline(
            r#"{"descrizione": " Fornitura cemento ", "importo": "1250,456", "data": "31/07/2024"}"#,
        )
        .validate()
        .expect("valid");
        assert_eq!(record.description, "Fornitura cemento");
        assert_eq!(record.amount, Decimal::from_str("1250.46").expect("dec"));
        assert_eq!(record.due_date, NaiveDate::from_ymd_opt(2024, 7, 31).expect("date"));
    }

    #[test]
    fn test_validate_rejects_bad_deadlines() {
        for body in [
            r#"{"importo": 10, "dataScadenza": "2024-07-31"}"#,
            r#"{"descrizione": "x", "dataScadenza": "2024-07-31"}"#,
            r#"{"descrizione": "x", "importo": -1, "dataScadenza": "2024-07-31"}"#,
            r#"{"descrizione": "x", "importo": 1}"#,
            r#"{"descrizione": "x", "importo": 1, "dataScadenza": "domani"}"#,
        ] {
            assert!(new_deadline(body).validate().is_err(), "{body}");
        }
    }

    #[test]
    fn test_zero_amount_is_allowed() {
        let record = new_deadline(r#"{"descrizione": "x", "importo": 0, "dataScadenza": "2024-07-31"}"#)
            .validate()
            .expect("valid");
        assert!(record.amount.is_zero());
    }
}
