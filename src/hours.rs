//! Work-hours log (`ore_lavorate`) and the per-employee summary.

use crate::error::ServiceError;
use crate::executor::{DbError, DbExecutor};
use crate::wire::{id_opt, max_len, non_blank, parse_date, parse_time};
use chrono::{NaiveDate, NaiveTime};
use may_postgres::types::ToSql;
use may_postgres::Row;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A stored hours entry, with the names it refers to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HoursEntry {
    pub id: i64,
    #[serde(rename = "dipendenteId")]
    pub employee_id: i64,
    #[serde(rename = "dipendente")]
    pub employee_name: Option<String>,
    #[serde(rename = "cantiereId")]
    pub site_id: i64,
    #[serde(rename = "cantiere")]
    pub site_name: Option<String>,
    #[serde(rename = "data")]
    pub date: NaiveDate,
    #[serde(rename = "oraInizio")]
    pub start: NaiveTime,
    #[serde(rename = "oraFine")]
    pub end: NaiveTime,
    #[serde(rename = "ore", with = "rust_decimal::serde::float")]
    pub hours: Decimal,
    pub note: Option<String>,
}

/// `POST /ore` body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewHours {
    #[serde(rename = "dipendenteId", alias = "idDipendente", default, deserialize_with = "id_opt")]
    pub employee_id: Option<i64>,
    #[serde(rename = "cantiereId", alias = "idCantiere", default, deserialize_with = "id_opt")]
    pub site_id: Option<i64>,
    #[serde(rename = "data", default)]
    pub date: Option<String>,
    #[serde(rename = "oraInizio", default)]
    pub start: Option<String>,
    #[serde(rename = "oraFine", default)]
    pub end: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// A checked hours entry, ready to insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoursRecord {
    pub employee_id: i64,
    pub site_id: i64,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub note: Option<String>,
}

const MISSING_FIELDS: &str = "Dipendente, cantiere, data, ora inizio e ora fine sono obbligatori.";

impl NewHours {
    /// # Errors
    ///
    /// `InvalidArgument` for missing fields, bad dates or times, or an end
    /// time not after the start time.
    pub fn validate(self) -> Result<HoursRecord, ServiceError> {
        let employee_id = self.employee_id.filter(|id| *id > 0);
        let site_id = self.site_id.filter(|id| *id > 0);
        let (Some(employee_id), Some(site_id), Some(date), Some(start), Some(end)) = (
            employee_id,
            site_id,
            non_blank(self.date),
            non_blank(self.start),
            non_blank(self.end),
        ) else {
            return Err(ServiceError::invalid(MISSING_FIELDS));
        };
        let start = parse_time(&start)?;
        let end = parse_time(&end)?;
        if end <= start {
            return Err(ServiceError::invalid("L'ora di fine deve seguire l'ora di inizio"));
        }
        Ok(HoursRecord {
            employee_id,
            site_id,
            date: parse_date(&date)?,
            start,
            end,
            note: max_len(non_blank(self.note), 255, "note")?,
        })
    }
}

/// Worked hours between two times, rounded to the hundredth
pub fn worked_hours(start: NaiveTime, end: NaiveTime) -> Decimal {
    let minutes = (end - start).num_minutes().max(0);
    (Decimal::from(minutes) / Decimal::from(60)).round_dp(2)
}

/// Optional filters of the hours list and summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HoursFilter {
    pub employee_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl HoursFilter {
    /// # Errors
    ///
    /// `InvalidArgument` for a non-numeric id or a bad date.
    pub fn parse(
        employee_id: Option<&str>,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<Self, ServiceError> {
        let present = |v: &&str| !v.trim().is_empty();
        Ok(Self {
            employee_id: employee_id
                .filter(present)
                .map(|raw| {
                    raw.trim()
                        .parse::<i64>()
                        .map_err(|_| ServiceError::invalid(format!("dipendenteId non valido: {raw}")))
                })
                .transpose()?,
            from: from.filter(present).map(parse_date).transpose()?,
            to: to.filter(present).map(parse_date).transpose()?,
        })
    }
}

/// Per-employee totals
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmployeeHours {
    #[serde(rename = "dipendenteId")]
    pub employee_id: i64,
    #[serde(rename = "dipendente")]
    pub employee_name: Option<String>,
    #[serde(rename = "registrazioni")]
    pub entries: usize,
    #[serde(rename = "oreTotali", with = "rust_decimal::serde::float")]
    pub total_hours: Decimal,
}

/// Group entries by employee, ordered by employee id
pub fn summarize(entries: &[HoursEntry]) -> Vec<EmployeeHours> {
    let mut by_employee: BTreeMap<i64, EmployeeHours> = BTreeMap::new();
    for entry in entries {
        let total = by_employee
            .entry(entry.employee_id)
            .or_insert_with(|| EmployeeHours {
                employee_id: entry.employee_id,
                employee_name: entry.employee_name.clone(),
                entries: 0,
                total_hours: Decimal::ZERO,
            });
        total.entries += 1;
        total.total_hours += entry.hours;
    }
    by_employee.into_values().collect()
}

fn entry_from_row(row: &Row) -> Result<HoursEntry, DbError> {
    let start: NaiveTime = row.try_get(6)?;
    let end: NaiveTime = row.try_get(7)?;
    Ok(HoursEntry {
        id: row.try_get(0)?,
        employee_id: row.try_get(1)?,
        employee_name: row.try_get(2)?,
        site_id: row.try_get(3)?,
        site_name: row.try_get(4)?,
        date: row.try_get(5)?,
        start,
        end,
        hours: worked_hours(start, end),
        note: row.try_get(8)?,
    })
}

/// Entries matching `filter`, newest day first
///
/// # Errors
///
/// Returns `DbError` if the query fails.
pub fn list_hours(executor: &dyn DbExecutor, filter: &HoursFilter) -> Result<Vec<HoursEntry>, DbError> {
    let mut conditions = Vec::new();
    let mut params: Vec<&dyn ToSql> = Vec::new();
    if let Some(id) = &filter.employee_id {
        params.push(id);
        conditions.push(format!("o.dipendente_id = ${}", params.len()));
    }
    if let Some(from) = &filter.from {
        params.push(from);
        conditions.push(format!("o.data >= ${}", params.len()));
    }
    if let Some(to) = &filter.to {
        params.push(to);
        conditions.push(format!("o.data <= ${}", params.len()));
    }
    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };
    let sql = format!(
        "SELECT o.id, o.dipendente_id, d.nome_completo, o.cantiere_id, c.nome, \
         o.data, o.ora_inizio, o.ora_fine, o.note \
         FROM ore_lavorate o \
         LEFT JOIN dipendenti d ON d.id = o.dipendente_id \
         LEFT JOIN cantieri c ON c.id = o.cantiere_id{where_clause} \
         ORDER BY o.data DESC, o.ora_inizio DESC, o.id DESC"
    );
    executor.query_all(&sql, &params)?.iter().map(entry_from_row).collect()
}

/// # Errors
///
/// Returns `DbError` if the insert fails.
pub fn create_hours(executor: &dyn DbExecutor, record: &HoursRecord) -> Result<i64, DbError> {
    let row = executor.query_one(
        "INSERT INTO ore_lavorate (dipendente_id, cantiere_id, data, ora_inizio, ora_fine, note) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
        &[
            &record.employee_id,
            &record.site_id,
            &record.date,
            &record.start,
            &record.end,
            &record.note,
        ],
    )?;
    let id: i64 = row.try_get(0)?;
    log::info!(
        "logged {}h for employee {} on site {} ({})",
        worked_hours(record.start, record.end),
        record.employee_id,
        record.site_id,
        record.date
    );
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).expect("valid time")
    }

    fn entry(id: i64, employee_id: i64, start: NaiveTime, end: NaiveTime) -> HoursEntry {
        HoursEntry {
            id,
            employee_id,
            employee_name: Some(format!("Dipendente {employee_id}")),
            site_id: 1,
            site_name: None,
            date: NaiveDate::from_ymd_opt(2024, 5, 6).expect("valid date"),
            start,
            end,
            hours: worked_hours(start, end),
            note: None,
        }
    }

    #[test]
    fn test_worked_hours() {
        assert_eq!(worked_hours(time(7, 30), time(12, 0)), Decimal::from_str("4.5").expect("dec"));
        assert_eq!(worked_hours(time(8, 0), time(8, 20)), Decimal::from_str("0.33").expect("dec"));
    }

    #[test]
    fn test_summarize_groups_by_employee() {
        let entries = vec![
            entry(1, 2, time(7, 0), time(12, 0)),
            entry(2, 1, time(8, 0), time(10, 30)),
            entry(3, 2, time(13, 0), time(16, 0)),
        ];
        let summary = summarize(&entries);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].employee_id, 1);
        assert_eq!(summary[0].entries, 1);
        assert_eq!(summary[0].total_hours, Decimal::from_str("2.5").expect("dec"));
        assert_eq!(summary[1].entries, 2);
        assert_eq!(summary[1].total_hours, Decimal::from(8));
    }

    #[test]
    fn test_summarize_empty() {
        assert!(summarize(&[]).is_empty());
    }

    #[test]
    fn test_validate_entry() {
        let raw: NewHours = serde_json::from_str(
            r#"{"idDipendente": "3", "idCantiere": 4, "data": "06/05/2024",
                "oraInizio": "07:30", "oraFine": "16:00"}"#,
        )
        .expect("json");
        let record = raw.validate().expect("valid");
        assert_eq!(record.employee_id, 3);
        assert_eq!(record.site_id, 4);
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2024, 5, 6).expect("date"));
        assert_eq!(record.start, time(7, 30));
    }

    #[test]
    fn test_validate_rejects_bad_entries() {
        for body in [
            r#"{"cantiereId": 4, "data": "2024-05-06", "oraInizio": "07:00", "oraFine": "08:00"}"#,
            r#"{"dipendenteId": 3, "cantiereId": 4, "oraInizio": "07:00", "oraFine": "08:00"}"#,
            r#"{"dipendenteId": 3, "cantiereId": 4, "data": "2024-05-06", "oraInizio": "09:00", "oraFine": "08:00"}"#,
            r#"{"dipendenteId": 3, "cantiereId": 4, "data": "2024-05-06", "oraInizio": "09:00", "oraFine": "09:00"}"#,
            r#"{"dipendenteId": 3, "cantiereId": 4, "data": "2024-05-06", "oraInizio": "nove", "oraFine": "10:00"}"#,
        ] {
            let raw: NewHours = serde_json::from_str(body).expect("json");
            assert!(raw.validate().is_err(), "{body}");
        }
    }

    #[test]
    fn test_filter_parse() {
        let filter = HoursFilter::parse(Some("7"), Some("2024-05-01"), None).expect("valid");
        assert_eq!(filter.employee_id, Some(7));
        assert!(HoursFilter::parse(Some("x"), None, None).is_err());
    }
}
