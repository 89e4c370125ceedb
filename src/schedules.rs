//! Site schedules (`pianificazioni`): which employees work on which site on a
//! given day.
//!
//! A schedule is unique per (site, day) and an employee may be assigned to at
//! most one site per day. Assigning somebody already on another site that day
//! is reported as a conflict and skipped; assigning twice is a no-op reported
//! as a duplicate.

use crate::employees::missing_employees;
use crate::error::ServiceError;
use crate::executor::{DbError, DbExecutor};
use crate::sites::site_exists;
use crate::wire::{id_opt, non_blank, parse_date};
use chrono::NaiveDate;
use may_postgres::Row;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `POST /pianificazioni` body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleRequest {
    #[serde(rename = "cantiereId", default, deserialize_with = "id_opt")]
    pub site_id: Option<i64>,
    #[serde(rename = "data", default)]
    pub date: Option<String>,
    /// One id or a list; numbers or numeric strings
    #[serde(rename = "dipendenti", alias = "dipendenteId", default)]
    pub employees: Option<Value>,
}

/// A checked assignment request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub site_id: i64,
    pub date: NaiveDate,
    pub employees: Vec<i64>,
}

fn employee_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|id| *id > 0)
}

/// Deduplicated ids from one id or a list
fn employee_list(value: Option<Value>) -> Result<Vec<i64>, ServiceError> {
    let raw = match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(single) => vec![single],
    };
    let mut employees = Vec::with_capacity(raw.len());
    for value in &raw {
        let id = employee_id(value)
            .ok_or_else(|| ServiceError::invalid(format!("Dipendente non valido: {value}")))?;
        if !employees.contains(&id) {
            employees.push(id);
        }
    }
    Ok(employees)
}

impl ScheduleRequest {
    /// # Errors
    ///
    /// `InvalidArgument` for a missing site or date, or an employee id that
    /// is not a positive integer.
    pub fn validate(self) -> Result<Assignment, ServiceError> {
        let missing = || ServiceError::invalid("Parametri mancanti o non validi (cantiereId, data).");
        let site_id = self.site_id.filter(|id| *id > 0).ok_or_else(missing)?;
        let date = non_blank(self.date).ok_or_else(missing)?;
        let date = parse_date(&date)?;
        Ok(Assignment {
            site_id,
            date,
            employees: employee_list(self.employees)?,
        })
    }
}

/// `PATCH /pianificazioni/{id}/assegna` body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddEmployeesRequest {
    #[serde(rename = "dipendenti", alias = "dipendenteId", default)]
    pub employees: Option<Value>,
}

impl AddEmployeesRequest {
    /// # Errors
    ///
    /// `InvalidArgument` for an empty list or a bad id.
    pub fn validate(self) -> Result<Vec<i64>, ServiceError> {
        let employees = employee_list(self.employees)?;
        if employees.is_empty() {
            return Err(ServiceError::invalid("Parametri mancanti o non validi (dipendenti)."));
        }
        Ok(employees)
    }
}

/// `PATCH /pianificazioni/{id}/move` body; absent fields keep their value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MoveRequest {
    #[serde(rename = "cantiereId", default, deserialize_with = "id_opt")]
    pub site_id: Option<i64>,
    #[serde(rename = "data", default)]
    pub date: Option<String>,
}

/// Where a schedule should end up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleMove {
    pub site_id: Option<i64>,
    pub date: Option<NaiveDate>,
}

impl MoveRequest {
    /// # Errors
    ///
    /// `InvalidArgument` for a non-positive site id or a bad date.
    pub fn validate(self) -> Result<ScheduleMove, ServiceError> {
        let site_id = match self.site_id {
            Some(id) if id <= 0 => return Err(ServiceError::invalid("cantiereId non valido")),
            other => other,
        };
        let date = non_blank(self.date).as_deref().map(parse_date).transpose()?;
        Ok(ScheduleMove { site_id, date })
    }
}

/// An employee already on another site that day
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleConflict {
    #[serde(rename = "dipendenteId")]
    pub employee_id: i64,
    #[serde(rename = "pianificazioneId")]
    pub schedule_id: i64,
    #[serde(rename = "cantiereId")]
    pub site_id: i64,
}

/// Outcome of an assignment request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentReport {
    #[serde(rename = "pianificazioneId")]
    pub schedule_id: i64,
    #[serde(rename = "cantiereId")]
    pub site_id: i64,
    #[serde(rename = "data")]
    pub date: NaiveDate,
    pub assigned: Vec<i64>,
    pub duplicates: Vec<i64>,
    pub conflicts: Vec<ScheduleConflict>,
}

fn find_or_create_schedule(tx: &dyn DbExecutor, site_id: i64, date: NaiveDate) -> Result<i64, DbError> {
    let inserted = tx.query_opt(
        "INSERT INTO pianificazioni (cantiere_id, data) VALUES ($1, $2) \
         ON CONFLICT (cantiere_id, data) DO NOTHING RETURNING id",
        &[&site_id, &date],
    )?;
    let row = match inserted {
        Some(row) => row,
        None => tx.query_one(
            "SELECT id FROM pianificazioni WHERE cantiere_id = $1 AND data = $2",
            &[&site_id, &date],
        )?,
    };
    Ok(row.try_get(0)?)
}

/// Another schedule holding `employee` on `date`, at a site other than
/// `site_id`; `ignore` is left out of the search.
fn conflicting_schedule(
    tx: &dyn DbExecutor,
    employee: i64,
    date: NaiveDate,
    site_id: i64,
    ignore: Option<i64>,
) -> Result<Option<ScheduleConflict>, DbError> {
    let row = tx.query_opt(
        "SELECT p.id, p.cantiere_id FROM pianificazioni p \
         JOIN pianificazione_dipendenti pd ON pd.pianificazione_id = p.id \
         WHERE pd.dipendente_id = $1 AND p.data = $2 AND p.cantiere_id <> $3 \
           AND ($4::bigint IS NULL OR p.id <> $4) \
         ORDER BY p.id LIMIT 1",
        &[&employee, &date, &site_id, &ignore],
    )?;
    match row {
        Some(row) => Ok(Some(ScheduleConflict {
            employee_id: employee,
            schedule_id: row.try_get(0)?,
            site_id: row.try_get(1)?,
        })),
        None => Ok(None),
    }
}

fn require_employees(tx: &dyn DbExecutor, employees: &[i64]) -> Result<(), ServiceError> {
    let unknown = missing_employees(tx, employees)?;
    if !unknown.is_empty() {
        return Err(ServiceError::NotFound(format!("Dipendenti non trovati: {unknown:?}")));
    }
    Ok(())
}

fn require_site(tx: &dyn DbExecutor, site_id: i64) -> Result<(), ServiceError> {
    if !site_exists(tx, site_id)? {
        return Err(ServiceError::NotFound(format!("Cantiere {site_id} non trovato")));
    }
    Ok(())
}

/// Put each employee on the schedule unless they are already on it or on
/// another site that day
fn assign_employees(
    tx: &dyn DbExecutor,
    schedule_id: i64,
    site_id: i64,
    date: NaiveDate,
    employees: &[i64],
) -> Result<AssignmentReport, ServiceError> {
    let mut report = AssignmentReport {
        schedule_id,
        site_id,
        date,
        assigned: Vec::new(),
        duplicates: Vec::new(),
        conflicts: Vec::new(),
    };

    for employee in employees {
        if let Some(conflict) = conflicting_schedule(tx, *employee, date, site_id, None)? {
            report.conflicts.push(conflict);
            continue;
        }
        let inserted = tx.execute(
            "INSERT INTO pianificazione_dipendenti (pianificazione_id, dipendente_id) \
             VALUES ($1, $2) ON CONFLICT (pianificazione_id, dipendente_id) DO NOTHING",
            &[&schedule_id, employee],
        )?;
        if inserted == 0 {
            report.duplicates.push(*employee);
        } else {
            report.assigned.push(*employee);
        }
    }

    log::info!(
        "schedule {schedule_id} (site {site_id}, {date}): {} assigned, {} duplicate, {} conflict",
        report.assigned.len(),
        report.duplicates.len(),
        report.conflicts.len()
    );
    Ok(report)
}

/// Find or create the (site, day) schedule and assign every employee.
/// Run it inside a transaction.
///
/// # Errors
///
/// `NotFound` for an unknown site or employee; nothing is written then.
pub fn assign(tx: &dyn DbExecutor, assignment: &Assignment) -> Result<AssignmentReport, ServiceError> {
    require_site(tx, assignment.site_id)?;
    require_employees(tx, &assignment.employees)?;
    let schedule_id = find_or_create_schedule(tx, assignment.site_id, assignment.date)?;
    assign_employees(
        tx,
        schedule_id,
        assignment.site_id,
        assignment.date,
        &assignment.employees,
    )
}

/// Lock a schedule and read its site and day
fn lock_schedule(tx: &dyn DbExecutor, schedule_id: i64) -> Result<(i64, NaiveDate), ServiceError> {
    let row = tx
        .query_opt(
            "SELECT cantiere_id, data FROM pianificazioni WHERE id = $1 FOR UPDATE",
            &[&schedule_id],
        )?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("Pianificazione {schedule_id} non trovata"))
        })?;
    let site_id: i64 = row.try_get(0).map_err(DbError::from)?;
    let date: NaiveDate = row.try_get(1).map_err(DbError::from)?;
    Ok((site_id, date))
}

/// Add employees to an existing schedule, with the same guards as [`assign`].
/// Run it inside a transaction.
///
/// # Errors
///
/// `NotFound` for an unknown schedule or employee.
pub fn add_to_schedule(
    tx: &dyn DbExecutor,
    schedule_id: i64,
    employees: &[i64],
) -> Result<AssignmentReport, ServiceError> {
    let (site_id, date) = lock_schedule(tx, schedule_id)?;
    require_employees(tx, employees)?;
    assign_employees(tx, schedule_id, site_id, date, employees)
}

/// Outcome of moving a schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveReport {
    pub from: i64,
    pub to: i64,
    /// Employees now on the target schedule
    pub moved: Vec<i64>,
    /// Employees the target already had
    pub skipped: Vec<i64>,
    /// Employees busy elsewhere on the target day; they stay on the source
    pub conflicts: Vec<ScheduleConflict>,
    #[serde(rename = "sourceDeleted")]
    pub source_deleted: bool,
}

/// Move a schedule to another site and/or day, merging into the target
/// schedule when one exists. The source is deleted once it has no employees
/// left. Run it inside a transaction.
///
/// # Errors
///
/// `NotFound` for an unknown schedule or target site.
pub fn move_schedule(
    tx: &dyn DbExecutor,
    schedule_id: i64,
    target: &ScheduleMove,
) -> Result<MoveReport, ServiceError> {
    let (current_site, current_date) = lock_schedule(tx, schedule_id)?;
    let site_id = target.site_id.unwrap_or(current_site);
    let date = target.date.unwrap_or(current_date);

    let mut report = MoveReport {
        from: schedule_id,
        to: schedule_id,
        moved: Vec::new(),
        skipped: Vec::new(),
        conflicts: Vec::new(),
        source_deleted: false,
    };
    if site_id == current_site && date == current_date {
        return Ok(report);
    }
    if site_id != current_site {
        require_site(tx, site_id)?;
    }

    let target_id = find_or_create_schedule(tx, site_id, date)?;
    report.to = target_id;

    let rows = tx.query_all(
        "SELECT dipendente_id FROM pianificazione_dipendenti \
         WHERE pianificazione_id = $1 ORDER BY dipendente_id",
        &[&schedule_id],
    )?;

    for row in &rows {
        let employee: i64 = row.try_get(0).map_err(DbError::from)?;
        if let Some(conflict) =
            conflicting_schedule(tx, employee, date, site_id, Some(schedule_id))?
        {
            report.conflicts.push(conflict);
            continue;
        }
        let inserted = tx.execute(
            "INSERT INTO pianificazione_dipendenti (pianificazione_id, dipendente_id) \
             VALUES ($1, $2) ON CONFLICT (pianificazione_id, dipendente_id) DO NOTHING",
            &[&target_id, &employee],
        )?;
        tx.execute(
            "DELETE FROM pianificazione_dipendenti \
             WHERE pianificazione_id = $1 AND dipendente_id = $2",
            &[&schedule_id, &employee],
        )?;
        if inserted == 0 {
            report.skipped.push(employee);
        } else {
            report.moved.push(employee);
        }
    }

    report.source_deleted = tx.execute(
        "DELETE FROM pianificazioni p WHERE p.id = $1 AND NOT EXISTS \
         (SELECT 1 FROM pianificazione_dipendenti pd WHERE pd.pianificazione_id = p.id)",
        &[&schedule_id],
    )? == 1;

    log::info!(
        "schedule {schedule_id} moved to {target_id} (site {site_id}, {date}): \
         {} moved, {} already there, {} conflict",
        report.moved.len(),
        report.skipped.len(),
        report.conflicts.len()
    );
    Ok(report)
}

/// Employee on a schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledEmployee {
    pub id: i64,
    #[serde(rename = "nomeCompleto")]
    pub full_name: Option<String>,
}

/// A schedule with its employees
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schedule {
    pub id: i64,
    #[serde(rename = "cantiereId")]
    pub site_id: i64,
    #[serde(rename = "nomeCantiere")]
    pub site_name: Option<String>,
    #[serde(rename = "data")]
    pub date: NaiveDate,
    #[serde(rename = "dataIt")]
    pub date_it: String,
    #[serde(rename = "dipendenti")]
    pub employees: Vec<ScheduledEmployee>,
}

/// One row of the schedule join, before grouping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRow {
    pub schedule_id: i64,
    pub site_id: i64,
    pub site_name: Option<String>,
    pub date: NaiveDate,
    pub employee_id: Option<i64>,
    pub employee_name: Option<String>,
}

/// Fold join rows into schedules, keeping the row order of first appearance
pub fn group_schedules(rows: Vec<ScheduleRow>) -> Vec<Schedule> {
    let mut schedules: Vec<Schedule> = Vec::new();
    for row in rows {
        let idx = match schedules.iter().position(|s| s.id == row.schedule_id) {
            Some(idx) => idx,
            None => {
                schedules.push(Schedule {
                    id: row.schedule_id,
                    site_id: row.site_id,
                    site_name: row.site_name,
                    date: row.date,
                    date_it: row.date.format("%d/%m/%Y").to_string(),
                    employees: Vec::new(),
                });
                schedules.len() - 1
            }
        };
        if let Some(id) = row.employee_id {
            schedules[idx].employees.push(ScheduledEmployee {
                id,
                full_name: row.employee_name,
            });
        }
    }
    schedules
}

fn schedule_row(row: &Row) -> Result<ScheduleRow, DbError> {
    Ok(ScheduleRow {
        schedule_id: row.try_get(0)?,
        site_id: row.try_get(1)?,
        site_name: row.try_get(2)?,
        date: row.try_get(3)?,
        employee_id: row.try_get(4)?,
        employee_name: row.try_get(5)?,
    })
}

/// Every schedule, latest day first
///
/// # Errors
///
/// Returns `DbError` if the query fails.
pub fn list_schedules(executor: &dyn DbExecutor) -> Result<Vec<Schedule>, DbError> {
    let rows = executor.query_all(
        "SELECT p.id, p.cantiere_id, c.nome, p.data, pd.dipendente_id, d.nome_completo \
         FROM pianificazioni p \
         LEFT JOIN cantieri c ON c.id = p.cantiere_id \
         LEFT JOIN pianificazione_dipendenti pd ON pd.pianificazione_id = p.id \
         LEFT JOIN dipendenti d ON d.id = pd.dipendente_id \
         ORDER BY p.data DESC, p.id DESC, d.nome_completo",
        &[],
    )?;
    let rows = rows.iter().map(schedule_row).collect::<Result<Vec<_>, _>>()?;
    Ok(group_schedules(rows))
}

/// `GET /pianificazioni/calendar` query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalendarRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl CalendarRange {
    /// # Errors
    ///
    /// `InvalidArgument` for a bad date or `start` after `end`.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self, ServiceError> {
        let date = |raw: Option<&str>| {
            raw.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(parse_date)
                .transpose()
        };
        let range = Self {
            start: date(start)?,
            end: date(end)?,
        };
        if let (Some(start), Some(end)) = (range.start, range.end) {
            if start > end {
                return Err(ServiceError::invalid("start successivo a end"));
            }
        }
        Ok(range)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CalendarProps {
    #[serde(rename = "idCantiere")]
    pub site_id: i64,
}

/// One all-day event per schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarEvent {
    pub id: i64,
    pub title: String,
    pub start: NaiveDate,
    #[serde(rename = "allDay")]
    pub all_day: bool,
    pub editable: bool,
    #[serde(rename = "extendedProps")]
    pub extended_props: CalendarProps,
}

/// Title is the site name followed by the employee names
pub fn calendar_events(schedules: Vec<Schedule>) -> Vec<CalendarEvent> {
    schedules
        .into_iter()
        .map(|schedule| {
            let names: Vec<&str> = schedule
                .employees
                .iter()
                .filter_map(|e| e.full_name.as_deref())
                .collect();
            let site = schedule.site_name.as_deref().unwrap_or("");
            let title = if names.is_empty() {
                site.to_string()
            } else {
                format!("{site} - {}", names.join(", "))
            };
            CalendarEvent {
                id: schedule.id,
                title,
                start: schedule.date,
                all_day: true,
                editable: true,
                extended_props: CalendarProps {
                    site_id: schedule.site_id,
                },
            }
        })
        .collect()
}

/// Schedules in the range as calendar events, earliest day first
///
/// # Errors
///
/// Returns `DbError` if the query fails.
pub fn calendar(executor: &dyn DbExecutor, range: &CalendarRange) -> Result<Vec<CalendarEvent>, DbError> {
    let rows = executor.query_all(
        "SELECT p.id, p.cantiere_id, c.nome, p.data, pd.dipendente_id, d.nome_completo \
         FROM pianificazioni p \
         JOIN cantieri c ON c.id = p.cantiere_id \
         LEFT JOIN pianificazione_dipendenti pd ON pd.pianificazione_id = p.id \
         LEFT JOIN dipendenti d ON d.id = pd.dipendente_id \
         WHERE ($1::date IS NULL OR p.data >= $1) AND ($2::date IS NULL OR p.data <= $2) \
         ORDER BY p.data, p.id, d.nome_completo",
        &[&range.start, &range.end],
    )?;
    let rows = rows.iter().map(schedule_row).collect::<Result<Vec<_>, _>>()?;
    Ok(calendar_events(group_schedules(rows)))
}

/// Remove one employee from a schedule
///
/// # Errors
///
/// `NotFound` if that employee is not on that schedule.
pub fn unassign(executor: &dyn DbExecutor, schedule_id: i64, employee_id: i64) -> Result<(), ServiceError> {
    let removed = executor.execute(
        "DELETE FROM pianificazione_dipendenti WHERE pianificazione_id = $1 AND dipendente_id = $2",
        &[&schedule_id, &employee_id],
    )?;
    if removed == 0 {
        return Err(ServiceError::NotFound(format!(
            "Dipendente {employee_id} non assegnato alla pianificazione {schedule_id}"
        )));
    }
    log::info!("employee {employee_id} removed from schedule {schedule_id}");
    Ok(())
}
