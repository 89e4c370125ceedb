//! Employees (`dipendenti`). Passwords are stored as a SHA-256 digest and
//! never leave the database.

use crate::error::ServiceError;
use crate::executor::{DbError, DbExecutor};
use crate::wire::{max_len, non_blank, required};
use may_postgres::Row;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Employee {
    pub id: i64,
    #[serde(rename = "nomeCompleto")]
    pub full_name: String,
    pub username: String,
    #[serde(rename = "mansione")]
    pub role: Option<String>,
    #[serde(rename = "cellulare")]
    pub phone: Option<String>,
}

/// `POST /dipendenti` body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewEmployee {
    #[serde(rename = "nomeCompleto", default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(rename = "mansione", default)]
    pub role: Option<String>,
    #[serde(rename = "cellulare", default)]
    pub phone: Option<String>,
}

const MISSING_FIELDS: &str = "Nome, username e password sono obbligatori.";

impl NewEmployee {
    /// # Errors
    ///
    /// `InvalidArgument` when name, username or password is missing.
    pub fn validate(self) -> Result<Self, ServiceError> {
        let full_name = required(self.full_name, MISSING_FIELDS)?;
        let username = required(self.username, MISSING_FIELDS)?;
        // Passwords are taken verbatim, surrounding spaces included
        let password = self
            .password
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ServiceError::invalid(MISSING_FIELDS))?;
        Ok(Self {
            full_name: max_len(Some(full_name), 255, "nomeCompleto")?,
            username: max_len(Some(username), 80, "username")?,
            password: Some(password),
            role: max_len(non_blank(self.role), 120, "mansione")?,
            phone: max_len(non_blank(self.phone), 40, "cellulare")?,
        })
    }
}

/// Hex SHA-256 of `username:password`
pub fn password_digest(username: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(username.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn employee_from_row(row: &Row) -> Result<Employee, DbError> {
    Ok(Employee {
        id: row.try_get(0)?,
        full_name: row.try_get(1)?,
        username: row.try_get(2)?,
        role: row.try_get(3)?,
        phone: row.try_get(4)?,
    })
}

const EMPLOYEE_COLUMNS: &str = "id, nome_completo, username, mansione, cellulare";

/// # Errors
///
/// Returns `DbError` if the query fails.
pub fn list_employees(executor: &dyn DbExecutor) -> Result<Vec<Employee>, DbError> {
    let sql = format!("SELECT {EMPLOYEE_COLUMNS} FROM dipendenti ORDER BY nome_completo, id");
    executor.query_all(&sql, &[])?.iter().map(employee_from_row).collect()
}

/// Ids among `ids` that have no employee row
///
/// # Errors
///
/// Returns `DbError` if the query fails.
pub fn missing_employees(executor: &dyn DbExecutor, ids: &[i64]) -> Result<Vec<i64>, DbError> {
    let wanted = ids.to_vec();
    let rows = executor.query_all("SELECT id FROM dipendenti WHERE id = ANY($1)", &[&wanted])?;
    let found = rows
        .iter()
        .map(|r| r.try_get::<_, i64>(0))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids.iter().copied().filter(|id| !found.contains(id)).collect())
}

/// Insert an employee
///
/// # Errors
///
/// `Conflict` when the username is already taken.
pub fn create_employee(executor: &dyn DbExecutor, employee: &NewEmployee) -> Result<Employee, ServiceError> {
    let username = employee.username.clone().unwrap_or_default();
    let digest = password_digest(&username, employee.password.as_deref().unwrap_or_default());
    let sql = format!(
        "INSERT INTO dipendenti (nome_completo, username, password_hash, mansione, cellulare) \
         VALUES ($1, $2, $3, $4, $5) ON CONFLICT (username) DO NOTHING RETURNING {EMPLOYEE_COLUMNS}"
    );
    let row = executor
        .query_opt(
            &sql,
            &[&employee.full_name, &username, &digest, &employee.role, &employee.phone],
        )?
        .ok_or_else(|| ServiceError::Conflict("Questo username è già stato preso.".to_string()))?;
    let created = employee_from_row(&row)?;
    log::info!("created employee {} ({})", created.id, created.username);
    Ok(created)
}
