//! Job sites (`cantieri`).

use crate::error::ServiceError;
use crate::executor::{DbError, DbExecutor};
use crate::wire::{max_len, non_blank, required};
use may_postgres::Row;
use serde::{Deserialize, Serialize};

pub const DEFAULT_STATUS: &str = "In Corso";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Site {
    pub id: i64,
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "indirizzo")]
    pub address: String,
    #[serde(rename = "stato")]
    pub status: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// `POST /cantieri` body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewSite {
    #[serde(rename = "nome", alias = "nomeCantiere", default)]
    pub name: Option<String>,
    #[serde(rename = "indirizzo", alias = "citta", alias = "città", default)]
    pub address: Option<String>,
    #[serde(rename = "stato", default)]
    pub status: Option<String>,
    #[serde(default, alias = "latitudine")]
    pub lat: Option<f64>,
    #[serde(default, alias = "longitudine")]
    pub lon: Option<f64>,
}

impl NewSite {
    /// # Errors
    ///
    /// `InvalidArgument` for a missing name or address, or out-of-range
    /// coordinates.
    pub fn validate(self) -> Result<Self, ServiceError> {
        let name = required(self.name, "Nome e indirizzo del cantiere sono obbligatori")?;
        let address = required(self.address, "Nome e indirizzo del cantiere sono obbligatori")?;
        if let Some(lat) = self.lat {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(ServiceError::invalid(format!("Latitudine fuori intervallo: {lat}")));
            }
        }
        if let Some(lon) = self.lon {
            if !(-180.0..=180.0).contains(&lon) {
                return Err(ServiceError::invalid(format!("Longitudine fuori intervallo: {lon}")));
            }
        }
        Ok(Self {
            name: max_len(Some(name), 255, "nome")?,
            address: max_len(Some(address), 255, "indirizzo")?,
            status: max_len(non_blank(self.status), 40, "stato")?,
            lat: self.lat,
            lon: self.lon,
        })
    }
}

fn site_from_row(row: &Row) -> Result<Site, DbError> {
    Ok(Site {
        id: row.try_get(0)?,
        name: row.try_get(1)?,
        address: row.try_get(2)?,
        status: row.try_get(3)?,
        lat: row.try_get(4)?,
        lon: row.try_get(5)?,
    })
}

const SITE_COLUMNS: &str = "id, nome, indirizzo, stato, lat, lon";

/// # Errors
///
/// Returns `DbError` if the query fails.
pub fn list_sites(executor: &dyn DbExecutor) -> Result<Vec<Site>, DbError> {
    let sql = format!("SELECT {SITE_COLUMNS} FROM cantieri ORDER BY nome, id");
    executor.query_all(&sql, &[])?.iter().map(site_from_row).collect()
}

/// Distinct, non-blank site names in alphabetical order
///
/// # Errors
///
/// Returns `DbError` if the query fails.
pub fn site_names(executor: &dyn DbExecutor) -> Result<Vec<String>, DbError> {
    let rows = executor.query_all(
        "SELECT DISTINCT nome FROM cantieri WHERE btrim(nome) <> '' ORDER BY nome",
        &[],
    )?;
    rows.iter()
        .map(|r| r.try_get::<_, String>(0).map_err(DbError::from))
        .collect()
}

/// Whether a site with `id` exists
///
/// # Errors
///
/// Returns `DbError` if the query fails.
pub fn site_exists(executor: &dyn DbExecutor, id: i64) -> Result<bool, DbError> {
    Ok(executor
        .query_opt("SELECT 1 FROM cantieri WHERE id = $1", &[&id])?
        .is_some())
}

/// # Errors
///
/// Returns `ServiceError::Database` if the insert fails.
pub fn create_site(executor: &dyn DbExecutor, site: &NewSite) -> Result<Site, ServiceError> {
    let status = site.status.clone().unwrap_or_else(|| DEFAULT_STATUS.to_string());
    let sql = format!(
        "INSERT INTO cantieri (nome, indirizzo, stato, lat, lon) VALUES ($1, $2, $3, $4, $5) \
         RETURNING {SITE_COLUMNS}"
    );
    let row = executor.query_one(
        &sql,
        &[&site.name, &site.address, &status, &site.lat, &site.lon],
    )?;
    let created = site_from_row(&row)?;
    log::info!("created site {} ({})", created.id, created.name);
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_site(json: &str) -> NewSite {
        serde_json::from_str(json).expect("valid json")
    }

    #[test]
    fn test_validate_requires_name_and_address() {
        assert!(new_site(r#"{"nome": "Villa Rossi"}"#).validate().is_err());
        assert!(new_site(r#"{"indirizzo": "Via Roma 1"}"#).validate().is_err());
        let ok = new_site(r#"{"nome": " Villa Rossi ", "città": "Bergamo"}"#)
            .validate()
            .expect("valid");
        assert_eq!(ok.name.as_deref(), Some("Villa Rossi"));
        assert_eq!(ok.address.as_deref(), Some("Bergamo"));
        assert_eq!(ok.status, None);
    }

    #[test]
    fn test_validate_coordinates() {
        let base = r#""nome": "A", "indirizzo": "B""#;
        assert!(new_site(&format!("{{{base}, \"lat\": 45.7, \"lon\": 9.6}}"))
            .validate()
            .is_ok());
        assert!(new_site(&format!("{{{base}, \"lat\": 91}}")).validate().is_err());
        assert!(new_site(&format!("{{{base}, \"lon\": -181}}")).validate().is_err());
    }
}
