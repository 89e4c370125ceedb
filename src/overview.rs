//! Dashboard counters.

use crate::executor::{DbError, DbExecutor};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Overview {
    #[serde(rename = "cantieri")]
    pub sites: i64,
    #[serde(rename = "dipendenti")]
    pub employees: i64,
    /// Schedules dated today, by the database clock
    #[serde(rename = "pianificazioniOggi")]
    pub schedules_today: i64,
}

pub(crate) const OVERVIEW_SQL: &str = "SELECT \
     (SELECT COUNT(*) FROM cantieri)::bigint, \
     (SELECT COUNT(*) FROM dipendenti)::bigint, \
     (SELECT COUNT(*) FROM pianificazioni WHERE data = CURRENT_DATE)::bigint";

/// # Errors
///
/// Returns `DbError` if the query fails.
pub fn overview(executor: &dyn DbExecutor) -> Result<Overview, DbError> {
    let row = executor.query_one(OVERVIEW_SQL, &[])?;
    Ok(Overview {
        sites: row.try_get(0)?,
        employees: row.try_get(1)?,
        schedules_today: row.try_get(2)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overview_counts_todays_schedules_only() {
        assert!(OVERVIEW_SQL.contains("WHERE data = CURRENT_DATE"));
        assert_eq!(OVERVIEW_SQL.matches("::bigint").count(), 3);
    }

    #[test]
    fn test_overview_wire_shape() {
        let json = serde_json::to_value(Overview {
            sites: 3,
            employees: 12,
            schedules_today: 2,
        })
        .expect("json");
        assert_eq!(
            json,
            serde_json::json!({"cantieri": 3, "dipendenti": 12, "pianificazioniOggi": 2})
        );
    }
}
