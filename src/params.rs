//! Binding `sea-query` values to `may_postgres` parameters.
//!
//! `sea-query` renders `$n` placeholders and hands back the values as a
//! `Values` list. The driver wants `&[&dyn ToSql]`, so the values are first
//! copied into owned parameters and then borrowed for the duration of the
//! call.

use crate::executor::DbError;
use may_postgres::types::ToSql;
use sea_query::{Value, Values};

#[derive(Debug, Clone, PartialEq)]
enum Param {
    Bool(bool),
    Int(i32),
    BigInt(i64),
    Double(f64),
    Text(String),
}

impl Param {
    fn from_value(value: &Value) -> Result<Self, DbError> {
        let param = match value {
            Value::Bool(Some(b)) => Param::Bool(*b),
            Value::TinyInt(Some(i)) => Param::Int(i32::from(*i)),
            Value::SmallInt(Some(i)) => Param::Int(i32::from(*i)),
            Value::Int(Some(i)) => Param::Int(*i),
            Value::BigInt(Some(i)) => Param::BigInt(*i),
            Value::Unsigned(Some(u)) => Param::BigInt(i64::from(*u)),
            Value::BigUnsigned(Some(u)) => Param::BigInt(i64::try_from(*u).map_err(|_| {
                DbError::Other(format!("value {u} exceeds i64::MAX and cannot be bound"))
            })?),
            Value::Double(Some(d)) => Param::Double(*d),
            Value::String(Some(s)) => Param::Text(s.to_string()),
            other => {
                return Err(DbError::Other(format!(
                    "unsupported value type in query: {other:?}"
                )))
            }
        };
        Ok(param)
    }

    fn as_sql(&self) -> &dyn ToSql {
        match self {
            Param::Bool(b) => b,
            Param::Int(i) => i,
            Param::BigInt(i) => i,
            Param::Double(d) => d,
            Param::Text(s) => s,
        }
    }
}

/// Convert `values` and run `f` with the borrowed parameters
///
/// # Errors
///
/// Returns `DbError::Other` for a value type this crate never binds (nulls
/// included), otherwise whatever `f` returns.
pub fn with_converted_params<F, R>(values: &Values, f: F) -> Result<R, DbError>
where
    F: FnOnce(&[&dyn ToSql]) -> Result<R, DbError>,
{
    let owned = values
        .iter()
        .map(Param::from_value)
        .collect::<Result<Vec<_>, _>>()?;
    let params: Vec<&dyn ToSql> = owned.iter().map(Param::as_sql).collect();
    f(&params)
}
