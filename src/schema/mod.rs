//! Database schema: bootstrap of the tables this service owns, and discovery
//! of the warehouse item table whose physical shape varies per deployment.

pub mod bootstrap;
pub mod discovery;

pub use bootstrap::bootstrap_schema;
pub use discovery::{pick_candidate, resolve_item_schema, Catalog, ItemSchema};

/// Quote an SQL identifier for PostgreSQL, doubling embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_plain() {
        assert_eq!(quote_ident("quantita"), "\"quantita\"");
        assert_eq!(quote_ident("SogliaMinima"), "\"SogliaMinima\"");
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
