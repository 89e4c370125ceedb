//! Warehouse item schema discovery
//!
//! Deployments disagree on what the item table and its columns are called
//! (`magazzino_articoli.quantita`, `Magazzino.Giacenza`, ...). Discovery reads
//! the information schema once, matches each logical field against an alias
//! list, and produces an [`ItemSchema`] that is handed to the warehouse
//! services at construction time.

use crate::error::ServiceError;
use crate::executor::{DbError, DbExecutor};
use crate::schema::quote_ident;
use std::collections::BTreeMap;

/// Item table candidates, in priority order
pub const TABLE_ALIASES: &[&str] = &["magazzino_articoli", "Magazzino", "Articoli", "Prodotti"];
pub const ID_ALIASES: &[&str] = &["id", "ID", "IdArticolo"];
pub const NAME_ALIASES: &[&str] = &["nome_articolo", "NomeArticolo", "Nome", "Descrizione", "Titolo"];
pub const QUANTITY_ALIASES: &[&str] = &["quantita", "Quantita", "Giacenza", "Qta", "Disponibile"];
pub const THRESHOLD_ALIASES: &[&str] = &["soglia_minima", "SogliaMinima", "ScortaMinima", "Minimo", "Soglia"];
pub const CATEGORY_ALIASES: &[&str] = &["categoria"];
pub const SUPPLIER_ALIASES: &[&str] = &["fornitore"];
pub const NOTE_ALIASES: &[&str] = &["note"];
pub const PRICE_ALIASES: &[&str] = &["prezzo_unitario", "PrezzoUnitario", "CostoUnitario", "Prezzo", "Costo"];
pub const UPDATED_AT_ALIASES: &[&str] = &["updated_at", "TimestampAggiornamento"];

/// Tables and their columns in the current schema
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    tables: BTreeMap<String, Vec<String>>,
}

impl Catalog {
    /// Read every table/column pair of `current_schema()`
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the information schema cannot be queried.
    pub fn load(executor: &dyn DbExecutor) -> Result<Self, DbError> {
        let rows = executor.query_all(
            "SELECT table_name::text, column_name::text \
             FROM information_schema.columns \
             WHERE table_schema = current_schema() \
             ORDER BY table_name, ordinal_position",
            &[],
        )?;
        let pairs = rows
            .iter()
            .map(|r| -> Result<(String, String), DbError> { Ok((r.try_get(0)?, r.try_get(1)?)) })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_pairs(pairs))
    }

    /// Build a catalog from `(table, column)` pairs
    pub fn from_pairs<I, T, C>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (T, C)>,
        T: Into<String>,
        C: Into<String>,
    {
        let mut tables: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (table, column) in pairs {
            tables.entry(table.into()).or_default().push(column.into());
        }
        Self { tables }
    }

    /// Physical name of the first alias that exists; an exact spelling wins
    /// over a case-insensitive one for the same alias.
    pub fn find_table(&self, aliases: &[&str]) -> Option<&str> {
        aliases.iter().find_map(|alias| {
            self.tables
                .get_key_value(*alias)
                .map(|(k, _)| k.as_str())
                .or_else(|| {
                    self.tables
                        .keys()
                        .find(|t| t.eq_ignore_ascii_case(alias))
                        .map(String::as_str)
                })
        })
    }

    /// Columns of `table`, empty if the table is unknown
    pub fn columns(&self, table: &str) -> &[String] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// First alias present in `columns`, compared case-insensitively; returns the
/// physical spelling.
pub fn pick_candidate<'a>(aliases: &[&str], columns: &'a [String]) -> Option<&'a str> {
    aliases.iter().find_map(|alias| {
        columns
            .iter()
            .find(|c| c.as_str() == *alias)
            .or_else(|| columns.iter().find(|c| c.eq_ignore_ascii_case(alias)))
            .map(String::as_str)
    })
}

/// Physical names of the item table and its columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSchema {
    pub table: String,
    pub id_column: String,
    pub name_column: String,
    pub quantity_column: String,
    pub threshold_column: String,
    pub category_column: Option<String>,
    pub supplier_column: Option<String>,
    pub note_column: Option<String>,
    pub price_column: Option<String>,
    pub updated_at_column: Option<String>,
}

impl ItemSchema {
    /// Match the alias lists against a catalog
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` when no candidate table exists or a
    /// required column (id, name, quantity, threshold) is missing.
    pub fn resolve(catalog: &Catalog) -> Result<Self, ServiceError> {
        let table = catalog.find_table(TABLE_ALIASES).ok_or_else(|| {
            ServiceError::NotFound(format!(
                "no warehouse item table found (looked for {})",
                TABLE_ALIASES.join(", ")
            ))
        })?;
        let columns = catalog.columns(table);

        let required = |field: &str, aliases: &[&str]| {
            pick_candidate(aliases, columns).map(str::to_string).ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "table {table} has no {field} column (looked for {})",
                    aliases.join(", ")
                ))
            })
        };
        let optional = |aliases: &[&str]| pick_candidate(aliases, columns).map(str::to_string);

        Ok(Self {
            table: table.to_string(),
            id_column: required("id", ID_ALIASES)?,
            name_column: required("name", NAME_ALIASES)?,
            quantity_column: required("quantity", QUANTITY_ALIASES)?,
            threshold_column: required("threshold", THRESHOLD_ALIASES)?,
            category_column: optional(CATEGORY_ALIASES),
            supplier_column: optional(SUPPLIER_ALIASES),
            note_column: optional(NOTE_ALIASES),
            price_column: optional(PRICE_ALIASES),
            updated_at_column: optional(UPDATED_AT_ALIASES),
        })
    }

    /// Quoted table name
    pub fn table_sql(&self) -> String {
        quote_ident(&self.table)
    }
}

/// Load the catalog and resolve the item schema in one step
///
/// # Errors
///
/// Returns `ServiceError::Database` if the catalog query fails and
/// `ServiceError::NotFound` if nothing matches.
pub fn resolve_item_schema(executor: &dyn DbExecutor) -> Result<ItemSchema, ServiceError> {
    let catalog = Catalog::load(executor)?;
    let schema = ItemSchema::resolve(&catalog)?;
    log::info!(
        "warehouse items resolved to {}({}, {}, {}, {})",
        schema.table,
        schema.id_column,
        schema.name_column,
        schema.quantity_column,
        schema.threshold_column
    );
    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy_catalog() -> Catalog {
        Catalog::from_pairs([
            ("Magazzino", "ID"),
            ("Magazzino", "NomeArticolo"),
            ("Magazzino", "Giacenza"),
            ("Magazzino", "ScortaMinima"),
            ("Magazzino", "Fornitore"),
            ("Magazzino", "CostoUnitario"),
            ("Cantieri", "ID"),
        ])
    }

    #[test]
    fn test_pick_candidate_is_case_insensitive() {
        let cols = vec!["ID".to_string(), "quantita".to_string()];
        assert_eq!(pick_candidate(&["Quantita"], &cols), Some("quantita"));
        assert_eq!(pick_candidate(&["id"], &cols), Some("ID"));
        assert_eq!(pick_candidate(&["Qta"], &cols), None);
    }

    #[test]
    fn test_pick_candidate_respects_alias_order() {
        let cols = vec!["Soglia".to_string(), "soglia_minima".to_string()];
        assert_eq!(pick_candidate(THRESHOLD_ALIASES, &cols), Some("soglia_minima"));
    }

    #[test]
    fn test_resolve_bootstrap_table() {
        let catalog = Catalog::from_pairs([
            ("magazzino_articoli", "id"),
            ("magazzino_articoli", "nome_articolo"),
            ("magazzino_articoli", "categoria"),
            ("magazzino_articoli", "quantita"),
            ("magazzino_articoli", "soglia_minima"),
            ("magazzino_articoli", "fornitore"),
            ("magazzino_articoli", "note"),
            ("magazzino_articoli", "updated_at"),
        ]);
        let schema = ItemSchema::resolve(&catalog).expect("resolves");
        assert_eq!(schema.table, "magazzino_articoli");
        assert_eq!(schema.quantity_column, "quantita");
        assert_eq!(schema.category_column.as_deref(), Some("categoria"));
        assert_eq!(schema.updated_at_column.as_deref(), Some("updated_at"));
        assert_eq!(schema.price_column, None);
    }

    #[test]
    fn test_resolve_legacy_spelling() {
        let schema = ItemSchema::resolve(&legacy_catalog()).expect("resolves");
        assert_eq!(schema.table, "Magazzino");
        assert_eq!(schema.id_column, "ID");
        assert_eq!(schema.name_column, "NomeArticolo");
        assert_eq!(schema.quantity_column, "Giacenza");
        assert_eq!(schema.threshold_column, "ScortaMinima");
        assert_eq!(schema.supplier_column.as_deref(), Some("Fornitore"));
        assert_eq!(schema.price_column.as_deref(), Some("CostoUnitario"));
        assert_eq!(schema.category_column, None);
        assert_eq!(schema.updated_at_column, None);
    }

    #[test]
    fn test_table_priority_follows_alias_order() {
        let catalog = Catalog::from_pairs([
            ("prodotti", "id"),
            ("magazzino", "id"),
        ]);
        assert_eq!(catalog.find_table(TABLE_ALIASES), Some("magazzino"));
    }

    #[test]
    fn test_missing_table_is_not_found() {
        let catalog = Catalog::from_pairs([("Cantieri", "ID")]);
        let err = ItemSchema::resolve(&catalog).unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[test]
    fn test_missing_required_column_is_not_found() {
        let catalog = Catalog::from_pairs([
            ("Articoli", "ID"),
            ("Articoli", "Nome"),
            ("Articoli", "Qta"),
        ]);
        match ItemSchema::resolve(&catalog) {
            Err(ServiceError::NotFound(msg)) => assert!(msg.contains("threshold")),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }
}
