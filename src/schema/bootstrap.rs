//! Schema bootstrap
//!
//! Creates the tables this service owns when they are missing. The item table
//! is special: if any known spelling of it already exists it is kept as is,
//! and only the optional descriptive columns are added.

use crate::executor::{DbError, DbExecutor};
use crate::schema::discovery::{
    pick_candidate, Catalog, CATEGORY_ALIASES, NOTE_ALIASES, SUPPLIER_ALIASES, TABLE_ALIASES,
};
use sea_query::{
    ColumnDef, Expr, Index, IndexCreateStatement, PostgresQueryBuilder, Table,
    TableAlterStatement, TableCreateStatement,
};

/// Table created when no item table exists yet
pub const DEFAULT_ITEM_TABLE: &str = "magazzino_articoli";
pub const MOVEMENT_TABLE: &str = "magazzino_movimenti";

/// What a bootstrap run changed
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    pub created_item_table: bool,
    pub added_item_columns: Vec<String>,
}

/// `CREATE TABLE IF NOT EXISTS magazzino_articoli`
pub fn item_table() -> TableCreateStatement {
    Table::create()
        .table(DEFAULT_ITEM_TABLE)
        .if_not_exists()
        .col(ColumnDef::new("id").big_integer().not_null().auto_increment().primary_key())
        .col(ColumnDef::new("nome_articolo").string_len(120).not_null())
        .col(ColumnDef::new("categoria").string_len(80).null())
        .col(ColumnDef::new("quantita").decimal_len(18, 3).not_null().default(0))
        .col(ColumnDef::new("soglia_minima").decimal_len(18, 3).null())
        .col(ColumnDef::new("fornitore").string_len(120).null())
        .col(ColumnDef::new("note").string_len(255).null())
        .col(ColumnDef::new("prezzo_unitario").decimal_len(18, 2).null())
        .col(ColumnDef::new("updated_at").timestamp().null().default(Expr::current_timestamp()))
        .to_owned()
}

/// Append-only movement log. No foreign key: movements outlive their item.
pub fn movement_table() -> TableCreateStatement {
    Table::create()
        .table(MOVEMENT_TABLE)
        .if_not_exists()
        .col(ColumnDef::new("id").big_integer().not_null().auto_increment().primary_key())
        .col(ColumnDef::new("articolo_id").big_integer().not_null())
        .col(ColumnDef::new("tipo").string_len(16).not_null())
        .col(ColumnDef::new("quantita").decimal_len(18, 3).not_null())
        .col(ColumnDef::new("quantita_risultante").decimal_len(18, 3).not_null())
        .col(ColumnDef::new("costo_unitario").decimal_len(18, 4).null())
        .col(ColumnDef::new("cantiere_id").big_integer().null())
        .col(ColumnDef::new("note").string_len(255).null())
        .col(ColumnDef::new("data_movimento").date().null())
        .col(ColumnDef::new("created_at").timestamp().not_null().default(Expr::cust("clock_timestamp()")))
        .to_owned()
}

pub fn site_table() -> TableCreateStatement {
    Table::create()
        .table("cantieri")
        .if_not_exists()
        .col(ColumnDef::new("id").big_integer().not_null().auto_increment().primary_key())
        .col(ColumnDef::new("nome").string_len(255).not_null())
        .col(ColumnDef::new("indirizzo").string_len(255).not_null())
        .col(ColumnDef::new("stato").string_len(40).not_null().default("In Corso"))
        .col(ColumnDef::new("lat").double().null())
        .col(ColumnDef::new("lon").double().null())
        .to_owned()
}

pub fn employee_table() -> TableCreateStatement {
    Table::create()
        .table("dipendenti")
        .if_not_exists()
        .col(ColumnDef::new("id").big_integer().not_null().auto_increment().primary_key())
        .col(ColumnDef::new("nome_completo").string_len(255).not_null())
        .col(ColumnDef::new("username").string_len(80).not_null().unique_key())
        .col(ColumnDef::new("password_hash").string_len(64).not_null())
        .col(ColumnDef::new("mansione").string_len(120).null())
        .col(ColumnDef::new("cellulare").string_len(40).null())
        .to_owned()
}

pub fn hours_table() -> TableCreateStatement {
    Table::create()
        .table("ore_lavorate")
        .if_not_exists()
        .col(ColumnDef::new("id").big_integer().not_null().auto_increment().primary_key())
        .col(ColumnDef::new("dipendente_id").big_integer().not_null())
        .col(ColumnDef::new("cantiere_id").big_integer().not_null())
        .col(ColumnDef::new("data").date().not_null())
        .col(ColumnDef::new("ora_inizio").time().not_null())
        .col(ColumnDef::new("ora_fine").time().not_null())
        .col(ColumnDef::new("note").string_len(255).null())
        .to_owned()
}

pub fn schedule_table() -> TableCreateStatement {
    Table::create()
        .table("pianificazioni")
        .if_not_exists()
        .col(ColumnDef::new("id").big_integer().not_null().auto_increment().primary_key())
        .col(ColumnDef::new("cantiere_id").big_integer().not_null())
        .col(ColumnDef::new("data").date().not_null())
        .col(ColumnDef::new("created_at").timestamp().not_null().default(Expr::current_timestamp()))
        .to_owned()
}

pub fn assignment_table() -> TableCreateStatement {
    Table::create()
        .table("pianificazione_dipendenti")
        .if_not_exists()
        .col(ColumnDef::new("id").big_integer().not_null().auto_increment().primary_key())
        .col(ColumnDef::new("pianificazione_id").big_integer().not_null())
        .col(ColumnDef::new("dipendente_id").big_integer().not_null())
        .to_owned()
}

pub fn deadline_table() -> TableCreateStatement {
    Table::create()
        .table("scadenze")
        .if_not_exists()
        .col(ColumnDef::new("id").big_integer().not_null().auto_increment().primary_key())
        .col(ColumnDef::new("descrizione").string_len(255).not_null())
        .col(ColumnDef::new("importo").decimal_len(18, 2).not_null())
        .col(ColumnDef::new("data_scadenza").date().not_null())
        .col(ColumnDef::new("stato").string_len(20).not_null().default("Da Pagare"))
        .col(ColumnDef::new("created_at").timestamp().not_null().default(Expr::current_timestamp()))
        .to_owned()
}

fn indexes() -> Vec<IndexCreateStatement> {
    vec![
        Index::create()
            .name("idx_mov_articolo")
            .table(MOVEMENT_TABLE)
            .col(Expr::col("articolo_id"))
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("idx_mov_created")
            .table(MOVEMENT_TABLE)
            .col(Expr::col("created_at"))
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("uniq_pianif_cant_data")
            .table("pianificazioni")
            .col(Expr::col("cantiere_id"))
            .col(Expr::col("data"))
            .unique()
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("uniq_piano_dip")
            .table("pianificazione_dipendenti")
            .col(Expr::col("pianificazione_id"))
            .col(Expr::col("dipendente_id"))
            .unique()
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("idx_ore_dipendente_data")
            .table("ore_lavorate")
            .col(Expr::col("dipendente_id"))
            .col(Expr::col("data"))
            .if_not_exists()
            .to_owned(),
    ]
}

/// Descriptive item columns to add to an existing legacy item table
fn missing_item_columns(catalog: &Catalog, table: &str) -> Vec<(TableAlterStatement, &'static str)> {
    let columns = catalog.columns(table);
    let mut alters = Vec::new();
    let wanted: [(&[&str], &'static str, u32); 3] = [
        (CATEGORY_ALIASES, "categoria", 80),
        (SUPPLIER_ALIASES, "fornitore", 120),
        (NOTE_ALIASES, "note", 255),
    ];
    for (aliases, name, len) in wanted {
        if pick_candidate(aliases, columns).is_none() {
            let alter = Table::alter()
                .table(table.to_string())
                .add_column_if_not_exists(ColumnDef::new(name).string_len(len).null())
                .to_owned();
            alters.push((alter, name));
        }
    }
    alters
}

/// Create missing tables and indexes
///
/// # Errors
///
/// Returns `DbError` if the catalog cannot be read or any DDL statement fails.
pub fn bootstrap_schema(executor: &dyn DbExecutor) -> Result<BootstrapReport, DbError> {
    let catalog = Catalog::load(executor)?;
    let mut report = BootstrapReport::default();

    match catalog.find_table(TABLE_ALIASES) {
        Some(existing) => {
            for (alter, name) in missing_item_columns(&catalog, existing) {
                executor.execute(&alter.build(PostgresQueryBuilder), &[])?;
                report.added_item_columns.push(name.to_string());
            }
        }
        None => {
            executor.execute(&item_table().build(PostgresQueryBuilder), &[])?;
            report.created_item_table = true;
        }
    }

    let owned = [
        movement_table(),
        site_table(),
        employee_table(),
        hours_table(),
        schedule_table(),
        assignment_table(),
        deadline_table(),
    ];
    for table in owned {
        executor.execute(&table.build(PostgresQueryBuilder), &[])?;
    }
    for index in indexes() {
        executor.execute(&index.build(PostgresQueryBuilder), &[])?;
    }

    log::info!(
        "schema bootstrap done (item table created: {}, columns added: {:?})",
        report.created_item_table,
        report.added_item_columns
    );
    Ok(report)
}
