//! Cantiere server
//!
//! Serves the REST API, or runs the schema tooling against the configured
//! database.

use anyhow::{anyhow, Context};
use cantiere::{
    bootstrap_schema, connect, resolve_item_schema, ApiService, AppConfig, AppState,
    MayPostgresExecutor,
};
use clap::{Parser, Subcommand};
use may_minihttp::HttpServer;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "cantiere-server")]
#[command(about = "Job sites, crews, hours and warehouse service")]
#[command(version)]
struct Cli {
    /// Configuration file (optional; CANTIERE__* variables override it)
    #[arg(long, default_value = cantiere::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Database connection URL
    #[arg(long)]
    database_url: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the REST API
    Serve {
        /// Listen address, e.g. 0.0.0.0:3000
        #[arg(long)]
        bind: Option<String>,

        /// Coroutine worker threads
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Create the service tables when missing
    InitSchema,

    /// Print how the warehouse item table was resolved
    CheckSchema,
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut config = AppConfig::load_from(&cli.config).context("loading configuration")?;
    if let Some(url) = cli
        .database_url
        .or_else(|| std::env::var("DATABASE_URL").ok())
    {
        config.database.url = url;
    }

    match cli.command {
        Commands::Serve { bind, workers } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(workers) = workers {
                config.server.workers = workers;
            }
            serve(config)
        }
        Commands::InitSchema => init_schema(&config),
        Commands::CheckSchema => check_schema(&config),
    }
}

fn serve(config: AppConfig) -> anyhow::Result<()> {
    if config.server.workers > 0 {
        may::config().set_workers(config.server.workers);
    }

    let state = AppState::from_config(&config)?;
    let service = ApiService::new(Arc::new(state));

    let server = HttpServer(service)
        .start(&config.server.bind)
        .map_err(|e| anyhow!("failed to start server on {}: {e}", config.server.bind))?;
    log::info!("cantiere listening on http://{}", config.server.bind);
    server
        .join()
        .map_err(|e| anyhow!("server stopped with an error: {e:?}"))?;
    Ok(())
}

fn executor(config: &AppConfig) -> anyhow::Result<MayPostgresExecutor> {
    let client = connect(&config.database.url).context("connecting to the database")?;
    Ok(MayPostgresExecutor::new(client))
}

fn init_schema(config: &AppConfig) -> anyhow::Result<()> {
    let executor = executor(config)?;
    let report = bootstrap_schema(&executor)?;
    if report.created_item_table {
        println!("created item table {}", cantiere::schema::bootstrap::DEFAULT_ITEM_TABLE);
    }
    for column in &report.added_item_columns {
        println!("added item column {column}");
    }
    println!("schema ready");
    Ok(())
}

fn check_schema(config: &AppConfig) -> anyhow::Result<()> {
    let executor = executor(config)?;
    let schema = resolve_item_schema(&executor)?;
    println!("table      {}", schema.table);
    println!("id         {}", schema.id_column);
    println!("name       {}", schema.name_column);
    println!("quantity   {}", schema.quantity_column);
    println!("threshold  {}", schema.threshold_column);
    let optional = [
        ("category", &schema.category_column),
        ("supplier", &schema.supplier_column),
        ("note", &schema.note_column),
        ("updated_at", &schema.updated_at_column),
    ];
    for (label, column) in optional {
        println!("{label:<10} {}", column.as_deref().unwrap_or("-"));
    }
    Ok(())
}
