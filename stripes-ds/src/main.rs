//! stripes-ds (Document Store) - shared document service for Stripes
//!
//! `serve` runs the HTTP/SSE store. `export` and `import` are operator
//! commands that act on a running store.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use stripes_common::config::{database_path, load_or_default, resolve_root_folder, TomlConfig};
use stripes_common::db::init_database;
use stripes_common::store::HttpStore;
use stripes_ds::cli::{export_document, import_document, ExportFormat};
use stripes_ds::{build_router, AppState};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "stripes-ds", version, about = "Stripes shared document store")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the document store (default)
    Serve {
        #[arg(long)]
        port: Option<u16>,

        /// Overrides STRIPES_ROOT_FOLDER and the config file
        #[arg(long)]
        root_folder: Option<PathBuf>,
    },
    /// Write the shared document as JSON or CSV
    Export {
        #[arg(long, value_enum, default_value = "json")]
        format: ExportFormat,

        /// Output file (stdout when omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Replace the shared document with a JSON export
    Import {
        file: PathBuf,

        /// Email of the admin performing the import
        #[arg(long)]
        email: String,
    },
}

fn init_tracing(config: &TomlConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_or_default(cli.config.as_deref())?;

    init_tracing(&config)?;

    // Log build identification immediately after tracing init
    info!(
        "Starting Stripes Document Store ({}) v{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    match cli.command.unwrap_or(Command::Serve {
        port: None,
        root_folder: None,
    }) {
        Command::Serve { port, root_folder } => serve(&config, port, root_folder).await,
        Command::Export { format, out } => {
            let store = Arc::new(HttpStore::new(&config.store_url)?);
            let output = export_document(store, &config, format).await?;
            match out {
                Some(path) => {
                    std::fs::write(&path, output)?;
                    info!("Wrote export to {}", path.display());
                }
                None => print!("{}", output),
            }
            Ok(())
        }
        Command::Import { file, email } => {
            let contents = std::fs::read_to_string(&file)?;
            let store = Arc::new(HttpStore::new(&config.store_url)?);
            let students = import_document(store, &config, &contents, &email).await?;
            println!("Imported {} students from {}", students, file.display());
            Ok(())
        }
    }
}

async fn serve(config: &TomlConfig, port: Option<u16>, root_folder: Option<PathBuf>) -> Result<()> {
    let root_folder = resolve_root_folder(root_folder.as_deref(), config);
    let db_path = database_path(&root_folder);
    info!("Database path: {}", db_path.display());

    let pool = match init_database(&db_path).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to open database: {}", e);
            return Err(e.into());
        }
    };

    let app = build_router(AppState::new(pool));

    let port = port.unwrap_or(config.port);
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    info!("stripes-ds listening on http://127.0.0.1:{}", port);
    info!("Health check: http://127.0.0.1:{}/health", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    Ok(())
}
