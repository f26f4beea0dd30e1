//! Operator commands: export and import
//!
//! Both talk to a running store through the same client stack the
//! tracker uses, so an import reaches live subscribers like any other
//! admin edit.

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use std::sync::Arc;
use std::time::Duration;
use stripes_common::config::TomlConfig;
use stripes_common::events::EventBus;
use stripes_common::export::{curriculum_csv, export_json, parse_export, songs_csv, students_csv};
use stripes_common::model::{AccountStatus, SharedDocument, UserAccount};
use stripes_common::store::RemoteStore;
use stripes_common::SyncSession;
use tracing::info;

/// How long to wait for the stored document before treating it as absent
pub const BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Json,
    StudentsCsv,
    SongsCsv,
    CurriculumCsv,
}

/// Current document at `path`; `None` when it does not exist or nothing
/// arrives in time
pub async fn fetch_document(
    store: &dyn RemoteStore,
    path: &str,
    timeout: Duration,
) -> Result<Option<SharedDocument>> {
    let mut subscription = store.subscribe(path).await?;
    match tokio::time::timeout(timeout, subscription.next()).await {
        Ok(Some(snapshot)) if !snapshot.is_null() => Ok(Some(serde_json::from_value(snapshot)?)),
        Ok(_) | Err(_) => Ok(None),
    }
}

pub async fn export_document(
    store: Arc<dyn RemoteStore>,
    config: &TomlConfig,
    format: ExportFormat,
) -> Result<String> {
    let levels = config.level_order()?;
    let Some(document) = fetch_document(store.as_ref(), &config.document_path, BOOTSTRAP_TIMEOUT).await? else {
        bail!("No document stored at {}", config.document_path);
    };

    let output = match format {
        ExportFormat::Json => export_json(&document)?,
        ExportFormat::StudentsCsv => students_csv(&document, &levels),
        ExportFormat::SongsCsv => songs_csv(&document),
        ExportFormat::CurriculumCsv => curriculum_csv(&document, &levels),
    };
    info!(students = document.students.len(), ?format, "Exported document");
    Ok(output)
}

/// Import a JSON export as the account with `email`. Only admin emails
/// get past the gateway. Returns the number of imported students.
pub async fn import_document(
    store: Arc<dyn RemoteStore>,
    config: &TomlConfig,
    contents: &str,
    email: &str,
) -> Result<usize> {
    let export = parse_export(contents).context("Failed to parse import file")?;
    let account = UserAccount {
        id: format!("cli:{}", email.trim().to_lowercase()),
        email: email.to_string(),
        display_name: None,
        status: AccountStatus::Approved,
        created_at: chrono::Utc::now(),
    };

    let mut session = SyncSession::start(
        store,
        config.session_config(),
        account,
        config.authorization_policy(),
        config.level_order()?,
        EventBus::default(),
    );

    let mut subscription = session.subscribe().await?;
    match tokio::time::timeout(BOOTSTRAP_TIMEOUT, session.next_snapshot(&mut subscription)).await {
        Ok(result) => {
            result?;
        }
        Err(_) => info!("Timed out waiting for the stored document; importing into an empty document"),
    }

    let result = session.mutate(|gw| gw.import_snapshot(export));
    if let Err(e) = result {
        session.sign_out();
        return Err(e.into());
    }
    session.flush().await?;

    let students = session.document().students.len();
    session.sign_out();
    info!(students, "Import complete");
    Ok(students)
}
