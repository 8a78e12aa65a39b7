//! Command handlers behind the `surveysync` binary

use crate::alert::{notifier, Alert};
use crate::api::ApiClient;
use crate::checkpoint::CheckpointStore;
use crate::config::{ApiConfig, Config, ProcessEnv, SyncConfig, Vars, DEFAULT_TIMEZONE};
use crate::error::Result;
use crate::export::ExportSink;
use crate::options::{active_labels, load_contacts, OptionReconciler, OptionsConfig, ReconcileReport};
use crate::paginator::PagingPolicy;
use crate::pipeline::{Extractor, RunReport};
use crate::storage::{self, StorageConfig};
use crate::window::{parse_offset, Bookmarks, WindowCalculator};
use chrono::{TimeDelta, Utc};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Overrides the `extract` subcommand applies on top of the environment
#[derive(Debug, Default, Clone)]
pub struct ExtractArgs {
    pub surveys: Vec<String>,
    pub page_size: Option<u32>,
    pub state_file: Option<PathBuf>,
    pub local_dir: Option<PathBuf>,
}

impl ExtractArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(page_size) = self.page_size {
            config.api.page_size = Some(page_size);
        }
        if let Some(state_file) = &self.state_file {
            config.sync.state_file = state_file.clone();
        }
        if let Some(dir) = &self.local_dir {
            config.storage = StorageConfig::local(dir);
        }
    }
}

/// One extraction run; failures are alerted before they are returned
pub async fn extract(args: &ExtractArgs) -> Result<RunReport> {
    let config = Config::from_env_with(|config| args.apply(config))?;

    let alerts = notifier(config.alert_webhook_url.as_deref())?;
    let outcome = run_extract(&config, &args.surveys).await;

    let alert = match &outcome {
        Ok(report) => Alert::from_report(report),
        Err(e) => Some(Alert::from_fatal(e)),
    };
    if let Some(alert) = alert {
        if let Err(e) = alerts.notify(&alert).await {
            error!(error = %e, subject = %alert.subject, "Failed to deliver alert");
        }
    }
    outcome
}

pub async fn run_extract(config: &Config, surveys: &[String]) -> Result<RunReport> {
    info!(
        state_file = %config.sync.state_file.display(),
        store = ?config.storage.kind,
        schema = %config.sync.schema_name,
        "Starting extraction"
    );

    let client = ApiClient::new(&config.api)?;
    let mut checkpoint = CheckpointStore::load(&config.sync.state_file, config.api.timezone)?;
    let store = storage::from_config(&config.storage).await?;
    let sink = ExportSink::new(store.as_ref(), config.sync.schema_name.clone());
    let windows = WindowCalculator::new(
        config.api.timezone,
        TimeDelta::seconds(config.sync.lag_secs),
    );
    let paging = PagingPolicy {
        page_size: config.api.page_size,
        degraded_retry: config.api.degraded_retry,
    };

    Extractor::new(&client, sink, &mut checkpoint, windows, config.sync.academic_year)
        .with_paging(paging)
        .with_survey_filter(surveys.iter().cloned())
        .run(Utc::now())
        .await
}

pub async fn sync_options(config_path: &Path, contacts_path: &Path, dry_run: bool) -> Result<ReconcileReport> {
    dotenvy::dotenv().ok();
    let api_config = ApiConfig::from_vars(&ProcessEnv)?;
    let client = ApiClient::new(&api_config)?;

    let options = OptionsConfig::load(config_path)?;
    let contacts = load_contacts(contacts_path)?;
    let active = active_labels(&contacts);
    info!(
        contacts = contacts.len(),
        active = active.len(),
        surveys = options.surveys.len(),
        dry_run,
        "Reconciling question options"
    );

    Ok(OptionReconciler::new(&client)
        .with_paging(PagingPolicy {
            page_size: api_config.page_size,
            degraded_retry: api_config.degraded_retry,
        })
        .with_dry_run(dry_run)
        .reconcile(&options, &active)
        .await)
}

/// Bookmarks stored in the checkpoint file
pub fn bookmarks(state_file: Option<&Path>) -> Result<(PathBuf, Bookmarks)> {
    dotenvy::dotenv().ok();
    let tz = parse_offset(
        &ProcessEnv
            .var("ALCHEMER_TIMEZONE")
            .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
    )?;
    let path = match state_file {
        Some(path) => path.to_path_buf(),
        None => SyncConfig::default_state_file(&ProcessEnv),
    };

    let store = CheckpointStore::load(&path, tz)?;
    Ok((path, store.bookmarks().clone()))
}
