//! Casekeep data-lifecycle worker runtime.
//!
//! Hosts the periodic retention sweep and backup rotation, and exposes the
//! same operations as one-shot administrative commands.

#![forbid(unsafe_code)]

mod scheduler;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use casekeep_application::{
    BackupService, FileCipher, RestoreService, RetentionService,
};
use casekeep_core::{AppError, AppResult, CaseId};
use casekeep_domain::RetentionTrigger;
use casekeep_infrastructure::{
    AesBackupCipher, DatabaseSettings, FilesystemBackupCatalog, FilesystemDocumentStore,
    PgDumpTool, PostgresCaseRepository,
};

use scheduler::JobHandle;

#[derive(Debug, Clone)]
struct WorkerConfig {
    database_url: String,
    backup_dir: PathBuf,
    upload_dir: PathBuf,
    encryption_key: Option<String>,
    sweep_interval_hours: u64,
    backup_interval_hours: u64,
    actor: String,
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let database_url = required_env("DATABASE_URL")?;
        let backup_dir =
            PathBuf::from(env::var("BACKUP_DIR").unwrap_or_else(|_| "./backups".to_owned()));
        let upload_dir =
            PathBuf::from(env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_owned()));
        let encryption_key = env::var("BACKUP_ENCRYPTION_KEY")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());
        let sweep_interval_hours = parse_env_u64("SWEEP_INTERVAL_HOURS", 24)?;
        let backup_interval_hours = parse_env_u64("BACKUP_INTERVAL_HOURS", 24)?;
        let actor = env::var("WORKER_ACTOR")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "admin".to_owned());

        if sweep_interval_hours == 0 {
            return Err(AppError::Configuration(
                "SWEEP_INTERVAL_HOURS must be greater than zero".to_owned(),
            ));
        }

        if backup_interval_hours == 0 {
            return Err(AppError::Configuration(
                "BACKUP_INTERVAL_HOURS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            database_url,
            backup_dir,
            upload_dir,
            encryption_key,
            sweep_interval_hours,
            backup_interval_hours,
            actor,
        })
    }

    fn installation_salt_path(&self) -> PathBuf {
        self.backup_dir.join(".backup.salt")
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let args: Vec<String> = env::args().collect();
    let mode = args.get(1).map(String::as_str).unwrap_or("run");

    match mode {
        "run" => run_scheduled(&config).await,
        "sweep" => {
            let pool = connect_pool(config.database_url.as_str()).await?;
            let report = build_retention_service(&pool, &config)
                .sweep(Utc::now())
                .await?;
            info!(
                total_checked = report.total_checked,
                purged = report.purged.len(),
                errors = report.errors.len(),
                retried_file_deletions = report.retried_file_deletions,
                "sweep finished"
            );
            Ok(())
        }
        "backup" => {
            let (backup_service, _) = build_backup_services(&config)?;
            let outcome = backup_service.run_backup(Utc::now()).await?;
            info!(
                file_name = %outcome.file_name,
                encrypted = outcome.encrypted,
                size_bytes = outcome.size_bytes,
                pruned = outcome.pruned.len(),
                "backup finished"
            );
            Ok(())
        }
        "restore" => {
            let (_, restore_service) = build_backup_services(&config)?;
            let target = args.get(2).map(String::as_str);
            let outcome = restore_service.restore(target).await?;
            info!(
                backup_file = %outcome.backup_file,
                decrypted = outcome.decrypted,
                "restore finished"
            );
            Ok(())
        }
        "purge" => {
            let case_id = args.get(2).map(String::as_str).ok_or_else(|| {
                AppError::Validation("usage: casekeep-worker purge CASE_ID".to_owned())
            })?;
            let case_id = CaseId::parse(case_id)?;
            let pool = connect_pool(config.database_url.as_str()).await?;
            let outcome = build_retention_service(&pool, &config)
                .purge_case(case_id, RetentionTrigger::ManualAdmin, config.actor.as_str())
                .await?;
            info!(
                case_id = %outcome.case_id,
                documents_deleted = outcome.documents_deleted,
                files_deleted = outcome.files_deleted,
                file_errors = outcome.file_errors.len(),
                notifications_deleted = outcome.notifications_deleted,
                "purge finished"
            );
            Ok(())
        }
        other => Err(AppError::Validation(format!(
            "unknown worker mode '{other}' (expected run, sweep, backup, restore, or purge)"
        ))),
    }
}

async fn run_scheduled(config: &WorkerConfig) -> AppResult<()> {
    let pool = connect_pool(config.database_url.as_str()).await?;
    let retention_service = build_retention_service(&pool, config);
    let (backup_service, _) = build_backup_services(config)?;

    info!(
        sweep_interval_hours = config.sweep_interval_hours,
        backup_interval_hours = config.backup_interval_hours,
        backup_dir = %config.backup_dir.display(),
        encryption = config.encryption_key.is_some(),
        "casekeep-worker started"
    );

    let sweep_handle = {
        let service = retention_service.clone();
        JobHandle::spawn(
            "retention_sweep",
            Duration::from_secs(config.sweep_interval_hours * 3600),
            move || {
                let service = service.clone();
                async move {
                    match service.sweep(Utc::now()).await {
                        Ok(report) => {
                            if !report.errors.is_empty() {
                                warn!(
                                    errors = report.errors.len(),
                                    "retention sweep finished with per-case failures"
                                );
                            }
                        }
                        Err(sweep_error) => {
                            error!(error = %sweep_error, "retention sweep failed");
                        }
                    }
                }
            },
        )
    };

    let backup_handle = {
        let service = backup_service.clone();
        JobHandle::spawn(
            "backup_rotation",
            Duration::from_secs(config.backup_interval_hours * 3600),
            move || {
                let service = service.clone();
                async move {
                    if let Err(backup_error) = service.run_backup(Utc::now()).await {
                        error!(error = %backup_error, "scheduled backup failed");
                    }
                }
            },
        )
    };

    tokio::signal::ctrl_c()
        .await
        .map_err(|error| AppError::Internal(format!("failed to listen for shutdown: {error}")))?;
    info!("shutdown requested; stopping jobs");

    sweep_handle.stop().await;
    backup_handle.stop().await;
    info!("casekeep-worker stopped");
    Ok(())
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

fn build_retention_service(pool: &PgPool, config: &WorkerConfig) -> RetentionService {
    let case_repository = Arc::new(PostgresCaseRepository::new(pool.clone()));
    let document_store = Arc::new(FilesystemDocumentStore::new(config.upload_dir.clone()));
    RetentionService::new(case_repository, document_store)
}

fn build_backup_services(config: &WorkerConfig) -> AppResult<(BackupService, RestoreService)> {
    let settings = database_settings_from_env()?;
    let catalog = Arc::new(FilesystemBackupCatalog::new(config.backup_dir.clone()));
    let dump_tool = Arc::new(PgDumpTool::new(settings));
    let cipher = build_cipher(config)?;

    let backup_service = BackupService::new(catalog.clone(), dump_tool.clone(), cipher.clone());
    let restore_service = RestoreService::new(catalog, dump_tool, cipher);
    Ok((backup_service, restore_service))
}

fn build_cipher(config: &WorkerConfig) -> AppResult<Option<Arc<dyn FileCipher>>> {
    match config.encryption_key.as_deref() {
        Some(material) => {
            let cipher = AesBackupCipher::from_key_material(
                material,
                config.installation_salt_path().as_path(),
            )?;
            Ok(Some(Arc::new(cipher) as Arc<dyn FileCipher>))
        }
        None => {
            warn!("BACKUP_ENCRYPTION_KEY not set; backups will be stored unencrypted");
            Ok(None)
        }
    }
}

/// Database settings for the external tools, read at the moment an
/// operation needs them; all values are required with no defaults.
fn database_settings_from_env() -> AppResult<DatabaseSettings> {
    DatabaseSettings::new(
        required_env("DB_HOST")?,
        required_env("DB_PORT")?,
        required_env("DB_NAME")?,
        required_env("DB_USER")?,
        required_env("DB_PASSWORD")?,
    )
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Configuration(format!("{name} is required")))
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Configuration(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
