//! Store selection.

use anyhow::{Context, Result};
use async_trait::async_trait;
use vl_core::{HeaderStatus, IntervalRecord, IntervalStore, MemoryStore, Row, StoreError};
use vl_db::Sheet;
use vl_sheets::{ServiceAccountKey, SheetsStore};

use crate::config::{Backend, Config, CredentialSource};

/// The store a command writes to.
#[derive(Debug)]
pub enum Store {
    Sheets(SheetsStore),
    Sqlite(Sheet),
    Memory(MemoryStore),
}

impl Store {
    /// Short name for log fields.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Sheets(_) => "sheets",
            Self::Sqlite(_) => "sqlite",
            Self::Memory(_) => "memory",
        }
    }
}

#[async_trait]
impl IntervalStore for Store {
    async fn ensure_header(&self) -> Result<HeaderStatus, StoreError> {
        match self {
            Self::Sheets(s) => s.ensure_header().await,
            Self::Sqlite(s) => s.ensure_header().await,
            Self::Memory(s) => s.ensure_header().await,
        }
    }

    async fn append(&self, record: &IntervalRecord) -> Result<(), StoreError> {
        match self {
            Self::Sheets(s) => s.append(record).await,
            Self::Sqlite(s) => s.append(record).await,
            Self::Memory(s) => s.append(record).await,
        }
    }

    async fn read_all(&self) -> Result<Vec<Row>, StoreError> {
        match self {
            Self::Sheets(s) => s.read_all().await,
            Self::Sqlite(s) => s.read_all().await,
            Self::Memory(s) => s.read_all().await,
        }
    }

    async fn update_exit_time(&self, index: usize, exit_time: &str) -> Result<(), StoreError> {
        match self {
            Self::Sheets(s) => s.update_exit_time(index, exit_time).await,
            Self::Sqlite(s) => s.update_exit_time(index, exit_time).await,
            Self::Memory(s) => s.update_exit_time(index, exit_time).await,
        }
    }
}

/// Opens the configured store, or an in-memory one for dry runs.
///
/// Missing configuration is reported here, before any event is consumed.
pub fn open_store(config: &Config, dry_run: bool) -> Result<Store> {
    if dry_run {
        return Ok(Store::Memory(MemoryStore::new()));
    }

    match config.backend {
        Backend::Sheets => {
            let spreadsheet_id = config.require_spreadsheet_id()?;
            let key = match config.credential_source() {
                CredentialSource::Inline(json) => ServiceAccountKey::from_json(json),
                CredentialSource::File(path) => ServiceAccountKey::from_file(path),
            }
            .context("failed to load service-account credentials")?;
            let store = SheetsStore::new(key, spreadsheet_id, config.sheet_name.as_str())
                .context("failed to create sheets client")?;
            Ok(Store::Sheets(store))
        }
        Backend::Sqlite => {
            if let Some(parent) = config.database_path.parent() {
                std::fs::create_dir_all(parent).context("failed to create database directory")?;
            }
            let sheet = Sheet::open(&config.database_path, config.sheet_name.as_str())
                .with_context(|| format!("failed to open {}", config.database_path.display()))?;
            Ok(Store::Sqlite(sheet))
        }
    }
}
