//! Year-keyed cache of reconciled datasets
//!
//! `CacheStore` owns the staleness policy and structural validation; the raw
//! bytes live behind a `BlobStore`, one blob per year. A blob that no longer
//! deserializes into a `YearlyDataset` is deleted and reported as absent.

use crate::error::{LedgerError, Result};
use crate::ledger::YearlyDataset;
use crate::logging::{StructuredLogger, get_logger};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

const BLOB_PREFIX: &str = "ledger-";
const BLOB_SUFFIX: &str = ".json";

/// Raw per-year storage
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn read(&self, year: i32) -> Result<Option<Vec<u8>>>;
    async fn write(&self, year: i32, bytes: &[u8]) -> Result<()>;
    /// Deleting a missing blob is not an error
    async fn delete(&self, year: i32) -> Result<()>;
    async fn years(&self) -> Result<Vec<i32>>;
}

/// One JSON file per year under a directory
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    directory: PathBuf,
}

impl FileBlobStore {
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    /// `<dir>/ledger-<year>.json`
    pub fn path_for(&self, year: i32) -> PathBuf {
        self.directory
            .join(format!("{}{}{}", BLOB_PREFIX, year, BLOB_SUFFIX))
    }

    fn parse_year(file_name: &str) -> Option<i32> {
        file_name
            .strip_prefix(BLOB_PREFIX)?
            .strip_suffix(BLOB_SUFFIX)?
            .parse()
            .ok()
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn read(&self, year: i32) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(year)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, year: i32, bytes: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.directory).await?;
        let target = self.path_for(year);
        let staging = target.with_extension("json.tmp");
        tokio::fs::write(&staging, bytes).await?;
        tokio::fs::rename(&staging, &target).await?;
        Ok(())
    }

    async fn delete(&self, year: i32) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(year)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn years(&self) -> Result<Vec<i32>> {
        let mut entries = match tokio::fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut years = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(year) = entry.file_name().to_str().and_then(Self::parse_year) {
                years.push(year);
            }
        }
        years.sort_unstable();
        Ok(years)
    }
}

/// In-process blob store, for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<BTreeMap<i32, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn read(&self, year: i32) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.lock().await.get(&year).cloned())
    }

    async fn write(&self, year: i32, bytes: &[u8]) -> Result<()> {
        self.blobs.lock().await.insert(year, bytes.to_vec());
        Ok(())
    }

    async fn delete(&self, year: i32) -> Result<()> {
        self.blobs.lock().await.remove(&year);
        Ok(())
    }

    async fn years(&self) -> Result<Vec<i32>> {
        Ok(self.blobs.lock().await.keys().copied().collect())
    }
}

/// What `CacheStore::clear` removes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheScope {
    Year(i32),
    All,
}

/// Validated, staleness-aware view over a `BlobStore`
#[derive(Clone)]
pub struct CacheStore {
    blobs: Arc<dyn BlobStore>,
    tz: Tz,
    logger: StructuredLogger,
}

impl CacheStore {
    /// `tz` is the zone whose calendar days decide staleness
    pub fn new(blobs: Arc<dyn BlobStore>, tz: Tz) -> Self {
        Self {
            blobs,
            tz,
            logger: get_logger("cache"),
        }
    }

    /// Cached dataset for `year`; a corrupt blob is deleted and yields `None`
    pub async fn get(&self, year: i32) -> Result<Option<YearlyDataset>> {
        let log = self.logger.for_year(year);
        let Some(bytes) = self.blobs.read(year).await? else {
            log.debug("No cached dataset");
            return Ok(None);
        };

        match serde_json::from_slice::<YearlyDataset>(&bytes) {
            Ok(dataset) => {
                log.debug(&format!(
                    "Loaded cached dataset ({} hours, updated {})",
                    dataset.hourly.len(),
                    dataset.last_updated
                ));
                Ok(Some(dataset))
            }
            Err(e) => {
                let err = LedgerError::cache_corruption(year, e.to_string());
                log.warn(&format!("{}; deleting blob", err));
                if let Err(delete_err) = self.blobs.delete(year).await {
                    log.error(&format!("Failed to delete corrupt blob: {}", delete_err));
                }
                Ok(None)
            }
        }
    }

    /// Replace the cached dataset for `year`
    pub async fn put(&self, year: i32, dataset: &YearlyDataset) -> Result<()> {
        let bytes = serde_json::to_vec(dataset)?;
        self.blobs.write(year, &bytes).await?;
        self.logger.for_year(year).info(&format!(
            "Cached dataset ({} hours, {} months)",
            dataset.hourly.len(),
            dataset.monthly.len()
        ));
        Ok(())
    }

    /// Whether `dataset` must be refetched at `now`.
    ///
    /// Absent is stale. Otherwise stale only when `lastUpdated` is on another
    /// local calendar day than `now` and in the current local year; anything
    /// last updated in an earlier year is kept as is.
    pub fn is_stale(&self, dataset: Option<&YearlyDataset>, now: DateTime<Utc>) -> bool {
        let Some(dataset) = dataset else {
            return true;
        };
        let updated = dataset.last_updated.with_timezone(&self.tz).date_naive();
        let today = now.with_timezone(&self.tz).date_naive();
        updated != today && updated.year() == today.year()
    }

    /// Remove one year or everything
    pub async fn clear(&self, scope: CacheScope) -> Result<()> {
        let years = match scope {
            CacheScope::Year(year) => vec![year],
            CacheScope::All => self.blobs.years().await?,
        };
        for year in &years {
            self.blobs.delete(*year).await?;
        }
        self.logger
            .info(&format!("Cleared cached years {:?}", years));
        Ok(())
    }
}
