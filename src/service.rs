//! Public entry point for the presentation layer
//!
//! `LedgerService` wires the providers, the price index, the reconciliation
//! engine and the cache together. Every collaborator is injected; the service
//! itself holds no global state beyond a per-year lock table that keeps at
//! most one fetch+reconcile in flight for any year.

use crate::cache::{CacheScope, CacheStore, FileBlobStore};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{LedgerError, Result};
use crate::fetch::ResilientClient;
use crate::ledger::YearlyDataset;
use crate::logging::{StructuredLogger, get_logger};
use crate::price_index::PriceIndex;
use crate::providers::{
    ConsumptionProvider, CredentialProvider, EnvCredentialProvider, HttpConsumptionProvider,
    HttpPriceProvider, PriceProvider,
};
use crate::reconcile::{ReconcileStats, reconcile};
use crate::timestamp::{NormalizedKey, SourceZone};
use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;

/// UTC date range of prices needed to reconcile `year`.
///
/// Starts a day early so local hours just after New Year, which are still the
/// previous UTC day, find a price. For the current year the range stops at
/// tomorrow, the last day with published prices.
pub fn price_range_for_year(year: i32, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, 1, 1)?;
    let start = first.checked_sub_days(Days::new(1))?;
    let mut end = NaiveDate::from_ymd_opt(year, 12, 31)?;
    if year == today.year()
        && let Some(tomorrow) = today.checked_add_days(Days::new(1))
    {
        end = end.min(tomorrow);
    }
    Some((start, end))
}

/// Completion of a background cache write
#[derive(Debug)]
pub struct PersistHandle {
    year: i32,
    handle: JoinHandle<Result<()>>,
}

impl PersistHandle {
    pub fn year(&self) -> i32 {
        self.year
    }

    /// Wait for the write and surface its outcome
    pub async fn wait(self) -> Result<()> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(LedgerError::io(format!(
                "Cache write task for {} did not complete: {}",
                self.year, e
            ))),
        }
    }
}

/// Result of a successful refresh
#[derive(Debug)]
pub struct Refresh {
    pub dataset: YearlyDataset,
    pub stats: ReconcileStats,
    pub persist: PersistHandle,
}

/// Yearly ledger and instant price queries
pub struct LedgerService {
    consumption: Arc<dyn ConsumptionProvider>,
    prices: Arc<dyn PriceProvider>,
    credentials: Arc<dyn CredentialProvider>,
    cache: CacheStore,
    clock: Arc<dyn Clock>,
    markup_percent: f64,
    source_zone: SourceZone,
    year_locks: std::sync::Mutex<HashMap<i32, Arc<tokio::sync::Mutex<()>>>>,
    logger: StructuredLogger,
}

impl LedgerService {
    /// Assemble a service from explicit collaborators
    pub fn new(
        config: &Config,
        consumption: Arc<dyn ConsumptionProvider>,
        prices: Arc<dyn PriceProvider>,
        credentials: Arc<dyn CredentialProvider>,
        cache: CacheStore,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Ok(Self {
            consumption,
            prices,
            credentials,
            cache,
            clock,
            markup_percent: config.prices.markup_percent,
            source_zone: SourceZone::Local(config.consumption.tz()?),
            year_locks: std::sync::Mutex::new(HashMap::new()),
            logger: get_logger("service"),
        })
    }

    /// Production wiring: HTTP providers, file cache, credentials from the environment
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let client = ResilientClient::from_config(&config.fetch)?;
        let consumption = Arc::new(HttpConsumptionProvider::new(
            client.clone(),
            config.consumption.base_url.clone(),
        ));
        let prices = Arc::new(HttpPriceProvider::new(client, config.prices.base_url.clone()));
        let cache = CacheStore::new(
            Arc::new(FileBlobStore::new(&config.cache.directory)),
            config.cache.tz()?,
        );
        Self::new(
            config,
            consumption,
            prices,
            Arc::new(EnvCredentialProvider),
            cache,
            Arc::new(SystemClock),
        )
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Dataset for `year`, refreshed if the cached copy is stale.
    ///
    /// When the refresh fails and any cached copy exists, that copy is
    /// returned instead of the error.
    pub async fn get_yearly_dataset(&self, year: i32) -> Result<YearlyDataset> {
        let guard = self.year_lock(year).lock_owned().await;
        let log = self.logger.for_year(year);

        let now = self.clock.now();
        let cached = match self.cache.get(year).await {
            Ok(cached) => cached,
            Err(e) => {
                log.warn(&format!("Cache read failed, treating as absent: {}", e));
                None
            }
        };

        if !self.cache.is_stale(cached.as_ref(), now)
            && let Some(dataset) = cached
        {
            log.debug("Serving cached dataset");
            return Ok(dataset);
        }

        match self.refresh_locked(year, now, guard).await {
            Ok(refresh) => {
                if let Err(e) = refresh.persist.wait().await {
                    log.error(&format!("Failed to persist dataset: {}", e));
                }
                Ok(refresh.dataset)
            }
            Err(e) => match cached {
                Some(stale) => {
                    log.warn(&format!(
                        "Refresh failed ({}); serving dataset last updated {}",
                        e, stale.last_updated
                    ));
                    Ok(stale)
                }
                None => {
                    log.error(&format!("Refresh failed with no cached fallback: {}", e));
                    Err(LedgerError::reconciliation(year, e))
                }
            },
        }
    }

    /// Fetch, reconcile and start persisting `year` regardless of staleness.
    ///
    /// Serialized with `get_yearly_dataset` for the same year. The cache write
    /// runs in the background and holds the year's lock until it lands; await
    /// the returned handle to observe it.
    pub async fn refresh_year(&self, year: i32) -> Result<Refresh> {
        let guard = self.year_lock(year).lock_owned().await;
        self.refresh_locked(year, self.clock.now(), guard)
            .await
            .map_err(|e| LedgerError::reconciliation(year, e))
    }

    /// VAT-inclusive spot price for the current hour, c/kWh
    pub async fn get_current_instant_price(&self) -> Result<f64> {
        let now = self.clock.now();
        let today = now.date_naive();
        let raw = self
            .prices
            .fetch_price_range(today, today)
            .await
            .map_err(|e| LedgerError::price_unavailable(format!("price fetch failed: {}", e)))?;

        let index = PriceIndex::build(&raw, self.markup_percent);
        let key = NormalizedKey::hour_of(now);
        index.lookup(&key).ok_or_else(|| {
            self.logger.warn(&format!("No spot price published for {}", key));
            LedgerError::price_unavailable(format!("no price for {}", key))
        })
    }

    /// Drop cached datasets
    pub async fn clear_cache(&self, scope: CacheScope) -> Result<()> {
        self.cache.clear(scope).await
    }

    fn year_lock(&self, year: i32) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .year_locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        locks.entry(year).or_default().clone()
    }

    /// `guard` is released once the cache write finishes, or on error
    async fn refresh_locked(
        &self,
        year: i32,
        now: DateTime<Utc>,
        guard: OwnedMutexGuard<()>,
    ) -> Result<Refresh> {
        let log = self.logger.for_year(year);
        let credential = self.credentials.get_credential().ok_or_else(|| {
            LedgerError::auth("no stored credential for the consumption provider")
        })?;
        let (start, end) = price_range_for_year(year, now.date_naive()).ok_or_else(|| {
            LedgerError::validation("year".to_string(), format!("{} is out of range", year))
        })?;

        log.info(&format!("Refreshing (prices {}..={})", start, end));
        let (groups, raw_prices) = tokio::try_join!(
            self.consumption.fetch_consumption_readings(year, &credential),
            self.prices.fetch_price_range(start, end),
        )?;

        let index = PriceIndex::build(&raw_prices, self.markup_percent);
        let reconciled = reconcile(&groups, &index, self.source_zone);
        let stats = reconciled.stats;
        let dataset = reconciled.into_dataset(now);

        let cache = self.cache.clone();
        let snapshot = dataset.clone();
        let handle = tokio::spawn(async move {
            let result = cache.put(year, &snapshot).await;
            drop(guard);
            result
        });

        Ok(Refresh {
            dataset,
            stats,
            persist: PersistHandle { year, handle },
        })
    }
}
