//! Consumption/price reconciliation
//!
//! Joins a year of month-grouped meter readings against a `PriceIndex`,
//! producing the hourly ledger and its monthly roll-up. Bad readings and hours
//! without a price are skipped and counted; nothing in here can fail.

use crate::ledger::{
    CombinedRecord, MonthAccumulator, MonthlySummary, YearlyDataset, hour_cost, to_decimal,
};
use crate::logging::get_logger;
use crate::price_index::PriceIndex;
use crate::providers::{MonthGroup, RawConsumptionReading};
use crate::timestamp::{NormalizedKey, SourceZone, normalize};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// The one reading variant used for a month
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReadingSource<'a> {
    Netted(&'a [RawConsumptionReading]),
    Gross(&'a [RawConsumptionReading]),
    Empty,
}

impl<'a> ReadingSource<'a> {
    /// Pick the variant for a month: netted when present, else gross.
    ///
    /// The flag is `true` when both variants carried data, which upstream
    /// should never do.
    pub fn resolve(group: &'a MonthGroup) -> (Self, bool) {
        let both = !group.netted.is_empty() && !group.gross.is_empty();
        let source = if !group.netted.is_empty() {
            ReadingSource::Netted(&group.netted)
        } else if !group.gross.is_empty() {
            ReadingSource::Gross(&group.gross)
        } else {
            ReadingSource::Empty
        };
        (source, both)
    }

    pub fn readings(&self) -> &'a [RawConsumptionReading] {
        match *self {
            ReadingSource::Netted(r) | ReadingSource::Gross(r) => r,
            ReadingSource::Empty => &[],
        }
    }
}

/// What was skipped during one reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Months that carried both netted and gross readings
    pub anomalies: usize,
    /// Readings with a bad value or timestamp, or whose cost does not fit
    /// the hour or its month total
    pub rejected_readings: usize,
    /// Readings whose hour had no price
    pub missing_prices: usize,
    /// Readings that replaced an earlier one for the same hour
    pub duplicate_readings: usize,
    /// Price entries dropped while building the index
    pub rejected_prices: usize,
}

/// Output of one reconciliation run
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// Strictly ascending by timestamp
    pub hourly: Vec<CombinedRecord>,
    /// Strictly ascending by month key
    pub monthly: Vec<MonthlySummary>,
    pub stats: ReconcileStats,
}

impl Reconciliation {
    pub fn into_dataset(self, last_updated: DateTime<Utc>) -> YearlyDataset {
        YearlyDataset::new(last_updated, self.hourly, self.monthly)
    }
}

struct JoinedHour {
    consumption_kwh: Decimal,
    price: Decimal,
    cost: Decimal,
}

/// Join month-grouped readings with `prices`.
///
/// `zone` is only consulted for readings whose timestamp lacks an offset.
pub fn reconcile(groups: &[MonthGroup], prices: &PriceIndex, zone: SourceZone) -> Reconciliation {
    let logger = get_logger("reconcile");
    let mut stats = ReconcileStats {
        rejected_prices: prices.rejected(),
        ..ReconcileStats::default()
    };
    let mut joined: BTreeMap<NormalizedKey, JoinedHour> = BTreeMap::new();

    for (idx, group) in groups.iter().enumerate() {
        let (source, both_present) = ReadingSource::resolve(group);
        if both_present {
            stats.anomalies += 1;
            logger.warn(&format!(
                "Month group {} has both netted ({}) and gross ({}) readings; using netted",
                idx,
                group.netted.len(),
                group.gross.len()
            ));
        }

        for reading in source.readings() {
            let Some((key, kwh)) = parse_reading(reading, zone) else {
                stats.rejected_readings += 1;
                continue;
            };
            let Some(price) = prices.lookup_decimal(&key) else {
                stats.missing_prices += 1;
                continue;
            };
            let Some(cost) = hour_cost(kwh, price) else {
                logger.warn(&format!("Cost for {} overflows; skipping reading", key));
                stats.rejected_readings += 1;
                continue;
            };
            let hour = JoinedHour {
                consumption_kwh: kwh,
                price,
                cost,
            };
            if joined.insert(key, hour).is_some() {
                stats.duplicate_readings += 1;
            }
        }
    }

    let mut months: BTreeMap<String, MonthAccumulator> = BTreeMap::new();
    let mut hourly: Vec<CombinedRecord> = Vec::with_capacity(joined.len());
    for (key, hour) in joined {
        let month = key.month_key();
        let mut acc = months.get(&month).cloned().unwrap_or_default();
        if !acc.add(hour.consumption_kwh, hour.cost) {
            logger.warn(&format!("Totals for {} overflow at {}; skipping hour", month, key));
            stats.rejected_readings += 1;
            continue;
        }
        months.insert(month, acc);
        hourly.push(CombinedRecord::with_cost(
            key,
            hour.consumption_kwh,
            hour.price,
            hour.cost,
        ));
    }

    let monthly: Vec<MonthlySummary> = months
        .into_iter()
        .map(|(month, acc)| acc.finalize(month))
        .collect();

    logger.info(&format!(
        "Reconciled {} hours in {} months (rejected={}, missing_price={}, duplicate={}, anomalies={})",
        hourly.len(),
        monthly.len(),
        stats.rejected_readings,
        stats.missing_prices,
        stats.duplicate_readings,
        stats.anomalies
    ));

    Reconciliation {
        hourly,
        monthly,
        stats,
    }
}

/// Normalized hour and kWh for a reading, or `None` if it must be skipped
fn parse_reading(
    reading: &RawConsumptionReading,
    zone: SourceZone,
) -> Option<(NormalizedKey, Decimal)> {
    let watt_hours = to_decimal(reading.watt_hours()?)?;
    let key = normalize(&reading.local_timestamp, zone).ok()?;
    Some((key, watt_hours / Decimal::ONE_THOUSAND))
}
