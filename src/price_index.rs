//! Price index construction
//!
//! Turns a raw UTC price series into a lookup keyed by `NormalizedKey`, with
//! the fixed VAT markup applied and each price rounded to cents precision.

use crate::ledger::{PRICE_DP, round_dp, to_decimal, to_f64};
use crate::logging::get_logger;
use crate::providers::RawPriceEntry;
use crate::timestamp::{NormalizedKey, SourceZone, normalize};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// VAT-inclusive hourly prices (c/kWh) by canonical UTC hour
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceIndex {
    prices: BTreeMap<NormalizedKey, Decimal>,
    rejected: usize,
    duplicates: usize,
}

impl PriceIndex {
    /// Build an index from raw prices.
    ///
    /// Entries whose timestamp does not parse, whose value is not finite, or
    /// whose marked-up value does not fit a `Decimal` are counted in
    /// `rejected` and skipped. On a duplicate key the later
    /// entry wins.
    pub fn build(raw_prices: &[RawPriceEntry], markup_percent: f64) -> Self {
        let logger = get_logger("price_index");
        let factor = Decimal::ONE
            + to_decimal(markup_percent).unwrap_or(Decimal::ZERO) / Decimal::ONE_HUNDRED;

        let mut index = Self::default();
        for entry in raw_prices {
            let key = match normalize(&entry.utc_timestamp, SourceZone::Utc) {
                Ok(key) => key,
                Err(e) => {
                    logger.debug(&format!("Skipping price entry: {}", e));
                    index.rejected += 1;
                    continue;
                }
            };
            let Some(marked_up) = to_decimal(entry.value).and_then(|v| v.checked_mul(factor))
            else {
                logger.debug(&format!(
                    "Skipping unrepresentable price {} at {}",
                    entry.value, key
                ));
                index.rejected += 1;
                continue;
            };

            let price = round_dp(marked_up, PRICE_DP);
            if index.prices.insert(key, price).is_some() {
                index.duplicates += 1;
            }
        }

        if index.rejected > 0 || index.duplicates > 0 {
            logger.warn(&format!(
                "Built price index with {} hours ({} rejected, {} duplicate)",
                index.prices.len(),
                index.rejected,
                index.duplicates
            ));
        } else {
            logger.debug(&format!("Built price index with {} hours", index.prices.len()));
        }
        index
    }

    /// Exact VAT-inclusive price for an hour
    pub fn lookup_decimal(&self, key: &NormalizedKey) -> Option<Decimal> {
        self.prices.get(key).copied()
    }

    /// VAT-inclusive price for an hour, c/kWh
    pub fn lookup(&self, key: &NormalizedKey) -> Option<f64> {
        self.lookup_decimal(key).map(to_f64)
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Entries dropped for a bad timestamp or value
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    /// Entries that replaced an earlier one with the same key
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }
}
