//! Reconciled ledger data model
//!
//! These are the shapes that leave the core: hourly `CombinedRecord`s, their
//! `MonthlySummary` roll-ups, and the `YearlyDataset` persisted per year.
//! All money rounding goes through `round_dp`, which works in decimal so the
//! result never depends on binary float representation.

use crate::timestamp::NormalizedKey;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Decimal places kept for per-hour and per-month costs
pub const COST_DP: u32 = 6;

/// Decimal places kept for VAT-inclusive prices
pub const PRICE_DP: u32 = 2;

/// Convert a float into a decimal using its shortest round-trip representation
pub fn to_decimal(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    // `Display` for f64 prints the shortest digits that round-trip
    Decimal::from_str(&value.to_string()).ok()
}

/// Convert back to a float for storage and presentation
pub fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// Round half away from zero to `dp` decimal places
pub fn round_dp(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

/// One reconciled hour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedRecord {
    #[serde(rename = "timestampUTC")]
    pub timestamp_utc: NormalizedKey,
    #[serde(rename = "consumptionKWh")]
    pub consumption_kwh: f64,
    #[serde(rename = "priceCentsPerKWh")]
    pub price_cents_per_kwh: f64,
    pub cost_currency: f64,
}

/// `kWh * c/kWh / 100`, rounded to `COST_DP` places; `None` on overflow
pub fn hour_cost(consumption_kwh: Decimal, price: Decimal) -> Option<Decimal> {
    let cents = consumption_kwh.checked_mul(price)?;
    Some(round_dp(cents.checked_div(Decimal::ONE_HUNDRED)?, COST_DP))
}

impl CombinedRecord {
    /// Join one hour of consumption with its price; `None` if the cost overflows
    pub fn new(
        timestamp_utc: NormalizedKey,
        consumption_kwh: Decimal,
        price: Decimal,
    ) -> Option<Self> {
        let cost = hour_cost(consumption_kwh, price)?;
        Some(Self::with_cost(timestamp_utc, consumption_kwh, price, cost))
    }

    /// Build from an already rounded cost
    pub(crate) fn with_cost(
        timestamp_utc: NormalizedKey,
        consumption_kwh: Decimal,
        price: Decimal,
        cost: Decimal,
    ) -> Self {
        Self {
            timestamp_utc,
            consumption_kwh: to_f64(consumption_kwh),
            price_cents_per_kwh: to_f64(price),
            cost_currency: to_f64(cost),
        }
    }
}

/// Roll-up of all joined hours in one UTC month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlySummary {
    /// `YYYY-MM`, UTC month
    pub month_key: String,
    #[serde(rename = "totalConsumptionKWh")]
    pub total_consumption_kwh: f64,
    #[serde(rename = "averagePriceCentsPerKWh")]
    pub average_price_cents_per_kwh: f64,
    pub total_cost_currency: f64,
}

impl MonthlySummary {
    /// Average price with the user's retail margin added on top
    pub fn price_with_margin(&self, margin_cents_per_kwh: f64) -> f64 {
        if self.total_consumption_kwh == 0.0 {
            return 0.0;
        }
        self.average_price_cents_per_kwh + margin_cents_per_kwh
    }

    /// Total cost including the margin on every consumed kWh
    pub fn cost_with_margin(&self, margin_cents_per_kwh: f64) -> f64 {
        self.total_cost_currency + self.total_consumption_kwh * margin_cents_per_kwh / 100.0
    }
}

/// Exact running totals for one month, finalized into a `MonthlySummary`
#[derive(Debug, Clone, Default)]
pub(crate) struct MonthAccumulator {
    consumption_kwh: Decimal,
    cost: Decimal,
}

impl MonthAccumulator {
    /// Add one hour; leaves the totals untouched and returns `false` if either
    /// sum would overflow
    pub(crate) fn add(&mut self, consumption_kwh: Decimal, cost: Decimal) -> bool {
        match (
            self.consumption_kwh.checked_add(consumption_kwh),
            self.cost.checked_add(cost),
        ) {
            (Some(kwh), Some(total)) => {
                self.consumption_kwh = kwh;
                self.cost = total;
                true
            }
            _ => false,
        }
    }

    /// Average is `cost / kWh * 100`, or 0 when nothing was consumed or the
    /// ratio is not representable
    pub(crate) fn finalize(&self, month_key: String) -> MonthlySummary {
        let average = if self.consumption_kwh.is_zero() {
            Decimal::ZERO
        } else {
            self.cost
                .checked_div(self.consumption_kwh)
                .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
                .map_or(Decimal::ZERO, |avg| round_dp(avg, COST_DP))
        };
        MonthlySummary {
            month_key,
            total_consumption_kwh: to_f64(self.consumption_kwh),
            average_price_cents_per_kwh: to_f64(average),
            total_cost_currency: to_f64(self.cost),
        }
    }
}

/// Everything cached for one calendar year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlyDataset {
    pub last_updated: DateTime<Utc>,
    pub hourly: Vec<CombinedRecord>,
    pub monthly: Vec<MonthlySummary>,
}

impl YearlyDataset {
    pub fn new(
        last_updated: DateTime<Utc>,
        hourly: Vec<CombinedRecord>,
        monthly: Vec<MonthlySummary>,
    ) -> Self {
        Self {
            last_updated,
            hourly,
            monthly,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hourly.is_empty()
    }

    /// Sum of all monthly costs
    pub fn total_cost(&self) -> f64 {
        let exact = self.monthly.iter().try_fold(Decimal::ZERO, |acc, m| {
            acc.checked_add(to_decimal(m.total_cost_currency)?)
        });
        match exact {
            Some(total) => to_f64(total),
            None => self.monthly.iter().map(|m| m.total_cost_currency).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::{SourceZone, normalize};

    fn dec(v: f64) -> Decimal {
        to_decimal(v).unwrap()
    }

    #[test]
    fn midpoint_rounds_away_from_zero() {
        // 5.0 * 1.255 is 6.2749999.. as a float but exactly 6.275 in decimal
        let price = dec(5.0) * (Decimal::ONE + dec(25.5) / Decimal::ONE_HUNDRED);
        assert_eq!(round_dp(price, PRICE_DP), dec(6.28));
        assert_eq!(round_dp(dec(-0.125), 2), dec(-0.13));
    }

    #[test]
    fn record_cost_formula() {
        let key = normalize("2024-03-31T00:30:00Z", SourceZone::Utc).unwrap();
        let record = CombinedRecord::new(key, dec(1.5), dec(6.28)).unwrap();
        assert_eq!(record.consumption_kwh, 1.5);
        assert_eq!(record.price_cents_per_kwh, 6.28);
        assert_eq!(record.cost_currency, 0.0942);
    }

    #[test]
    fn record_cost_rounds_to_six_places() {
        let key = normalize("2024-01-01T00:00:00Z", SourceZone::Utc).unwrap();
        let record = CombinedRecord::new(key, dec(0.333), dec(7.77)).unwrap();
        // 0.333 * 7.77 / 100 = 0.0258741
        assert_eq!(record.cost_currency, 0.025874);
    }

    #[test]
    fn empty_month_average_is_zero() {
        let summary = MonthAccumulator::default().finalize("2024-02".to_string());
        assert_eq!(summary.average_price_cents_per_kwh, 0.0);
        assert_eq!(summary.total_consumption_kwh, 0.0);
        assert_eq!(summary.price_with_margin(0.5), 0.0);
    }

    #[test]
    fn month_average_follows_cost_over_consumption() {
        let mut acc = MonthAccumulator::default();
        assert!(acc.add(dec(1.0), dec(0.1)));
        assert!(acc.add(dec(3.0), dec(0.2)));
        let summary = acc.finalize("2024-05".to_string());
        assert_eq!(summary.total_consumption_kwh, 4.0);
        assert_eq!(summary.total_cost_currency, 0.3);
        assert!((summary.average_price_cents_per_kwh - 7.5).abs() < 1e-9);
        assert!((summary.price_with_margin(0.5) - 8.0).abs() < 1e-9);
        assert!((summary.cost_with_margin(0.5) - 0.32).abs() < 1e-9);
    }

    #[test]
    fn dataset_json_uses_wire_field_names() {
        let key = normalize("2024-03-31T00:30:00Z", SourceZone::Utc).unwrap();
        let dataset = YearlyDataset::new(
            Utc::now(),
            vec![CombinedRecord::new(key, dec(1.5), dec(6.28)).unwrap()],
            vec![],
        );
        let json = serde_json::to_value(&dataset).unwrap();
        assert!(json.get("lastUpdated").is_some());
        let hour = &json["hourly"][0];
        assert_eq!(hour["timestampUTC"], "2024-03-31T00:30:00Z");
        assert_eq!(hour["consumptionKWh"], 1.5);
        assert_eq!(hour["priceCentsPerKWh"], 6.28);
        assert_eq!(hour["costCurrency"], 0.0942);
    }

    #[test]
    fn overflowing_cost_is_refused() {
        let key = normalize("2024-01-01T00:00:00Z", SourceZone::Utc).unwrap();
        assert!(CombinedRecord::new(key, Decimal::MAX, dec(10000.0)).is_none());
        assert_eq!(hour_cost(Decimal::MAX, dec(10000.0)), None);
    }

    #[test]
    fn overflowing_month_sum_leaves_totals_untouched() {
        let mut acc = MonthAccumulator::default();
        assert!(acc.add(dec(2.0), dec(0.5)));
        assert!(!acc.add(dec(1.0), Decimal::MAX));
        assert!(!acc.add(Decimal::MAX, dec(0.1)));
        let summary = acc.finalize("2024-07".to_string());
        assert_eq!(summary.total_consumption_kwh, 2.0);
        assert_eq!(summary.total_cost_currency, 0.5);
    }

    #[test]
    fn unrepresentable_average_reports_zero() {
        let mut acc = MonthAccumulator::default();
        // Netted consumption can almost cancel out
        assert!(acc.add(dec(1e-20), dec(1e20)));
        let summary = acc.finalize("2024-08".to_string());
        assert_eq!(summary.average_price_cents_per_kwh, 0.0);
    }

    #[test]
    fn total_cost_sums_months() {
        let month = |cost: f64| MonthlySummary {
            month_key: "2024-01".to_string(),
            total_consumption_kwh: 1.0,
            average_price_cents_per_kwh: 1.0,
            total_cost_currency: cost,
        };
        let dataset = YearlyDataset::new(Utc::now(), vec![], vec![month(0.1), month(0.2)]);
        assert_eq!(dataset.total_cost(), 0.3);
    }
}
