use crate::error::{LedgerError, Result};
use crate::fetch::{RequestSpec, ResilientClient};
use crate::logging::{StructuredLogger, get_logger};
use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// One pre-tax hourly spot price, c/kWh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPriceEntry {
    #[serde(alias = "date")]
    pub utc_timestamp: String,
    pub value: f64,
}

impl RawPriceEntry {
    pub fn new<S: Into<String>>(utc_timestamp: S, value: f64) -> Self {
        Self {
            utc_timestamp: utc_timestamp.into(),
            value,
        }
    }
}

/// Source of hourly spot prices
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Prices for every hour of `start..=end` (UTC dates)
    async fn fetch_price_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawPriceEntry>>;
}

#[derive(Deserialize)]
struct PriceResponse {
    #[serde(default)]
    prices: Vec<RawPriceEntry>,
}

/// Spot price API over HTTP
pub struct HttpPriceProvider {
    client: ResilientClient,
    base_url: String,
    logger: StructuredLogger,
}

impl HttpPriceProvider {
    pub fn new<S: Into<String>>(client: ResilientClient, base_url: S) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            logger: get_logger("prices"),
        }
    }

    /// `[start 00:00Z, end+1 00:00Z)` as query parameters
    pub fn range_url(&self, start: NaiveDate, end: NaiveDate) -> String {
        let end_exclusive = end.checked_add_days(Days::new(1)).unwrap_or(end);
        format!(
            "{}/prices?start={}T00:00:00Z&end={}T00:00:00Z",
            self.base_url,
            start.format("%Y-%m-%d"),
            end_exclusive.format("%Y-%m-%d")
        )
    }
}

#[async_trait]
impl PriceProvider for HttpPriceProvider {
    async fn fetch_price_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawPriceEntry>> {
        if end < start {
            return Err(LedgerError::validation(
                "price range".to_string(),
                format!("end {} is before start {}", end, start),
            ));
        }

        let spec =
            RequestSpec::get(self.range_url(start, end)).with_header("Accept", "application/json");
        let response = self.client.request(&spec).await?;
        let parsed: PriceResponse = response
            .json()
            .map_err(|e| LedgerError::serialization(format!("Unexpected price payload: {}", e)))?;

        self.logger.info(&format!(
            "Fetched {} spot prices for {}..={}",
            parsed.prices.len(),
            start,
            end
        ));
        Ok(parsed.prices)
    }
}
