use crate::error::{LedgerError, Result};
use crate::fetch::{RequestSpec, ResilientClient};
use crate::logging::{StructuredLogger, get_logger};
use crate::providers::credentials::Credential;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One metered hour as delivered upstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawConsumptionReading {
    #[serde(default, alias = "timestamp")]
    pub local_timestamp: String,
    /// Number or numeric string; anything else is rejected at reconciliation
    #[serde(default, alias = "value")]
    pub watt_hours: Value,
}

impl RawConsumptionReading {
    pub fn new<S: Into<String>>(local_timestamp: S, watt_hours: f64) -> Self {
        Self {
            local_timestamp: local_timestamp.into(),
            watt_hours: serde_json::Number::from_f64(watt_hours)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        }
    }

    /// Build a reading with an arbitrary raw value (used for malformed input)
    pub fn with_raw_value<S: Into<String>>(local_timestamp: S, watt_hours: Value) -> Self {
        Self {
            local_timestamp: local_timestamp.into(),
            watt_hours,
        }
    }

    /// The reading's value when it is a finite number
    pub fn watt_hours(&self) -> Option<f64> {
        let value = match &self.watt_hours {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }?;
        value.is_finite().then_some(value)
    }
}

/// One month of readings; `netted` and `gross` are meant to be exclusive
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthGroup {
    #[serde(default)]
    pub netted: Vec<RawConsumptionReading>,
    #[serde(default)]
    pub gross: Vec<RawConsumptionReading>,
}

impl MonthGroup {
    pub fn netted(readings: Vec<RawConsumptionReading>) -> Self {
        Self {
            netted: readings,
            gross: Vec::new(),
        }
    }

    pub fn gross(readings: Vec<RawConsumptionReading>) -> Self {
        Self {
            netted: Vec::new(),
            gross: readings,
        }
    }
}

/// Source of a year's hourly consumption
#[async_trait]
pub trait ConsumptionProvider: Send + Sync {
    /// Fails with `Auth` for a rejected login, `Transient`/`FetchExhausted` otherwise
    async fn fetch_consumption_readings(
        &self,
        year: i32,
        credential: &Credential,
    ) -> Result<Vec<MonthGroup>>;
}

#[derive(Serialize)]
struct ConsumptionQuery<'a> {
    username: &'a str,
    password: &'a str,
    year: i32,
}

#[derive(Deserialize)]
struct ConsumptionResponse {
    #[serde(default)]
    months: Vec<MonthGroup>,
}

/// Metering API over HTTP
pub struct HttpConsumptionProvider {
    client: ResilientClient,
    base_url: String,
    logger: StructuredLogger,
}

impl HttpConsumptionProvider {
    pub fn new<S: Into<String>>(client: ResilientClient, base_url: S) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            logger: get_logger("consumption"),
        }
    }
}

#[async_trait]
impl ConsumptionProvider for HttpConsumptionProvider {
    async fn fetch_consumption_readings(
        &self,
        year: i32,
        credential: &Credential,
    ) -> Result<Vec<MonthGroup>> {
        let query = ConsumptionQuery {
            username: &credential.username,
            password: credential.expose_secret(),
            year,
        };
        let spec = RequestSpec::post_json(format!("{}/consumption", self.base_url), &query)?
            .with_header("Accept", "application/json");

        let response = self.client.request(&spec).await?;
        let parsed: ConsumptionResponse = response.json().map_err(|e| {
            LedgerError::serialization(format!("Unexpected consumption payload: {}", e))
        })?;

        let log = self.logger.for_year(year);
        log.info(&format!(
            "Fetched {} month groups of consumption",
            parsed.months.len()
        ));
        Ok(parsed.months)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reading_value_accepts_numbers_and_numeric_strings() {
        let r: RawConsumptionReading =
            serde_json::from_value(json!({"timestamp": "2024-01-01T00:00:00+02:00", "value": 1500}))
                .unwrap();
        assert_eq!(r.local_timestamp, "2024-01-01T00:00:00+02:00");
        assert_eq!(r.watt_hours(), Some(1500.0));

        let r = RawConsumptionReading::with_raw_value("t", json!(" 250.5 "));
        assert_eq!(r.watt_hours(), Some(250.5));
    }

    #[test]
    fn reading_value_rejects_everything_else() {
        for raw in [json!(null), json!("n/a"), json!(true), json!({"wh": 1})] {
            let r = RawConsumptionReading::with_raw_value("t", raw);
            assert_eq!(r.watt_hours(), None);
        }
        let r = RawConsumptionReading::with_raw_value("t", json!("NaN"));
        assert_eq!(r.watt_hours(), None);
    }

    #[test]
    fn month_group_variants_default_to_empty() {
        let group: MonthGroup = serde_json::from_value(json!({"gross": [
            {"localTimestamp": "2024-01-01T00:00:00+02:00", "wattHours": 10}
        ]}))
        .unwrap();
        assert!(group.netted.is_empty());
        assert_eq!(group.gross.len(), 1);
    }
}
