//! Upstream collaborators: consumption readings, spot prices, credentials
//!
//! Each collaborator is a trait so the reconciliation service can be driven by
//! in-memory fakes in tests. The HTTP implementations share one
//! `ResilientClient` and therefore one retry policy.

pub mod consumption;
pub mod credentials;
pub mod prices;

pub use consumption::{
    ConsumptionProvider, HttpConsumptionProvider, MonthGroup, RawConsumptionReading,
};
pub use credentials::{Credential, CredentialProvider, EnvCredentialProvider, StaticCredentialProvider};
pub use prices::{HttpPriceProvider, PriceProvider, RawPriceEntry};
