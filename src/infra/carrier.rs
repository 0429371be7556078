//! Carrier web-service abstraction.
//!
//! `CarrierClient` hides whether a store talks to the legacy SOAP service or
//! to Pymexpress, so the service layer and its tests work against either
//! one, or against the in-memory mock.

use std::time::SystemTime;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{CarrierVariant, OrderSummary};

#[derive(Debug, Error)]
pub enum CarrierError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("http request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("api error: {0}")]
    Api(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("missing carrier setting: {0}")]
    MissingCredentials(&'static str),
    #[error("operation not supported by {variant}: {operation}")]
    Unsupported {
        variant: CarrierVariant,
        operation: &'static str,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthToken {
    pub value: String,
    pub issued_at: SystemTime,
}

/// Store origin printed on every guide.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub name: String,
    pub phone: String,
    pub address: String,
    pub postal_code: String,
}

/// Entry of the province → canton → district hierarchy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub code: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuideResponse {
    pub guide_number: String,
    pub response_code: Option<String>,
    pub message: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuideDocument {
    pub guide_number: String,
    /// PDF bytes as the carrier sends them, base64 encoded.
    pub pdf_base64: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub date: String,
    pub description: String,
    pub location: Option<String>,
}

#[async_trait]
pub trait CarrierClient: Send + Sync {
    fn variant(&self) -> CarrierVariant;

    async fn authenticate(&self) -> Result<AuthToken, CarrierError>;

    async fn cantons(&self, province: &str) -> Result<Vec<Location>, CarrierError>;

    async fn districts(&self, province: &str, canton: &str)
        -> Result<Vec<Location>, CarrierError>;

    /// Obtains a guide number for the order and registers the shipment.
    async fn request_guide(&self, order: &OrderSummary) -> Result<GuideResponse, CarrierError>;

    /// Re-registers a shipment whose guide was refused earlier.
    async fn register_guide(
        &self,
        order: &OrderSummary,
        guide_number: &str,
    ) -> Result<GuideResponse, CarrierError>;

    async fn guide_pdf(&self, guide_number: &str) -> Result<GuideDocument, CarrierError>;

    async fn tracking(&self, guide_number: &str) -> Result<Vec<TrackingEvent>, CarrierError>;
}
