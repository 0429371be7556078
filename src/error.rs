//! Error types shared by the rate engine, the guide tracker and the service.

use serde::Serialize;
use thiserror::Error;

use crate::domain::{CarrierVariant, GuideAction, GuideState};
use crate::infra::carrier::CarrierError;

/// Result type alias using the crate error type.
pub type Result<T> = std::result::Result<T, ShippingError>;

/// Main error type for quoting and guide handling.
#[derive(Debug, Error)]
pub enum ShippingError {
    /// Weight unit string that is not one of g, kg, lb, oz
    #[error("invalid weight unit: {0}")]
    InvalidUnit(String),

    /// No per-unit or fixed rate configured for the variant
    #[error("no shipping rate configured for {0}")]
    MissingRateConfig(CarrierVariant),

    /// Destination could not be classified into a zone
    #[error("cannot resolve destination zone: {0}")]
    InvalidZone(String),

    /// Stored setting that does not parse into its declared type
    #[error("invalid value {value:?} for setting {key}")]
    InvalidSetting { key: String, value: String },

    /// Quote requested for a carrier that is not enabled in the store
    #[error("carrier {0} is not active for this store")]
    InactiveCarrier(CarrierVariant),

    /// Malformed input rejected before entering the rate engine
    #[error("validation error: {0}")]
    Validation(String),

    /// Guide action not valid from the current guide state
    #[error("cannot {action} a guide that is {state}")]
    ActionNotAllowed {
        action: GuideAction,
        state: GuideState,
    },

    /// Order not found in the host store
    #[error("order {0} not found")]
    OrderNotFound(u64),

    /// Carrier web service could not be reached or refused the call
    #[error("carrier unavailable: {0}")]
    CarrierUnavailable(#[from] CarrierError),

    /// Option or order store failure
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

/// How an error is surfaced to the admin or the customer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Shown to the admin as a warning; quoting is refused.
    Configuration,
    /// Shown with a "click to retry" affordance; never retried automatically.
    CarrierUnavailable,
    /// Input rejected before any processing.
    Validation,
    /// Logged when debugging is enabled, hidden from the customer.
    Internal,
}

impl ShippingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingRateConfig(_)
            | Self::InvalidZone(_)
            | Self::InvalidSetting { .. }
            | Self::InactiveCarrier(_) => ErrorKind::Configuration,
            Self::CarrierUnavailable(_) => ErrorKind::CarrierUnavailable,
            Self::InvalidUnit(_) | Self::Validation(_) | Self::ActionNotAllowed { .. } => {
                ErrorKind::Validation
            }
            Self::OrderNotFound(_) | Self::Storage(_) => ErrorKind::Internal,
        }
    }
}

/// Failure of a host-owned store (options or orders).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage directory unavailable")]
    StorageUnavailable,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    #[error("store backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_surface_rules() {
        assert_eq!(
            ShippingError::MissingRateConfig(CarrierVariant::Simple).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            ShippingError::from(CarrierError::Api("down".into())).kind(),
            ErrorKind::CarrierUnavailable
        );
        assert_eq!(
            ShippingError::Validation("negative weight".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            ShippingError::from(StoreError::StorageUnavailable).kind(),
            ErrorKind::Internal
        );
    }
}
