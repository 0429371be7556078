//! Shipping quotes and guide handling for Correos de Costa Rica stores.

pub mod ajax;
pub mod domain;
pub mod error;
pub mod infra;
pub mod service;
pub mod util;

pub use error::{ErrorKind, Result, ShippingError};
pub use service::{AvailableRate, GuideStatus, ShippingService};
