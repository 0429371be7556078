//! Quoting and guide rules live here; nothing in this module performs I/O.

pub mod entities;
pub mod free_shipping;
pub mod guide;
pub mod rate_engine;
pub mod rates;
pub mod settings;
pub mod units;
pub mod zones;

pub use entities::{
    Cart, CartLine, CarrierVariant, Destination, DestinationZone, OrderSummary, ProductInfo,
    QuoteResult, RateRequest, Recipient, WeightUnit,
};
pub use guide::{GuideAction, GuideMetaKeys, GuideRecord, GuideState, ACCEPTED_RESPONSE_CODES};
pub use rate_engine::quote;
pub use rates::{
    DiscountMode, ExchangeMode, ExchangeSettings, FixedRates, FreeShippingMode, FreeShippingRule,
    MinimumAmounts, MinimumScope, RateConfig,
};
pub use settings::{ProviderSelection, StoreSettings, DEFAULT_CACHE_LIFETIME};
pub use units::{from_grams, round_amount, to_grams, RoundingMode};
pub use zones::ZoneResolver;
