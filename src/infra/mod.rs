pub mod cache;
pub mod carrier;
pub mod indicator;
pub mod legacy;
pub mod options;
pub mod orders;
pub mod pymexpress;

pub use cache::{CacheStatus, CachedPayload, ResponseCache};
pub use carrier::{CarrierClient, CarrierError, GuideDocument, GuideResponse, Location, Sender};
pub use indicator::{BccrIndicatorClient, ExchangeRateSource, IndicatorConfig};
pub use legacy::{LegacyClient, LegacyConfig, ProxySettings};
pub use options::{JsonFileOptionStore, MemoryOptionStore, OptionKey, OptionStore, OptionValue};
pub use orders::{MemoryOrderStore, OrderStore};
pub use pymexpress::{PymexpressClient, PymexpressConfig};
