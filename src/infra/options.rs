//! Configuration store access.
//!
//! Settings are flat key → value options named `{prefix}-{box-id}-{field}`.
//! `OptionKey` builds those names from typed parts and the loaders below
//! turn them into `RateConfig` / `StoreSettings` once per request.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::domain::{
    CarrierVariant, DestinationZone, DiscountMode, ExchangeMode, ExchangeSettings, FixedRates,
    FreeShippingMode, FreeShippingRule, MinimumAmounts, MinimumScope, ProviderSelection,
    RateConfig, RoundingMode, StoreSettings, WeightUnit,
};
use crate::error::{Result, ShippingError, StoreError};

const APP_QUALIFIER: &str = "cr";
const APP_ORG: &str = "CorreosShipping";
const APP_NAME: &str = "CorreosShipping";

/// Prefix of the store-wide options.
pub const GLOBAL_PREFIX: &str = "wc-correos";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl OptionValue {
    pub fn as_text(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(t) => t.clone(),
            Self::List(items) => items.join(","),
        }
    }

    pub fn as_list(&self) -> Vec<String> {
        match self {
            Self::List(items) => items.clone(),
            other => other
                .as_text()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

pub trait OptionStore: Send + Sync {
    fn get(&self, name: &str) -> Result<Option<OptionValue>>;
    fn set(&self, name: &str, value: OptionValue) -> Result<()>;
}

/// Fields of one shipping-method instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RateField {
    UnitRate(WeightUnit),
    FixedEnabled,
    FixedRate(DestinationZone),
    FixedFallback,
    MinimumEnabled,
    Minimum(MinimumScope),
    ExchangeEnabled,
    ExchangeMode,
    ExchangeRate,
    RoundingMode,
    FreeShippingMode,
    FreeShippingThreshold,
    DiscountMode,
    DiscountValue,
    PackingCost,
    RequiresIva,
}

impl RateField {
    pub fn name(&self) -> String {
        match self {
            Self::UnitRate(unit) => format!("rate-per-{unit}"),
            Self::FixedEnabled => "fixed-rates-enabled".into(),
            Self::FixedRate(zone) => format!("fixed-rate-{}", zone.as_str().replace('_', "-")),
            Self::FixedFallback => "fixed-rate-default".into(),
            Self::MinimumEnabled => "minimum-amount-enabled".into(),
            Self::Minimum(scope) => {
                let scope = match scope {
                    MinimumScope::General => "general",
                    MinimumScope::InsideGam => "inside-gam",
                    MinimumScope::OutsideGam => "outside-gam",
                    MinimumScope::International => "international",
                };
                format!("minimum-amount-{scope}")
            }
            Self::ExchangeEnabled => "exchange-rate-enabled".into(),
            Self::ExchangeMode => "exchange-rate-mode".into(),
            Self::ExchangeRate => "exchange-rate".into(),
            Self::RoundingMode => "rounding".into(),
            Self::FreeShippingMode => "free-shipping".into(),
            Self::FreeShippingThreshold => "free-shipping-threshold".into(),
            Self::DiscountMode => "discount-mode".into(),
            Self::DiscountValue => "discount-value".into(),
            Self::PackingCost => "packing-cost".into(),
            Self::RequiresIva => "requires-iva".into(),
        }
    }
}

/// Typed name of a per-method option.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OptionKey<'a> {
    pub variant: CarrierVariant,
    pub box_id: &'a str,
    pub field: RateField,
}

impl fmt::Display for OptionKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}",
            self.variant.option_prefix(),
            self.box_id,
            self.field.name()
        )
    }
}

/// Store-wide option names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GlobalField {
    Provider,
    Providers,
    Pro,
    WeightUnit,
    Debug,
    CacheLifetime,
}

impl GlobalField {
    pub fn key(&self) -> String {
        let field = match self {
            Self::Provider => "provider",
            Self::Providers => "providers",
            Self::Pro => "pro",
            Self::WeightUnit => "weight-unit",
            Self::Debug => "debug",
            Self::CacheLifetime => "cache-lifetime",
        };
        format!("{GLOBAL_PREFIX}-{field}")
    }
}

/// Typed reads over an `OptionStore`.
pub struct OptionReader<'a> {
    store: &'a dyn OptionStore,
}

impl<'a> OptionReader<'a> {
    pub fn new(store: &'a dyn OptionStore) -> Self {
        Self { store }
    }

    pub fn text(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .store
            .get(name)?
            .map(|value| value.as_text().trim().to_string())
            .filter(|text| !text.is_empty()))
    }

    /// Empty options read as `None`; anything else must parse.
    pub fn number(&self, name: &str) -> Result<Option<f64>> {
        match self.store.get(name)? {
            None => Ok(None),
            Some(OptionValue::Number(n)) => Ok(Some(n)),
            Some(other) => {
                let text = other.as_text();
                let text = text.trim();
                if text.is_empty() {
                    return Ok(None);
                }
                text.replace(',', ".")
                    .parse::<f64>()
                    .ok()
                    .filter(|n| n.is_finite())
                    .map(Some)
                    .ok_or_else(|| ShippingError::InvalidSetting {
                        key: name.to_string(),
                        value: text.to_string(),
                    })
            }
        }
    }

    pub fn flag(&self, name: &str) -> Result<bool> {
        Ok(match self.store.get(name)? {
            None => false,
            Some(OptionValue::Number(n)) => n != 0.0,
            Some(other) => matches!(
                other.as_text().trim().to_ascii_lowercase().as_str(),
                "yes" | "true" | "1" | "on"
            ),
        })
    }

    pub fn list(&self, name: &str) -> Result<Vec<String>> {
        Ok(self
            .store
            .get(name)?
            .map(|value| value.as_list())
            .unwrap_or_default())
    }

    pub fn parsed<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: std::str::FromStr<Err = ShippingError>,
    {
        self.text(name)?.map(|text| text.parse::<T>()).transpose()
    }
}

pub fn load_rate_config(
    store: &dyn OptionStore,
    variant: CarrierVariant,
    box_id: &str,
) -> Result<RateConfig> {
    let reader = OptionReader::new(store);
    let key = |field: RateField| {
        OptionKey {
            variant,
            box_id,
            field,
        }
        .to_string()
    };

    let mut per_unit_rates = BTreeMap::new();
    for unit in WeightUnit::ALL {
        if let Some(rate) = reader.number(&key(RateField::UnitRate(unit)))? {
            per_unit_rates.insert(unit, rate);
        }
    }

    let mut by_zone = BTreeMap::new();
    for zone in [
        DestinationZone::InsideGam,
        DestinationZone::OutsideGam,
        DestinationZone::International,
    ] {
        if let Some(rate) = reader.number(&key(RateField::FixedRate(zone)))? {
            by_zone.insert(zone, rate);
        }
    }
    let fixed_enabled = reader.flag(&key(RateField::FixedEnabled))?;
    let fallback = reader.number(&key(RateField::FixedFallback))?;
    let fixed_rates = (fixed_enabled || !by_zone.is_empty() || fallback.is_some()).then(|| {
        FixedRates {
            enabled: fixed_enabled,
            by_zone,
            fallback,
        }
    });

    let mut amounts = BTreeMap::new();
    for scope in [
        MinimumScope::General,
        MinimumScope::InsideGam,
        MinimumScope::OutsideGam,
        MinimumScope::International,
    ] {
        if let Some(amount) = reader.number(&key(RateField::Minimum(scope)))? {
            amounts.insert(scope, amount);
        }
    }

    let config = RateConfig {
        per_unit_rates,
        fixed_rates,
        minimum_amounts: MinimumAmounts {
            enabled: reader.flag(&key(RateField::MinimumEnabled))?,
            amounts,
        },
        exchange: ExchangeSettings {
            enabled: reader.flag(&key(RateField::ExchangeEnabled))?,
            mode: reader
                .parsed::<ExchangeMode>(&key(RateField::ExchangeMode))?
                .unwrap_or_default(),
            rate: reader.number(&key(RateField::ExchangeRate))?.unwrap_or(0.0),
        },
        rounding_mode: reader
            .parsed::<RoundingMode>(&key(RateField::RoundingMode))?
            .unwrap_or_default(),
        free_shipping_rule: FreeShippingRule {
            mode: reader
                .parsed::<FreeShippingMode>(&key(RateField::FreeShippingMode))?
                .unwrap_or_default(),
            threshold: reader
                .number(&key(RateField::FreeShippingThreshold))?
                .unwrap_or(0.0),
            discount_mode: reader
                .parsed::<DiscountMode>(&key(RateField::DiscountMode))?
                .unwrap_or_default(),
            discount_value: reader
                .number(&key(RateField::DiscountValue))?
                .unwrap_or(100.0),
        },
        packing_cost: reader.number(&key(RateField::PackingCost))?,
        requires_iva: reader.flag(&key(RateField::RequiresIva))?,
    };

    tracing::debug!(%variant, box_id, "Loaded rate configuration");
    Ok(config)
}

pub fn load_store_settings(store: &dyn OptionStore) -> Result<StoreSettings> {
    let reader = OptionReader::new(store);
    let defaults = StoreSettings::default();

    let provider = reader
        .parsed::<CarrierVariant>(&GlobalField::Provider.key())?
        .unwrap_or(CarrierVariant::Simple);
    let providers = reader
        .list(&GlobalField::Providers.key())?
        .iter()
        .map(|name| name.parse::<CarrierVariant>())
        .collect::<Result<Vec<_>>>()?;
    let pro = reader.flag(&GlobalField::Pro.key())?;

    let cache_lifetime = match reader.number(&GlobalField::CacheLifetime.key())? {
        Some(secs) => Duration::try_from_secs_f64(secs).map_err(|_| {
            ShippingError::InvalidSetting {
                key: GlobalField::CacheLifetime.key(),
                value: secs.to_string(),
            }
        })?,
        None => defaults.cache_lifetime,
    };

    Ok(StoreSettings {
        provider: ProviderSelection::from_settings(provider, providers, pro),
        weight_unit: reader
            .parsed::<WeightUnit>(&GlobalField::WeightUnit.key())?
            .unwrap_or(defaults.weight_unit),
        debug: reader.flag(&GlobalField::Debug.key())?,
        cache_lifetime,
    })
}

#[derive(Default)]
pub struct MemoryOptionStore {
    values: RwLock<BTreeMap<String, OptionValue>>,
}

impl MemoryOptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, name: &str, value: impl Into<OptionValue>) -> Self {
        if let Ok(mut values) = self.values.write() {
            values.insert(name.to_string(), value.into());
        }
        self
    }
}

impl OptionStore for MemoryOptionStore {
    fn get(&self, name: &str) -> Result<Option<OptionValue>> {
        let values = self
            .values
            .read()
            .map_err(|_| StoreError::Backend("option store lock poisoned".into()))?;
        Ok(values.get(name).cloned())
    }

    fn set(&self, name: &str, value: OptionValue) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| StoreError::Backend("option store lock poisoned".into()))?;
        values.insert(name.to_string(), value);
        Ok(())
    }
}

/// Options persisted as one JSON document. Every `set` rewrites the file.
pub struct JsonFileOptionStore {
    path: PathBuf,
    values: RwLock<BTreeMap<String, OptionValue>>,
}

impl JsonFileOptionStore {
    /// Opens the store in the platform config directory.
    pub fn open_default() -> Result<Self> {
        let path = ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
            .map(|dirs| dirs.config_dir().join("options.json"))
            .ok_or(StoreError::StorageUnavailable)?;
        Self::open(path)
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = if path.exists() {
            let data = fs::read_to_string(&path).map_err(StoreError::from)?;
            serde_json::from_str(&data).map_err(StoreError::from)?
        } else {
            BTreeMap::new()
        };
        tracing::debug!(path = %path.display(), options = values.len(), "Opened option store");
        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    fn save(&self, values: &BTreeMap<String, OptionValue>) -> std::result::Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(values)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

impl OptionStore for JsonFileOptionStore {
    fn get(&self, name: &str) -> Result<Option<OptionValue>> {
        let values = self
            .values
            .read()
            .map_err(|_| StoreError::Backend("option store lock poisoned".into()))?;
        Ok(values.get(name).cloned())
    }

    /// Memory only changes once the file write succeeded.
    fn set(&self, name: &str, value: OptionValue) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| StoreError::Backend("option store lock poisoned".into()))?;
        let mut updated = values.clone();
        updated.insert(name.to_string(), value);
        self.save(&updated)?;
        *values = updated;
        Ok(())
    }
}
