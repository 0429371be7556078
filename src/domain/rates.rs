use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::entities::{DestinationZone, WeightUnit};
use super::units::RoundingMode;
use crate::error::{Result, ShippingError};

/// Per-variant, per-method-instance rate settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateConfig {
    /// Rates per unit of weight; every positive entry is charged.
    pub per_unit_rates: BTreeMap<WeightUnit, f64>,
    pub fixed_rates: Option<FixedRates>,
    pub minimum_amounts: MinimumAmounts,
    pub exchange: ExchangeSettings,
    pub rounding_mode: RoundingMode,
    pub free_shipping_rule: FreeShippingRule,
    pub packing_cost: Option<f64>,
    /// Whether the method is marked as carrying IVA. Not applied to quotes.
    pub requires_iva: bool,
}

impl RateConfig {
    pub fn with_unit_rate(mut self, unit: WeightUnit, rate: f64) -> Self {
        self.per_unit_rates.insert(unit, rate);
        self
    }

    /// True when at least one rate source could produce a quote.
    pub fn has_any_rate(&self) -> bool {
        self.per_unit_rates.values().any(|rate| *rate > 0.0)
            || self
                .fixed_rates
                .as_ref()
                .is_some_and(|fixed| fixed.enabled && fixed.has_any())
    }

    /// Copy of this config with a resolved exchange rate, used for automatic mode.
    pub fn with_exchange_rate(&self, rate: f64) -> Self {
        let mut config = self.clone();
        config.exchange.rate = rate;
        config
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedRates {
    pub enabled: bool,
    pub by_zone: BTreeMap<DestinationZone, f64>,
    /// Used when the destination zone has no rate of its own.
    pub fallback: Option<f64>,
}

impl FixedRates {
    pub fn rate_for(&self, zone: DestinationZone) -> Option<f64> {
        self.by_zone
            .get(&zone)
            .copied()
            .filter(|rate| *rate > 0.0)
            .or(self.fallback.filter(|rate| *rate > 0.0))
    }

    fn has_any(&self) -> bool {
        self.by_zone.values().any(|rate| *rate > 0.0) || self.fallback.is_some_and(|r| r > 0.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinimumScope {
    General,
    InsideGam,
    OutsideGam,
    International,
}

impl From<DestinationZone> for MinimumScope {
    fn from(zone: DestinationZone) -> Self {
        match zone {
            DestinationZone::InsideGam => Self::InsideGam,
            DestinationZone::OutsideGam => Self::OutsideGam,
            DestinationZone::International => Self::International,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinimumAmounts {
    pub enabled: bool,
    pub amounts: BTreeMap<MinimumScope, f64>,
}

impl MinimumAmounts {
    /// Zone minimum, falling back to the general one when unset or zero.
    pub fn for_zone(&self, zone: DestinationZone) -> Option<f64> {
        let positive = |scope: MinimumScope| self.amounts.get(&scope).copied().filter(|m| *m > 0.0);
        positive(zone.into()).or_else(|| positive(MinimumScope::General))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeMode {
    #[default]
    Manual,
    Automatic,
}

impl FromStr for ExchangeMode {
    type Err = ShippingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" | "manual" => Ok(Self::Manual),
            "automatic" | "auto" => Ok(Self::Automatic),
            other => Err(ShippingError::InvalidSetting {
                key: "exchange_mode".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Conversion from carrier currency to store currency:
/// `store_amount = carrier_amount / rate`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeSettings {
    pub enabled: bool,
    pub mode: ExchangeMode,
    pub rate: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreeShippingMode {
    #[default]
    Disabled,
    MinAmount,
    MinWeight,
    MinItems,
    MaxAmount,
    MaxWeight,
    MaxItems,
}

impl FreeShippingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::MinAmount => "min_amount",
            Self::MinWeight => "min_weight",
            Self::MinItems => "min_items",
            Self::MaxAmount => "max_amount",
            Self::MaxWeight => "max_weight",
            Self::MaxItems => "max_items",
        }
    }
}

impl fmt::Display for FreeShippingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FreeShippingMode {
    type Err = ShippingError;

    fn from_str(s: &str) -> Result<Self> {
        let mode = match s.trim() {
            "" | "disabled" | "no" => Self::Disabled,
            "min_amount" => Self::MinAmount,
            "min_weight" => Self::MinWeight,
            "min_items" => Self::MinItems,
            "max_amount" => Self::MaxAmount,
            "max_weight" => Self::MaxWeight,
            "max_items" => Self::MaxItems,
            other => {
                return Err(ShippingError::InvalidSetting {
                    key: "free_shipping_mode".to_string(),
                    value: other.to_string(),
                })
            }
        };
        Ok(mode)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountMode {
    Fixed,
    #[default]
    Percent,
}

impl FromStr for DiscountMode {
    type Err = ShippingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "fixed" => Ok(Self::Fixed),
            "" | "percent" | "percentage" => Ok(Self::Percent),
            other => Err(ShippingError::InvalidSetting {
                key: "discount_mode".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FreeShippingRule {
    pub mode: FreeShippingMode,
    pub threshold: f64,
    pub discount_mode: DiscountMode,
    pub discount_value: f64,
}

impl FreeShippingRule {
    /// Full free shipping once the order amount reaches `threshold`.
    pub fn free_above_amount(threshold: f64) -> Self {
        Self {
            mode: FreeShippingMode::MinAmount,
            threshold,
            discount_mode: DiscountMode::Percent,
            discount_value: 100.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimum_falls_back_to_general() {
        let minimum = MinimumAmounts {
            enabled: true,
            amounts: BTreeMap::from([
                (MinimumScope::General, 1500.0),
                (MinimumScope::InsideGam, 2000.0),
                (MinimumScope::OutsideGam, 0.0),
            ]),
        };
        assert_eq!(minimum.for_zone(DestinationZone::InsideGam), Some(2000.0));
        assert_eq!(minimum.for_zone(DestinationZone::OutsideGam), Some(1500.0));
        assert_eq!(minimum.for_zone(DestinationZone::International), Some(1500.0));
    }

    #[test]
    fn disabled_fixed_rates_do_not_count_as_configured() {
        let config = RateConfig {
            fixed_rates: Some(FixedRates {
                enabled: false,
                by_zone: BTreeMap::from([(DestinationZone::InsideGam, 2500.0)]),
                fallback: None,
            }),
            ..RateConfig::default()
        };
        assert!(!config.has_any_rate());
        assert!(config.clone().with_unit_rate(WeightUnit::Kg, 1500.0).has_any_rate());
        assert!(!RateConfig::default().with_unit_rate(WeightUnit::Kg, 0.0).has_any_rate());
    }

    #[test]
    fn deserializes_settings_document() {
        let config: RateConfig = serde_json::from_str(
            r#"{
                "per_unit_rates": {"kg": 1500.0},
                "rounding_mode": "nearest_100",
                "free_shipping_rule": {"mode": "min_amount", "threshold": 50000.0}
            }"#,
        )
        .unwrap();
        assert_eq!(config.per_unit_rates.get(&WeightUnit::Kg), Some(&1500.0));
        assert_eq!(config.rounding_mode, RoundingMode::Nearest100);
        assert_eq!(config.free_shipping_rule.mode, FreeShippingMode::MinAmount);
        assert_eq!(config.free_shipping_rule.discount_mode, DiscountMode::Percent);
        assert!(!config.exchange.enabled);
    }
}
