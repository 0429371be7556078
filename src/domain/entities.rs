use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShippingError};

/// Carrier integration a shipping method quotes through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CarrierVariant {
    /// Weight-based fallback without carrier web service.
    Simple,
    /// Legacy SOAP web service.
    Ccr,
    /// Weight-based rates under the carrier's name, no guides.
    CcrSimple,
    /// REST/token web service.
    Pymexpress,
}

impl CarrierVariant {
    pub const ALL: [CarrierVariant; 4] = [
        CarrierVariant::Simple,
        CarrierVariant::Ccr,
        CarrierVariant::CcrSimple,
        CarrierVariant::Pymexpress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Ccr => "ccr",
            Self::CcrSimple => "ccr_simple",
            Self::Pymexpress => "pymexpress",
        }
    }

    /// Option-name prefix for this variant's settings.
    pub fn option_prefix(&self) -> &'static str {
        match self {
            Self::Simple => "wc-simple",
            Self::Ccr => "wc-ccr",
            Self::CcrSimple => "wc-ccr-simple",
            Self::Pymexpress => "wc-pymexpress",
        }
    }

    /// Only the web-service variants issue guide numbers.
    pub fn issues_guides(&self) -> bool {
        matches!(self, Self::Ccr | Self::Pymexpress)
    }

    /// Pymexpress covers domestic deliveries only.
    pub fn ships_internationally(&self) -> bool {
        !matches!(self, Self::Pymexpress)
    }
}

impl fmt::Display for CarrierVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CarrierVariant {
    type Err = ShippingError;

    fn from_str(s: &str) -> Result<Self> {
        CarrierVariant::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ShippingError::InvalidSetting {
                key: "provider".to_string(),
                value: s.to_string(),
            })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightUnit {
    G,
    Kg,
    Lb,
    Oz,
}

impl WeightUnit {
    pub const ALL: [WeightUnit; 4] = [WeightUnit::Kg, WeightUnit::Lb, WeightUnit::G, WeightUnit::Oz];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::G => "g",
            Self::Kg => "kg",
            Self::Lb => "lb",
            Self::Oz => "oz",
        }
    }

    /// Grams in one unit.
    pub fn grams(&self) -> f64 {
        match self {
            Self::G => 1.0,
            Self::Kg => 1000.0,
            Self::Lb => 453.59,
            Self::Oz => 28.35,
        }
    }
}

impl fmt::Display for WeightUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WeightUnit {
    type Err = ShippingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "g" => Ok(Self::G),
            "kg" => Ok(Self::Kg),
            "lb" | "lbs" => Ok(Self::Lb),
            "oz" => Ok(Self::Oz),
            _ => Err(ShippingError::InvalidUnit(s.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationZone {
    InsideGam,
    OutsideGam,
    International,
}

impl DestinationZone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InsideGam => "inside_gam",
            Self::OutsideGam => "outside_gam",
            Self::International => "international",
        }
    }
}

impl fmt::Display for DestinationZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to a single quote.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateRequest {
    pub total_weight_grams: f64,
    pub order_amount: f64,
    pub item_count: u32,
    pub destination_zone: DestinationZone,
    pub carrier_variant: CarrierVariant,
}

impl RateRequest {
    pub fn validate(&self) -> Result<()> {
        if !self.total_weight_grams.is_finite() || self.total_weight_grams < 0.0 {
            return Err(ShippingError::Validation(format!(
                "weight must be a non-negative number, got {}",
                self.total_weight_grams
            )));
        }
        if !self.order_amount.is_finite() || self.order_amount < 0.0 {
            return Err(ShippingError::Validation(format!(
                "order amount must be a non-negative number, got {}",
                self.order_amount
            )));
        }
        Ok(())
    }
}

/// Quote broken down by pipeline stage. All amounts are in store currency.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuoteResult {
    pub base_cost: f64,
    pub after_minimum: f64,
    pub after_discount: f64,
    pub final_cost: f64,
    pub applied_rule: Option<String>,
}

/// Shipping address as entered at checkout.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub country: String,
    #[serde(default)]
    pub province: Option<String>,
    #[serde(default)]
    pub canton: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
}

impl Destination {
    pub fn costa_rica(province: &str, canton: &str) -> Self {
        Self {
            country: "CR".to_string(),
            province: Some(province.to_string()),
            canton: Some(canton.to_string()),
            district: None,
        }
    }
}

/// One cart line; weight is per item in the store weight unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub weight: f64,
    pub quantity: u32,
    pub line_total: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub lines: Vec<CartLine>,
    pub destination: Destination,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub province: String,
    pub canton: String,
    pub district: String,
    pub postal_code: String,
}

/// Order data read from the host commerce system.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub id: u64,
    /// Carrier variants among the order's shipping lines.
    pub shipping_variants: Vec<CarrierVariant>,
    pub total_weight_grams: f64,
    pub amount: f64,
    pub item_count: u32,
    pub recipient: Recipient,
    #[serde(default)]
    pub note: Option<String>,
}

impl OrderSummary {
    pub fn ships_with(&self, variant: CarrierVariant) -> bool {
        self.shipping_variants.contains(&variant)
    }
}

/// Product or variation as seen by the weight diagnostic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub id: u64,
    #[serde(default)]
    pub parent_id: Option<u64>,
    pub name: String,
    #[serde(default)]
    pub weight: Option<f64>,
}
