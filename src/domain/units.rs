//! Weight normalisation and monetary rounding.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::entities::WeightUnit;
use crate::error::{Result, ShippingError};

/// Tolerance for treating a quotient as an exact multiple.
const MULTIPLE_EPSILON: f64 = 1e-9;

pub fn to_grams(value: f64, unit: WeightUnit) -> f64 {
    value * unit.grams()
}

pub fn from_grams(grams: f64, unit: WeightUnit) -> f64 {
    grams / unit.grams()
}

/// Parses the unit string before converting.
pub fn parse_to_grams(value: f64, unit: &str) -> Result<f64> {
    let unit = unit.parse::<WeightUnit>()?;
    Ok(to_grams(value, unit))
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingMode {
    #[default]
    None,
    #[serde(rename = "nearest_10")]
    Nearest10,
    #[serde(rename = "nearest_100")]
    Nearest100,
    #[serde(rename = "nearest_500")]
    Nearest500,
    #[serde(rename = "nearest_1000")]
    Nearest1000,
}

impl RoundingMode {
    pub fn step(&self) -> Option<f64> {
        match self {
            Self::None => None,
            Self::Nearest10 => Some(10.0),
            Self::Nearest100 => Some(100.0),
            Self::Nearest500 => Some(500.0),
            Self::Nearest1000 => Some(1000.0),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Nearest10 => "nearest_10",
            Self::Nearest100 => "nearest_100",
            Self::Nearest500 => "nearest_500",
            Self::Nearest1000 => "nearest_1000",
        }
    }
}

impl fmt::Display for RoundingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoundingMode {
    type Err = ShippingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" | "none" | "no" => Ok(Self::None),
            "nearest_10" | "10" => Ok(Self::Nearest10),
            "nearest_100" | "100" => Ok(Self::Nearest100),
            "nearest_500" | "500" => Ok(Self::Nearest500),
            "nearest_1000" | "1000" => Ok(Self::Nearest1000),
            other => Err(ShippingError::InvalidSetting {
                key: "rounding_mode".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Rounds up to the next multiple of the mode's step. This is a ceiling,
/// so 3203.56 with `Nearest100` becomes 3300.
pub fn round_amount(value: f64, mode: RoundingMode) -> f64 {
    let Some(step) = mode.step() else {
        return value;
    };

    let quotient = value / step;
    let nearest = quotient.round();
    let multiples = if (quotient - nearest).abs() < MULTIPLE_EPSILON {
        nearest
    } else {
        quotient.ceil()
    };
    multiples * step
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_to_grams() {
        assert_eq!(to_grams(2.0, WeightUnit::Kg), 2000.0);
        assert_eq!(to_grams(1.0, WeightUnit::Lb), 453.59);
        assert_eq!(to_grams(2.0, WeightUnit::Oz), 56.7);
        assert_eq!(to_grams(250.0, WeightUnit::G), 250.0);
    }

    #[test]
    fn rejects_unknown_unit_string() {
        assert!(matches!(
            parse_to_grams(1.0, "ton"),
            Err(ShippingError::InvalidUnit(_))
        ));
        assert_eq!(parse_to_grams(1.5, "kg").unwrap(), 1500.0);
    }

    #[test]
    fn kilograms_round_trip_through_grams() {
        for kg in [0.0, 0.001, 1.25, 3.3, 17.0, 1234.567] {
            let back = from_grams(to_grams(kg, WeightUnit::Kg), WeightUnit::Kg);
            assert!((back - kg).abs() < 1e-9, "{kg} came back as {back}");
        }
    }

    #[test]
    fn rounds_up_to_multiples() {
        assert_eq!(round_amount(3203.56, RoundingMode::Nearest100), 3300.0);
        assert_eq!(round_amount(3203.56, RoundingMode::Nearest10), 3210.0);
        assert_eq!(round_amount(3203.56, RoundingMode::None), 3203.56);
        assert_eq!(round_amount(3203.56, RoundingMode::Nearest500), 3500.0);
        assert_eq!(round_amount(3203.56, RoundingMode::Nearest1000), 4000.0);
    }

    #[test]
    fn exact_multiples_are_kept() {
        assert_eq!(round_amount(3000.0, RoundingMode::Nearest100), 3000.0);
        assert_eq!(round_amount(0.0, RoundingMode::Nearest500), 0.0);
        // 0.1 * 3 carries float noise above 0.3
        assert_eq!(round_amount(0.1 * 3.0 * 1000.0, RoundingMode::Nearest100), 300.0);
    }

    #[test]
    fn parses_rounding_mode_settings() {
        assert_eq!("nearest_500".parse::<RoundingMode>().unwrap(), RoundingMode::Nearest500);
        assert_eq!("".parse::<RoundingMode>().unwrap(), RoundingMode::None);
        assert!("nearest_7".parse::<RoundingMode>().is_err());
    }
}
