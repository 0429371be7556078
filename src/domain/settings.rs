use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::entities::{CarrierVariant, WeightUnit};

pub const DEFAULT_CACHE_LIFETIME: Duration = Duration::from_secs(60);

/// Which carriers the store quotes with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderSelection {
    Single(CarrierVariant),
    /// PRO stores may run several carriers side by side.
    Multiple(Vec<CarrierVariant>),
}

impl Default for ProviderSelection {
    fn default() -> Self {
        Self::Single(CarrierVariant::Simple)
    }
}

impl ProviderSelection {
    /// Picks the selection allowed for the license: without PRO only the
    /// single `provider` setting counts.
    pub fn from_settings(
        provider: CarrierVariant,
        providers: Vec<CarrierVariant>,
        pro: bool,
    ) -> Self {
        if pro && !providers.is_empty() {
            let mut unique = Vec::with_capacity(providers.len());
            for variant in providers {
                if !unique.contains(&variant) {
                    unique.push(variant);
                }
            }
            Self::Multiple(unique)
        } else {
            Self::Single(provider)
        }
    }

    pub fn active(&self) -> Vec<CarrierVariant> {
        match self {
            Self::Single(variant) => vec![*variant],
            Self::Multiple(variants) => variants.clone(),
        }
    }

    pub fn is_active(&self, variant: CarrierVariant) -> bool {
        match self {
            Self::Single(active) => *active == variant,
            Self::Multiple(variants) => variants.contains(&variant),
        }
    }
}

/// Store-wide settings shared by every carrier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreSettings {
    pub provider: ProviderSelection,
    /// Unit the store records product weights in.
    pub weight_unit: WeightUnit,
    pub debug: bool,
    #[serde(with = "duration_secs")]
    pub cache_lifetime: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            provider: ProviderSelection::default(),
            weight_unit: WeightUnit::Kg,
            debug: false,
            cache_lifetime: DEFAULT_CACHE_LIFETIME,
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_provider_without_pro() {
        let selection = ProviderSelection::from_settings(
            CarrierVariant::Pymexpress,
            vec![CarrierVariant::Ccr, CarrierVariant::Simple],
            false,
        );
        assert_eq!(selection.active(), vec![CarrierVariant::Pymexpress]);
        assert!(!selection.is_active(CarrierVariant::Ccr));
    }

    #[test]
    fn pro_allows_several_carriers() {
        let selection = ProviderSelection::from_settings(
            CarrierVariant::Simple,
            vec![
                CarrierVariant::Ccr,
                CarrierVariant::Pymexpress,
                CarrierVariant::Ccr,
            ],
            true,
        );
        assert_eq!(
            selection.active(),
            vec![CarrierVariant::Ccr, CarrierVariant::Pymexpress]
        );
        assert!(!selection.is_active(CarrierVariant::Simple));
    }
}
