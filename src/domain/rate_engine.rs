//! Shipping quote pipeline.
//!
//! Stages run in a fixed order: base cost, exchange conversion, minimum
//! floor, free/discount rule, packing cost and rounding.

use super::entities::{DestinationZone, QuoteResult, RateRequest};
use super::free_shipping;
use super::rates::RateConfig;
use super::units::{from_grams, round_amount};
use crate::error::{Result, ShippingError};

pub fn quote(request: &RateRequest, config: &RateConfig) -> Result<QuoteResult> {
    request.validate()?;

    let carrier_cost = base_cost(request, config)?;
    let base_cost = convert_currency(carrier_cost, config)?;

    let after_minimum = if config.minimum_amounts.enabled {
        apply_minimum(
            base_cost,
            config.minimum_amounts.for_zone(request.destination_zone),
        )
    } else {
        base_cost
    };

    let outcome = free_shipping::evaluate(&config.free_shipping_rule, request, after_minimum);
    let after_discount = outcome.cost;

    let packed = after_discount + config.packing_cost.filter(|c| *c > 0.0).unwrap_or(0.0);
    let final_cost = round_amount(packed, config.rounding_mode).max(0.0);

    tracing::debug!(
        variant = %request.carrier_variant,
        zone = %request.destination_zone,
        base_cost,
        after_minimum,
        after_discount,
        final_cost,
        "Computed shipping quote"
    );

    Ok(QuoteResult {
        base_cost,
        after_minimum,
        after_discount,
        final_cost,
        applied_rule: outcome.applied_rule,
    })
}

/// Cost in carrier currency before any adjustment.
fn base_cost(request: &RateRequest, config: &RateConfig) -> Result<f64> {
    if !config.has_any_rate() {
        return Err(ShippingError::MissingRateConfig(request.carrier_variant));
    }

    if let Some(fixed) = config.fixed_rates.as_ref().filter(|f| f.enabled) {
        if let Some(rate) = fixed.rate_for(request.destination_zone) {
            return Ok(rate);
        }
        if request.destination_zone == DestinationZone::International
            && !request.carrier_variant.ships_internationally()
        {
            return Err(ShippingError::InvalidZone(format!(
                "{} does not ship to international destinations",
                request.carrier_variant
            )));
        }
    }

    let rates: Vec<_> = config
        .per_unit_rates
        .iter()
        .filter(|(_, rate)| **rate > 0.0)
        .collect();
    if rates.is_empty() {
        return Err(ShippingError::MissingRateConfig(request.carrier_variant));
    }

    Ok(rates
        .into_iter()
        .map(|(unit, rate)| rate * from_grams(request.total_weight_grams, *unit))
        .sum())
}

fn convert_currency(amount: f64, config: &RateConfig) -> Result<f64> {
    if !config.exchange.enabled {
        return Ok(amount);
    }
    let rate = config.exchange.rate;
    if !rate.is_finite() || rate <= 0.0 {
        return Err(ShippingError::InvalidSetting {
            key: "exchange_rate".to_string(),
            value: rate.to_string(),
        });
    }
    Ok(amount / rate)
}

pub fn apply_minimum(cost: f64, minimum: Option<f64>) -> f64 {
    minimum.map_or(cost, |minimum| cost.max(minimum))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::domain::entities::{CarrierVariant, WeightUnit};
    use crate::domain::rates::{
        DiscountMode, ExchangeSettings, FixedRates, FreeShippingMode, FreeShippingRule,
        MinimumAmounts, MinimumScope,
    };
    use crate::domain::units::{to_grams, RoundingMode};

    fn request(grams: f64, amount: f64, zone: DestinationZone) -> RateRequest {
        RateRequest {
            total_weight_grams: grams,
            order_amount: amount,
            item_count: 1,
            destination_zone: zone,
            carrier_variant: CarrierVariant::Simple,
        }
    }

    fn kg_config(rate: f64, rounding_mode: RoundingMode) -> RateConfig {
        RateConfig {
            rounding_mode,
            ..RateConfig::default()
        }
        .with_unit_rate(WeightUnit::Kg, rate)
    }

    #[test]
    fn kg_rate_scenario_with_minimum() {
        let mut config = kg_config(1500.0, RoundingMode::Nearest100);
        config.minimum_amounts = MinimumAmounts {
            enabled: true,
            amounts: BTreeMap::from([(MinimumScope::InsideGam, 2000.0)]),
        };

        let result = quote(
            &request(2000.0, 10_000.0, DestinationZone::InsideGam),
            &config,
        )
        .unwrap();

        assert_eq!(result.base_cost, 3000.0);
        assert_eq!(result.after_minimum, 3000.0);
        assert_eq!(result.after_discount, 3000.0);
        assert_eq!(result.final_cost, 3000.0);
        assert_eq!(result.applied_rule, None);
    }

    #[test]
    fn kg_only_quote_matches_closed_form() {
        let rate = 1375.0;
        for mode in [
            RoundingMode::None,
            RoundingMode::Nearest10,
            RoundingMode::Nearest100,
            RoundingMode::Nearest1000,
        ] {
            let config = kg_config(rate, mode);
            for grams in [0.0, 1.0, 250.0, 999.0, 2000.0, 7321.5] {
                let result =
                    quote(&request(grams, 1.0, DestinationZone::OutsideGam), &config).unwrap();
                assert_eq!(result.final_cost, round_amount(rate * (grams / 1000.0), mode));
            }
        }
    }

    #[test]
    fn unit_rates_are_additive() {
        let config = RateConfig::default()
            .with_unit_rate(WeightUnit::Kg, 1000.0)
            .with_unit_rate(WeightUnit::G, 0.5)
            .with_unit_rate(WeightUnit::Lb, 0.0);
        let grams = to_grams(2.0, WeightUnit::Kg);
        let result = quote(&request(grams, 0.0, DestinationZone::InsideGam), &config).unwrap();
        assert_eq!(result.base_cost, 2000.0 + 1000.0);
    }

    #[test]
    fn refuses_to_quote_without_rates() {
        let err = quote(
            &request(1000.0, 1000.0, DestinationZone::InsideGam),
            &RateConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ShippingError::MissingRateConfig(CarrierVariant::Simple)
        ));
    }

    #[test]
    fn fixed_rates_select_by_zone() {
        let config = RateConfig {
            fixed_rates: Some(FixedRates {
                enabled: true,
                by_zone: BTreeMap::from([
                    (DestinationZone::InsideGam, 2500.0),
                    (DestinationZone::OutsideGam, 3500.0),
                ]),
                fallback: Some(9000.0),
            }),
            ..RateConfig::default()
        };
        let inside = quote(&request(9000.0, 0.0, DestinationZone::InsideGam), &config).unwrap();
        let outside = quote(&request(10.0, 0.0, DestinationZone::OutsideGam), &config).unwrap();
        let abroad = quote(&request(10.0, 0.0, DestinationZone::International), &config).unwrap();
        assert_eq!(inside.final_cost, 2500.0);
        assert_eq!(outside.final_cost, 3500.0);
        assert_eq!(abroad.final_cost, 9000.0);
    }

    #[test]
    fn pymexpress_rejects_international_without_fixed_rate() {
        let config = RateConfig {
            fixed_rates: Some(FixedRates {
                enabled: true,
                by_zone: BTreeMap::from([(DestinationZone::InsideGam, 2500.0)]),
                fallback: None,
            }),
            ..RateConfig::default()
        }
        .with_unit_rate(WeightUnit::Kg, 1000.0);
        let mut req = request(1000.0, 0.0, DestinationZone::International);
        req.carrier_variant = CarrierVariant::Pymexpress;
        assert!(matches!(
            quote(&req, &config),
            Err(ShippingError::InvalidZone(_))
        ));

        // Other variants fall through to the weight rates.
        req.carrier_variant = CarrierVariant::Ccr;
        assert_eq!(quote(&req, &config).unwrap().base_cost, 1000.0);
    }

    #[test]
    fn exchange_divides_by_rate() {
        let mut config = kg_config(10.0, RoundingMode::None);
        config.exchange = ExchangeSettings {
            enabled: true,
            rate: 0.5,
            ..ExchangeSettings::default()
        };
        let result = quote(&request(1000.0, 0.0, DestinationZone::InsideGam), &config).unwrap();
        assert_eq!(result.base_cost, 20.0);

        config.exchange.rate = 0.0;
        assert!(matches!(
            quote(&request(1000.0, 0.0, DestinationZone::InsideGam), &config),
            Err(ShippingError::InvalidSetting { .. })
        ));
    }

    #[test]
    fn free_shipping_above_threshold() {
        let mut config = kg_config(1500.0, RoundingMode::Nearest100);
        config.free_shipping_rule = FreeShippingRule::free_above_amount(50_000.0);

        let free = quote(&request(2000.0, 50_000.0, DestinationZone::InsideGam), &config).unwrap();
        assert_eq!(free.final_cost, 0.0);
        assert!(free.applied_rule.is_some());

        let paid = quote(&request(2000.0, 49_999.0, DestinationZone::InsideGam), &config).unwrap();
        assert_eq!(paid.final_cost, paid.base_cost);
        assert_eq!(paid.applied_rule, None);
    }

    #[test]
    fn packing_cost_added_after_discount_before_rounding() {
        let mut config = kg_config(1000.0, RoundingMode::Nearest100);
        config.free_shipping_rule = FreeShippingRule {
            mode: FreeShippingMode::MinItems,
            threshold: 1.0,
            discount_mode: DiscountMode::Fixed,
            discount_value: 5000.0,
        };
        config.packing_cost = Some(250.0);
        let result = quote(&request(1000.0, 0.0, DestinationZone::InsideGam), &config).unwrap();
        assert_eq!(result.after_discount, 0.0);
        assert_eq!(result.final_cost, 300.0);
    }

    #[test]
    fn minimum_floor_is_idempotent() {
        for (base, minimum) in [(100.0, 2000.0), (3000.0, 2000.0), (0.0, 0.0)] {
            let once = apply_minimum(base, Some(minimum));
            assert_eq!(apply_minimum(once, Some(minimum)), once);
        }
        assert_eq!(apply_minimum(1234.0, None), 1234.0);
    }
}
