use super::entities::RateRequest;
use super::rates::{DiscountMode, FreeShippingMode, FreeShippingRule};

/// Outcome of evaluating the free/discount shipping rule against a request.
#[derive(Clone, Debug, PartialEq)]
pub struct RuleOutcome {
    pub cost: f64,
    pub applied_rule: Option<String>,
}

/// `min_*` modes fire when the field reaches the threshold, `max_*` modes
/// while it stays at or below it.
pub fn rule_fires(rule: &FreeShippingRule, request: &RateRequest) -> bool {
    let items = f64::from(request.item_count);
    match rule.mode {
        FreeShippingMode::Disabled => false,
        FreeShippingMode::MinAmount => request.order_amount >= rule.threshold,
        FreeShippingMode::MinWeight => request.total_weight_grams >= rule.threshold,
        FreeShippingMode::MinItems => items >= rule.threshold,
        FreeShippingMode::MaxAmount => request.order_amount <= rule.threshold,
        FreeShippingMode::MaxWeight => request.total_weight_grams <= rule.threshold,
        FreeShippingMode::MaxItems => items <= rule.threshold,
    }
}

pub fn apply_discount(cost: f64, discount_mode: DiscountMode, value: f64) -> f64 {
    let discounted = match discount_mode {
        DiscountMode::Fixed => cost - value,
        DiscountMode::Percent => cost * (1.0 - value / 100.0),
    };
    discounted.max(0.0)
}

pub fn evaluate(rule: &FreeShippingRule, request: &RateRequest, cost: f64) -> RuleOutcome {
    if !rule_fires(rule, request) {
        return RuleOutcome {
            cost,
            applied_rule: None,
        };
    }

    let comparison = match rule.mode {
        FreeShippingMode::MaxAmount | FreeShippingMode::MaxWeight | FreeShippingMode::MaxItems => {
            "<="
        }
        _ => ">=",
    };
    let discount = match rule.discount_mode {
        DiscountMode::Fixed => format!("-{}", rule.discount_value),
        DiscountMode::Percent => format!("-{}%", rule.discount_value),
    };

    RuleOutcome {
        cost: apply_discount(cost, rule.discount_mode, rule.discount_value),
        applied_rule: Some(format!(
            "{} {comparison} {} ({discount})",
            rule.mode, rule.threshold
        )),
    }
}
