//! Entry point used by the host store.
//!
//! `ShippingService` wires the option store, the order store and the
//! carrier clients together. Quotes are pure computations over loaded
//! settings; guide actions are one carrier call each, persisted only when
//! the call succeeds.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::units::to_grams;
use crate::domain::{
    quote, Cart, CarrierVariant, ExchangeMode, GuideAction, GuideRecord, GuideState,
    OrderSummary, ProductInfo, QuoteResult, RateConfig, RateRequest, StoreSettings, ZoneResolver,
};
use crate::error::{Result, ShippingError};
use crate::infra::carrier::{CarrierClient, GuideDocument, Location, TrackingEvent};
use crate::infra::indicator::{BccrIndicatorClient, ExchangeRateSource, IndicatorConfig};
use crate::infra::legacy::{LegacyClient, LegacyConfig};
use crate::infra::options::{load_rate_config, load_store_settings, OptionStore};
use crate::infra::orders::OrderStore;
use crate::infra::pymexpress::{PymexpressClient, PymexpressConfig};
use crate::util::logging;

/// Web-service credentials the host holds for this store.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CarrierConfigs {
    #[serde(default)]
    pub pymexpress: Option<PymexpressConfig>,
    #[serde(default)]
    pub legacy: Option<LegacyConfig>,
    #[serde(default)]
    pub indicator: Option<IndicatorConfig>,
}

/// Clients built from `CarrierConfigs`, all sharing one cache lifetime.
pub struct CarrierClients {
    pub pymexpress: Option<PymexpressClient>,
    pub legacy: Option<LegacyClient>,
    pub indicator: Option<BccrIndicatorClient>,
}

impl CarrierConfigs {
    pub fn build(self, cache_lifetime: Duration) -> Result<CarrierClients> {
        Ok(CarrierClients {
            pymexpress: self
                .pymexpress
                .map(|config| PymexpressClient::with_cache_lifetime(config, cache_lifetime))
                .transpose()?,
            legacy: self
                .legacy
                .map(|config| LegacyClient::with_cache_lifetime(config, cache_lifetime))
                .transpose()?,
            indicator: self
                .indicator
                .map(|config| BccrIndicatorClient::with_cache_lifetime(config, cache_lifetime))
                .transpose()?,
        })
    }
}

/// Guide state as shown next to an order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GuideStatus {
    pub variant: CarrierVariant,
    pub state: GuideState,
    pub guide_number: Option<String>,
    pub response_code: Option<String>,
    pub actions: Vec<GuideAction>,
}

impl GuideStatus {
    fn new(variant: CarrierVariant, record: &GuideRecord) -> Self {
        let state = record.state();
        Self {
            variant,
            state,
            guide_number: record.guide_number.clone(),
            response_code: record.response_code.clone(),
            actions: state.allowed_actions().to_vec(),
        }
    }
}

/// One shipping option offered at checkout.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AvailableRate {
    pub variant: CarrierVariant,
    pub quote: QuoteResult,
    pub requires_iva: bool,
}

pub struct ShippingService {
    options: Arc<dyn OptionStore>,
    orders: Arc<dyn OrderStore>,
    carriers: HashMap<CarrierVariant, Arc<dyn CarrierClient>>,
    exchange: Option<Arc<dyn ExchangeRateSource>>,
    zones: ZoneResolver,
}

impl ShippingService {
    pub fn new(options: Arc<dyn OptionStore>, orders: Arc<dyn OrderStore>) -> Self {
        Self {
            options,
            orders,
            carriers: HashMap::new(),
            exchange: None,
            zones: ZoneResolver::default(),
        }
    }

    /// Registers a carrier client under the variant it reports.
    pub fn with_carrier(mut self, client: Arc<dyn CarrierClient>) -> Self {
        self.carriers.insert(client.variant(), client);
        self
    }

    pub fn with_exchange_source(mut self, source: Arc<dyn ExchangeRateSource>) -> Self {
        self.exchange = Some(source);
        self
    }

    pub fn with_zone_resolver(mut self, zones: ZoneResolver) -> Self {
        self.zones = zones;
        self
    }

    /// Applies the store settings: logging at the store's debug level and
    /// carrier clients caching for the store's cache lifetime.
    pub fn connect(mut self, configs: CarrierConfigs) -> Result<Self> {
        let settings = self.settings()?;
        logging::init(settings.debug);

        let clients = configs.build(settings.cache_lifetime)?;
        if let Some(client) = clients.pymexpress {
            self = self.with_carrier(Arc::new(client));
        }
        if let Some(client) = clients.legacy {
            self = self.with_carrier(Arc::new(client));
        }
        if let Some(client) = clients.indicator {
            self = self.with_exchange_source(Arc::new(client));
        }

        tracing::info!(
            carriers = self.carriers.len(),
            exchange_feed = self.exchange.is_some(),
            cache_lifetime_secs = settings.cache_lifetime.as_secs(),
            debug = settings.debug,
            "Shipping service connected"
        );
        Ok(self)
    }

    /// Carrier a guide action applies to when the caller names none: the
    /// only active carrier that issues guides.
    pub fn guide_variant(&self, requested: Option<CarrierVariant>) -> Result<CarrierVariant> {
        if let Some(variant) = requested {
            return Ok(variant);
        }
        let issuing: Vec<_> = self
            .settings()?
            .provider
            .active()
            .into_iter()
            .filter(|variant| variant.issues_guides())
            .collect();
        match issuing.as_slice() {
            [variant] => Ok(*variant),
            [] => Err(ShippingError::Validation(
                "no active carrier issues guides".into(),
            )),
            _ => Err(ShippingError::Validation(
                "several carriers are active, name one".into(),
            )),
        }
    }

    pub fn settings(&self) -> Result<StoreSettings> {
        load_store_settings(self.options.as_ref())
    }

    /// Quote for one active carrier and one shipping-method instance.
    pub async fn quote(
        &self,
        variant: CarrierVariant,
        box_id: &str,
        cart: &Cart,
    ) -> Result<QuoteResult> {
        let settings = self.settings()?;
        if !settings.provider.is_active(variant) {
            return Err(ShippingError::InactiveCarrier(variant));
        }
        let (request, config) = self.prepare(&settings, variant, box_id, cart).await?;
        quote(&request, &config)
    }

    /// Quotes every active carrier. A carrier that cannot quote is left out.
    pub async fn available_rates(&self, box_id: &str, cart: &Cart) -> Result<Vec<AvailableRate>> {
        let settings = self.settings()?;
        let mut rates = Vec::new();
        for variant in settings.provider.active() {
            let prepared = self.prepare(&settings, variant, box_id, cart).await;
            match prepared.and_then(|(request, config)| {
                quote(&request, &config).map(|quote| (quote, config.requires_iva))
            }) {
                Ok((quote, requires_iva)) => rates.push(AvailableRate {
                    variant,
                    quote,
                    requires_iva,
                }),
                Err(err) => {
                    tracing::debug!(%variant, error = %err, kind = ?err.kind(), "Shipping option hidden");
                }
            }
        }
        Ok(rates)
    }

    async fn prepare(
        &self,
        settings: &StoreSettings,
        variant: CarrierVariant,
        box_id: &str,
        cart: &Cart,
    ) -> Result<(RateRequest, RateConfig)> {
        let request = self.rate_request(settings, variant, cart)?;
        let config = load_rate_config(self.options.as_ref(), variant, box_id)?;
        let config = self.resolve_exchange(config).await?;
        Ok((request, config))
    }

    fn rate_request(
        &self,
        settings: &StoreSettings,
        variant: CarrierVariant,
        cart: &Cart,
    ) -> Result<RateRequest> {
        let mut total_weight_grams = 0.0;
        let mut order_amount = 0.0;
        let mut item_count = 0u32;
        for line in &cart.lines {
            if !line.weight.is_finite() || line.weight < 0.0 {
                return Err(ShippingError::Validation(format!(
                    "cart line weight must be non-negative, got {}",
                    line.weight
                )));
            }
            total_weight_grams += to_grams(line.weight, settings.weight_unit) * f64::from(line.quantity);
            order_amount += line.line_total;
            item_count = item_count.saturating_add(line.quantity);
        }

        Ok(RateRequest {
            total_weight_grams,
            order_amount,
            item_count,
            destination_zone: self.zones.resolve(&cart.destination, variant)?,
            carrier_variant: variant,
        })
    }

    /// Automatic mode reads today's rate from the indicator feed and falls
    /// back to the manual rate when the feed is down.
    async fn resolve_exchange(&self, config: RateConfig) -> Result<RateConfig> {
        if !config.exchange.enabled || config.exchange.mode != ExchangeMode::Automatic {
            return Ok(config);
        }
        let Some(source) = &self.exchange else {
            return Ok(config);
        };
        match source.current_rate().await {
            Ok(rate) => Ok(config.with_exchange_rate(rate)),
            Err(err) if config.exchange.rate > 0.0 => {
                tracing::warn!(error = %err, fallback = config.exchange.rate, "Exchange feed unavailable, using manual rate");
                Ok(config)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn carrier(&self, variant: CarrierVariant) -> Result<&Arc<dyn CarrierClient>> {
        if !variant.issues_guides() {
            return Err(ShippingError::Validation(format!(
                "{variant} does not issue guides"
            )));
        }
        self.carriers
            .get(&variant)
            .ok_or(ShippingError::InactiveCarrier(variant))
    }

    fn order(&self, order_id: u64) -> Result<OrderSummary> {
        self.orders
            .order(order_id)?
            .ok_or(ShippingError::OrderNotFound(order_id))
    }

    fn record(&self, order_id: u64, variant: CarrierVariant) -> Result<GuideRecord> {
        let mut failure = None;
        let record = GuideRecord::from_meta(variant, |key| {
            match self.orders.meta(order_id, key) {
                Ok(value) => value,
                Err(err) => {
                    failure.get_or_insert(err);
                    None
                }
            }
        });
        match failure {
            Some(err) => Err(err),
            None => Ok(record),
        }
    }

    pub fn guide_status(&self, order_id: u64, variant: CarrierVariant) -> Result<GuideStatus> {
        let record = self.record(order_id, variant)?;
        Ok(GuideStatus::new(variant, &record))
    }

    /// Asks the carrier for a guide number and registers the shipment.
    pub async fn request_guide(&self, order_id: u64, variant: CarrierVariant) -> Result<GuideStatus> {
        let client = self.carrier(variant)?;
        let order = self.order(order_id)?;
        if !order.ships_with(variant) {
            return Err(ShippingError::Validation(format!(
                "order {order_id} does not ship with {variant}"
            )));
        }
        let record = self.record(order_id, variant)?;
        record.check(GuideAction::Request)?;

        let response = client.request_guide(&order).await?;
        let updated = record.with_response(
            &response.guide_number,
            response.response_code.as_deref(),
            OffsetDateTime::now_utc(),
        );
        self.orders.set_meta(order_id, &updated.to_meta(variant))?;

        let status = GuideStatus::new(variant, &updated);
        tracing::info!(order_id, %variant, state = %status.state, "Guide requested");
        Ok(status)
    }

    /// Retries the registration of a guide the carrier refused.
    pub async fn register_guide(
        &self,
        order_id: u64,
        variant: CarrierVariant,
    ) -> Result<GuideStatus> {
        let client = self.carrier(variant)?;
        let order = self.order(order_id)?;
        let record = self.record(order_id, variant)?;
        record.check(GuideAction::Register)?;
        let guide_number = record.guide_number.clone().unwrap_or_default();

        let response = client.register_guide(&order, &guide_number).await?;
        let updated = record.with_response(
            &response.guide_number,
            response.response_code.as_deref(),
            OffsetDateTime::now_utc(),
        );
        self.orders.set_meta(order_id, &updated.to_meta(variant))?;

        let status = GuideStatus::new(variant, &updated);
        tracing::info!(order_id, %variant, state = %status.state, "Guide registered");
        Ok(status)
    }

    pub async fn download_pdf(
        &self,
        order_id: u64,
        variant: CarrierVariant,
    ) -> Result<GuideDocument> {
        let client = self.carrier(variant)?;
        let record = self.record(order_id, variant)?;
        record.check(GuideAction::Download)?;
        let guide_number = record.guide_number.unwrap_or_default();
        Ok(client.guide_pdf(&guide_number).await?)
    }

    pub async fn tracking(
        &self,
        order_id: u64,
        variant: CarrierVariant,
    ) -> Result<Vec<TrackingEvent>> {
        let client = self.carrier(variant)?;
        let record = self.record(order_id, variant)?;
        let guide_number = record.guide_number.ok_or_else(|| {
            ShippingError::Validation(format!("order {order_id} has no {variant} guide"))
        })?;
        Ok(client.tracking(&guide_number).await?)
    }

    /// Client used for address lookups; Pymexpress first, then the legacy service.
    fn location_client(&self) -> Result<&Arc<dyn CarrierClient>> {
        [CarrierVariant::Pymexpress, CarrierVariant::Ccr]
            .iter()
            .find_map(|variant| self.carriers.get(variant))
            .ok_or(ShippingError::InactiveCarrier(CarrierVariant::Pymexpress))
    }

    pub async fn cantons(&self, province: &str) -> Result<Vec<Location>> {
        let province = province.trim();
        if province.is_empty() {
            return Err(ShippingError::Validation("province is required".into()));
        }
        Ok(self.location_client()?.cantons(province).await?)
    }

    pub async fn districts(&self, province: &str, canton: &str) -> Result<Vec<Location>> {
        let (province, canton) = (province.trim(), canton.trim());
        if province.is_empty() || canton.is_empty() {
            return Err(ShippingError::Validation(
                "province and canton are required".into(),
            ));
        }
        Ok(self.location_client()?.districts(province, canton).await?)
    }

    /// Products and variations whose weight is missing or zero; quotes for
    /// carts holding them come out too low.
    pub fn products_information(&self) -> Result<Vec<ProductInfo>> {
        Ok(self
            .orders
            .products()?
            .into_iter()
            .filter(|product| product.weight.map_or(true, |weight| weight <= 0.0))
            .collect())
    }
}
