//! Exchange rate feed used when a rate table is in automatic exchange mode.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use time::{macros::format_description, macros::offset, Date, OffsetDateTime};

use super::cache::ResponseCache;
use super::carrier::CarrierError;
use crate::domain::DEFAULT_CACHE_LIFETIME;
use crate::util::version::user_agent;
use crate::util::xml;

pub const DEFAULT_INDICATOR_URL: &str = "https://gee.bccr.fi.cr/Indicadores/Suscripciones/WS/wsindicadoreseconomicos.asmx/ObtenerIndicadoresEconomicosXML";
/// Reference sale rate of the US dollar.
pub const SALE_RATE_INDICATOR: &str = "318";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Colones per store currency unit.
#[async_trait]
pub trait ExchangeRateSource: Send + Sync {
    async fn current_rate(&self) -> Result<f64, CarrierError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorConfig {
    pub url: String,
    pub name: String,
    pub email: String,
    pub token: String,
    #[serde(default = "default_indicator")]
    pub indicator: String,
}

fn default_indicator() -> String {
    SALE_RATE_INDICATOR.to_string()
}

#[derive(Clone)]
pub struct BccrIndicatorClient {
    http: Client,
    url: Url,
    config: IndicatorConfig,
    rates: ResponseCache<Date, f64>,
}

impl BccrIndicatorClient {
    pub fn new(config: IndicatorConfig) -> Result<Self, CarrierError> {
        Self::with_cache_lifetime(config, DEFAULT_CACHE_LIFETIME)
    }

    pub fn with_cache_lifetime(
        config: IndicatorConfig,
        lifetime: Duration,
    ) -> Result<Self, CarrierError> {
        if config.email.trim().is_empty() {
            return Err(CarrierError::MissingCredentials("email"));
        }
        if config.token.trim().is_empty() {
            return Err(CarrierError::MissingCredentials("token"));
        }
        let url = Url::parse(&config.url)?;
        let http = Client::builder()
            .user_agent(user_agent())
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            url,
            config,
            rates: ResponseCache::new(lifetime),
        })
    }

    pub fn cache_lifetime(&self) -> Duration {
        self.rates.ttl()
    }

    fn request_url(&self, day: Date) -> Result<Url, CarrierError> {
        let date = format_day(day)?;
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair("Indicador", &self.config.indicator)
            .append_pair("FechaInicio", &date)
            .append_pair("FechaFinal", &date)
            .append_pair("Nombre", &self.config.name)
            .append_pair("SubNiveles", "N")
            .append_pair("CorreoElectronico", &self.config.email)
            .append_pair("Token", &self.config.token);
        Ok(url)
    }

    async fn fetch(&self, day: Date) -> Result<f64, CarrierError> {
        let url = self.request_url(day)?;
        tracing::debug!(indicator = %self.config.indicator, %day, "Fetching exchange rate");
        let body = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let rate = parse_rate(&body)?;
        tracing::info!(rate, "Exchange rate updated");
        Ok(rate)
    }
}

#[async_trait]
impl ExchangeRateSource for BccrIndicatorClient {
    async fn current_rate(&self) -> Result<f64, CarrierError> {
        let today = OffsetDateTime::now_utc().to_offset(offset!(-6)).date();
        let payload = self
            .rates
            .get_or_fetch(today, move || self.fetch(today))
            .await?;
        Ok(payload.data)
    }
}

fn format_day(day: Date) -> Result<String, CarrierError> {
    day.format(format_description!("[day]/[month]/[year]"))
        .map_err(|err| CarrierError::Decode(err.to_string()))
}

/// The service wraps the dataset in a string element, escaped, so the value
/// is read from the unescaped inner document when present.
fn parse_rate(body: &str) -> Result<f64, CarrierError> {
    let inner = xml::element_text(body, "string").unwrap_or_else(|| body.to_string());
    let raw = xml::element_text(&inner, "NUM_VALOR")
        .ok_or_else(|| CarrierError::Decode("indicator response carries no value".into()))?;
    let rate: f64 = raw
        .trim()
        .replace(',', ".")
        .parse()
        .map_err(|_| CarrierError::Decode(format!("invalid indicator value: {raw}")))?;
    if rate <= 0.0 || !rate.is_finite() {
        return Err(CarrierError::Decode(format!("invalid indicator value: {raw}")));
    }
    Ok(rate)
}
