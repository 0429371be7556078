//! Client for the carrier's Pymexpress REST service.
//!
//! - Authenticates with username/password and reuses the bearer token for
//!   the cache lifetime.
//! - Caches canton and district lookups the same way.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::cache::ResponseCache;
use super::carrier::{
    AuthToken, CarrierClient, CarrierError, GuideDocument, GuideResponse, Location, Sender,
    TrackingEvent,
};
use crate::domain::guide::is_accepted_code;
use crate::domain::{CarrierVariant, OrderSummary, DEFAULT_CACHE_LIFETIME};
use crate::util::version::user_agent;

pub const DEFAULT_AUTH_URL: &str = "https://servicios.correos.go.cr:442/Token/authenticate";
pub const DEFAULT_BASE_URL: &str = "https://servicios.correos.go.cr:447/";
const SYSTEM_NAME: &str = "PYMEXPRESS";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PymexpressConfig {
    pub auth_url: String,
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub user_id: String,
    pub service_id: String,
    pub client_code: String,
    pub sender: Sender,
}

impl PymexpressConfig {
    fn validate(&self) -> Result<(), CarrierError> {
        if self.username.trim().is_empty() {
            return Err(CarrierError::MissingCredentials("username"));
        }
        if self.password.is_empty() {
            return Err(CarrierError::MissingCredentials("password"));
        }
        if self.client_code.trim().is_empty() {
            return Err(CarrierError::MissingCredentials("client_code"));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct PymexpressClient {
    http: Client,
    auth_url: Url,
    base_url: Url,
    config: PymexpressConfig,
    tokens: ResponseCache<&'static str, AuthToken>,
    locations: ResponseCache<String, Vec<Location>>,
}

impl PymexpressClient {
    pub fn new(config: PymexpressConfig) -> Result<Self, CarrierError> {
        Self::with_cache_lifetime(config, DEFAULT_CACHE_LIFETIME)
    }

    pub fn with_cache_lifetime(
        config: PymexpressConfig,
        lifetime: Duration,
    ) -> Result<Self, CarrierError> {
        config.validate()?;
        let auth_url = Url::parse(&config.auth_url)?;
        let base_url = Url::parse(&config.base_url)?;
        let http = Client::builder()
            .user_agent(user_agent())
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            auth_url,
            base_url,
            config,
            tokens: ResponseCache::new(lifetime),
            locations: ResponseCache::new(lifetime),
        })
    }

    pub fn cache_lifetime(&self) -> Duration {
        self.tokens.ttl()
    }

    async fn token(&self) -> Result<String, CarrierError> {
        let payload = self
            .tokens
            .get_or_fetch("token", move || self.fetch_token())
            .await?;
        Ok(payload.data.value)
    }

    async fn fetch_token(&self) -> Result<AuthToken, CarrierError> {
        tracing::debug!(url = %self.auth_url, "Requesting Pymexpress token");
        let body = TokenRequest {
            username: &self.config.username,
            password: &self.config.password,
            system: SYSTEM_NAME,
        };
        let response = self
            .http
            .post(self.auth_url.clone())
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let text = response.text().await?;
        let value = parse_token(&text)?;
        Ok(AuthToken {
            value,
            issued_at: SystemTime::now(),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, CarrierError> {
        let mut url = self.base_url.join(path)?;
        url.query_pairs_mut().extend_pairs(query);
        let token = self.token().await?;
        tracing::debug!(%url, "Pymexpress GET");
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, CarrierError> {
        let url = self.base_url.join(path)?;
        let token = self.token().await?;
        tracing::debug!(%url, "Pymexpress POST");
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn locations(
        &self,
        cache_key: String,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<Location>, CarrierError> {
        let fetch = self.get::<LocationsResponse>(path, query);
        let payload = self
            .locations
            .get_or_fetch(cache_key, move || async move { fetch.await?.into_locations() })
            .await?;
        Ok(payload.data)
    }

    async fn register(
        &self,
        order: &OrderSummary,
        guide_number: &str,
    ) -> Result<GuideResponse, CarrierError> {
        let body = RegisterRequest::new(&self.config, order, guide_number);
        let response: Envelope = self.post("api/Envio/Registro", &body).await?;
        tracing::info!(
            order_id = order.id,
            guide_number,
            code = response.code.as_deref().unwrap_or("-"),
            "Pymexpress shipment registered"
        );
        Ok(GuideResponse {
            guide_number: guide_number.to_string(),
            response_code: response.code,
            message: response.message,
        })
    }
}

#[async_trait]
impl CarrierClient for PymexpressClient {
    fn variant(&self) -> CarrierVariant {
        CarrierVariant::Pymexpress
    }

    async fn authenticate(&self) -> Result<AuthToken, CarrierError> {
        let payload = self
            .tokens
            .get_or_fetch("token", move || self.fetch_token())
            .await?;
        Ok(payload.data)
    }

    async fn cantons(&self, province: &str) -> Result<Vec<Location>, CarrierError> {
        self.locations(
            format!("cantons:{province}"),
            "api/Localizacion/Cantones",
            &[("CodProvincia", province)],
        )
        .await
    }

    async fn districts(
        &self,
        province: &str,
        canton: &str,
    ) -> Result<Vec<Location>, CarrierError> {
        self.locations(
            format!("districts:{province}:{canton}"),
            "api/Localizacion/Distritos",
            &[("CodProvincia", province), ("CodCanton", canton)],
        )
        .await
    }

    async fn request_guide(&self, order: &OrderSummary) -> Result<GuideResponse, CarrierError> {
        let response: GuideNumberResponse = self
            .post("api/Envio/GenerarGuia", &serde_json::json!({}))
            .await?;
        if let Some(refusal) = response.refusal() {
            tracing::warn!(
                order_id = order.id,
                code = refusal.response_code.as_deref().unwrap_or("-"),
                "Pymexpress refused the guide request"
            );
            return Ok(refusal);
        }
        let guide_number = response.guide_number()?;
        tracing::info!(order_id = order.id, %guide_number, "Pymexpress guide number issued");
        self.register(order, &guide_number).await
    }

    async fn register_guide(
        &self,
        order: &OrderSummary,
        guide_number: &str,
    ) -> Result<GuideResponse, CarrierError> {
        self.register(order, guide_number).await
    }

    async fn guide_pdf(&self, guide_number: &str) -> Result<GuideDocument, CarrierError> {
        let response: PdfResponse = self
            .get("api/Envio/Guia", &[("NumeroEnvio", guide_number)])
            .await?;
        response.envelope.ensure_accepted()?;
        let pdf_base64 = response
            .pdf
            .filter(|pdf| !pdf.is_empty())
            .ok_or_else(|| CarrierError::Decode("response carries no PDF".into()))?;
        Ok(GuideDocument {
            guide_number: guide_number.to_string(),
            pdf_base64,
        })
    }

    async fn tracking(&self, guide_number: &str) -> Result<Vec<TrackingEvent>, CarrierError> {
        let response: TrackingResponse = self
            .get("api/Envio/Tracking", &[("NumeroEnvio", guide_number)])
            .await?;
        response.envelope.ensure_accepted()?;
        Ok(response
            .events
            .into_iter()
            .map(|event| TrackingEvent {
                date: event.date,
                description: event.description,
                location: event.unit,
            })
            .collect())
    }
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    #[serde(rename = "Username")]
    username: &'a str,
    #[serde(rename = "Password")]
    password: &'a str,
    #[serde(rename = "Sistema")]
    system: &'a str,
}

/// The token endpoint answers with a bare string, a JSON string, or an
/// object carrying it.
fn parse_token(body: &str) -> Result<String, CarrierError> {
    let body = body.trim();
    let token = match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::String(token)) => token,
        Ok(serde_json::Value::Object(map)) => ["token", "Token", "access_token"]
            .iter()
            .find_map(|key| map.get(*key).and_then(|v| v.as_str()))
            .map(str::to_string)
            .ok_or_else(|| CarrierError::Decode("token missing from response".into()))?,
        _ => body.to_string(),
    };
    if token.is_empty() {
        return Err(CarrierError::Decode("empty token".into()));
    }
    Ok(token)
}

#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(rename = "Cod_Respuesta", default, deserialize_with = "optional_code")]
    code: Option<String>,
    #[serde(rename = "Mensaje_Respuesta", default)]
    message: Option<String>,
}

impl Envelope {
    fn ensure_accepted(&self) -> Result<(), CarrierError> {
        match self.code.as_deref() {
            None => Ok(()),
            Some(code) if is_accepted_code(code) => Ok(()),
            Some(code) => Err(CarrierError::Api(format!(
                "{code}: {}",
                self.message.as_deref().unwrap_or("request refused")
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GuideNumberResponse {
    #[serde(flatten)]
    envelope: Envelope,
    #[serde(rename = "NumeroEnvio", default)]
    number: Option<String>,
}

impl GuideNumberResponse {
    /// A refused request is a carrier answer, not a transport failure.
    fn refusal(&self) -> Option<GuideResponse> {
        let code = self.envelope.code.as_deref()?;
        if is_accepted_code(code) {
            return None;
        }
        Some(GuideResponse {
            guide_number: self
                .number
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
            response_code: Some(code.to_string()),
            message: self.envelope.message.clone(),
        })
    }

    fn guide_number(self) -> Result<String, CarrierError> {
        self.envelope.ensure_accepted()?;
        self.number
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| CarrierError::Decode("response carries no guide number".into()))
    }
}

#[derive(Debug, Deserialize)]
struct LocationsResponse {
    #[serde(flatten)]
    envelope: Envelope,
    #[serde(alias = "Cantones", alias = "Distritos", default)]
    items: Vec<LocationDto>,
}

impl LocationsResponse {
    fn into_locations(self) -> Result<Vec<Location>, CarrierError> {
        self.envelope.ensure_accepted()?;
        Ok(self.items.into_iter().map(Location::from).collect())
    }
}

#[derive(Debug, Deserialize)]
struct LocationDto {
    #[serde(alias = "Codigo", deserialize_with = "string_from_json")]
    code: String,
    #[serde(alias = "Descripcion", alias = "Nombre")]
    name: String,
}

impl From<LocationDto> for Location {
    fn from(dto: LocationDto) -> Self {
        Self {
            code: dto.code,
            name: dto.name.trim().to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PdfResponse {
    #[serde(flatten)]
    envelope: Envelope,
    #[serde(rename = "PDF", default)]
    pdf: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrackingResponse {
    #[serde(flatten)]
    envelope: Envelope,
    #[serde(rename = "Eventos", default)]
    events: Vec<TrackingEventDto>,
}

#[derive(Debug, Deserialize)]
struct TrackingEventDto {
    #[serde(rename = "Fecha_Hora", alias = "Fecha")]
    date: String,
    #[serde(rename = "Evento")]
    description: String,
    #[serde(rename = "Unidad", default)]
    unit: Option<String>,
}

#[derive(Debug, Serialize)]
struct RegisterRequest {
    #[serde(rename = "Cliente")]
    client_code: String,
    #[serde(rename = "Envio")]
    shipment: ShipmentDto,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct ShipmentDto {
    dest_apartado: String,
    dest_direccion: String,
    dest_nombre: String,
    dest_telefono: String,
    dest_zip: String,
    envio_id: String,
    id_distrito_destino: String,
    monto_flete: f64,
    observaciones: String,
    peso: f64,
    send_direccion: String,
    send_nombre: String,
    send_telefono: String,
    send_zip: String,
    servicio: String,
    usuario_id: String,
}

impl RegisterRequest {
    fn new(config: &PymexpressConfig, order: &OrderSummary, guide_number: &str) -> Self {
        let recipient = &order.recipient;
        Self {
            client_code: config.client_code.clone(),
            shipment: ShipmentDto {
                dest_apartado: String::new(),
                dest_direccion: recipient.address.clone(),
                dest_nombre: recipient.name.clone(),
                dest_telefono: recipient.phone.clone(),
                dest_zip: recipient.postal_code.clone(),
                envio_id: guide_number.to_string(),
                id_distrito_destino: format!(
                    "{}{}{}",
                    recipient.province, recipient.canton, recipient.district
                ),
                monto_flete: order.amount,
                observaciones: order.note.clone().unwrap_or_default(),
                peso: order.total_weight_grams.max(1.0),
                send_direccion: config.sender.address.clone(),
                send_nombre: config.sender.name.clone(),
                send_telefono: config.sender.phone.clone(),
                send_zip: config.sender.postal_code.clone(),
                servicio: config.service_id.clone(),
                usuario_id: config.user_id.clone(),
            },
        }
    }
}

fn optional_code<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(serde_json::Value::Number(n)) => Some(
            n.as_u64()
                .map(|code| format!("{code:02}"))
                .unwrap_or_else(|| n.to_string()),
        ),
        _ => None,
    })
}

fn string_from_json<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct StringOrNumber;

    impl<'de> serde::de::Visitor<'de> for StringOrNumber {
        type Value = String;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or number")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.trim().to_string())
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(format!("{value:02}"))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(format!("{value:02}"))
        }
    }

    deserializer.deserialize_any(StringOrNumber)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Recipient;

    fn config() -> PymexpressConfig {
        PymexpressConfig {
            auth_url: DEFAULT_AUTH_URL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            username: "store".into(),
            password: "secret".into(),
            user_id: "123".into(),
            service_id: "73".into(),
            client_code: "C-77".into(),
            sender: Sender {
                name: "Tienda".into(),
                phone: "22223333".into(),
                address: "Avenida 2".into(),
                postal_code: "10101".into(),
            },
        }
    }

    #[test]
    fn requires_credentials() {
        let mut cfg = config();
        cfg.username = " ".into();
        assert!(matches!(
            PymexpressClient::new(cfg),
            Err(CarrierError::MissingCredentials("username"))
        ));
        assert!(PymexpressClient::new(config()).is_ok());
    }

    #[test]
    fn parses_token_shapes() {
        assert_eq!(parse_token("abc.def").unwrap(), "abc.def");
        assert_eq!(parse_token("\"abc.def\"").unwrap(), "abc.def");
        assert_eq!(parse_token(r#"{"token":"abc"}"#).unwrap(), "abc");
        assert!(parse_token(r#"{"error":"x"}"#).is_err());
        assert!(parse_token("  ").is_err());
    }

    #[test]
    fn decodes_locations_with_numeric_codes() {
        let response: LocationsResponse = serde_json::from_str(
            r#"{"Cod_Respuesta":"00","Mensaje_Respuesta":"OK",
                "Cantones":[{"Codigo":1,"Descripcion":"SAN JOSE "},{"Codigo":"02","Descripcion":"ESCAZU"}]}"#,
        )
        .unwrap();
        let locations = response.into_locations().unwrap();
        assert_eq!(locations[0].code, "01");
        assert_eq!(locations[0].name, "SAN JOSE");
        assert_eq!(locations[1].code, "02");
    }

    #[test]
    fn refused_lookup_is_an_api_error() {
        let response: LocationsResponse =
            serde_json::from_str(r#"{"Cod_Respuesta":"12","Mensaje_Respuesta":"Token vencido"}"#)
                .unwrap();
        assert!(matches!(
            response.into_locations(),
            Err(CarrierError::Api(message)) if message.contains("Token vencido")
        ));
    }

    #[test]
    fn guide_number_requires_value() {
        let ok: GuideNumberResponse =
            serde_json::from_str(r#"{"Cod_Respuesta":"00","NumeroEnvio":"PY123CR"}"#).unwrap();
        assert!(ok.refusal().is_none());
        assert_eq!(ok.guide_number().unwrap(), "PY123CR");
        let empty: GuideNumberResponse =
            serde_json::from_str(r#"{"Cod_Respuesta":"00","NumeroEnvio":""}"#).unwrap();
        assert!(matches!(empty.guide_number(), Err(CarrierError::Decode(_))));
    }

    #[test]
    fn refused_guide_request_keeps_carrier_code() {
        let refused: GuideNumberResponse = serde_json::from_str(
            r#"{"Cod_Respuesta":"12","Mensaje_Respuesta":"Cliente sin saldo"}"#,
        )
        .unwrap();
        let response = refused.refusal().unwrap();
        assert_eq!(response.guide_number, "");
        assert_eq!(response.response_code.as_deref(), Some("12"));
        assert_eq!(response.message.as_deref(), Some("Cliente sin saldo"));
    }

    #[test]
    fn builds_registration_payload() {
        let order = OrderSummary {
            id: 42,
            shipping_variants: vec![CarrierVariant::Pymexpress],
            total_weight_grams: 1250.0,
            amount: 18_500.0,
            item_count: 2,
            recipient: Recipient {
                name: "Ana".into(),
                phone: "88889999".into(),
                province: "1".into(),
                canton: "02".into(),
                district: "01".into(),
                postal_code: "10201".into(),
                ..Recipient::default()
            },
            note: None,
        };
        let json = serde_json::to_value(RegisterRequest::new(&config(), &order, "PY1")).unwrap();
        assert_eq!(json["Cliente"], "C-77");
        assert_eq!(json["Envio"]["ENVIO_ID"], "PY1");
        assert_eq!(json["Envio"]["ID_DISTRITO_DESTINO"], "10201");
        assert_eq!(json["Envio"]["PESO"], 1250.0);
        assert_eq!(json["Envio"]["SERVICIO"], "73");
    }
}
