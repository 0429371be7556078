//! Client for the carrier's original SOAP web service.
//!
//! Every call is a SOAP 1.1 envelope posted to one endpoint. Some stores can
//! only reach the service through an authenticated HTTP proxy.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use reqwest::{Client, Proxy, Url};
use serde::{Deserialize, Serialize};

use super::cache::ResponseCache;
use super::carrier::{
    AuthToken, CarrierClient, CarrierError, GuideDocument, GuideResponse, Location, Sender,
    TrackingEvent,
};
use crate::domain::guide::is_accepted_code;
use crate::domain::{CarrierVariant, OrderSummary, DEFAULT_CACHE_LIFETIME};
use crate::util::version::user_agent;
use crate::util::xml;

pub const DEFAULT_ENDPOINT: &str = "http://amistad.correos.go.cr:84/wsAppCorreos.wsAppCorreos.svc";
const SOAP_NAMESPACE: &str = "http://tempuri.org/";
const SOAP_ACTION_PREFIX: &str = "http://tempuri.org/IwsAppCorreos/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySettings {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl ProxySettings {
    fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyConfig {
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub client_code: String,
    pub user_id: String,
    pub service_id: String,
    pub sender: Sender,
    #[serde(default)]
    pub proxy: Option<ProxySettings>,
}

impl LegacyConfig {
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

/// One SOAP operation call with its ordered parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
struct SoapCall {
    operation: &'static str,
    params: Vec<(&'static str, String)>,
}

impl SoapCall {
    fn new(operation: &'static str) -> Self {
        Self {
            operation,
            params: Vec::new(),
        }
    }

    fn param(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.params.push((name, value.into()));
        self
    }

    fn action(&self) -> String {
        format!("{SOAP_ACTION_PREFIX}{}", self.operation)
    }

    fn envelope(&self) -> String {
        let mut body = String::new();
        for (name, value) in &self.params {
            body.push_str(&format!("<tem:{name}>{}</tem:{name}>", xml::escape(value)));
        }
        format!(
            concat!(
                r#"<?xml version="1.0" encoding="utf-8"?>"#,
                r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns:tem="{ns}">"#,
                "<soapenv:Header/><soapenv:Body><tem:{op}>{body}</tem:{op}></soapenv:Body>",
                "</soapenv:Envelope>"
            ),
            ns = SOAP_NAMESPACE,
            op = self.operation,
            body = body,
        )
    }
}

#[derive(Clone)]
pub struct LegacyClient {
    http: Client,
    endpoint: Url,
    config: LegacyConfig,
    locations: ResponseCache<String, Vec<Location>>,
}

impl LegacyClient {
    pub fn new(config: LegacyConfig) -> Result<Self, CarrierError> {
        Self::with_cache_lifetime(config, DEFAULT_CACHE_LIFETIME)
    }

    pub fn with_cache_lifetime(
        config: LegacyConfig,
        lifetime: Duration,
    ) -> Result<Self, CarrierError> {
        config.validate()?;
        let endpoint = Url::parse(&config.endpoint)?;
        let mut builder = Client::builder()
            .user_agent(user_agent())
            .timeout(REQUEST_TIMEOUT);
        if let Some(proxy) = &config.proxy {
            let mut tunnel = Proxy::all(proxy.url())?;
            if let (Some(user), Some(password)) = (&proxy.username, &proxy.password) {
                tunnel = tunnel.basic_auth(user, password);
            }
            tracing::debug!(host = %proxy.host, port = proxy.port, "Routing legacy calls through proxy");
            builder = builder.proxy(tunnel);
        }
        Ok(Self {
            http: builder.build()?,
            endpoint,
            config,
            locations: ResponseCache::new(lifetime),
        })
    }

    pub fn cache_lifetime(&self) -> Duration {
        self.locations.ttl()
    }

    fn authenticated(&self, operation: &'static str) -> SoapCall {
        SoapCall::new(operation)
            .param("usuario", self.config.username.as_str())
            .param("clave", self.config.password.as_str())
    }

    async fn call(&self, call: SoapCall) -> Result<String, CarrierError> {
        tracing::debug!(operation = call.operation, "Legacy SOAP call");
        let response = self
            .http
            .post(self.endpoint.clone())
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", call.action())
            .body(call.envelope())
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if let Some(fault) = xml::element_text(&body, "faultstring") {
            return Err(CarrierError::Api(fault));
        }
        if !status.is_success() {
            return Err(CarrierError::Api(format!("{status}: {}", body.trim())));
        }
        Ok(body)
    }

    async fn locations(&self, cache_key: String, call: SoapCall) -> Result<Vec<Location>, CarrierError> {
        let fetch = self.call(call);
        let payload = self
            .locations
            .get_or_fetch(cache_key, move || async move { parse_locations(&fetch.await?) })
            .await?;
        Ok(payload.data)
    }

    fn registration(&self, order: &OrderSummary, guide_number: &str) -> SoapCall {
        let recipient = &order.recipient;
        let sender = &self.config.sender;
        self.authenticated("ccrRegistroEnvio")
            .param("Cliente", self.config.client_code.as_str())
            .param("Envio", guide_number)
            .param("DestNombre", recipient.name.as_str())
            .param("DestDireccion", recipient.address.as_str())
            .param("DestTelefono", recipient.phone.as_str())
            .param("DestZip", recipient.postal_code.as_str())
            .param(
                "IdDistritoDestino",
                format!("{}{}{}", recipient.province, recipient.canton, recipient.district),
            )
            .param("MontoFlete", format!("{:.2}", order.amount))
            .param("Observaciones", order.note.clone().unwrap_or_default())
            .param("Peso", format!("{:.0}", order.total_weight_grams.max(1.0)))
            .param("SendNombre", sender.name.as_str())
            .param("SendDireccion", sender.address.as_str())
            .param("SendTelefono", sender.phone.as_str())
            .param("SendZip", sender.postal_code.as_str())
            .param("Servicio", self.config.service_id.as_str())
            .param("UsuarioId", self.config.user_id.as_str())
    }

    async fn register(
        &self,
        order: &OrderSummary,
        guide_number: &str,
    ) -> Result<GuideResponse, CarrierError> {
        let body = self.call(self.registration(order, guide_number)).await?;
        let response = parse_guide_response(&body, Some(guide_number))?;
        tracing::info!(
            order_id = order.id,
            guide_number,
            code = response.response_code.as_deref().unwrap_or("-"),
            "Legacy shipment registered"
        );
        Ok(response)
    }
}

#[async_trait]
impl CarrierClient for LegacyClient {
    fn variant(&self) -> CarrierVariant {
        CarrierVariant::Ccr
    }

    /// The SOAP service takes credentials on every call; there is no session.
    async fn authenticate(&self) -> Result<AuthToken, CarrierError> {
        Ok(AuthToken {
            value: self.config.username.clone(),
            issued_at: SystemTime::now(),
        })
    }

    async fn cantons(&self, province: &str) -> Result<Vec<Location>, CarrierError> {
        let call = self
            .authenticated("ccrCodCanton")
            .param("CodProvincia", province);
        self.locations(format!("cantons:{province}"), call).await
    }

    async fn districts(
        &self,
        province: &str,
        canton: &str,
    ) -> Result<Vec<Location>, CarrierError> {
        let call = self
            .authenticated("ccrCodDistrito")
            .param("CodProvincia", province)
            .param("CodCanton", canton);
        self.locations(format!("districts:{province}:{canton}"), call)
            .await
    }

    async fn request_guide(&self, order: &OrderSummary) -> Result<GuideResponse, CarrierError> {
        let call = self
            .authenticated("ccrGenerarGuia")
            .param("Cliente", self.config.client_code.as_str());
        let body = self.call(call).await?;
        let issued = parse_guide_response(&body, None)?;
        if let Some(code) = issued.response_code.as_deref() {
            if !is_accepted_code(code) {
                return Ok(issued);
            }
        }
        tracing::info!(order_id = order.id, guide_number = %issued.guide_number, "Legacy guide number issued");
        self.register(order, &issued.guide_number).await
    }

    async fn register_guide(
        &self,
        order: &OrderSummary,
        guide_number: &str,
    ) -> Result<GuideResponse, CarrierError> {
        self.register(order, guide_number).await
    }

    async fn guide_pdf(&self, _guide_number: &str) -> Result<GuideDocument, CarrierError> {
        Err(CarrierError::Unsupported {
            variant: CarrierVariant::Ccr,
            operation: "guide_pdf",
        })
    }

    async fn tracking(&self, guide_number: &str) -> Result<Vec<TrackingEvent>, CarrierError> {
        let call = self
            .authenticated("ccrMovilTracking")
            .param("NumeroEnvio", guide_number);
        let body = self.call(call).await?;
        Ok(parse_tracking(&body))
    }
}

fn response_code(body: &str) -> Option<String> {
    xml::element_text(body, "CodRespuesta")
        .or_else(|| xml::element_text(body, "Cod_Respuesta"))
        .map(|code| code.trim().to_string())
        .filter(|code| !code.is_empty())
}

fn parse_guide_response(
    body: &str,
    known_number: Option<&str>,
) -> Result<GuideResponse, CarrierError> {
    let response_code = response_code(body);
    let message = xml::element_text(body, "MensajeRespuesta")
        .or_else(|| xml::element_text(body, "Mensaje_Respuesta"))
        .filter(|message| !message.is_empty());
    let guide_number = xml::element_text(body, "NumeroEnvio")
        .filter(|number| !number.is_empty())
        .or_else(|| known_number.map(str::to_string));

    match guide_number {
        Some(guide_number) => Ok(GuideResponse {
            guide_number,
            response_code,
            message,
        }),
        None => match response_code {
            Some(code) if !is_accepted_code(&code) => Ok(GuideResponse {
                guide_number: String::new(),
                response_code: Some(code),
                message,
            }),
            _ => Err(CarrierError::Decode("response carries no guide number".into())),
        },
    }
}

fn parse_locations(body: &str) -> Result<Vec<Location>, CarrierError> {
    if let Some(code) = response_code(body) {
        if !is_accepted_code(&code) {
            let message = xml::element_text(body, "MensajeRespuesta").unwrap_or_default();
            return Err(CarrierError::Api(format!("{code}: {message}")));
        }
    }
    let codes = xml::elements_text(body, "Codigo");
    let names = xml::elements_text(body, "Descripcion");
    if codes.len() != names.len() {
        return Err(CarrierError::Decode(format!(
            "{} codes for {} names",
            codes.len(),
            names.len()
        )));
    }
    Ok(codes
        .into_iter()
        .zip(names)
        .map(|(code, name)| Location { code, name })
        .collect())
}

/// One `Movimiento` record per event; fields missing from a record stay
/// empty for that record only.
fn parse_tracking(body: &str) -> Vec<TrackingEvent> {
    xml::elements_raw(body, "Movimiento")
        .into_iter()
        .filter_map(|event| {
            let description = xml::element_text(event, "Evento")?;
            Some(TrackingEvent {
                date: xml::element_text(event, "FechaHora").unwrap_or_default(),
                description,
                location: xml::element_text(event, "Unidad").filter(|unit| !unit.is_empty()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LegacyConfig {
        LegacyConfig {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            username: "store".into(),
            password: "p<a>ss".into(),
            client_code: "C-1".into(),
            user_id: "9".into(),
            service_id: "73".into(),
            sender: Sender::default(),
            proxy: None,
        }
    }

    #[test]
    fn builds_escaped_envelope() {
        let client = LegacyClient::new(config()).unwrap();
        let call = client
            .authenticated("ccrCodCanton")
            .param("CodProvincia", "1");
        let envelope = call.envelope();
        assert!(envelope.contains("<tem:ccrCodCanton>"));
        assert!(envelope.contains("<tem:clave>p&lt;a&gt;ss</tem:clave>"));
        assert!(envelope.contains("<tem:CodProvincia>1</tem:CodProvincia>"));
        assert_eq!(call.action(), "http://tempuri.org/IwsAppCorreos/ccrCodCanton");
    }

    #[test]
    fn proxy_settings_are_accepted() {
        let mut cfg = config();
        cfg.proxy = Some(ProxySettings {
            host: "10.0.0.1".into(),
            port: 3128,
            username: Some("proxy".into()),
            password: Some("secret".into()),
        });
        assert!(LegacyClient::new(cfg).is_ok());
    }

    #[test]
    fn rejects_missing_client_code() {
        let mut cfg = config();
        cfg.client_code.clear();
        assert!(matches!(
            LegacyClient::new(cfg),
            Err(CarrierError::MissingCredentials("client_code"))
        ));
    }

    #[test]
    fn parses_issued_guide() {
        let body = r#"<s:Envelope><s:Body><ccrGenerarGuiaResponse><ccrGenerarGuiaResult>
            <a:CodRespuesta>00</a:CodRespuesta><a:MensajeRespuesta>OK</a:MensajeRespuesta>
            <a:NumeroEnvio>WC123456789CR</a:NumeroEnvio>
            </ccrGenerarGuiaResult></ccrGenerarGuiaResponse></s:Body></s:Envelope>"#;
        let response = parse_guide_response(body, None).unwrap();
        assert_eq!(response.guide_number, "WC123456789CR");
        assert_eq!(response.response_code.as_deref(), Some("00"));
    }

    #[test]
    fn refusal_without_number_keeps_code() {
        let body = "<r><CodRespuesta>12</CodRespuesta><MensajeRespuesta>Cliente invalido</MensajeRespuesta></r>";
        let response = parse_guide_response(body, None).unwrap();
        assert!(response.guide_number.is_empty());
        assert_eq!(response.response_code.as_deref(), Some("12"));

        let empty = "<r><CodRespuesta>00</CodRespuesta></r>";
        assert!(matches!(
            parse_guide_response(empty, None),
            Err(CarrierError::Decode(_))
        ));
    }

    #[test]
    fn parses_location_pairs() {
        let body = "<r><CodRespuesta>00</CodRespuesta>\
            <a:Item><a:Codigo>01</a:Codigo><a:Descripcion>CARMEN</a:Descripcion></a:Item>\
            <a:Item><a:Codigo>02</a:Codigo><a:Descripcion>MERCED</a:Descripcion></a:Item></r>";
        let locations = parse_locations(body).unwrap();
        assert_eq!(locations.len(), 2);
        assert_eq!(locations[1].name, "MERCED");
    }

    #[test]
    fn parses_tracking_events() {
        let body = "<r>\
            <a:Movimiento><a:Evento>Recibido</a:Evento><a:FechaHora>2024-05-01</a:FechaHora><a:Unidad>San Jos&#233;</a:Unidad></a:Movimiento>\
            <a:Movimiento><a:Evento>En ruta</a:Evento><a:FechaHora>2024-05-02</a:FechaHora></a:Movimiento>\
            <a:Movimiento><a:Evento>Entregado</a:Evento><a:FechaHora>2024-05-03</a:FechaHora><a:Unidad>Lim&#243;n</a:Unidad></a:Movimiento>\
            </r>";
        let events = parse_tracking(body);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].location.as_deref(), Some("San José"));
        assert_eq!(events[1].description, "En ruta");
        assert_eq!(events[1].location, None);
        assert_eq!(events[2].date, "2024-05-03");
        assert_eq!(events[2].location.as_deref(), Some("Limón"));
    }

    #[tokio::test]
    async fn pdf_is_not_offered() {
        let client = LegacyClient::new(config()).unwrap();
        assert!(matches!(
            client.guide_pdf("WC1").await,
            Err(CarrierError::Unsupported { .. })
        ));
    }
}
