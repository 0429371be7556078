//! Admin actions posted from the order screen.
//!
//! Requests arrive as JSON tagged by `action` and every answer uses the
//! same `{ success, data }` envelope.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::CarrierVariant;
use crate::error::{Result, ShippingError};
use crate::service::ShippingService;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AjaxRequest {
    RequestGuideNumber {
        order_id: u64,
        #[serde(default)]
        variant: Option<CarrierVariant>,
    },
    RegisterGuideNumber {
        order_id: u64,
        #[serde(default)]
        variant: Option<CarrierVariant>,
    },
    DownloadPdf {
        order_id: u64,
        #[serde(default)]
        variant: Option<CarrierVariant>,
    },
    GetCantonsList {
        province: String,
    },
    GetDistrictList {
        province: String,
        canton: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AjaxResponse {
    pub success: bool,
    pub data: Value,
}

impl AjaxResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data,
        }
    }

    pub fn error(err: &ShippingError) -> Self {
        Self {
            success: false,
            data: json!({
                "message": err.to_string(),
                "kind": err.kind(),
            }),
        }
    }
}

/// Parses a raw request body and dispatches it.
pub async fn dispatch_json(service: &ShippingService, body: &str) -> AjaxResponse {
    match serde_json::from_str::<AjaxRequest>(body) {
        Ok(request) => dispatch(service, request).await,
        Err(err) => {
            tracing::debug!(error = %err, "Rejected malformed admin request");
            AjaxResponse::error(&ShippingError::Validation(err.to_string()))
        }
    }
}

pub async fn dispatch(service: &ShippingService, request: AjaxRequest) -> AjaxResponse {
    match handle(service, &request).await {
        Ok(data) => AjaxResponse::ok(data),
        Err(err) => {
            tracing::warn!(?request, error = %err, kind = ?err.kind(), "Admin action failed");
            AjaxResponse::error(&err)
        }
    }
}

async fn handle(service: &ShippingService, request: &AjaxRequest) -> Result<Value> {
    match request {
        AjaxRequest::RequestGuideNumber { order_id, variant } => {
            let variant = service.guide_variant(*variant)?;
            to_value(service.request_guide(*order_id, variant).await?)
        }
        AjaxRequest::RegisterGuideNumber { order_id, variant } => {
            let variant = service.guide_variant(*variant)?;
            to_value(service.register_guide(*order_id, variant).await?)
        }
        AjaxRequest::DownloadPdf { order_id, variant } => {
            let variant = service.guide_variant(*variant)?;
            let document = service.download_pdf(*order_id, variant).await?;
            Ok(json!({
                "guide_number": document.guide_number,
                "file_name": format!("{}.pdf", document.guide_number),
                "pdf": document.pdf_base64,
            }))
        }
        AjaxRequest::GetCantonsList { province } => to_value(service.cantons(province).await?),
        AjaxRequest::GetDistrictList { province, canton } => {
            to_value(service.districts(province, canton).await?)
        }
    }
}

fn to_value<T: Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value).map_err(|err| ShippingError::Validation(err.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::{OrderSummary, Recipient};
    use crate::infra::carrier::mock::MockCarrier;
    use crate::infra::carrier::CarrierClient;
    use crate::infra::options::{GlobalField, MemoryOptionStore};
    use crate::infra::orders::MemoryOrderStore;

    fn service(carrier: &MockCarrier) -> ShippingService {
        let variant = carrier.variant();
        let orders = MemoryOrderStore::new();
        orders
            .insert_order(OrderSummary {
                id: 42,
                shipping_variants: vec![variant],
                total_weight_grams: 500.0,
                amount: 9_000.0,
                item_count: 1,
                recipient: Recipient::default(),
                note: None,
            })
            .unwrap();
        let options = MemoryOptionStore::new().with(&GlobalField::Provider.key(), variant.as_str());
        ShippingService::new(Arc::new(options), Arc::new(orders))
            .with_carrier(Arc::new(carrier.clone()))
    }

    #[test]
    fn parses_tagged_actions() {
        let request: AjaxRequest =
            serde_json::from_str(r#"{"action":"get_district_list","province":"1","canton":"01"}"#)
                .unwrap();
        assert_eq!(
            request,
            AjaxRequest::GetDistrictList {
                province: "1".into(),
                canton: "01".into()
            }
        );
        let request: AjaxRequest =
            serde_json::from_str(r#"{"action":"request_guide_number","order_id":42}"#).unwrap();
        assert_eq!(
            request,
            AjaxRequest::RequestGuideNumber {
                order_id: 42,
                variant: None
            }
        );
        let request: AjaxRequest = serde_json::from_str(
            r#"{"action":"download_pdf","order_id":42,"variant":"ccr"}"#,
        )
        .unwrap();
        assert_eq!(
            request,
            AjaxRequest::DownloadPdf {
                order_id: 42,
                variant: Some(CarrierVariant::Ccr)
            }
        );
    }

    #[tokio::test]
    async fn guide_actions_default_to_active_carrier() {
        let carrier = MockCarrier::new(CarrierVariant::Ccr);
        let service = service(&carrier);
        carrier.respond("CR55", "00");

        let response = dispatch_json(&service, r#"{"action":"request_guide_number","order_id":42}"#).await;
        assert!(response.success);
        assert_eq!(response.data["variant"], "ccr");
        assert_eq!(response.data["guide_number"], "CR55");
    }

    #[tokio::test]
    async fn request_then_download() {
        let carrier = MockCarrier::new(CarrierVariant::Pymexpress);
        let service = service(&carrier);
        carrier.respond("PY77", "00");

        let response = dispatch_json(&service, r#"{"action":"request_guide_number","order_id":42}"#).await;
        assert!(response.success);
        assert_eq!(response.data["state"], "issued");
        assert_eq!(response.data["guide_number"], "PY77");

        let response = dispatch_json(&service, r#"{"action":"download_pdf","order_id":42}"#).await;
        assert!(response.success);
        assert_eq!(response.data["file_name"], "PY77.pdf");
        assert_eq!(response.data["pdf"], "JVBERi0xLjQK");
    }

    #[tokio::test]
    async fn failures_use_error_envelope() {
        let carrier = MockCarrier::new(CarrierVariant::Pymexpress);
        let service = service(&carrier);

        let response = dispatch_json(&service, r#"{"action":"register_guide_number","order_id":42}"#).await;
        assert!(!response.success);
        assert_eq!(response.data["kind"], "validation");

        let response = dispatch_json(&service, r#"{"action":"unknown"}"#).await;
        assert!(!response.success);

        carrier.fail("down");
        let response = dispatch_json(&service, r#"{"action":"request_guide_number","order_id":42}"#).await;
        assert_eq!(response.data["kind"], "carrier_unavailable");
    }

    #[tokio::test]
    async fn lists_cantons() {
        let carrier = MockCarrier::new(CarrierVariant::Pymexpress);
        let service = service(&carrier);
        let response = dispatch(
            &service,
            AjaxRequest::GetCantonsList {
                province: "1".into(),
            },
        )
        .await;
        assert!(response.success);
        assert_eq!(response.data[0]["code"], "01");
    }
}
