//! Guide lifecycle derived from order metadata.
//!
//! The state is never stored: it is recomputed from the guide number and
//! the carrier response code each time a record is read. The tracker only
//! classifies and checks transitions; the carrier call itself happens in
//! the service.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::entities::CarrierVariant;
use crate::error::{Result, ShippingError};

/// Carrier response codes treated as a successfully registered guide.
pub const ACCEPTED_RESPONSE_CODES: [&str; 2] = ["00", "36"];

pub fn is_accepted_code(code: &str) -> bool {
    ACCEPTED_RESPONSE_CODES.contains(&code.trim())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuideState {
    NotRequested,
    #[serde(rename = "requested_with_error")]
    Error,
    Issued,
}

impl GuideState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotRequested => "not_requested",
            Self::Error => "requested_with_error",
            Self::Issued => "issued",
        }
    }

    pub fn allowed_actions(&self) -> &'static [GuideAction] {
        match self {
            Self::NotRequested => &[GuideAction::Request],
            Self::Error => &[GuideAction::Register],
            Self::Issued => &[GuideAction::Download],
        }
    }

    pub fn permits(&self, action: GuideAction) -> bool {
        self.allowed_actions().contains(&action)
    }
}

impl fmt::Display for GuideState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuideAction {
    Request,
    Register,
    Download,
}

impl fmt::Display for GuideAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Request => "request",
            Self::Register => "register",
            Self::Download => "download",
        };
        f.write_str(name)
    }
}

/// Order metadata keys for one carrier variant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuideMetaKeys {
    pub guide_number: String,
    pub response_code: String,
    pub requested_at: String,
}

impl GuideMetaKeys {
    pub fn for_variant(variant: CarrierVariant) -> Self {
        let prefix = variant.as_str();
        Self {
            guide_number: format!("{prefix}_guide_number"),
            response_code: format!("{prefix}_guide_response_code"),
            requested_at: format!("{prefix}_guide_requested_at"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuideRecord {
    pub guide_number: Option<String>,
    pub response_code: Option<String>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub requested_at: Option<OffsetDateTime>,
}

impl GuideRecord {
    /// Builds a record from raw metadata; blank values count as absent.
    pub fn from_meta<F>(variant: CarrierVariant, mut lookup: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let keys = GuideMetaKeys::for_variant(variant);
        let non_blank = |value: Option<String>| {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            guide_number: non_blank(lookup(&keys.guide_number)),
            response_code: non_blank(lookup(&keys.response_code)),
            requested_at: non_blank(lookup(&keys.requested_at))
                .and_then(|raw| OffsetDateTime::parse(&raw, &Rfc3339).ok()),
        }
    }

    /// Metadata entries to persist, written together in one call.
    pub fn to_meta(&self, variant: CarrierVariant) -> Vec<(String, String)> {
        let keys = GuideMetaKeys::for_variant(variant);
        vec![
            (keys.guide_number, self.guide_number.clone().unwrap_or_default()),
            (
                keys.response_code,
                self.response_code.clone().unwrap_or_default(),
            ),
            (
                keys.requested_at,
                self.requested_at
                    .and_then(|at| at.format(&Rfc3339).ok())
                    .unwrap_or_default(),
            ),
        ]
    }

    pub fn state(&self) -> GuideState {
        match (&self.guide_number, &self.response_code) {
            (None, _) => GuideState::NotRequested,
            (Some(_), None) => GuideState::Issued,
            (Some(_), Some(code)) if is_accepted_code(code) => GuideState::Issued,
            (Some(_), Some(_)) => GuideState::Error,
        }
    }

    pub fn check(&self, action: GuideAction) -> Result<()> {
        let state = self.state();
        if state.permits(action) {
            Ok(())
        } else {
            Err(ShippingError::ActionNotAllowed { action, state })
        }
    }

    /// Record produced by a successful carrier call. The receiver is left
    /// untouched so a failed persist keeps the old state.
    pub fn with_response(
        &self,
        guide_number: &str,
        response_code: Option<&str>,
        at: OffsetDateTime,
    ) -> Self {
        let guide_number = Some(guide_number.trim().to_string())
            .filter(|g| !g.is_empty())
            .or_else(|| self.guide_number.clone());
        Self {
            guide_number,
            response_code: response_code
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            requested_at: self.requested_at.or(Some(at)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn record(guide: &str, code: Option<&str>) -> GuideRecord {
        GuideRecord {
            guide_number: Some(guide.to_string()).filter(|g| !g.is_empty()),
            response_code: code.map(str::to_string),
            requested_at: None,
        }
    }

    #[test]
    fn classifies_states() {
        assert_eq!(record("", None).state(), GuideState::NotRequested);
        assert_eq!(record("", Some("99")).state(), GuideState::NotRequested);
        assert_eq!(record("ABC123", Some("36")).state(), GuideState::Issued);
        assert_eq!(record("ABC123", Some("00")).state(), GuideState::Issued);
        assert_eq!(record("ABC123", None).state(), GuideState::Issued);
        assert_eq!(record("ABC123", Some("99")).state(), GuideState::Error);
    }

    #[test]
    fn only_error_permits_register() {
        assert!(record("ABC123", Some("99")).check(GuideAction::Register).is_ok());
        for rec in [record("", None), record("ABC123", Some("36"))] {
            assert!(matches!(
                rec.check(GuideAction::Register),
                Err(ShippingError::ActionNotAllowed {
                    action: GuideAction::Register,
                    ..
                })
            ));
        }
    }

    #[test]
    fn download_only_from_issued() {
        assert!(record("ABC123", Some("00")).check(GuideAction::Download).is_ok());
        assert!(record("ABC123", Some("12")).check(GuideAction::Download).is_err());
        assert!(record("", None).check(GuideAction::Download).is_err());
        assert!(record("", None).check(GuideAction::Request).is_ok());
    }

    #[test]
    fn blank_metadata_counts_as_absent() {
        let meta = HashMap::from([
            ("ccr_guide_number".to_string(), "  ".to_string()),
            ("ccr_guide_response_code".to_string(), "99".to_string()),
        ]);
        let rec = GuideRecord::from_meta(CarrierVariant::Ccr, |key| meta.get(key).cloned());
        assert_eq!(rec.state(), GuideState::NotRequested);
    }

    #[test]
    fn metadata_round_trips() {
        let at = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let rec = GuideRecord::default().with_response("PY123", Some("00"), at);
        let meta: HashMap<_, _> = rec.to_meta(CarrierVariant::Pymexpress).into_iter().collect();
        assert_eq!(meta["pymexpress_guide_number"], "PY123");
        let back = GuideRecord::from_meta(CarrierVariant::Pymexpress, |key| meta.get(key).cloned());
        assert_eq!(back, rec);
    }

    #[test]
    fn register_keeps_guide_number_and_first_request_time() {
        let first = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let later = OffsetDateTime::from_unix_timestamp(1_700_000_600).unwrap();
        let failed = GuideRecord::default().with_response("AB1", Some("99"), first);
        let retried = failed.with_response("", Some("36"), later);
        assert_eq!(retried.guide_number.as_deref(), Some("AB1"));
        assert_eq!(retried.requested_at, Some(first));
        assert_eq!(retried.state(), GuideState::Issued);
    }
}
