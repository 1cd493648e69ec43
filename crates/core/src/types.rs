use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Remote affiliate program configuration, fetched once per page load.
///
/// Fields are read loosely: a value of the wrong JSON type falls back to the
/// default instead of failing the whole lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AffiliateProgram {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default, deserialize_with = "loose_string")]
    pub url_modifier: Option<String>,
    /// Cookie lifetime in days; may be fractional.
    #[serde(default, deserialize_with = "loose_number")]
    pub cookie_duration: Option<f64>,
    #[serde(default, deserialize_with = "truthy")]
    pub enable_debug_logs: Option<bool>,
}

impl AffiliateProgram {
    /// Query parameter that carries the affiliate ref; empty values fall back.
    pub fn url_modifier_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        match self.url_modifier.as_deref() {
            Some(m) if !m.is_empty() => m,
            _ => fallback,
        }
    }

    /// Whole days, rounded up so a fractional lifetime never shortens to zero.
    pub fn cookie_duration_or(&self, fallback: i64) -> i64 {
        self.cookie_duration
            .map(|days| days.ceil() as i64)
            .unwrap_or(fallback)
    }

    pub fn debug_logs_enabled(&self) -> bool {
        self.enable_debug_logs.unwrap_or(false)
    }
}

fn loose_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn loose_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let number = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(number.filter(|n| n.is_finite()))
}

/// JSON truthiness: `null`, `false`, `0` and `""` are false.
fn truthy<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    Ok(Option::<Value>::deserialize(deserializer)?.map(|value| match value {
        Value::Null => false,
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }))
}

/// Envelope returned by `GET /api/affiliates/affiliate-program`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AffiliateProgramResponse {
    #[serde(default)]
    pub program: Option<AffiliateProgram>,
}

/// The affiliate ref and click id currently attributed to this visitor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralState {
    #[serde(rename = "ref")]
    pub affiliate_ref: Option<String>,
    /// Server-assigned click id, or the ref itself until one is confirmed.
    pub click_id: Option<String>,
}

impl ReferralState {
    pub fn is_attributed(&self) -> bool {
        self.affiliate_ref.is_some()
    }
}

/// Which storage backend persists the referral state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StorageKind {
    #[serde(rename = "cookies")]
    Cookies,
    #[serde(rename = "localStorage")]
    LocalStorage,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Cookies => "cookies",
            StorageKind::LocalStorage => "localStorage",
        }
    }
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot returned by `PushLapClient::affiliate_info`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AffiliateInfo {
    #[serde(rename = "ref")]
    pub affiliate_ref: Option<String>,
    pub click_id: Option<String>,
    pub storage_type: StorageKind,
}

/// Event names dispatched to the host page.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TrackerEventType {
    AffiliateIdReady,
    AffiliateReferralReady,
}

impl TrackerEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackerEventType::AffiliateIdReady => "affiliate_id_ready",
            TrackerEventType::AffiliateReferralReady => "affiliate_referral_ready",
        }
    }
}

/// An event dispatched once the attribution state is known.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackerEvent {
    pub event_type: TrackerEventType,
    /// `{ref, clickId}` for `affiliate_id_ready`; absent otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<ReferralState>,
}

impl TrackerEvent {
    pub fn affiliate_id_ready(affiliate_ref: Option<String>, click_id: Option<String>) -> Self {
        Self {
            event_type: TrackerEventType::AffiliateIdReady,
            detail: Some(ReferralState {
                affiliate_ref,
                click_id,
            }),
        }
    }

    pub fn affiliate_referral_ready() -> Self {
        Self {
            event_type: TrackerEventType::AffiliateReferralReady,
            detail: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.event_type.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_response_deserialize() {
        let json = r#"{"program":{"id":"p-1","urlModifier":"via","cookieDuration":30,"enableDebugLogs":true}}"#;
        let parsed: AffiliateProgramResponse = serde_json::from_str(json).unwrap();
        let program = parsed.program.unwrap();
        assert_eq!(program.url_modifier_or("ref"), "via");
        assert_eq!(program.cookie_duration_or(60), 30);
        assert!(program.debug_logs_enabled());
    }

    #[test]
    fn test_program_defaults_when_fields_missing() {
        let parsed: AffiliateProgramResponse =
            serde_json::from_str(r#"{"program":{"urlModifier":""}}"#).unwrap();
        let program = parsed.program.unwrap();
        assert_eq!(program.url_modifier_or("ref"), "ref");
        assert_eq!(program.cookie_duration_or(60), 60);
        assert!(!program.debug_logs_enabled());
    }

    #[test]
    fn test_program_with_loose_field_types() {
        let json = r#"{"program":{"id":42,"cookieDuration":30.5,"enableDebugLogs":"yes","urlModifier":7}}"#;
        let program = serde_json::from_str::<AffiliateProgramResponse>(json)
            .unwrap()
            .program
            .unwrap();
        assert_eq!(program.id, Some(serde_json::json!(42)));
        assert_eq!(program.cookie_duration_or(60), 31);
        assert!(program.debug_logs_enabled());
        assert_eq!(program.url_modifier_or("ref"), "7");
    }

    #[test]
    fn test_malformed_program_fields_fall_back() {
        let json = r#"{"program":{"cookieDuration":"soon","enableDebugLogs":0,"urlModifier":null}}"#;
        let program = serde_json::from_str::<AffiliateProgramResponse>(json)
            .unwrap()
            .program
            .unwrap();
        assert_eq!(program.cookie_duration_or(60), 60);
        assert!(!program.debug_logs_enabled());
        assert_eq!(program.url_modifier_or("ref"), "ref");

        let numeric_string: AffiliateProgramResponse =
            serde_json::from_str(r#"{"program":{"cookieDuration":"14"}}"#).unwrap();
        assert_eq!(numeric_string.program.unwrap().cookie_duration_or(60), 14);
    }

    #[test]
    fn test_missing_program_envelope() {
        let parsed: AffiliateProgramResponse = serde_json::from_str(r#"{"error":"nope"}"#).unwrap();
        assert!(parsed.program.is_none());
    }

    #[test]
    fn test_affiliate_info_wire_shape() {
        let info = AffiliateInfo {
            affiliate_ref: Some("alice".into()),
            click_id: Some("42".into()),
            storage_type: StorageKind::LocalStorage,
        };
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"ref": "alice", "clickId": "42", "storageType": "localStorage"})
        );
    }

    #[test]
    fn test_event_names() {
        let ready = TrackerEvent::affiliate_id_ready(Some("alice".into()), Some("42".into()));
        assert_eq!(ready.name(), "affiliate_id_ready");
        assert_eq!(
            serde_json::to_value(&ready.detail).unwrap(),
            serde_json::json!({"ref": "alice", "clickId": "42"})
        );
        assert_eq!(
            TrackerEvent::affiliate_referral_ready().name(),
            "affiliate_referral_ready"
        );
    }
}
