//! Stripe event payloads as seen by the webhook

use std::collections::HashMap;

use serde::Deserialize;

/// Event type emitted when a hosted checkout is paid
pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

/// Session metadata key carrying the project being signalled
pub const PROJECT_ID_KEY: &str = "projectId";

/// A verified payment event, reduced to what signal counting needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentEvent {
    /// Stripe event id (`evt_...`), used to detect redelivery
    pub id: Option<String>,
    pub event_type: String,
    /// `data.object.metadata`; empty when the object carries none
    pub session_metadata: HashMap<String, String>,
}

impl PaymentEvent {
    /// Parse the raw webhook body
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        let raw: RawEvent = serde_json::from_slice(body)?;
        let session_metadata = raw
            .data
            .and_then(|d| d.object)
            .and_then(|o| o.metadata)
            .unwrap_or_default();

        Ok(Self {
            id: raw.id.filter(|id| !id.is_empty()),
            event_type: raw.event_type,
            session_metadata,
        })
    }

    pub fn is_checkout_completed(&self) -> bool {
        self.event_type == CHECKOUT_COMPLETED
    }

    /// Project id from session metadata, ignoring blank values
    pub fn project_id(&self) -> Option<&str> {
        self.session_metadata
            .get(PROJECT_ID_KEY)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: Option<RawEventData>,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    #[serde(default)]
    object: Option<RawObject>,
}

#[derive(Debug, Deserialize)]
struct RawObject {
    #[serde(default)]
    metadata: Option<HashMap<String, String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_checkout_completed() {
        let body = br#"{
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {
                "object": { "id": "cs_1", "amount_total": 500, "metadata": { "projectId": "p1" } }
            }
        }"#;

        let event = PaymentEvent::from_slice(body).unwrap();
        assert_eq!(event.id.as_deref(), Some("evt_1"));
        assert!(event.is_checkout_completed());
        assert_eq!(event.project_id(), Some("p1"));
    }

    #[test]
    fn missing_metadata_is_empty() {
        let body = br#"{
            "id": "evt_2",
            "type": "checkout.session.completed",
            "data": { "object": { "metadata": null } }
        }"#;
        let event = PaymentEvent::from_slice(body).unwrap();
        assert!(event.session_metadata.is_empty());
        assert_eq!(event.project_id(), None);

        let bare = PaymentEvent::from_slice(br#"{"type":"charge.refunded"}"#).unwrap();
        assert_eq!(bare.id, None);
        assert!(!bare.is_checkout_completed());
    }

    #[test]
    fn blank_project_id_is_absent() {
        let body = br#"{
            "type": "checkout.session.completed",
            "data": { "object": { "metadata": { "projectId": "  " } } }
        }"#;
        let event = PaymentEvent::from_slice(body).unwrap();
        assert_eq!(event.project_id(), None);
    }

    #[test]
    fn rejects_non_event_json() {
        assert!(PaymentEvent::from_slice(b"not json").is_err());
        assert!(PaymentEvent::from_slice(br#"{"data":{}}"#).is_err());
    }
}
