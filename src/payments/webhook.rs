//! Stripe webhook handler with signature verification

use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{debug, info, warn};

use crate::app::AppState;
use crate::payments::event::PaymentEvent;
use crate::signals::Outcome;
use crate::util::time::unix_secs;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying `t=<unix>,v1=<hex hmac>[,v1=...]`
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Outcome of authenticating a webhook delivery
#[derive(Debug)]
pub enum VerificationResult {
    Verified(PaymentEvent),
    Rejected(RejectReason),
}

/// Why a delivery failed verification
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    #[error("Missing Stripe-Signature header")]
    MissingHeader,

    #[error("Unable to extract timestamp and signatures from header")]
    MalformedHeader,

    #[error("No signatures found with expected scheme")]
    NoSignatures,

    #[error("Timestamp outside the tolerance zone")]
    TimestampOutsideTolerance,

    #[error("No signatures found matching the expected signature for payload")]
    SignatureMismatch,

    #[error("Invalid event payload")]
    MalformedPayload,
}

/// Authenticate a raw webhook body and parse the event it carries.
///
/// The signature covers `"{t}.{raw_body}"` byte-for-byte, so `raw_body` must be
/// the unmodified request body. `now` is the current unix time in seconds.
pub fn verify(
    raw_body: &[u8],
    signature_header: Option<&str>,
    secret: &str,
    tolerance: Duration,
    now: i64,
) -> VerificationResult {
    let checked = signature_header
        .ok_or(RejectReason::MissingHeader)
        .and_then(|header| check_signature(raw_body, header, secret, tolerance, now))
        .and_then(|()| {
            PaymentEvent::from_slice(raw_body).map_err(|_| RejectReason::MalformedPayload)
        });

    match checked {
        Ok(event) => VerificationResult::Verified(event),
        Err(reason) => VerificationResult::Rejected(reason),
    }
}

fn check_signature(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
    tolerance: Duration,
    now: i64,
) -> Result<(), RejectReason> {
    // Parse signature header
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in signature_header.split(',') {
        let mut kv = part.trim().splitn(2, '=');
        if let (Some(key), Some(value)) = (kv.next(), kv.next()) {
            match key {
                "t" => timestamp = Some(value),
                "v1" => signatures.push(value),
                _ => {}
            }
        }
    }

    let raw_timestamp = timestamp.ok_or(RejectReason::MalformedHeader)?;
    let timestamp: i64 = raw_timestamp
        .parse()
        .map_err(|_| RejectReason::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(RejectReason::NoSignatures);
    }

    // Compute expected signature over "{timestamp}.{payload}"
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| RejectReason::SignatureMismatch)?;
    mac.update(raw_timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);

    // Stripe emits lowercase hex; anything else cannot match
    let valid = signatures
        .iter()
        .filter(|sig| sig.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')))
        .filter_map(|sig| hex::decode(sig).ok())
        .any(|bytes| mac.clone().verify_slice(&bytes).is_ok());
    if !valid {
        return Err(RejectReason::SignatureMismatch);
    }

    if now.abs_diff(timestamp) > tolerance.as_secs() {
        return Err(RejectReason::TimestampOutsideTolerance);
    }

    Ok(())
}

/// Handle Stripe webhook events
pub async fn stripe_webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, WebhookError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let event = match verify(
        &body,
        signature,
        &state.config.stripe_webhook_secret,
        state.config.webhook_tolerance,
        unix_secs(),
    ) {
        VerificationResult::Verified(event) => event,
        VerificationResult::Rejected(reason) => {
            warn!(reason = %reason, "Webhook signature verification failed");
            return Err(WebhookError::Rejected(reason));
        }
    };

    info!(
        event_type = %event.event_type,
        event_id = ?event.id,
        "Received Stripe webhook"
    );

    // Increments run detached; Stripe only needs the acknowledgement
    match state.dispatcher.dispatch(event) {
        Outcome::IncrementScheduled { project_id, .. } => {
            debug!(project_id = %project_id, "Signal increment detached")
        }
        Outcome::Duplicate { event_id } => {
            debug!(event_id = %event_id, "Acknowledging redelivery")
        }
        Outcome::Ignored { event_type } => {
            debug!(event_type = %event_type, "Acknowledging ignored event")
        }
        Outcome::MissingProjectId => {}
    }

    Ok(Json(json!({ "received": true })))
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Webhook Error: {0}")]
    Rejected(#[from] RejectReason),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> axum::response::Response {
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SECRET: &str = "whsec_test_secret";
    const TOLERANCE: Duration = Duration::from_secs(300);
    const NOW: i64 = 1_700_000_000;

    pub(crate) fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.", timestamp).as_bytes());
        mac.update(payload);
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    fn body() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": { "metadata": { "projectId": "p1" } } }
        }))
        .unwrap()
    }

    fn rejected(result: VerificationResult) -> RejectReason {
        match result {
            VerificationResult::Rejected(reason) => reason,
            VerificationResult::Verified(event) => panic!("unexpectedly verified {event:?}"),
        }
    }

    #[test]
    fn valid_signature_is_verified() {
        let body = body();
        let header = sign(&body, SECRET, NOW);

        match verify(&body, Some(&header), SECRET, TOLERANCE, NOW) {
            VerificationResult::Verified(event) => {
                assert_eq!(event.project_id(), Some("p1"));
                assert_eq!(event.id.as_deref(), Some("evt_1"));
            }
            VerificationResult::Rejected(reason) => panic!("rejected: {reason}"),
        }
    }

    #[test]
    fn any_body_bit_flip_is_rejected() {
        let body = body();
        let header = sign(&body, SECRET, NOW);

        for byte in 0..body.len() {
            for bit in 0..8 {
                let mut mutated = body.clone();
                mutated[byte] ^= 1 << bit;
                let reason = rejected(verify(&mutated, Some(&header), SECRET, TOLERANCE, NOW));
                assert_eq!(reason, RejectReason::SignatureMismatch, "byte {byte} bit {bit}");
            }
        }
    }

    #[test]
    fn any_signature_bit_flip_is_rejected() {
        let body = body();
        let header = sign(&body, SECRET, NOW);
        let sig_start = header.find("v1=").unwrap() + 3;

        for index in sig_start..header.len() {
            for bit in 0..8 {
                let mut mutated = header.clone().into_bytes();
                mutated[index] ^= 1 << bit;
                let Ok(mutated) = String::from_utf8(mutated) else {
                    continue;
                };
                assert!(
                    matches!(
                        verify(&body, Some(&mutated), SECRET, TOLERANCE, NOW),
                        VerificationResult::Rejected(_)
                    ),
                    "index {index} bit {bit}"
                );
            }
        }
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let body = body();
        let header = sign(&body, "whsec_other", NOW);
        let reason = rejected(verify(&body, Some(&header), SECRET, TOLERANCE, NOW));
        assert_eq!(reason, RejectReason::SignatureMismatch);
    }

    #[test]
    fn stale_or_future_timestamp_is_rejected() {
        let body = body();

        let old = sign(&body, SECRET, NOW - 301);
        assert_eq!(
            rejected(verify(&body, Some(&old), SECRET, TOLERANCE, NOW)),
            RejectReason::TimestampOutsideTolerance
        );

        let future = sign(&body, SECRET, NOW + 301);
        assert_eq!(
            rejected(verify(&body, Some(&future), SECRET, TOLERANCE, NOW)),
            RejectReason::TimestampOutsideTolerance
        );

        let edge = sign(&body, SECRET, NOW - 300);
        assert!(matches!(
            verify(&body, Some(&edge), SECRET, TOLERANCE, NOW),
            VerificationResult::Verified(_)
        ));
    }

    #[test]
    fn malformed_headers_are_rejected() {
        let body = body();

        assert_eq!(
            rejected(verify(&body, None, SECRET, TOLERANCE, NOW)),
            RejectReason::MissingHeader
        );
        assert_eq!(
            rejected(verify(&body, Some("garbage"), SECRET, TOLERANCE, NOW)),
            RejectReason::MalformedHeader
        );
        assert_eq!(
            rejected(verify(&body, Some("t=abc,v1=00"), SECRET, TOLERANCE, NOW)),
            RejectReason::MalformedHeader
        );
        assert_eq!(
            rejected(verify(&body, Some(&format!("t={NOW},v0=abcd")), SECRET, TOLERANCE, NOW)),
            RejectReason::NoSignatures
        );
        assert_eq!(
            rejected(verify(&body, Some(&format!("t={NOW},v1=not-hex")), SECRET, TOLERANCE, NOW)),
            RejectReason::SignatureMismatch
        );
    }

    #[test]
    fn one_matching_signature_among_several_is_enough() {
        let body = body();
        let valid = sign(&body, SECRET, NOW);
        let good_sig = valid.split("v1=").nth(1).unwrap();
        let header = format!("t={NOW},v1={},v1={good_sig}", "0".repeat(64));

        assert!(matches!(
            verify(&body, Some(&header), SECRET, TOLERANCE, NOW),
            VerificationResult::Verified(_)
        ));
    }

    #[test]
    fn signed_non_event_body_is_rejected() {
        let body = b"[1,2,3]".to_vec();
        let header = sign(&body, SECRET, NOW);
        assert_eq!(
            rejected(verify(&body, Some(&header), SECRET, TOLERANCE, NOW)),
            RejectReason::MalformedPayload
        );
    }
}
