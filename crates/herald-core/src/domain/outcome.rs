//! Outcome model: what a delivery attempt reported back.
//!
//! The transport either accepted the message (and handed back its own message
//! id) or refused it with a reason code. Both shapes end up on the
//! DeliveryRequest through `DeliveryRequest::apply_outcome`.

use serde::{Deserialize, Serialize};

/// Failure codes written by the pipeline itself (transport codes pass through untouched).
pub mod codes {
    /// Destination was on the denylist when the worker re-checked it.
    pub const PHONE_NUMBER_BLACKLISTED: &str = "PHONE_NUMBER_BLACKLISTED";
    /// Unexpected error after the record was claimed.
    pub const PROCESSING_ERROR: &str = "PROCESSING_ERROR";
    /// Transport did not answer within the configured deadline.
    pub const TRANSPORT_TIMEOUT: &str = "TRANSPORT_TIMEOUT";
    /// Denylist could not be consulted; delivery refused (fail-closed).
    pub const DENYLIST_UNAVAILABLE: &str = "DENYLIST_UNAVAILABLE";
    /// Generic transport-side error.
    pub const API_ERROR: &str = "API_ERROR";

    pub const BLACKLISTED_DETAIL: &str = "Phone number is blacklisted";
}

/// Result of one `DeliveryTransport::send` call.
///
/// Serialized as `{"result":"SENT","message_id":"..."}` /
/// `{"result":"FAILED","code":"...","detail":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransportOutcome {
    Sent { message_id: String },
    Failed { code: String, detail: String },
}

impl TransportOutcome {
    pub fn sent(message_id: impl Into<String>) -> Self {
        Self::Sent {
            message_id: message_id.into(),
        }
    }

    pub fn failed(code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Failed {
            code: code.into(),
            detail: detail.into(),
        }
    }

    pub fn timed_out(limit: std::time::Duration) -> Self {
        Self::failed(
            codes::TRANSPORT_TIMEOUT,
            format!("transport did not answer within {}ms", limit.as_millis()),
        )
    }

    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn outcome_is_tagged_by_result() {
        let v = serde_json::to_value(TransportOutcome::failed("RATE_LIMIT", "slow down")).unwrap();
        assert_eq!(v["result"], "FAILED");
        assert_eq!(v["code"], "RATE_LIMIT");
        assert_eq!(v["detail"], "slow down");

        let v = serde_json::to_value(TransportOutcome::sent("m-1")).unwrap();
        assert_eq!(v["result"], "SENT");
        assert_eq!(v["message_id"], "m-1");
    }

    #[test]
    fn timeout_maps_to_pipeline_code() {
        let outcome = TransportOutcome::timed_out(Duration::from_millis(250));
        assert!(!outcome.is_sent());
        assert!(matches!(
            outcome,
            TransportOutcome::Failed { ref code, ref detail }
                if code == codes::TRANSPORT_TIMEOUT && detail.contains("250ms")
        ));
    }
}
