//! DeliveryRequest - パイプライン唯一のエンティティ
//!
//! # 不変条件
//! - `correlation_id` / `destination` / `body` / `id` / `created_at` は作成後に変わらない
//! - status は [`DeliveryStatus::can_transition_to`] に従って前進のみ
//! - `transport_message_id` は SENT のときだけ、failure 系は FAILED / BLACKLISTED のときだけ存在
//!
//! 3 つ目の条件は [`Disposition`] の形で構造的に保証しています。
//! status と結果フィールドを別々に書き換える手段は存在しません。
//!
//! `id` / `created_at` / `updated_at` / `version` は Record Store adapter が
//! [`DeliveryRequest::materialize`] と [`DeliveryRequest::record_update`] で明示的に設定します。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::PipelineError;
use super::ids::{CorrelationId, RecordId};
use super::outcome::{TransportOutcome, codes};
use super::state::DeliveryStatus;

/// Submission Handler が store に渡す挿入前の値
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDeliveryRequest {
    pub correlation_id: CorrelationId,
    pub destination: String,
    pub body: String,
}

/// status と、その status にだけ存在する結果フィールド
///
/// JSON 上は DeliveryRequest にフラットに展開されます（`"status":"SENT","transport_message_id":...`）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Disposition {
    Pending,
    Processing,
    Sent {
        transport_message_id: String,
    },
    Failed {
        failure_code: String,
        failure_detail: String,
    },
    Blacklisted {
        failure_code: String,
        failure_detail: String,
    },
}

impl Disposition {
    pub fn status(&self) -> DeliveryStatus {
        match self {
            Disposition::Pending => DeliveryStatus::Pending,
            Disposition::Processing => DeliveryStatus::Processing,
            Disposition::Sent { .. } => DeliveryStatus::Sent,
            Disposition::Failed { .. } => DeliveryStatus::Failed,
            Disposition::Blacklisted { .. } => DeliveryStatus::Blacklisted,
        }
    }
}

/// 許可されていない状態遷移
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid status transition {from} -> {to}")]
pub struct TransitionError {
    pub from: DeliveryStatus,
    pub to: DeliveryStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRequest {
    id: RecordId,
    correlation_id: CorrelationId,
    destination: String,
    body: String,
    #[serde(flatten)]
    disposition: Disposition,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    /// optimistic concurrency 用。insert で 1、update 成功ごとに +1
    version: u64,
}

impl DeliveryRequest {
    /// Record Store adapter 用: insert 時に id と時刻を確定させる
    pub fn materialize(new: NewDeliveryRequest, id: RecordId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            correlation_id: new.correlation_id,
            destination: new.destination,
            body: new.body,
            disposition: Disposition::Pending,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// Record Store adapter 用: update が受理されたときに呼ぶ
    pub fn record_update(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = now;
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn status(&self) -> DeliveryStatus {
        self.disposition.status()
    }

    pub fn disposition(&self) -> &Disposition {
        &self.disposition
    }

    pub fn transport_message_id(&self) -> Option<&str> {
        match &self.disposition {
            Disposition::Sent {
                transport_message_id,
            } => Some(transport_message_id),
            _ => None,
        }
    }

    pub fn failure_code(&self) -> Option<&str> {
        match &self.disposition {
            Disposition::Failed { failure_code, .. }
            | Disposition::Blacklisted { failure_code, .. } => Some(failure_code),
            _ => None,
        }
    }

    pub fn failure_detail(&self) -> Option<&str> {
        match &self.disposition {
            Disposition::Failed { failure_detail, .. }
            | Disposition::Blacklisted { failure_detail, .. } => Some(failure_detail),
            _ => None,
        }
    }

    /// FAILED のときだけ、記録された失敗を [`PipelineError::TransportFailure`] で返す
    pub fn transport_failure(&self) -> Option<PipelineError> {
        match &self.disposition {
            Disposition::Failed {
                failure_code,
                failure_detail,
            } => Some(PipelineError::TransportFailure {
                code: failure_code.clone(),
                detail: failure_detail.clone(),
            }),
            _ => None,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// PENDING -> PROCESSING
    pub fn begin_processing(&mut self) -> Result<(), TransitionError> {
        self.transition(Disposition::Processing)
    }

    /// PROCESSING -> SENT
    pub fn mark_sent(&mut self, transport_message_id: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(Disposition::Sent {
            transport_message_id: transport_message_id.into(),
        })
    }

    /// PROCESSING -> FAILED
    pub fn mark_failed(
        &mut self,
        code: impl Into<String>,
        detail: impl Into<String>,
    ) -> Result<(), TransitionError> {
        self.transition(Disposition::Failed {
            failure_code: code.into(),
            failure_detail: detail.into(),
        })
    }

    /// PROCESSING -> BLACKLISTED
    pub fn mark_blacklisted(&mut self) -> Result<(), TransitionError> {
        self.transition(Disposition::Blacklisted {
            failure_code: codes::PHONE_NUMBER_BLACKLISTED.to_string(),
            failure_detail: codes::BLACKLISTED_DETAIL.to_string(),
        })
    }

    /// transport の結果を SENT / FAILED に写す
    pub fn apply_outcome(&mut self, outcome: TransportOutcome) -> Result<(), TransitionError> {
        match outcome {
            TransportOutcome::Sent { message_id } => self.mark_sent(message_id),
            TransportOutcome::Failed { code, detail } => self.mark_failed(code, detail),
        }
    }

    fn transition(&mut self, next: Disposition) -> Result<(), TransitionError> {
        let from = self.status();
        let to = next.status();
        if !from.can_transition_to(to) {
            return Err(TransitionError { from, to });
        }
        self.disposition = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ulid::Ulid;

    fn pending() -> DeliveryRequest {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        DeliveryRequest::materialize(
            NewDeliveryRequest {
                correlation_id: CorrelationId::from_ulid(Ulid::new()),
                destination: "+15551234567".to_string(),
                body: "hi".to_string(),
            },
            RecordId(1),
            now,
        )
    }

    #[test]
    fn materialize_starts_pending_at_version_one() {
        let r = pending();
        assert_eq!(r.status(), DeliveryStatus::Pending);
        assert_eq!(r.version(), 1);
        assert_eq!(r.created_at(), r.updated_at());
        assert!(r.transport_message_id().is_none());
        assert!(r.failure_code().is_none());
    }

    #[test]
    fn happy_path_sets_message_id_only() {
        let mut r = pending();
        r.begin_processing().unwrap();
        r.apply_outcome(TransportOutcome::sent("MOCK_MSG_1")).unwrap();

        assert_eq!(r.status(), DeliveryStatus::Sent);
        assert_eq!(r.transport_message_id(), Some("MOCK_MSG_1"));
        assert!(r.failure_code().is_none());
        assert!(r.failure_detail().is_none());
    }

    #[test]
    fn transport_failure_maps_code_and_detail() {
        let mut r = pending();
        r.begin_processing().unwrap();
        r.apply_outcome(TransportOutcome::failed("RATE_LIMIT", "too many requests"))
            .unwrap();

        assert_eq!(r.status(), DeliveryStatus::Failed);
        assert_eq!(r.failure_code(), Some("RATE_LIMIT"));
        assert_eq!(r.failure_detail(), Some("too many requests"));
        assert!(r.transport_message_id().is_none());
    }

    #[test]
    fn transport_failure_only_for_failed() {
        let mut r = pending();
        assert_eq!(r.transport_failure(), None);
        r.begin_processing().unwrap();
        r.apply_outcome(TransportOutcome::failed("RATE_LIMIT", "too many requests"))
            .unwrap();
        assert_eq!(
            r.transport_failure(),
            Some(PipelineError::TransportFailure {
                code: "RATE_LIMIT".to_string(),
                detail: "too many requests".to_string(),
            })
        );

        let mut blocked = pending();
        blocked.begin_processing().unwrap();
        blocked.mark_blacklisted().unwrap();
        assert_eq!(blocked.transport_failure(), None);
    }

    #[test]
    fn blacklisted_uses_pipeline_code() {
        let mut r = pending();
        r.begin_processing().unwrap();
        r.mark_blacklisted().unwrap();

        assert_eq!(r.status(), DeliveryStatus::Blacklisted);
        assert_eq!(r.failure_code(), Some(codes::PHONE_NUMBER_BLACKLISTED));
    }

    #[test]
    fn cannot_skip_processing() {
        let mut r = pending();
        let err = r.mark_sent("m").unwrap_err();
        assert_eq!(
            err,
            TransitionError {
                from: DeliveryStatus::Pending,
                to: DeliveryStatus::Sent
            }
        );
        assert_eq!(r.status(), DeliveryStatus::Pending);
    }

    #[test]
    fn terminal_state_is_frozen() {
        let mut r = pending();
        r.begin_processing().unwrap();
        r.mark_sent("m-1").unwrap();
        let snapshot = r.clone();

        assert!(r.begin_processing().is_err());
        assert!(r.mark_failed("X", "y").is_err());
        assert!(r.mark_blacklisted().is_err());
        assert_eq!(r, snapshot);
    }

    #[test]
    fn record_update_bumps_version_and_timestamp() {
        let mut r = pending();
        let later = r.created_at() + chrono::Duration::seconds(5);
        r.record_update(later);

        assert_eq!(r.version(), 2);
        assert_eq!(r.updated_at(), later);
        assert_ne!(r.created_at(), r.updated_at());
    }

    #[test]
    fn json_is_flat() {
        let mut r = pending();
        r.begin_processing().unwrap();
        r.mark_failed("RATE_LIMIT", "slow").unwrap();

        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["status"], "FAILED");
        assert_eq!(v["failure_code"], "RATE_LIMIT");
        assert_eq!(v["destination"], "+15551234567");
        assert!(v.get("transport_message_id").is_none());

        let back: DeliveryRequest = serde_json::from_value(v).unwrap();
        assert_eq!(back, r);
    }
}
