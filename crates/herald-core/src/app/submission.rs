//! SubmissionHandler - 受付（denylist veto → PENDING 保存 → enqueue）
//!
//! # 順序
//! 1. denylist を確認（member なら何も書かずに拒否）
//! 2. correlation id を生成
//! 3. PENDING を store に挿入（publish より必ず先）
//! 4. queue に correlation id を publish
//!
//! 3 と 4 は 2PC ではありません。4 が失敗すると record は PENDING のまま残り、
//! 呼び出し側には `QueueUnavailable` が返ります（再送はしない）。

use serde::Serialize;
use std::sync::Arc;

use crate::app::deadline::bounded;
use crate::config::Timeouts;
use crate::domain::errors::PipelineError;
use crate::domain::ids::{CorrelationId, RecordId};
use crate::domain::request::NewDeliveryRequest;
use crate::ports::{DeliveryQueue, DenylistCache, IdGenerator, RecordStore};

/// 受付結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Submission {
    pub correlation_id: CorrelationId,
    pub record_id: RecordId,
}

pub struct SubmissionHandler {
    store: Arc<dyn RecordStore>,
    denylist: Arc<dyn DenylistCache>,
    queue: Arc<dyn DeliveryQueue>,
    ids: Arc<dyn IdGenerator>,
    timeouts: Timeouts,
}

impl SubmissionHandler {
    pub fn new(
        store: Arc<dyn RecordStore>,
        denylist: Arc<dyn DenylistCache>,
        queue: Arc<dyn DeliveryQueue>,
        ids: Arc<dyn IdGenerator>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            store,
            denylist,
            queue,
            ids,
            timeouts,
        }
    }

    pub async fn submit(&self, destination: &str, body: &str) -> Result<Submission, PipelineError> {
        // cache に聞けないときは受け付けない（fail-closed）
        let blocked = bounded(
            "denylist.is_member",
            self.timeouts.cache,
            self.denylist.is_member(destination),
        )
        .await?;
        if blocked {
            tracing::info!(destination, "submission rejected: destination is denylisted");
            return Err(PipelineError::DestinationBlocked(destination.to_string()));
        }

        let correlation_id = self.ids.generate_correlation_id();
        let record = bounded(
            "store.insert",
            self.timeouts.store,
            self.store.insert(NewDeliveryRequest {
                correlation_id,
                destination: destination.to_string(),
                body: body.to_string(),
            }),
        )
        .await?;

        let key = correlation_id.to_string();
        if let Err(err) = bounded("queue.publish", self.timeouts.queue, self.queue.publish(&key, &key)).await {
            tracing::warn!(
                correlation_id = %correlation_id,
                record_id = %record.id(),
                error = %err,
                "record stored but not published; it stays PENDING"
            );
            return Err(err.into());
        }

        tracing::info!(
            correlation_id = %correlation_id,
            record_id = %record.id(),
            "submission accepted"
        );
        Ok(Submission {
            correlation_id,
            record_id: record.id(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DeliveryStatus;
    use crate::impls::{InMemoryDeliveryQueue, InMemoryDenylist, InMemoryRecordStore};
    use crate::ports::{Clock, SystemClock, UlidGenerator};
    use std::time::Duration;

    struct Fixture {
        handler: SubmissionHandler,
        store: Arc<InMemoryRecordStore>,
        denylist: Arc<InMemoryDenylist>,
        queue: Arc<InMemoryDeliveryQueue>,
    }

    fn fixture() -> Fixture {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(InMemoryRecordStore::new(clock.clone()));
        let denylist = Arc::new(InMemoryDenylist::with_default_ttl(clock.clone()));
        let queue = Arc::new(InMemoryDeliveryQueue::new());
        let handler = SubmissionHandler::new(
            store.clone(),
            denylist.clone(),
            queue.clone(),
            Arc::new(UlidGenerator::new(clock)),
            Timeouts::default(),
        );
        Fixture {
            handler,
            store,
            denylist,
            queue,
        }
    }

    #[tokio::test]
    async fn accepted_submission_is_stored_then_queued() {
        let f = fixture();
        let submission = f.handler.submit("+15550000001", "hello").await.unwrap();

        let record = f
            .store
            .find_by_correlation_id(&submission.correlation_id)
            .await
            .unwrap();
        assert_eq!(record.id(), submission.record_id);
        assert_eq!(record.status(), DeliveryStatus::Pending);

        let msg = f.queue.consume(Duration::from_millis(100)).await.unwrap().unwrap();
        assert_eq!(msg.payload, submission.correlation_id.to_string());
        assert_eq!(msg.key, msg.payload);
    }

    #[tokio::test]
    async fn denylisted_destination_has_no_side_effects() {
        let f = fixture();
        f.denylist.add(&["+15550000001".to_string()]).await.unwrap();

        let err = f.handler.submit("+15550000001", "hello").await.unwrap_err();
        assert_eq!(err, PipelineError::DestinationBlocked("+15550000001".into()));
        assert!(f.store.is_empty().await);
        assert_eq!(f.queue.ready_len().await, 0);
    }

    #[tokio::test]
    async fn cache_outage_rejects_submission() {
        let f = fixture();
        f.denylist.set_available(false);

        let err = f.handler.submit("+15550000001", "hello").await.unwrap_err();
        assert!(matches!(err, PipelineError::CacheUnavailable(_)));
        assert!(f.store.is_empty().await);
    }

    #[tokio::test]
    async fn publish_failure_leaves_pending_record() {
        let f = fixture();
        f.queue.set_available(false);

        let err = f.handler.submit("+15550000001", "hello").await.unwrap_err();
        assert!(matches!(err, PipelineError::QueueUnavailable(_)));
        assert_eq!(f.store.len().await, 1);
        let record = f.store.find_by_id(RecordId(1)).await.unwrap();
        assert_eq!(record.status(), DeliveryStatus::Pending);
    }

    #[tokio::test]
    async fn store_outage_publishes_nothing() {
        let f = fixture();
        f.store.set_available(false);

        let err = f.handler.submit("+15550000001", "hello").await.unwrap_err();
        assert!(matches!(err, PipelineError::StoreUnavailable(_)));
        assert_eq!(f.queue.ready_len().await, 0);
    }
}
