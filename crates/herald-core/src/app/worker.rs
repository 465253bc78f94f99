//! DeliveryWorker - 1 件の correlation id を終端状態まで進める
//!
//! # フロー
//! 1. store から correlation id で取得（無ければ InternalInconsistency として捨てる）
//! 2. 終端ならそのまま終了（再配送は no-op）
//! 3. PENDING → PROCESSING を version の CAS で確定（負けたら他の worker に任せる）
//! 4. denylist を再確認（member なら BLACKLISTED）
//! 5. transport を timeout 付きで呼ぶ
//! 6. 終端状態を保存し、search index に best-effort で書く
//!
//! 3〜6 の途中で予期しないエラーが起きたら FAILED / PROCESSING_ERROR を
//! 保存しようとします。それも失敗した record は PROCESSING のまま残ります。
//!
//! worker 側のエラーは呼び出し元に伝播しません。結果は [`ProcessOutcome`] で返します。

use std::sync::Arc;

use crate::app::deadline::bounded;
use crate::config::Timeouts;
use crate::domain::document::SearchDocument;
use crate::domain::errors::{ErrorKind, PipelineError};
use crate::domain::ids::CorrelationId;
use crate::domain::outcome::{TransportOutcome, codes};
use crate::domain::request::DeliveryRequest;
use crate::domain::state::DeliveryStatus;
use crate::ports::{
    DeliveryTransport, DenylistCache, OutboundMessage, RecordStore, SearchIndex, StoreError,
};

/// `process` の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// この呼び出しで終端状態まで進めた
    Completed(DeliveryStatus),
    /// すでに終端だった（再配送）
    AlreadyTerminal(DeliveryStatus),
    /// 別の worker が処理中、または CAS に負けた
    Skipped,
    /// record が存在しない。再試行しても直らないので捨てる
    Dropped,
    /// claim 前にインフラが応答しなかった。再配送に回す
    Deferred(String),
    /// 失敗の記録にも失敗し、PROCESSING のまま残った
    Stranded,
}

impl ProcessOutcome {
    /// queue に ack するか（false なら nack）
    pub fn should_ack(&self) -> bool {
        !matches!(self, ProcessOutcome::Deferred(_))
    }
}

pub struct DeliveryWorker {
    store: Arc<dyn RecordStore>,
    denylist: Arc<dyn DenylistCache>,
    transport: Arc<dyn DeliveryTransport>,
    index: Arc<dyn SearchIndex>,
    timeouts: Timeouts,
    index_blacklisted: bool,
}

impl DeliveryWorker {
    pub fn new(
        store: Arc<dyn RecordStore>,
        denylist: Arc<dyn DenylistCache>,
        transport: Arc<dyn DeliveryTransport>,
        index: Arc<dyn SearchIndex>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            store,
            denylist,
            transport,
            index,
            timeouts,
            index_blacklisted: true,
        }
    }

    /// BLACKLISTED を index に書くかどうか（既定 true）
    pub fn index_blacklisted(mut self, enabled: bool) -> Self {
        self.index_blacklisted = enabled;
        self
    }

    pub async fn process(&self, correlation_id: &CorrelationId) -> ProcessOutcome {
        let lookup = bounded(
            "store.find_by_correlation_id",
            self.timeouts.store,
            self.store.find_by_correlation_id(correlation_id),
        )
        .await;
        let record = match lookup {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => {
                let err = PipelineError::InternalInconsistency(format!(
                    "queued correlation id {correlation_id} has no record"
                ));
                tracing::error!(correlation_id = %correlation_id, error = %err, "dropping work item");
                return ProcessOutcome::Dropped;
            }
            Err(err) => {
                tracing::warn!(correlation_id = %correlation_id, error = %err, "lookup failed, deferring");
                return ProcessOutcome::Deferred(err.to_string());
            }
        };

        let status = record.status();
        if status.is_terminal() {
            tracing::debug!(correlation_id = %correlation_id, %status, "already terminal, nothing to do");
            return ProcessOutcome::AlreadyTerminal(status);
        }
        if status == DeliveryStatus::Processing {
            tracing::warn!(correlation_id = %correlation_id, "record already PROCESSING, skipping");
            return ProcessOutcome::Skipped;
        }

        let claimed = match self.claim(record).await {
            Ok(claimed) => claimed,
            Err(PipelineError::Conflict(reason)) => {
                tracing::debug!(correlation_id = %correlation_id, %reason, "claimed by another worker");
                return ProcessOutcome::Skipped;
            }
            Err(err) if err.kind() == ErrorKind::Infrastructure => {
                tracing::warn!(correlation_id = %correlation_id, error = %err, "claim failed, deferring");
                return ProcessOutcome::Deferred(err.to_string());
            }
            Err(err) => {
                tracing::error!(correlation_id = %correlation_id, error = %err, "claim rejected");
                return ProcessOutcome::Dropped;
            }
        };

        match self.drive(&claimed).await {
            Ok(done) => ProcessOutcome::Completed(done.status()),
            Err(err) => self.fail_after_error(&claimed, err).await,
        }
    }

    /// PENDING → PROCESSING（version の CAS）
    async fn claim(&self, mut record: DeliveryRequest) -> Result<DeliveryRequest, PipelineError> {
        record.begin_processing()?;
        self.persist(record).await
    }

    /// PROCESSING から終端状態まで
    async fn drive(&self, claimed: &DeliveryRequest) -> Result<DeliveryRequest, PipelineError> {
        let correlation_id = claimed.correlation_id();
        let mut record = claimed.clone();

        let member = bounded(
            "denylist.is_member",
            self.timeouts.cache,
            self.denylist.is_member(record.destination()),
        )
        .await;
        match member {
            Ok(true) => {
                record.mark_blacklisted()?;
                let saved = self.persist(record).await?;
                tracing::info!(correlation_id = %correlation_id, "destination denylisted before delivery");
                if self.index_blacklisted {
                    self.index(&saved).await;
                }
                return Ok(saved);
            }
            Ok(false) => {}
            Err(err) => {
                // denylist を確認できないまま送らない
                tracing::warn!(correlation_id = %correlation_id, error = %err, "denylist unavailable, refusing delivery");
                record.mark_failed(codes::DENYLIST_UNAVAILABLE, err.to_string())?;
                let saved = self.persist(record).await?;
                self.index(&saved).await;
                return Ok(saved);
            }
        }

        let message = OutboundMessage {
            correlation_id,
            destination: record.destination().to_string(),
            body: record.body().to_string(),
        };
        let limit = self.timeouts.transport;
        let outcome = match tokio::time::timeout(limit, self.transport.send(&message)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(correlation_id = %correlation_id, limit_ms = limit.as_millis() as u64, "transport timed out");
                TransportOutcome::timed_out(limit)
            }
        };

        if let TransportOutcome::Failed { code, detail } = &outcome {
            tracing::warn!(correlation_id = %correlation_id, %code, %detail, "delivery failed");
        }
        record.apply_outcome(outcome)?;
        let saved = self.persist(record).await?;
        tracing::info!(correlation_id = %correlation_id, status = %saved.status(), "delivery finished");

        self.index(&saved).await;
        Ok(saved)
    }

    /// claim 後のエラー: FAILED / PROCESSING_ERROR を残す
    async fn fail_after_error(&self, claimed: &DeliveryRequest, cause: PipelineError) -> ProcessOutcome {
        let correlation_id = claimed.correlation_id();
        tracing::error!(correlation_id = %correlation_id, error = %cause, "processing error after claim");

        let mut record = claimed.clone();
        if let Err(err) = record.mark_failed(codes::PROCESSING_ERROR, cause.to_string()) {
            tracing::error!(correlation_id = %correlation_id, error = %err, "cannot mark record failed");
            return ProcessOutcome::Stranded;
        }
        match self.persist(record).await {
            Ok(saved) => {
                self.index(&saved).await;
                ProcessOutcome::Completed(saved.status())
            }
            Err(err) => {
                tracing::error!(
                    correlation_id = %correlation_id,
                    error = %err,
                    "could not record failure; record left in PROCESSING"
                );
                ProcessOutcome::Stranded
            }
        }
    }

    async fn persist(&self, record: DeliveryRequest) -> Result<DeliveryRequest, PipelineError> {
        Ok(bounded("store.update", self.timeouts.store, self.store.update(record)).await?)
    }

    /// best-effort。失敗しても終端状態はそのまま
    async fn index(&self, record: &DeliveryRequest) {
        let key = record.correlation_id().to_string();
        let document = SearchDocument::from_record(record);
        if let Err(err) = bounded(
            "index.upsert",
            self.timeouts.index,
            self.index.upsert(&key, &document),
        )
        .await
        {
            tracing::warn!(correlation_id = %key, error = %err, "search index write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{InMemoryDenylist, InMemoryRecordStore, InMemorySearchIndex, MockTransport};
    use crate::domain::request::NewDeliveryRequest;
    use crate::ports::{Clock, SystemClock};
    use std::time::Duration;
    use ulid::Ulid;

    struct Fixture {
        worker: DeliveryWorker,
        store: Arc<InMemoryRecordStore>,
        denylist: Arc<InMemoryDenylist>,
        transport: Arc<MockTransport>,
        index: Arc<InMemorySearchIndex>,
    }

    fn fixture_with(transport: MockTransport, timeouts: Timeouts) -> Fixture {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(InMemoryRecordStore::new(clock.clone()));
        let denylist = Arc::new(InMemoryDenylist::with_default_ttl(clock));
        let transport = Arc::new(transport);
        let index = Arc::new(InMemorySearchIndex::new());
        let worker = DeliveryWorker::new(
            store.clone(),
            denylist.clone(),
            transport.clone(),
            index.clone(),
            timeouts,
        );
        Fixture {
            worker,
            store,
            denylist,
            transport,
            index,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(MockTransport::new(), Timeouts::default())
    }

    async fn pending(f: &Fixture, destination: &str) -> CorrelationId {
        let correlation_id = CorrelationId::from_ulid(Ulid::new());
        f.store
            .insert(NewDeliveryRequest {
                correlation_id,
                destination: destination.to_string(),
                body: "hello".to_string(),
            })
            .await
            .unwrap();
        correlation_id
    }

    #[tokio::test]
    async fn pending_record_is_sent_and_indexed() {
        let f = fixture();
        let id = pending(&f, "+15550000001").await;

        assert_eq!(
            f.worker.process(&id).await,
            ProcessOutcome::Completed(DeliveryStatus::Sent)
        );
        let record = f.store.find_by_correlation_id(&id).await.unwrap();
        assert_eq!(record.transport_message_id(), Some("MOCK_MSG_1"));
        let doc = f.index.get(&id.to_string()).await.unwrap().unwrap();
        assert_eq!(doc.status(), DeliveryStatus::Sent);
    }

    #[tokio::test]
    async fn replay_is_a_no_op() {
        let f = fixture();
        let id = pending(&f, "+15550000001").await;

        f.worker.process(&id).await;
        let first = f.store.find_by_correlation_id(&id).await.unwrap();
        let again = f.worker.process(&id).await;

        assert_eq!(again, ProcessOutcome::AlreadyTerminal(DeliveryStatus::Sent));
        assert_eq!(f.store.find_by_correlation_id(&id).await.unwrap(), first);
        assert_eq!(f.transport.calls(), 1);
    }

    #[tokio::test]
    async fn denylist_hit_blacklists_without_transport() {
        let f = fixture();
        let id = pending(&f, "+15550000001").await;
        f.denylist.add(&["+15550000001".to_string()]).await.unwrap();

        assert_eq!(
            f.worker.process(&id).await,
            ProcessOutcome::Completed(DeliveryStatus::Blacklisted)
        );
        let record = f.store.find_by_correlation_id(&id).await.unwrap();
        assert_eq!(record.failure_code(), Some(codes::PHONE_NUMBER_BLACKLISTED));
        assert_eq!(record.failure_detail(), Some(codes::BLACKLISTED_DETAIL));
        assert_eq!(f.transport.calls(), 0);
        assert_eq!(f.index.len().await, 1);
    }

    #[tokio::test]
    async fn blacklisted_indexing_can_be_turned_off() {
        let mut f = fixture();
        f.worker = f.worker.index_blacklisted(false);
        let id = pending(&f, "+15550000001").await;
        f.denylist.add(&["+15550000001".to_string()]).await.unwrap();

        f.worker.process(&id).await;
        assert!(f.index.is_empty().await);
    }

    #[tokio::test]
    async fn denylist_outage_fails_closed() {
        let f = fixture();
        let id = pending(&f, "+15550000001").await;
        f.denylist.set_available(false);

        assert_eq!(
            f.worker.process(&id).await,
            ProcessOutcome::Completed(DeliveryStatus::Failed)
        );
        let record = f.store.find_by_correlation_id(&id).await.unwrap();
        assert_eq!(record.failure_code(), Some(codes::DENYLIST_UNAVAILABLE));
        assert_eq!(f.transport.calls(), 0);
    }

    #[tokio::test]
    async fn transport_failure_is_recorded() {
        let f = fixture();
        f.transport
            .script([TransportOutcome::failed("RATE_LIMIT", "too many requests")]);
        let id = pending(&f, "+15550000001").await;

        f.worker.process(&id).await;
        let record = f.store.find_by_correlation_id(&id).await.unwrap();
        assert_eq!(record.status(), DeliveryStatus::Failed);
        assert_eq!(record.failure_code(), Some("RATE_LIMIT"));
        assert_eq!(record.failure_detail(), Some("too many requests"));
        assert_eq!(record.transport_message_id(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_transport_times_out() {
        let timeouts = Timeouts {
            transport: Duration::from_millis(100),
            ..Timeouts::default()
        };
        let f = fixture_with(MockTransport::with_delay(Duration::from_secs(5)), timeouts);
        let id = pending(&f, "+15550000001").await;

        assert_eq!(
            f.worker.process(&id).await,
            ProcessOutcome::Completed(DeliveryStatus::Failed)
        );
        let record = f.store.find_by_correlation_id(&id).await.unwrap();
        assert_eq!(record.failure_code(), Some(codes::TRANSPORT_TIMEOUT));
    }

    #[tokio::test]
    async fn unknown_id_is_dropped() {
        let f = fixture();
        let outcome = f.worker.process(&CorrelationId::from_ulid(Ulid::new())).await;
        assert_eq!(outcome, ProcessOutcome::Dropped);
        assert!(outcome.should_ack());
    }

    #[tokio::test]
    async fn store_outage_before_claim_defers() {
        let f = fixture();
        let id = pending(&f, "+15550000001").await;
        f.store.set_available(false);

        let outcome = f.worker.process(&id).await;
        assert!(matches!(outcome, ProcessOutcome::Deferred(_)));
        assert!(!outcome.should_ack());
    }

    #[tokio::test]
    async fn index_outage_keeps_terminal_status() {
        let f = fixture();
        f.index.set_available(false);
        let id = pending(&f, "+15550000001").await;

        assert_eq!(
            f.worker.process(&id).await,
            ProcessOutcome::Completed(DeliveryStatus::Sent)
        );
        let record = f.store.find_by_correlation_id(&id).await.unwrap();
        assert_eq!(record.status(), DeliveryStatus::Sent);
    }

    #[tokio::test]
    async fn record_stuck_in_processing_is_skipped() {
        let f = fixture();
        let id = pending(&f, "+15550000001").await;
        let mut record = f.store.find_by_correlation_id(&id).await.unwrap();
        record.begin_processing().unwrap();
        f.store.update(record).await.unwrap();

        assert_eq!(f.worker.process(&id).await, ProcessOutcome::Skipped);
        assert_eq!(f.transport.calls(), 0);
    }
}
