//! NotificationService - 外側（HTTP 層 / CLI）から使う facade
//!
//! 受付は SubmissionHandler に委譲し、参照系は store / index / denylist を
//! そのまま叩きます。すべての呼び出しは timeout 付きです。

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::app::deadline::bounded;
use crate::app::submission::{Submission, SubmissionHandler};
use crate::config::Timeouts;
use crate::domain::document::SearchDocument;
use crate::domain::errors::PipelineError;
use crate::domain::ids::{CorrelationId, RecordId};
use crate::domain::request::DeliveryRequest;
use crate::domain::search::{Page, PageRequest, SearchFilter};
use crate::ports::{Clock, DeliveryQueue, DenylistCache, RecordStore, SearchIndex};

/// 依存先 1 つ分の疎通結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DependencyHealth {
    Up,
    Down { reason: String },
}

impl DependencyHealth {
    fn from_result<E: std::fmt::Display>(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => DependencyHealth::Up,
            Err(err) => DependencyHealth::Down {
                reason: err.to_string(),
            },
        }
    }

    pub fn is_up(&self) -> bool {
        matches!(self, DependencyHealth::Up)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub checked_at: DateTime<Utc>,
    pub store: DependencyHealth,
    pub queue: DependencyHealth,
    pub denylist: DependencyHealth,
    pub index: DependencyHealth,
}

impl HealthReport {
    /// store / queue / denylist が生きていれば受付可能（index は best-effort）
    pub fn accepting_submissions(&self) -> bool {
        self.store.is_up() && self.queue.is_up() && self.denylist.is_up()
    }

    pub fn all_up(&self) -> bool {
        self.accepting_submissions() && self.index.is_up()
    }
}

pub struct NotificationService {
    submission: SubmissionHandler,
    store: Arc<dyn RecordStore>,
    denylist: Arc<dyn DenylistCache>,
    queue: Arc<dyn DeliveryQueue>,
    index: Arc<dyn SearchIndex>,
    clock: Arc<dyn Clock>,
    timeouts: Timeouts,
}

impl NotificationService {
    pub fn new(
        submission: SubmissionHandler,
        store: Arc<dyn RecordStore>,
        denylist: Arc<dyn DenylistCache>,
        queue: Arc<dyn DeliveryQueue>,
        index: Arc<dyn SearchIndex>,
        clock: Arc<dyn Clock>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            submission,
            store,
            denylist,
            queue,
            index,
            clock,
            timeouts,
        }
    }

    pub async fn submit(&self, destination: &str, body: &str) -> Result<Submission, PipelineError> {
        self.submission.submit(destination, body).await
    }

    pub async fn get_by_correlation_id(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<DeliveryRequest, PipelineError> {
        Ok(bounded(
            "store.find_by_correlation_id",
            self.timeouts.store,
            self.store.find_by_correlation_id(correlation_id),
        )
        .await?)
    }

    pub async fn get_by_id(&self, id: RecordId) -> Result<DeliveryRequest, PipelineError> {
        Ok(bounded("store.find_by_id", self.timeouts.store, self.store.find_by_id(id)).await?)
    }

    /// 管理用。store から直接消す（index には残る）
    pub async fn delete_by_id(&self, id: RecordId) -> Result<(), PipelineError> {
        bounded("store.delete_by_id", self.timeouts.store, self.store.delete_by_id(id)).await?;
        tracing::info!(record_id = %id, "record deleted");
        Ok(())
    }

    pub async fn denylist_add(&self, destinations: &[String]) -> Result<(), PipelineError> {
        Ok(bounded("denylist.add", self.timeouts.cache, self.denylist.add(destinations)).await?)
    }

    pub async fn denylist_remove(&self, destinations: &[String]) -> Result<(), PipelineError> {
        Ok(bounded(
            "denylist.remove",
            self.timeouts.cache,
            self.denylist.remove(destinations),
        )
        .await?)
    }

    pub async fn denylist_list(&self) -> Result<BTreeSet<String>, PipelineError> {
        Ok(bounded("denylist.members", self.timeouts.cache, self.denylist.members()).await?)
    }

    /// destination 完全一致 + created_at が [from, to] の範囲
    pub async fn search_by_destination(
        &self,
        destination: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        page: PageRequest,
    ) -> Result<Page<SearchDocument>, PipelineError> {
        let filter = SearchFilter::ByDestination {
            destination: destination.to_string(),
            from,
            to,
        };
        self.search(filter, page).await
    }

    /// 本文の単語一致（大文字小文字は区別しない）
    pub async fn search_by_text(
        &self,
        text: &str,
        page: PageRequest,
    ) -> Result<Page<SearchDocument>, PipelineError> {
        let filter = SearchFilter::ByText {
            text: text.to_string(),
        };
        self.search(filter, page).await
    }

    async fn search(
        &self,
        filter: SearchFilter,
        page: PageRequest,
    ) -> Result<Page<SearchDocument>, PipelineError> {
        Ok(bounded("index.query", self.timeouts.index, self.index.query(&filter, page)).await?)
    }

    pub async fn health(&self) -> HealthReport {
        let (store, queue, denylist, index) = tokio::join!(
            bounded("store.ping", self.timeouts.store, self.store.ping()),
            bounded("queue.ping", self.timeouts.queue, self.queue.ping()),
            bounded("denylist.ping", self.timeouts.cache, self.denylist.ping()),
            bounded("index.ping", self.timeouts.index, self.index.ping()),
        );
        let report = HealthReport {
            checked_at: self.clock.now(),
            store: DependencyHealth::from_result(store),
            queue: DependencyHealth::from_result(queue),
            denylist: DependencyHealth::from_result(denylist),
            index: DependencyHealth::from_result(index),
        };
        if !report.all_up() {
            tracing::warn!(?report, "dependency check failed");
        }
        report
    }
}
