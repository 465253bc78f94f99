//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）: 足りない port を build() でまとめて報告
//! - 開発用の in-memory 実装は明示的に選ぶ（暗黙の既定にしない）

use std::sync::Arc;

use crate::app::service::NotificationService;
use crate::app::submission::SubmissionHandler;
use crate::app::worker::DeliveryWorker;
use crate::app::worker_loop::WorkerGroup;
use crate::config::PipelineConfig;
use crate::impls::{InMemoryDeliveryQueue, InMemoryDenylist, InMemoryRecordStore, InMemorySearchIndex};
use crate::ports::{
    Clock, DeliveryQueue, DeliveryTransport, DenylistCache, IdGenerator, RecordStore, SearchIndex,
    SystemClock, UlidGenerator,
};

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new()
///     .with_config(PipelineConfig::load()?)
///     .with_in_memory_backends()
///     .with_transport(Arc::new(MockTransport::new()))
///     .build()?;
/// let workers = app.spawn_workers();
/// ```
///
/// # Fail-fast 設計
/// - store / denylist / queue / index / transport はすべて必須
/// - clock と id generator は省略時に SystemClock / UlidGenerator
#[derive(Default)]
pub struct AppBuilder {
    config: PipelineConfig,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    store: Option<Arc<dyn RecordStore>>,
    denylist: Option<Arc<dyn DenylistCache>>,
    queue: Option<Arc<dyn DeliveryQueue>>,
    index: Option<Arc<dyn SearchIndex>>,
    transport: Option<Arc<dyn DeliveryTransport>>,
    in_memory: bool,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing components: {0:?}. Provide them or call with_in_memory_backends().")]
    MissingComponents(Vec<&'static str>),
}

impl AppBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_denylist(mut self, denylist: Arc<dyn DenylistCache>) -> Self {
        self.denylist = Some(denylist);
        self
    }

    pub fn with_queue(mut self, queue: Arc<dyn DeliveryQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_index(mut self, index: Arc<dyn SearchIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn DeliveryTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// 明示的に渡されていない store / denylist / queue / index を in-memory 実装で埋める
    ///
    /// transport は埋めません。
    pub fn with_in_memory_backends(mut self) -> Self {
        self.in_memory = true;
        self
    }

    /// AppBuilder を構築して App を生成
    ///
    /// # 検証
    /// - 必須の port がそろっているかチェック
    /// - 不足があれば BuildError::MissingComponents を返す
    pub fn build(self) -> Result<App, BuildError> {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(clock.clone())));

        let mut store = self.store;
        let mut denylist = self.denylist;
        let mut queue = self.queue;
        let mut index = self.index;
        if self.in_memory {
            store.get_or_insert_with(|| Arc::new(InMemoryRecordStore::new(clock.clone())));
            denylist.get_or_insert_with(|| {
                Arc::new(InMemoryDenylist::new(clock.clone(), self.config.denylist_ttl()))
            });
            queue.get_or_insert_with(|| Arc::new(InMemoryDeliveryQueue::new()));
            index.get_or_insert_with(|| Arc::new(InMemorySearchIndex::new()));
        }

        let mut missing = Vec::new();
        if store.is_none() {
            missing.push("record store");
        }
        if denylist.is_none() {
            missing.push("denylist cache");
        }
        if queue.is_none() {
            missing.push("delivery queue");
        }
        if index.is_none() {
            missing.push("search index");
        }
        if self.transport.is_none() {
            missing.push("delivery transport");
        }
        let (Some(store), Some(denylist), Some(queue), Some(index), Some(transport)) =
            (store, denylist, queue, index, self.transport)
        else {
            return Err(BuildError::MissingComponents(missing));
        };

        let timeouts = self.config.timeouts();
        let submission = SubmissionHandler::new(
            store.clone(),
            denylist.clone(),
            queue.clone(),
            ids,
            timeouts,
        );
        let service = NotificationService::new(
            submission,
            store.clone(),
            denylist.clone(),
            queue.clone(),
            index.clone(),
            clock,
            timeouts,
        );
        let worker = DeliveryWorker::new(store, denylist, transport, index, timeouts)
            .index_blacklisted(self.config.index_blacklisted);

        Ok(App {
            service: Arc::new(service),
            worker: Arc::new(worker),
            queue,
            config: self.config,
        })
    }
}

/// App は組み上がったパイプライン
pub struct App {
    pub service: Arc<NotificationService>,
    pub worker: Arc<DeliveryWorker>,
    pub queue: Arc<dyn DeliveryQueue>,
    pub config: PipelineConfig,
}

impl App {
    /// 設定の worker 数で WorkerGroup を起動
    pub fn spawn_workers(&self) -> WorkerGroup {
        WorkerGroup::spawn(
            self.config.workers,
            Arc::clone(&self.queue),
            Arc::clone(&self.worker),
            self.config.timeouts(),
        )
    }
}
