//! herald-core
//!
//! 非同期 SMS 配送パイプラインの中核。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, state, request, outcome, document, search, errors）
//! - **ports**: 抽象化レイヤー（RecordStore, DenylistCache, DeliveryQueue, DeliveryTransport, SearchIndex, Clock, IdGenerator）
//! - **impls**: 実装（in-memory の store / denylist / queue / index と MockTransport）
//! - **app**: アプリケーションロジック（builder, submission, worker, worker_loop, service）
//! - **config**: TOML + 環境変数による設定
//! - **logging**: tracing-subscriber の初期化

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod logging;
pub mod ports;

pub use app::{App, AppBuilder, NotificationService, ProcessOutcome};
pub use config::PipelineConfig;
pub use domain::{DeliveryRequest, DeliveryStatus, PipelineError};
