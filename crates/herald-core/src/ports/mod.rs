//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（RDB, Redis, Kafka, Elasticsearch, SMS API）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - RecordStore が source of truth（正本）
//! - DeliveryQueue は配送キュー（correlation id のみ）
//! - SearchIndex は best-effort の二次ストア
//! - DenylistCache は TTL 付きの集合

pub mod clock;
pub mod delivery_queue;
pub mod denylist;
pub mod id_generator;
pub mod record_store;
pub mod search_index;
pub mod transport;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, ManualClock, SystemClock};
pub use self::delivery_queue::{DeliveryQueue, QueueError, QueueMessage};
pub use self::denylist::{CacheError, DenylistCache};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::record_store::{RecordStore, StoreError};
pub use self::search_index::{IndexError, SearchIndex};
pub use self::transport::{DeliveryTransport, OutboundMessage};
