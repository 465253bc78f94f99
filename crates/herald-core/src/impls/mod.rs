//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryRecordStore**: 正本（RDB の代わり）
//! - **InMemoryDenylist**: TTL 付き集合（Redis の代わり）
//! - **InMemoryDeliveryQueue**: 配送キュー（Kafka の代わり）
//! - **InMemorySearchIndex**: 検索用の二次ストア（Elasticsearch の代わり）
//! - **MockTransport**: SMS API の代わり
//!
//! # 本番用実装
//! 本番用の実装は別クレートに配置する想定です（RDB / Redis / Kafka / Elasticsearch）。

pub mod inmem_delivery;
pub mod inmem_denylist;
pub mod inmem_index;
pub mod inmem_store;
pub mod mock_transport;

// 主要な型を再エクスポート
pub use self::inmem_delivery::InMemoryDeliveryQueue;
pub use self::inmem_denylist::{DEFAULT_DENYLIST_TTL_SECS, InMemoryDenylist};
pub use self::inmem_index::InMemorySearchIndex;
pub use self::inmem_store::InMemoryRecordStore;
pub use self::mock_transport::MockTransport;
