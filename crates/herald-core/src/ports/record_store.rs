//! RecordStore port - DeliveryRequest の正本（source of truth）
//!
//! # 設計原則
//! - 1 submission = 1 row。correlation id と連番 id の両方で引ける
//! - `id` / `created_at` / `updated_at` / `version` は adapter が明示的に設定する
//! - `update` は version による条件付き更新（compare-and-swap）。
//!   読んだ時点から誰かが書き換えていれば [`StoreError::Conflict`] で拒否する。
//!   worker の PENDING -> PROCESSING はこれで 1 回しか成立しない。

use async_trait::async_trait;

use crate::domain::ids::{CorrelationId, RecordId};
use crate::domain::request::{DeliveryRequest, NewDeliveryRequest};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("correlation id already stored: {0}")]
    Duplicate(CorrelationId),

    #[error("version conflict on record {id}: expected {expected}, found {actual}")]
    Conflict {
        id: RecordId,
        expected: u64,
        actual: u64,
    },

    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 新しい record を PENDING で保存し、採番済みの record を返す
    async fn insert(&self, new: NewDeliveryRequest) -> Result<DeliveryRequest, StoreError>;

    async fn find_by_correlation_id(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<DeliveryRequest, StoreError>;

    async fn find_by_id(&self, id: RecordId) -> Result<DeliveryRequest, StoreError>;

    /// `record.version()` が保存済みの version と一致するときだけ書き込む。
    /// 成功すると version +1 / updated_at 更新済みの record を返す。
    async fn update(&self, record: DeliveryRequest) -> Result<DeliveryRequest, StoreError>;

    /// 管理操作。パイプライン自体は削除しない。
    async fn delete_by_id(&self, id: RecordId) -> Result<(), StoreError>;

    /// health check 用
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
