//! DenylistCache port - 配送を拒否する destination の集合
//!
//! # TTL
//! 期限は集合全体に 1 つだけ。`add` のたびに集合全体の TTL（既定 24h）が
//! リセットされ、期限が来ると全メンバーがまとめて消えます。メンバーごとの
//! 期限ではありません。`remove` は TTL に触りません。
//!
//! # 障害時
//! backend に届かないとき `is_member` は `false` ではなく
//! [`CacheError::Unavailable`] を返します。どう扱うかは呼び出し側が決めます
//! （herald は submission / worker の両方で fail-closed）。

use async_trait::async_trait;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("denylist cache unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait DenylistCache: Send + Sync {
    /// メンバーを追加し、集合全体の TTL をリセット
    async fn add(&self, destinations: &[String]) -> Result<(), CacheError>;

    async fn remove(&self, destinations: &[String]) -> Result<(), CacheError>;

    /// 現在のメンバー（期限切れなら空）
    async fn members(&self) -> Result<BTreeSet<String>, CacheError>;

    async fn is_member(&self, destination: &str) -> Result<bool, CacheError>;

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}
