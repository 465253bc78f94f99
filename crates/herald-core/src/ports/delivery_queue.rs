//! DeliveryQueue port - 配送キュー（Kafka / Redis または InMemory）
//!
//! DeliveryQueue は correlation id のみを流します（状態や本文は含まない）。
//!
//! # 配送保証
//! - at-least-once: `consume` で受け取ったメッセージは `ack` されるまで消えない。
//!   `nack` されたものは再配送される
//! - 順序は同じ key のメッセージ間でのみ保証（key をまたぐ順序は保証しない）

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::ids::ReceiptId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    #[error("unknown receipt: {0}")]
    UnknownReceipt(ReceiptId),
}

/// consume で受け取った 1 件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// ack / nack に使うハンドル（配送ごとに別の値）
    pub receipt: ReceiptId,
    pub key: String,
    pub payload: String,
    /// このメッセージが配送された回数（初回 = 1）
    pub delivery_count: u32,
}

#[async_trait]
pub trait DeliveryQueue: Send + Sync {
    async fn publish(&self, key: &str, payload: &str) -> Result<(), QueueError>;

    /// 次のメッセージを待つ。timeout までに何もなければ `Ok(None)`
    async fn consume(&self, timeout: Duration) -> Result<Option<QueueMessage>, QueueError>;

    /// 処理完了。以後再配送されない
    async fn ack(&self, receipt: ReceiptId) -> Result<(), QueueError>;

    /// 処理を諦めて再配送に戻す
    async fn nack(&self, receipt: ReceiptId) -> Result<(), QueueError>;

    async fn ping(&self) -> Result<(), QueueError> {
        Ok(())
    }
}
