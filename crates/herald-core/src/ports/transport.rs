//! DeliveryTransport port - 第三者の SMS チャネル
//!
//! 1 回の呼び出しで 1 通の配送を試み、結果を [`TransportOutcome`] で返します。
//! 失敗も値として返すので、このメソッド自体は `Result` を返しません。
//! 呼び出し側（worker）が timeout で包み、時間切れは失敗として扱います。

use async_trait::async_trait;

use crate::domain::ids::CorrelationId;
use crate::domain::outcome::TransportOutcome;

/// transport に渡す 1 通分
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub correlation_id: CorrelationId,
    pub destination: String,
    pub body: String,
}

#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> TransportOutcome;
}
