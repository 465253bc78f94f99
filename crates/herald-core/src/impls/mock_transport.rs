//! MockTransport - 外部 SMS API の代わり
//!
//! - 既定では常に成功し、`MOCK_MSG_<n>` の message id を返す
//! - `script` で結果を順番に差し込める（使い切ったら既定に戻る）
//! - `with_delay` で応答を遅らせ、timeout の再現に使う

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::domain::outcome::TransportOutcome;
use crate::ports::{DeliveryTransport, OutboundMessage};

#[derive(Default)]
pub struct MockTransport {
    scripted: Mutex<VecDeque<TransportOutcome>>,
    sent: Mutex<Vec<OutboundMessage>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// 次の呼び出しから順に返す結果を積む
    pub fn script(&self, outcomes: impl IntoIterator<Item = TransportOutcome>) {
        let mut scripted = self.scripted.lock().unwrap_or_else(|e| e.into_inner());
        scripted.extend(outcomes);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 受け取ったメッセージ（呼び出し順）
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl DeliveryTransport for MockTransport {
    async fn send(&self, message: &OutboundMessage) -> TransportOutcome {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .scripted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        let outcome = scripted.unwrap_or_else(|| TransportOutcome::sent(format!("MOCK_MSG_{n}")));

        tracing::debug!(
            correlation_id = %message.correlation_id,
            destination = %message.destination,
            sent = outcome.is_sent(),
            "mock transport called"
        );
        outcome
    }
}
