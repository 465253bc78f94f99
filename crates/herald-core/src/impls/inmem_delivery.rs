//! InMemoryDeliveryQueue - 開発用の配送キュー
//!
//! # 学習ポイント
//! - tokio::sync::Mutex + Notify による待機付き consume
//! - at-least-once: ack されるまでメッセージは in-flight に残る
//! - key ごとの順序: 同じ key のメッセージが in-flight の間、後続は配らない
//!
//! # 使用例
//! ```ignore
//! let queue = InMemoryDeliveryQueue::new();
//! queue.publish("sms-01H...", "sms-01H...").await?;
//! let msg = queue.consume(Duration::from_secs(5)).await?;
//! queue.ack(msg.unwrap().receipt).await?;
//! ```

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use ulid::Ulid;

use crate::domain::ids::ReceiptId;
use crate::ports::{DeliveryQueue, QueueError, QueueMessage};

#[derive(Debug, Clone)]
struct Pending {
    key: String,
    payload: String,
    /// これまでに配送した回数
    deliveries: u32,
}

#[derive(Default)]
struct QueueState {
    /// 配送待ち（publish 順、nack されたものは先頭に戻る）
    ready: VecDeque<Pending>,
    /// 配送済み・未 ack
    in_flight: HashMap<ReceiptId, Pending>,
    /// in-flight のメッセージを持つ key
    busy_keys: HashSet<String>,
}

impl QueueState {
    /// busy でない key の先頭メッセージを取り出す
    fn take_next(&mut self) -> Option<(ReceiptId, Pending)> {
        let index = self
            .ready
            .iter()
            .position(|m| !self.busy_keys.contains(&m.key))?;
        let mut message = self.ready.remove(index)?;
        message.deliveries += 1;

        let receipt = ReceiptId::from_ulid(Ulid::new());
        self.busy_keys.insert(message.key.clone());
        self.in_flight.insert(receipt, message.clone());
        Some((receipt, message))
    }

    fn settle(&mut self, receipt: ReceiptId) -> Result<Pending, QueueError> {
        let message = self
            .in_flight
            .remove(&receipt)
            .ok_or(QueueError::UnknownReceipt(receipt))?;
        self.busy_keys.remove(&message.key);
        Ok(message)
    }
}

pub struct InMemoryDeliveryQueue {
    state: Mutex<QueueState>,
    /// publish / ack / nack 時の通知用
    notify: Notify,
    available: AtomicBool,
}

impl InMemoryDeliveryQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// 配送待ちの件数
    pub async fn ready_len(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    /// 未 ack の件数
    pub async fn in_flight_len(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    /// consumer が落ちた状況の再現: 未 ack をすべて配送待ちに戻す
    pub async fn redeliver_in_flight(&self) -> usize {
        let mut state = self.state.lock().await;
        let returned: Vec<Pending> = state.in_flight.drain().map(|(_, m)| m).collect();
        state.busy_keys.clear();
        // in-flight だったものは同じ key の後続より先に配る
        let count = returned.len();
        for message in returned {
            state.ready.push_front(message);
        }
        drop(state);
        self.notify.notify_waiters();
        count
    }

    fn check_available(&self) -> Result<(), QueueError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(QueueError::Unavailable(
                "in-memory queue switched off".to_string(),
            ))
        }
    }
}

impl Default for InMemoryDeliveryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliveryQueue for InMemoryDeliveryQueue {
    async fn publish(&self, key: &str, payload: &str) -> Result<(), QueueError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        state.ready.push_back(Pending {
            key: key.to_string(),
            payload: payload.to_string(),
            deliveries: 0,
        });
        drop(state);

        // 待機中の consumer に通知
        self.notify.notify_waiters();
        Ok(())
    }

    async fn consume(&self, timeout: Duration) -> Result<Option<QueueMessage>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            self.check_available()?;

            // state を見る前に登録しておけば、その後の notify_waiters を取りこぼさない
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock().await;
                if let Some((receipt, message)) = state.take_next() {
                    return Ok(Some(QueueMessage {
                        receipt,
                        key: message.key,
                        payload: message.payload,
                        delivery_count: message.deliveries,
                    }));
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn ack(&self, receipt: ReceiptId) -> Result<(), QueueError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        state.settle(receipt)?;
        drop(state);

        // key が空いたので、後続を待っている consumer を起こす
        self.notify.notify_waiters();
        Ok(())
    }

    async fn nack(&self, receipt: ReceiptId) -> Result<(), QueueError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let message = state.settle(receipt)?;
        state.ready.push_front(message);
        drop(state);

        self.notify.notify_waiters();
        Ok(())
    }

    async fn ping(&self) -> Result<(), QueueError> {
        self.check_available()
    }
}
