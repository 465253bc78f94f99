//! WorkerLoop - queue から correlation id を取り出して DeliveryWorker に渡す
//!
//! # フロー
//! 1. DeliveryQueue::consume() で 1 件待つ（poll timeout ごとに shutdown を確認）
//! 2. payload を CorrelationId として解釈
//! 3. DeliveryWorker::process()
//! 4. ProcessOutcome に従って ack / nack
//!
//! ack は状態遷移と index 書き込みの後です。
//! nack の前には delivery_count に比例した backoff を入れます（上限あり）。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::app::deadline::bounded;
use crate::app::worker::DeliveryWorker;
use crate::config::Timeouts;
use crate::domain::ids::CorrelationId;
use crate::ports::{DeliveryQueue, QueueMessage};

/// backoff は `queue_poll * delivery_count`、最大でこの倍数まで
const MAX_BACKOFF_STEPS: u32 = 8;

/// Worker group handle.
/// - `request_shutdown` で新しいメッセージの受け取りを止める
/// - `shutdown_and_join` で処理中の `process` が終わるまで待つ
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers.
    pub fn spawn(
        n: usize,
        queue: Arc<dyn DeliveryQueue>,
        worker: Arc<DeliveryWorker>,
        timeouts: Timeouts,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let q = Arc::clone(&queue);
            let w = Arc::clone(&worker);
            let mut rx = shutdown_rx.clone();

            let join = tokio::spawn(async move {
                worker_loop(worker_id, q, w, timeouts, &mut rx).await;
            });
            joins.push(join);
        }
        tracing::info!(workers = n, "delivery workers started");

        Self { shutdown_tx, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Request shutdown for all workers.
    /// 処理中の process は中断しない。次の consume に進まないだけ
    pub fn request_shutdown(&self) {
        // receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all workers.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for j in self.joins {
            if let Err(err) = j.await {
                tracing::error!(error = %err, "worker task ended abnormally");
            }
        }
        tracing::info!("delivery workers stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<dyn DeliveryQueue>,
    worker: Arc<DeliveryWorker>,
    timeouts: Timeouts,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // consume は待つので shutdown と競合させる
        let consumed = tokio::select! {
            changed = shutdown_rx.changed() => {
                // sender が消えたら group ごと破棄されている
                if changed.is_err() {
                    break;
                }
                continue;
            }
            consumed = queue.consume(timeouts.queue_poll) => consumed,
        };

        let message = match consumed {
            Ok(Some(message)) => message,
            Ok(None) => continue,
            Err(err) => {
                tracing::warn!(worker_id, error = %err, "consume failed");
                // 障害中に空回りしない
                tokio::time::sleep(timeouts.queue_poll).await;
                continue;
            }
        };

        handle(worker_id, queue.as_ref(), &worker, timeouts, message).await;
    }
}

async fn handle(
    worker_id: usize,
    queue: &dyn DeliveryQueue,
    worker: &DeliveryWorker,
    timeouts: Timeouts,
    message: QueueMessage,
) {
    let ack = match message.payload.parse::<CorrelationId>() {
        Ok(correlation_id) => {
            tracing::debug!(
                worker_id,
                correlation_id = %correlation_id,
                delivery_count = message.delivery_count,
                "processing work item"
            );
            let outcome = worker.process(&correlation_id).await;
            tracing::debug!(worker_id, correlation_id = %correlation_id, ?outcome, "work item handled");
            outcome.should_ack()
        }
        Err(err) => {
            // 何度配っても読めないので捨てる
            tracing::error!(worker_id, payload = %message.payload, error = %err, "unreadable work item dropped");
            true
        }
    };

    let receipt = message.receipt;
    let settled = if ack {
        bounded("queue.ack", timeouts.queue, queue.ack(receipt)).await
    } else {
        // 依存先の障害中に同じメッセージを即座に取り直さない
        let delay = retry_backoff(timeouts.queue_poll, message.delivery_count);
        tracing::debug!(worker_id, %receipt, delay_ms = delay.as_millis() as u64, "backing off before nack");
        tokio::time::sleep(delay).await;
        bounded("queue.nack", timeouts.queue, queue.nack(receipt)).await
    };
    if let Err(err) = settled {
        tracing::warn!(worker_id, %receipt, ack, error = %err, "failed to settle queue message");
    }
}

fn retry_backoff(base: Duration, delivery_count: u32) -> Duration {
    base.saturating_mul(delivery_count.clamp(1, MAX_BACKOFF_STEPS))
}
