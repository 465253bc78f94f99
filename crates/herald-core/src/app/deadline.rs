//! Deadline - port 呼び出しを時間で区切る
//!
//! 時間切れは各 port の `Unavailable` に変換します。呼び出し側は
//! 通常の接続エラーと同じ経路で扱えます（transport だけは別扱い、worker 参照）。

use std::future::Future;
use std::time::Duration;

use crate::ports::{CacheError, IndexError, QueueError, StoreError};

/// 時間切れを自分のエラー型で表せる port エラー
pub trait DeadlineExceeded {
    fn deadline_exceeded(operation: &'static str, limit: Duration) -> Self;
}

fn describe(operation: &str, limit: Duration) -> String {
    format!("{operation} timed out after {}ms", limit.as_millis())
}

impl DeadlineExceeded for StoreError {
    fn deadline_exceeded(operation: &'static str, limit: Duration) -> Self {
        StoreError::Unavailable(describe(operation, limit))
    }
}

impl DeadlineExceeded for QueueError {
    fn deadline_exceeded(operation: &'static str, limit: Duration) -> Self {
        QueueError::Unavailable(describe(operation, limit))
    }
}

impl DeadlineExceeded for CacheError {
    fn deadline_exceeded(operation: &'static str, limit: Duration) -> Self {
        CacheError::Unavailable(describe(operation, limit))
    }
}

impl DeadlineExceeded for IndexError {
    fn deadline_exceeded(operation: &'static str, limit: Duration) -> Self {
        IndexError::Unavailable(describe(operation, limit))
    }
}

/// `fut` を `limit` で打ち切る
pub async fn bounded<T, E, F>(operation: &'static str, limit: Duration, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: DeadlineExceeded,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, limit_ms = limit.as_millis() as u64, "port call timed out");
            Err(E::deadline_exceeded(operation, limit))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn slow_call_becomes_unavailable() {
        let result: Result<(), StoreError> = bounded("store.insert", Duration::from_millis(100), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        })
        .await;

        assert_eq!(
            result,
            Err(StoreError::Unavailable(
                "store.insert timed out after 100ms".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn fast_call_passes_through() {
        let result: Result<u8, QueueError> =
            bounded("queue.publish", Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result, Ok(7));
    }
}
