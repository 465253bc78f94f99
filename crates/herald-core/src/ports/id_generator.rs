//! IdGenerator port - ID 生成の抽象化
//!
//! correlation id は submission ごとに 1 度だけ生成され、以後
//! queue / store / index をまたぐ idempotency key になります。

use crate::domain::ids::CorrelationId;
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は分散環境で衝突しない ID を生成
///
/// # ULID の特性
/// - 時刻でソート可能
/// - 128-bit（80-bit がランダム部）
pub trait IdGenerator: Send + Sync {
    fn generate_correlation_id(&self) -> CorrelationId;
}

/// UlidGenerator は Clock の時刻 + 乱数で ULID を作る
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = u64::try_from(self.clock.now().timestamp_millis()).unwrap_or(0);
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_correlation_id(&self) -> CorrelationId {
        CorrelationId::from(self.next_ulid())
    }
}
