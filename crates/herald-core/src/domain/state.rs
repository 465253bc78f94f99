//! State - DeliveryRequest の状態遷移
//!
//! ```text
//! PENDING --(worker dequeues)--> PROCESSING
//! PROCESSING --(denylist hit)--> BLACKLISTED          [terminal]
//! PROCESSING --(transport success)--> SENT            [terminal]
//! PROCESSING --(transport failure / internal error)--> FAILED [terminal]
//! ```
//!
//! terminal からの遷移は存在しない。PENDING / PROCESSING へ戻ることもない。

use serde::{Deserialize, Serialize};
use std::fmt;

/// DeliveryStatus は DeliveryRequest のライフサイクル上の位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    /// Submission Handler が作成した直後（唯一の初期状態）
    Pending,
    /// worker が claim 済み
    Processing,
    Sent,
    Failed,
    Blacklisted,
}

impl DeliveryStatus {
    pub const ALL: [DeliveryStatus; 5] = [
        DeliveryStatus::Pending,
        DeliveryStatus::Processing,
        DeliveryStatus::Sent,
        DeliveryStatus::Failed,
        DeliveryStatus::Blacklisted,
    ];

    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeliveryStatus::Sent | DeliveryStatus::Failed | DeliveryStatus::Blacklisted
        )
    }

    /// 許可された遷移かどうか
    pub fn can_transition_to(self, next: DeliveryStatus) -> bool {
        use DeliveryStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Processing, Sent) | (Processing, Failed) | (Processing, Blacklisted)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "PENDING",
            DeliveryStatus::Processing => "PROCESSING",
            DeliveryStatus::Sent => "SENT",
            DeliveryStatus::Failed => "FAILED",
            DeliveryStatus::Blacklisted => "BLACKLISTED",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
