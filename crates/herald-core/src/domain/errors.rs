//! Errors - パイプラインのエラー型と分類
//!
//! port ごとのエラー（StoreError, QueueError, CacheError, IndexError）は
//! `From` で [`PipelineError`] に集約されます。

use crate::domain::request::TransitionError;
use crate::domain::state::DeliveryStatus;
use crate::ports::{CacheError, IndexError, QueueError, StoreError};

/// ErrorKind は運用上の分類
///
/// - Transient: 一時的（再投入すれば通る可能性がある）
/// - Permanent: 恒久的（同じ入力では何度やっても同じ）
/// - Infrastructure: インフラ障害（store / queue / cache / index）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// submission 時の同期的な拒否。副作用なし
    #[error("destination {0} is on the denylist")]
    DestinationBlocked(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transport failure {code}: {detail}")]
    TransportFailure { code: String, detail: String },

    #[error("record store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("search index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("denylist cache unavailable: {0}")]
    CacheUnavailable(String),

    /// queue から来た correlation id に record がない、など
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),

    /// optimistic update の競合（他の worker が先に書いた）
    #[error("concurrent update: {0}")]
    Conflict(String),

    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition {
        from: DeliveryStatus,
        to: DeliveryStatus,
    },
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::DestinationBlocked(_)
            | PipelineError::NotFound(_)
            | PipelineError::InternalInconsistency(_)
            | PipelineError::InvalidTransition { .. } => ErrorKind::Permanent,
            PipelineError::TransportFailure { .. } | PipelineError::Conflict(_) => {
                ErrorKind::Transient
            }
            PipelineError::StoreUnavailable(_)
            | PipelineError::QueueUnavailable(_)
            | PipelineError::IndexUnavailable(_)
            | PipelineError::CacheUnavailable(_) => ErrorKind::Infrastructure,
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => PipelineError::NotFound(what),
            StoreError::Conflict { .. } => PipelineError::Conflict(err.to_string()),
            // 128-bit の衝突は起きない前提。起きたら整合性の問題として扱う
            StoreError::Duplicate(_) => PipelineError::InternalInconsistency(err.to_string()),
            StoreError::Unavailable(reason) => PipelineError::StoreUnavailable(reason),
        }
    }
}

impl From<QueueError> for PipelineError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Unavailable(reason) => PipelineError::QueueUnavailable(reason),
            QueueError::UnknownReceipt(_) => PipelineError::InternalInconsistency(err.to_string()),
        }
    }
}

impl From<CacheError> for PipelineError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Unavailable(reason) => PipelineError::CacheUnavailable(reason),
        }
    }
}

impl From<IndexError> for PipelineError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::Unavailable(reason) => PipelineError::IndexUnavailable(reason),
            IndexError::Schema { .. } => PipelineError::InternalInconsistency(err.to_string()),
        }
    }
}

impl From<TransitionError> for PipelineError {
    fn from(err: TransitionError) -> Self {
        PipelineError::InvalidTransition {
            from: err.from,
            to: err.to,
        }
    }
}
