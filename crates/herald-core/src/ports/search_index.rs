//! SearchIndex port - 結果を検索するための二次ストア（Elasticsearch など）
//!
//! eventually consistent な best-effort ストアです。正本は RecordStore で、
//! index は遅れたり欠けたりしても構いません。

use async_trait::async_trait;

use crate::domain::document::SearchDocument;
use crate::domain::search::{Page, PageRequest, SearchFilter};

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("search index unavailable: {0}")]
    Unavailable(String),

    /// 読み戻したドキュメントが現行 schema で解釈できない
    #[error("document {key} does not match a known schema: {reason}")]
    Schema { key: String, reason: String },
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// key（correlation id）で上書き保存
    async fn upsert(&self, key: &str, document: &SearchDocument) -> Result<(), IndexError>;

    /// `created_at` 降順でページング
    async fn query(
        &self,
        filter: &SearchFilter,
        page: PageRequest,
    ) -> Result<Page<SearchDocument>, IndexError>;

    async fn ping(&self) -> Result<(), IndexError> {
        Ok(())
    }
}
