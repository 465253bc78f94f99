//! Search - index 向けのクエリ条件とページング

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Search Index に渡すフィルタ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchFilter {
    /// destination 完全一致 + `created_at` が `[from, to]` に入るもの
    ByDestination {
        destination: String,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
    /// body に対する単語マッチ（大文字小文字は無視）
    ByText { text: String },
}

/// 0 始まりのページ指定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: usize,
    pub size: usize,
}

impl PageRequest {
    pub const DEFAULT_SIZE: usize = 20;

    pub fn new(page: usize, size: usize) -> Self {
        Self {
            page,
            size: size.max(1),
        }
    }

    pub fn offset(&self) -> usize {
        self.page.saturating_mul(self.size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(0, Self::DEFAULT_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// フィルタにマッチした総件数（ページング前）
    pub total: usize,
    pub page: usize,
    pub size: usize,
}

impl<T> Page<T> {
    /// ソート済みの全件から 1 ページ分を切り出す
    pub fn slice(all: Vec<T>, request: PageRequest) -> Self {
        let total = all.len();
        let items = all
            .into_iter()
            .skip(request.offset())
            .take(request.size)
            .collect();
        Self {
            items,
            total,
            page: request.page,
            size: request.size,
        }
    }

    pub fn total_pages(&self) -> usize {
        self.total.div_ceil(self.size.max(1))
    }
}
