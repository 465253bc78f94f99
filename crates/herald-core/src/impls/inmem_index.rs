//! InMemorySearchIndex - Elasticsearch の代わりに使う開発用 index
//!
//! ドキュメントは JSON のまま保存し、query のたびに [`SearchDocument::from_json`]
//! で読み戻します。本物の index と同じく schema のずれはここで表面化します。

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::domain::document::SearchDocument;
use crate::domain::search::{Page, PageRequest, SearchFilter};
use crate::ports::{IndexError, SearchIndex};

pub struct InMemorySearchIndex {
    documents: RwLock<HashMap<String, serde_json::Value>>,
    available: AtomicBool,
}

impl InMemorySearchIndex {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// 1 件を key で取得（テスト・デバッグ用）
    pub async fn get(&self, key: &str) -> Result<Option<SearchDocument>, IndexError> {
        self.check_available()?;
        let documents = self.documents.read().await;
        documents
            .get(key)
            .map(|raw| decode(key, raw.clone()))
            .transpose()
    }

    /// 生の JSON を書き込む（古い / 未来の schema の再現用）
    pub async fn put_raw(&self, key: &str, raw: serde_json::Value) {
        self.documents.write().await.insert(key.to_string(), raw);
    }

    fn check_available(&self) -> Result<(), IndexError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(IndexError::Unavailable(
                "in-memory index switched off".to_string(),
            ))
        }
    }
}

impl Default for InMemorySearchIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn decode(key: &str, raw: serde_json::Value) -> Result<SearchDocument, IndexError> {
    SearchDocument::from_json(raw).map_err(|e| IndexError::Schema {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// 英数字以外で区切り、小文字の単語にする
fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

fn matches(filter: &SearchFilter, doc: &SearchDocument) -> bool {
    match filter {
        SearchFilter::ByDestination {
            destination,
            from,
            to,
        } => doc.destination() == destination && doc.created_at() >= *from && doc.created_at() <= *to,
        // match query と同じく OR: どれか 1 語が body にあればヒット
        SearchFilter::ByText { text } => {
            let body: Vec<String> = words(doc.body()).collect();
            words(text).any(|term| body.contains(&term))
        }
    }
}

#[async_trait]
impl SearchIndex for InMemorySearchIndex {
    async fn upsert(&self, key: &str, document: &SearchDocument) -> Result<(), IndexError> {
        self.check_available()?;
        let raw = document.to_json().map_err(|e| IndexError::Schema {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.documents.write().await.insert(key.to_string(), raw);
        Ok(())
    }

    async fn query(
        &self,
        filter: &SearchFilter,
        page: PageRequest,
    ) -> Result<Page<SearchDocument>, IndexError> {
        self.check_available()?;
        let documents = self.documents.read().await;

        let mut hits = Vec::new();
        for (key, raw) in documents.iter() {
            match decode(key, raw.clone()) {
                Ok(doc) if matches(filter, &doc) => hits.push(doc),
                Ok(_) => {}
                // 読めないドキュメントはヒットから外し、ログに残す
                Err(err) => tracing::error!(error = %err, "skipping unreadable search document"),
            }
        }
        drop(documents);

        hits.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.correlation_id().cmp(&a.correlation_id()))
        });
        Ok(Page::slice(hits, page))
    }

    async fn ping(&self) -> Result<(), IndexError> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::{CorrelationId, RecordId};
    use crate::domain::request::{DeliveryRequest, NewDeliveryRequest};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rstest::rstest;
    use ulid::Ulid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn doc(id: u64, destination: &str, body: &str, minutes: i64) -> SearchDocument {
        let mut r = DeliveryRequest::materialize(
            NewDeliveryRequest {
                correlation_id: CorrelationId::from_ulid(Ulid::new()),
                destination: destination.to_string(),
                body: body.to_string(),
            },
            RecordId(id),
            t0() + Duration::minutes(minutes),
        );
        r.begin_processing().unwrap();
        r.mark_sent(format!("m-{id}")).unwrap();
        SearchDocument::from_record(&r)
    }

    async fn seeded() -> InMemorySearchIndex {
        let index = InMemorySearchIndex::new();
        for d in [
            doc(1, "+15550000001", "Your code is 1234", 0),
            doc(2, "+15550000001", "Meeting moved to noon", 10),
            doc(3, "+15550000002", "your CODE expires soon", 20),
            doc(4, "+15550000001", "Another code for you", 30),
        ] {
            index.upsert(&d.correlation_id().to_string(), &d).await.unwrap();
        }
        index
    }

    #[tokio::test]
    async fn by_destination_respects_range_and_order() {
        let index = seeded().await;
        let filter = SearchFilter::ByDestination {
            destination: "+15550000001".to_string(),
            from: t0(),
            to: t0() + Duration::minutes(10),
        };

        let page = index.query(&filter, PageRequest::default()).await.unwrap();
        let bodies: Vec<_> = page.items.iter().map(|d| d.body().to_string()).collect();
        assert_eq!(page.total, 2);
        assert_eq!(bodies, vec!["Meeting moved to noon", "Your code is 1234"]);
    }

    #[tokio::test]
    async fn by_text_is_case_insensitive_word_match() {
        let index = seeded().await;
        let filter = SearchFilter::ByText {
            text: "code".to_string(),
        };

        let page = index.query(&filter, PageRequest::default()).await.unwrap();
        assert_eq!(page.total, 3);
        // created_at 降順
        assert_eq!(page.items[0].body(), "Another code for you");
        assert_eq!(page.items[2].body(), "Your code is 1234");
    }

    #[rstest]
    #[case::one_term_missing("code mars", 3)]
    #[case::terms_in_different_docs("meeting expires", 2)]
    #[case::punctuation_splits_terms("noon!", 1)]
    #[case::no_term_present("mars venus", 0)]
    #[tokio::test]
    async fn by_text_matches_any_term(#[case] text: &str, #[case] expected: usize) {
        let index = seeded().await;
        let filter = SearchFilter::ByText {
            text: text.to_string(),
        };
        assert_eq!(index.query(&filter, PageRequest::default()).await.unwrap().total, expected);
    }

    #[tokio::test]
    async fn text_paging() {
        let index = seeded().await;
        let filter = SearchFilter::ByText {
            text: "code".to_string(),
        };

        let page = index.query(&filter, PageRequest::new(1, 2)).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].body(), "Your code is 1234");
    }

    #[tokio::test]
    async fn blank_text_matches_nothing() {
        let index = seeded().await;
        let filter = SearchFilter::ByText {
            text: "   ".to_string(),
        };
        assert_eq!(index.query(&filter, PageRequest::default()).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn upsert_replaces_by_key() {
        let index = InMemorySearchIndex::new();
        let d = doc(1, "+15550000001", "first", 0);
        let key = d.correlation_id().to_string();
        index.upsert(&key, &d).await.unwrap();
        index.upsert(&key, &d).await.unwrap();
        assert_eq!(index.len().await, 1);
    }

    #[tokio::test]
    async fn unknown_schema_is_skipped_in_query_and_error_on_get() {
        let index = seeded().await;
        index
            .put_raw(
                "sms-legacy",
                serde_json::json!({"schema_version": "0", "phoneNumber": "+15550000001"}),
            )
            .await;

        let filter = SearchFilter::ByDestination {
            destination: "+15550000001".to_string(),
            from: t0() - Duration::days(1),
            to: t0() + Duration::days(1),
        };
        let page = index.query(&filter, PageRequest::default()).await.unwrap();
        assert_eq!(page.total, 3);

        assert!(matches!(
            index.get("sms-legacy").await,
            Err(IndexError::Schema { .. })
        ));
    }

    #[tokio::test]
    async fn switched_off_index_is_unavailable() {
        let index = InMemorySearchIndex::new();
        index.set_available(false);
        let d = doc(1, "+15550000001", "x", 0);
        assert!(matches!(
            index.upsert("k", &d).await,
            Err(IndexError::Unavailable(_))
        ));
    }
}
