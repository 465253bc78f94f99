//! SearchDocument - Search Index に書く versioned なドキュメント
//!
//! index の schema は record store と独立に進化するので、読み戻しは
//! `schema_version` タグ付きの明示的なマッピングだけを受け付けます。
//! 知らない version や欠けたフィールドは [`DocumentError`] になり、
//! 空の record として黙って読まれることはありません。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{CorrelationId, RecordId};
use super::request::DeliveryRequest;
use super::state::DeliveryStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "schema_version")]
pub enum SearchDocument {
    #[serde(rename = "1")]
    V1(DocumentV1),
}

/// schema_version = "1"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentV1 {
    pub id: RecordId,
    pub correlation_id: CorrelationId,
    pub destination: String,
    pub body: String,
    pub status: DeliveryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
#[error("unreadable search document: {0}")]
pub struct DocumentError(#[from] serde_json::Error);

impl SearchDocument {
    /// 現行 schema で record からドキュメントを作る
    pub fn from_record(record: &DeliveryRequest) -> Self {
        SearchDocument::V1(DocumentV1 {
            id: record.id(),
            correlation_id: record.correlation_id(),
            destination: record.destination().to_string(),
            body: record.body().to_string(),
            status: record.status(),
            transport_message_id: record.transport_message_id().map(str::to_string),
            failure_code: record.failure_code().map(str::to_string),
            failure_detail: record.failure_detail().map(str::to_string),
            created_at: record.created_at(),
            updated_at: record.updated_at(),
        })
    }

    pub fn to_json(&self) -> Result<serde_json::Value, DocumentError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_json(value: serde_json::Value) -> Result<Self, DocumentError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn correlation_id(&self) -> CorrelationId {
        match self {
            SearchDocument::V1(doc) => doc.correlation_id,
        }
    }

    pub fn destination(&self) -> &str {
        match self {
            SearchDocument::V1(doc) => &doc.destination,
        }
    }

    pub fn body(&self) -> &str {
        match self {
            SearchDocument::V1(doc) => &doc.body,
        }
    }

    pub fn status(&self) -> DeliveryStatus {
        match self {
            SearchDocument::V1(doc) => doc.status,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            SearchDocument::V1(doc) => doc.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::request::NewDeliveryRequest;
    use ulid::Ulid;

    fn sent_record() -> DeliveryRequest {
        let mut r = DeliveryRequest::materialize(
            NewDeliveryRequest {
                correlation_id: CorrelationId::from_ulid(Ulid::new()),
                destination: "+15551234567".to_string(),
                body: "hello there".to_string(),
            },
            RecordId(7),
            Utc::now(),
        );
        r.begin_processing().unwrap();
        r.mark_sent("MOCK_MSG_7").unwrap();
        r
    }

    #[test]
    fn document_carries_schema_version() {
        let doc = SearchDocument::from_record(&sent_record());
        let v = doc.to_json().unwrap();
        assert_eq!(v["schema_version"], "1");
        assert_eq!(v["status"], "SENT");
        assert_eq!(v["transport_message_id"], "MOCK_MSG_7");
        assert!(v.get("failure_code").is_none());
    }

    #[test]
    fn reads_back_current_schema() {
        let record = sent_record();
        let doc = SearchDocument::from_record(&record);
        let back = SearchDocument::from_json(doc.to_json().unwrap()).unwrap();

        assert_eq!(back, doc);
        assert_eq!(back.correlation_id(), record.correlation_id());
    }

    #[test]
    fn unknown_schema_version_is_rejected() {
        let mut v = SearchDocument::from_record(&sent_record()).to_json().unwrap();
        v["schema_version"] = serde_json::json!("2");
        assert!(SearchDocument::from_json(v).is_err());
    }

    #[test]
    fn missing_field_is_rejected_not_defaulted() {
        let mut v = SearchDocument::from_record(&sent_record()).to_json().unwrap();
        v.as_object_mut().unwrap().remove("destination");
        assert!(SearchDocument::from_json(v).is_err());
    }
}
