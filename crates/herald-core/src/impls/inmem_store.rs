//! InMemoryRecordStore - 開発用・テスト用の正本
//!
//! - BTreeMap<RecordId, DeliveryRequest> が本体、correlation id は二次インデックス
//! - 連番 id は 1 から採番
//! - `update` はロックの中で version を比較してから書く（CAS）

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use crate::domain::ids::{CorrelationId, RecordId};
use crate::domain::request::{DeliveryRequest, NewDeliveryRequest};
use crate::ports::{Clock, RecordStore, StoreError};

#[derive(Default)]
struct StoreState {
    next_id: u64,
    rows: BTreeMap<RecordId, DeliveryRequest>,
    by_correlation: HashMap<CorrelationId, RecordId>,
}

pub struct InMemoryRecordStore {
    state: Mutex<StoreState>,
    clock: Arc<dyn Clock>,
    /// false にすると全操作が Unavailable になる（障害の再現用）
    available: AtomicBool,
}

impl InMemoryRecordStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(StoreState {
                next_id: 1,
                ..StoreState::default()
            }),
            clock,
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("in-memory store switched off".to_string()))
        }
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert(&self, new: NewDeliveryRequest) -> Result<DeliveryRequest, StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        if state.by_correlation.contains_key(&new.correlation_id) {
            return Err(StoreError::Duplicate(new.correlation_id));
        }

        let id = RecordId(state.next_id);
        state.next_id += 1;

        let record = DeliveryRequest::materialize(new, id, self.clock.now());
        state.by_correlation.insert(record.correlation_id(), id);
        state.rows.insert(id, record.clone());
        Ok(record)
    }

    async fn find_by_correlation_id(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<DeliveryRequest, StoreError> {
        self.check_available()?;
        let state = self.state.lock().await;
        state
            .by_correlation
            .get(correlation_id)
            .and_then(|id| state.rows.get(id))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(correlation_id.to_string()))
    }

    async fn find_by_id(&self, id: RecordId) -> Result<DeliveryRequest, StoreError> {
        self.check_available()?;
        let state = self.state.lock().await;
        state
            .rows
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("id {id}")))
    }

    async fn update(&self, mut record: DeliveryRequest) -> Result<DeliveryRequest, StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let stored = state
            .rows
            .get_mut(&record.id())
            .ok_or_else(|| StoreError::NotFound(format!("id {}", record.id())))?;

        if stored.version() != record.version() {
            return Err(StoreError::Conflict {
                id: record.id(),
                expected: record.version(),
                actual: stored.version(),
            });
        }

        record.record_update(self.clock.now());
        *stored = record.clone();
        Ok(record)
    }

    async fn delete_by_id(&self, id: RecordId) -> Result<(), StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let removed = state
            .rows
            .remove(&id)
            .ok_or_else(|| StoreError::NotFound(format!("id {id}")))?;
        state.by_correlation.remove(&removed.correlation_id());
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }
}
