//! InMemoryDenylist - Redis の SET + EXPIRE と同じ振る舞いの denylist
//!
//! `SADD key ...; EXPIRE key ttl` を再現します。期限は集合に 1 つで、
//! `add` のたびに全体の期限が `now + ttl` に延びます。

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::ports::{CacheError, Clock, DenylistCache};

/// Redis 側の既定 TTL（24 時間）
pub const DEFAULT_DENYLIST_TTL_SECS: i64 = 86_400;

#[derive(Default)]
struct DenylistState {
    members: BTreeSet<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl DenylistState {
    /// 期限切れなら集合ごと捨てる（Redis のキー失効と同じ）
    fn evict_if_expired(&mut self, now: DateTime<Utc>) {
        if let Some(expires_at) = self.expires_at {
            if now >= expires_at {
                self.members.clear();
                self.expires_at = None;
            }
        }
    }

    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now < expires_at)
    }
}

pub struct InMemoryDenylist {
    state: RwLock<DenylistState>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    available: AtomicBool,
}

impl InMemoryDenylist {
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            state: RwLock::new(DenylistState::default()),
            ttl,
            clock,
            available: AtomicBool::new(true),
        }
    }

    pub fn with_default_ttl(clock: Arc<dyn Clock>) -> Self {
        Self::new(clock, Duration::seconds(DEFAULT_DENYLIST_TTL_SECS))
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// 集合全体の失効時刻（空なら None）
    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        let state = self.state.read().await;
        if state.is_live(self.clock.now()) {
            state.expires_at
        } else {
            None
        }
    }

    fn check_available(&self) -> Result<(), CacheError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::Unavailable(
                "in-memory denylist switched off".to_string(),
            ))
        }
    }
}

#[async_trait]
impl DenylistCache for InMemoryDenylist {
    async fn add(&self, destinations: &[String]) -> Result<(), CacheError> {
        self.check_available()?;
        let now = self.clock.now();
        let mut state = self.state.write().await;
        state.evict_if_expired(now);
        state.members.extend(destinations.iter().cloned());
        // 桁あふれするほど長い ttl は「失効しない」に丸める
        state.expires_at = Some(now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC));
        tracing::info!(
            added = destinations.len(),
            total = state.members.len(),
            "denylist updated, ttl reset"
        );
        Ok(())
    }

    async fn remove(&self, destinations: &[String]) -> Result<(), CacheError> {
        self.check_available()?;
        let mut state = self.state.write().await;
        state.evict_if_expired(self.clock.now());
        for destination in destinations {
            state.members.remove(destination);
        }
        tracing::info!(removed = destinations.len(), "denylist entries removed");
        Ok(())
    }

    async fn members(&self) -> Result<BTreeSet<String>, CacheError> {
        self.check_available()?;
        let state = self.state.read().await;
        if state.is_live(self.clock.now()) {
            Ok(state.members.clone())
        } else {
            Ok(BTreeSet::new())
        }
    }

    async fn is_member(&self, destination: &str) -> Result<bool, CacheError> {
        self.check_available()?;
        let state = self.state.read().await;
        let hit = state.is_live(self.clock.now()) && state.members.contains(destination);
        if hit {
            tracing::warn!(destination, "destination is denylisted");
        }
        Ok(hit)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.check_available()
    }
}
