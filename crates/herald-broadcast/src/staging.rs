//! Staging store — broadcast proposals awaiting admin confirmation.
//!
//! Proposals live in a concurrent map keyed by a short opaque id and die
//! on confirm, cancel, or TTL expiry. `get` evicts lazily; a background
//! sweep bounds memory for proposals nobody ever looks at again.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use herald_core::spans::FormattingSpan;
use herald_core::traits::IdGenerator;
use herald_core::types::AudienceFilter;

/// A staged broadcast awaiting confirmation.
#[derive(Debug, Clone)]
pub struct BroadcastProposal {
    pub id: String,
    pub text: String,
    pub spans: Option<Vec<FormattingSpan>>,
    pub audience: AudienceFilter,
    pub requested_by: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Concurrent proposal store with per-entry TTL.
pub struct StagingStore {
    proposals: DashMap<String, BroadcastProposal>,
    ids: Arc<dyn IdGenerator>,
    ttl: Duration,
}

impl StagingStore {
    pub fn new(ids: Arc<dyn IdGenerator>, ttl: std::time::Duration) -> Self {
        Self {
            proposals: DashMap::new(),
            ids,
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::minutes(10)),
        }
    }

    /// Stage a proposal; returns its id.
    pub fn stage(
        &self,
        text: String,
        audience: AudienceFilter,
        spans: Option<Vec<FormattingSpan>>,
        admin_id: i64,
    ) -> String {
        let id = self.ids.generate();
        let now = Utc::now();
        let proposal = BroadcastProposal {
            id: id.clone(),
            text,
            spans,
            audience,
            requested_by: admin_id,
            created_at: now,
            expires_at: now + self.ttl,
        };
        tracing::info!("📋 Staged broadcast {id} for admin {admin_id} ({audience})");
        self.proposals.insert(id.clone(), proposal);
        id
    }

    /// Look up a proposal, evicting it if its TTL has passed.
    pub fn get(&self, id: &str) -> Option<BroadcastProposal> {
        self.get_at(id, Utc::now())
    }

    /// `get` with an explicit clock, for tests.
    pub fn get_at(&self, id: &str, now: DateTime<Utc>) -> Option<BroadcastProposal> {
        let expired = match self.proposals.get(id) {
            None => return None,
            Some(p) if now > p.expires_at => true,
            Some(p) => return Some(p.clone()),
        };
        if expired {
            self.proposals.remove(id);
            tracing::debug!("🗑 Proposal {id} expired on lookup");
        }
        None
    }

    /// Unconditional removal; true if the proposal existed.
    pub fn remove(&self, id: &str) -> bool {
        self.proposals.remove(id).is_some()
    }

    /// Drop every proposal past its TTL. Returns how many were evicted.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let before = self.proposals.len();
        self.proposals.retain(|_, p| now <= p.expires_at);
        let evicted = before - self.proposals.len();
        if evicted > 0 {
            tracing::debug!("🧹 Staging sweep evicted {evicted} proposal(s)");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.proposals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty()
    }

    /// Spawn the periodic sweep loop.
    pub fn spawn_sweeper(self: &Arc<Self>, every: std::time::Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await; // first tick fires immediately; skip it
            loop {
                interval.tick().await;
                store.sweep(Utc::now());
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::ids::HexIdGenerator;

    fn store(ttl_secs: u64) -> StagingStore {
        StagingStore::new(Arc::new(HexIdGenerator), std::time::Duration::from_secs(ttl_secs))
    }

    #[test]
    fn test_stage_then_get() {
        let store = store(600);
        let id = store.stage("hello".into(), AudienceFilter::EVERYONE, None, 42);
        let p = store.get(&id).unwrap();
        assert_eq!(p.text, "hello");
        assert_eq!(p.requested_by, 42);
        assert_eq!(p.expires_at - p.created_at, Duration::minutes(10));
    }

    #[test]
    fn test_lazy_expiry_without_sweep() {
        let store = store(600);
        let id = store.stage("hello".into(), AudienceFilter::EVERYONE, None, 42);
        let later = Utc::now() + Duration::minutes(11);
        assert!(store.get_at(&id, later).is_none());
        // Evicted, not just hidden
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove() {
        let store = store(600);
        let id = store.stage("hello".into(), AudienceFilter::EVERYONE, None, 42);
        assert!(store.remove(&id));
        assert!(!store.remove(&id));
        assert!(store.get(&id).is_none());
    }

    #[test]
    fn test_sweep() {
        let store = store(600);
        store.stage("a".into(), AudienceFilter::EVERYONE, None, 1);
        store.stage("b".into(), AudienceFilter::EVERYONE, None, 1);
        assert_eq!(store.sweep(Utc::now()), 0);
        assert_eq!(store.sweep(Utc::now() + Duration::minutes(11)), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_ids_are_distinct() {
        let store = store(600);
        let a = store.stage("a".into(), AudienceFilter::EVERYONE, None, 1);
        let b = store.stage("b".into(), AudienceFilter::EVERYONE, None, 1);
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }
}
