//! In-memory audience store.
//!
//! Good enough for the binary and for tests; a production deployment
//! swaps in a resolver backed by whatever owns the subscriber list.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::Result;
use crate::traits::AudienceResolver;
use crate::types::{AudienceFilter, Recipient};

/// Concurrent map of recipients keyed by id.
#[derive(Default)]
pub struct InMemoryAudience {
    recipients: DashMap<i64, Recipient>,
}

impl InMemoryAudience {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, recipient: Recipient) {
        self.recipients.insert(recipient.id, recipient);
    }

    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }
}

#[async_trait]
impl AudienceResolver for InMemoryAudience {
    async fn count_matching(&self, filter: AudienceFilter, exclude: Option<i64>) -> Result<usize> {
        Ok(self
            .recipients
            .iter()
            .filter(|r| filter.matches(r.categories) && Some(r.id) != exclude)
            .count())
    }

    async fn list_matching(&self, filter: AudienceFilter) -> Result<Vec<Recipient>> {
        Ok(self
            .recipients
            .iter()
            .filter(|r| filter.matches(r.categories))
            .map(|r| r.clone())
            .collect())
    }

    async fn remove(&self, recipient_id: i64) -> Result<()> {
        if self.recipients.remove(&recipient_id).is_some() {
            tracing::info!("🚫 Recipient {recipient_id} removed from audience");
        }
        Ok(())
    }
}
