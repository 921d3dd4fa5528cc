//! In-memory [`ResultStore`] for tests and ephemeral runs.

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::models::{NewRecord, RecordStatus, StoredRecord};

use super::ResultStore;

struct Inner {
    next_id: i64,
    records: Vec<StoredRecord>,
}

pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                next_id: 1,
                records: Vec::new(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn most_recent<F>(&self, limit: usize, keep: F) -> Result<Vec<StoredRecord>>
    where
        F: Fn(&StoredRecord) -> bool,
    {
        let inner = self
            .inner
            .read()
            .map_err(|_| anyhow!("result store lock poisoned"))?;
        let mut matched: Vec<StoredRecord> =
            inner.records.iter().filter(|r| keep(r)).cloned().collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        matched.truncate(limit);
        Ok(matched)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResultStore for InMemoryStore {
    async fn insert(&self, record: &NewRecord) -> Result<StoredRecord> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| anyhow!("result store lock poisoned"))?;
        let stored = StoredRecord {
            id: inner.next_id,
            timestamp: record.timestamp,
            source: record.source.clone(),
            status: record.status,
            issues: record.issues.clone(),
            raw_text: record.raw_text.clone(),
            latency_ms: record.latency_ms,
            created_at: Utc::now(),
        };
        inner.next_id += 1;
        inner.records.push(stored.clone());
        Ok(stored)
    }

    async fn recent_for_source(&self, source: &str, limit: usize) -> Result<Vec<StoredRecord>> {
        self.most_recent(limit, |r| r.source == source)
    }

    async fn recent_problems(&self, limit: usize) -> Result<Vec<StoredRecord>> {
        self.most_recent(limit, |r| r.status != RecordStatus::Ok)
    }

    async fn status_counts(&self) -> Result<BTreeMap<RecordStatus, u64>> {
        let inner = self
            .inner
            .read()
            .map_err(|_| anyhow!("result store lock poisoned"))?;
        let mut counts = BTreeMap::new();
        for r in &inner.records {
            *counts.entry(r.status).or_insert(0) += 1;
        }
        Ok(counts)
    }
}
