use crate::error::CacheError;
use crate::types::{ResourceRecord, WatchFilter};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory resource cache partitioned by context name.
///
/// A single store-wide lock guards every bucket: queries share it, mutations
/// take it exclusively. Nothing outside the store holds a reference into a
/// bucket; reads always copy.
#[derive(Debug, Default)]
pub struct ResourceStore {
    buckets: RwLock<HashMap<String, Vec<ResourceRecord>>>,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the record with the same identity in place, or append it.
    pub async fn upsert(&self, context: &str, record: ResourceRecord) {
        let mut guard = self.buckets.write().await;
        let bucket = guard.entry(context.to_string()).or_default();
        match bucket.iter_mut().find(|r| r.same_identity(&record)) {
            Some(existing) => *existing = record,
            None => bucket.push(record),
        }
    }

    pub async fn delete(&self, context: &str, record: &ResourceRecord) {
        let mut guard = self.buckets.write().await;
        let Some(bucket) = guard.get_mut(context) else {
            return;
        };
        if let Some(idx) = bucket.iter().position(|r| r.same_identity(record)) {
            bucket.remove(idx);
        }
    }

    /// Drop every record of `kind` (exact match) from the bucket.
    pub async fn delete_kind(&self, context: &str, kind: &str) {
        let mut guard = self.buckets.write().await;
        if let Some(bucket) = guard.get_mut(context) {
            bucket.retain(|r| r.kind != kind);
        }
    }

    /// Purge `kind` and insert `records` under one write lock.
    pub async fn replace_kind(&self, context: &str, kind: &str, records: Vec<ResourceRecord>) {
        let mut guard = self.buckets.write().await;
        let bucket = guard.entry(context.to_string()).or_default();
        bucket.retain(|r| r.kind != kind);
        for record in records {
            match bucket.iter_mut().find(|r| r.same_identity(&record)) {
                Some(existing) => *existing = record,
                None => bucket.push(record),
            }
        }
    }

    pub async fn query(&self, filter: &WatchFilter) -> Result<Vec<ResourceRecord>, CacheError> {
        let guard = self.buckets.read().await;
        let buckets = &*guard;
        debug!(?filter, "received request for resources");

        let mut keys: Vec<&String> = buckets
            .keys()
            .filter(|k| filter.context.is_empty() || k.eq_ignore_ascii_case(&filter.context))
            .collect();
        if keys.is_empty() {
            return Err(CacheError::UnknownContext(filter.context.clone()));
        }
        keys.sort();

        let result: Vec<ResourceRecord> = keys
            .into_iter()
            .flat_map(|k| buckets[k].iter())
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();

        debug!(?filter, count = result.len(), "returning resources");
        Ok(result)
    }

    pub async fn status_count(&self, context: &str) -> Result<usize, CacheError> {
        let guard = self.buckets.read().await;
        guard
            .get(context)
            .map(Vec::len)
            .ok_or_else(|| CacheError::UnknownContext(context.to_string()))
    }

    pub async fn contexts(&self) -> Vec<String> {
        let guard = self.buckets.read().await;
        let mut keys: Vec<String> = guard.keys().cloned().collect();
        keys.sort();
        keys
    }

    #[cfg(test)]
    pub async fn bucket(&self, context: &str) -> Vec<ResourceRecord> {
        self.buckets
            .read()
            .await
            .get(context)
            .cloned()
            .unwrap_or_default()
    }
}
