//! In-memory search index for tests/dev.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use jobmatch_core::EntityKind;

use super::{Candidate, SearchError, SearchIndex};

/// Index kept in a map per kind.
///
/// - `location` must match exactly
/// - score = number of distinct query tags found in the document's tag field
/// - results ordered by score descending, then id ascending
/// - writes and searches can be made to fail to exercise error paths
#[derive(Debug, Default)]
pub struct InMemorySearchIndex {
    docs: RwLock<HashMap<EntityKind, BTreeMap<String, JsonValue>>>,
    failing_writes: AtomicU32,
    failing_searches: AtomicBool,
    probe_attempts: AtomicU32,
    searches: AtomicU32,
}

impl InMemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` writes (upserts and probes) fail.
    pub fn fail_next_writes(&self, n: u32) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    pub fn fail_searches(&self, failing: bool) {
        self.failing_searches.store(failing, Ordering::SeqCst);
    }

    pub fn probe_attempts(&self) -> u32 {
        self.probe_attempts.load(Ordering::SeqCst)
    }

    /// Number of `find_candidates` calls that reached the index.
    pub fn searches(&self) -> u32 {
        self.searches.load(Ordering::SeqCst)
    }

    pub fn document(&self, kind: EntityKind, id: &str) -> Option<JsonValue> {
        self.docs
            .read()
            .ok()
            .and_then(|docs| docs.get(&kind).and_then(|index| index.get(id).cloned()))
    }

    pub fn len(&self, kind: EntityKind) -> usize {
        self.docs
            .read()
            .map(|docs| docs.get(&kind).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, kind: EntityKind) -> bool {
        self.len(kind) == 0
    }

    fn take_write_failure(&self) -> Result<(), SearchError> {
        let failing = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match failing {
            Ok(_) => Err(SearchError::Unavailable("write rejected (simulated)".to_string())),
            Err(_) => Ok(()),
        }
    }
}

fn overlap(document: &JsonValue, field: &str, wanted: &HashSet<&str>) -> usize {
    let Some(values) = document.get(field).and_then(JsonValue::as_array) else {
        return 0;
    };
    values
        .iter()
        .filter_map(JsonValue::as_str)
        .collect::<HashSet<_>>()
        .intersection(wanted)
        .count()
}

#[async_trait]
impl SearchIndex for InMemorySearchIndex {
    async fn upsert(&self, kind: EntityKind, id: &str, document: &JsonValue) -> Result<(), SearchError> {
        self.take_write_failure()?;

        let mut docs = self
            .docs
            .write()
            .map_err(|_| SearchError::Unavailable("index lock poisoned".to_string()))?;
        docs.entry(kind).or_default().insert(id.to_string(), document.clone());
        Ok(())
    }

    async fn find_candidates(
        &self,
        kind: EntityKind,
        location: &str,
        tags: &[String],
        limit: usize,
    ) -> Result<Vec<Candidate>, SearchError> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }

        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.failing_searches.load(Ordering::SeqCst) {
            return Err(SearchError::Unavailable("search rejected (simulated)".to_string()));
        }

        let docs = self
            .docs
            .read()
            .map_err(|_| SearchError::Unavailable("index lock poisoned".to_string()))?;
        let Some(index) = docs.get(&kind) else {
            return Ok(Vec::new());
        };

        let wanted: HashSet<&str> = tags.iter().map(String::as_str).collect();
        let mut hits: Vec<Candidate> = index
            .iter()
            .filter(|(_, doc)| doc.get("location").and_then(JsonValue::as_str) == Some(location))
            .filter_map(|(id, doc)| {
                let score = overlap(doc, kind.tag_field(), &wanted);
                (score > 0).then(|| Candidate {
                    id: id.clone(),
                    score: score as f64,
                    document: doc.clone(),
                })
            })
            .collect();

        // BTreeMap iteration is by id; a stable sort keeps that order among equal scores.
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn probe(&self) -> Result<(), SearchError> {
        self.probe_attempts.fetch_add(1, Ordering::SeqCst);
        self.take_write_failure()
    }
}
