use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use jobmatch_core::{JobId, Match, MatchKey, UserId};

use super::{MatchStore, MatchStoreError};

/// In-memory match store keyed by `(user_id, job_id)`.
#[derive(Debug, Default)]
pub struct InMemoryMatchStore {
    rows: Mutex<BTreeMap<MatchKey, Match>>,
    failing: Mutex<HashSet<MatchKey>>,
    calls: AtomicU32,
}

impl InMemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every insert of this key fail.
    pub fn fail_inserts_for(&self, user_id: &UserId, job_id: &JobId) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(MatchKey {
                user_id: user_id.clone(),
                job_id: job_id.clone(),
            });
        }
    }

    /// Number of store operations invoked so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self) -> Vec<Match> {
        self.rows
            .lock()
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    fn rows(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<MatchKey, Match>>, MatchStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.rows
            .lock()
            .map_err(|_| MatchStoreError::Connection("match store lock poisoned".to_string()))
    }

    fn select<P>(&self, predicate: P) -> Result<Vec<Match>, MatchStoreError>
    where
        P: Fn(&MatchKey) -> bool,
    {
        Ok(self
            .rows()?
            .iter()
            .filter(|(key, _)| predicate(key))
            .map(|(_, m)| m.clone())
            .collect())
    }
}

#[async_trait]
impl MatchStore for InMemoryMatchStore {
    async fn exists_match(&self, user_id: &UserId, job_id: &JobId) -> Result<bool, MatchStoreError> {
        let key = MatchKey {
            user_id: user_id.clone(),
            job_id: job_id.clone(),
        };
        Ok(self.rows()?.contains_key(&key))
    }

    async fn insert_match_if_absent(&self, m: &Match) -> Result<bool, MatchStoreError> {
        let key = m.key();
        let mut rows = self.rows()?;

        let failing = self
            .failing
            .lock()
            .map(|f| f.contains(&key))
            .unwrap_or(false);
        if failing {
            return Err(MatchStoreError::Query {
                operation: "insert_match_if_absent",
                message: format!("insert rejected for {m} (simulated)"),
            });
        }

        if rows.contains_key(&key) {
            return Ok(false);
        }
        rows.insert(key, m.clone());
        Ok(true)
    }

    async fn matches_for_user(&self, user_id: &UserId) -> Result<Vec<Match>, MatchStoreError> {
        self.select(|key| &key.user_id == user_id)
    }

    async fn matches_for_job(&self, job_id: &JobId) -> Result<Vec<Match>, MatchStoreError> {
        self.select(|key| &key.job_id == job_id)
    }
}
