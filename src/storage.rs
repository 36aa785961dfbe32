#[cfg(feature = "postgres")]
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use crate::error::AuthzError;
use crate::models::{Object, Subject, Tuple, TupleFilter, TupleKey};

/// The narrow storage contract check and list-accessible engines talk to.
/// Five operations, deliberately: backends with native query languages
/// should push filters down; backends without may linear-scan. Neither
/// engine knows or cares which it is talking to.
#[async_trait]
pub trait TupleStore: Send + Sync {
    /// Upserts by the 5-key (subject, relation, object); returns the stored
    /// tuples (with storage-assigned id/created_at filled in for new keys).
    async fn write(&self, tuples: Vec<Tuple>) -> Result<Vec<Tuple>, AuthzError>;

    /// Removes every tuple matching `filter`; returns the count removed.
    /// Rejects an empty filter with [`AuthzError::InvalidArgument`] — this
    /// is a safety invariant, not an accident.
    async fn delete(&self, filter: TupleFilter) -> Result<usize, AuthzError>;

    /// Returns all tuples matching `filter`, including condition data,
    /// active or not. Order is unspecified.
    async fn find_tuples(&self, filter: TupleFilter) -> Result<Vec<Tuple>, AuthzError>;

    /// Subjects `S` such that `(S, relation, object)` exists and is active
    /// now. Derivable from [`TupleStore::find_tuples`] but specified
    /// separately so backends can serve it with a targeted index.
    async fn find_subjects(&self, object: &Object, relation: &str) -> Result<Vec<Subject>, AuthzError> {
        let now = Utc::now();
        let filter = TupleFilter {
            object: Some(object.clone()),
            relation: Some(relation.to_string()),
            ..Default::default()
        };
        Ok(self
            .find_tuples(filter)
            .await?
            .into_iter()
            .filter(|tuple| tuple.is_active_at(now))
            .map(|tuple| tuple.subject)
            .collect())
    }

    /// Objects `O` such that `(subject, relation, O)` exists and is active
    /// now.
    async fn find_objects(&self, subject: &Subject, relation: &str) -> Result<Vec<Object>, AuthzError> {
        let now = Utc::now();
        let filter = TupleFilter {
            subject: Some(subject.clone()),
            relation: Some(relation.to_string()),
            ..Default::default()
        };
        Ok(self
            .find_tuples(filter)
            .await?
            .into_iter()
            .filter(|tuple| tuple.is_active_at(now))
            .map(|tuple| tuple.object)
            .collect())
    }
}

/// A reference in-memory backend used by tests and single-process
/// deployments. Maintains two secondary indexes on top of the primary
/// key → tuple map so the two directional lookups spec.md §6 calls out
/// don't require a linear scan even without a database behind them.
pub struct InMemoryTupleStore {
    by_key: DashMap<TupleKey, Tuple>,
    by_subject_relation: DashMap<(String, String, String), Vec<TupleKey>>,
    by_object_relation: DashMap<(String, String, String), Vec<TupleKey>>,
}

impl InMemoryTupleStore {
    pub fn new() -> Self {
        Self {
            by_key: DashMap::new(),
            by_subject_relation: DashMap::new(),
            by_object_relation: DashMap::new(),
        }
    }

    fn subject_index_key(tuple: &Tuple) -> (String, String, String) {
        (
            tuple.subject.subject_type.clone(),
            tuple.subject.subject_id.clone(),
            tuple.relation.clone(),
        )
    }

    fn object_index_key(tuple: &Tuple) -> (String, String, String) {
        (
            tuple.object.object_type.clone(),
            tuple.object.object_id.clone(),
            tuple.relation.clone(),
        )
    }

    fn index_insert(&self, tuple: &Tuple) {
        let key = tuple.key();
        self.by_subject_relation
            .entry(Self::subject_index_key(tuple))
            .or_default()
            .push(key.clone());
        self.by_object_relation
            .entry(Self::object_index_key(tuple))
            .or_default()
            .push(key);
    }

    fn index_remove(&self, tuple: &Tuple) {
        let key = tuple.key();
        if let Some(mut keys) = self.by_subject_relation.get_mut(&Self::subject_index_key(tuple)) {
            keys.retain(|k| k != &key);
        }
        if let Some(mut keys) = self.by_object_relation.get_mut(&Self::object_index_key(tuple)) {
            keys.retain(|k| k != &key);
        }
    }
}

impl Default for InMemoryTupleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TupleStore for InMemoryTupleStore {
    async fn write(&self, tuples: Vec<Tuple>) -> Result<Vec<Tuple>, AuthzError> {
        let mut stored = Vec::with_capacity(tuples.len());
        for tuple in tuples {
            let key = tuple.key();
            if let Some((_, previous)) = self.by_key.remove(&key) {
                self.index_remove(&previous);
            }
            self.index_insert(&tuple);
            self.by_key.insert(key, tuple.clone());
            stored.push(tuple);
        }
        Ok(stored)
    }

    async fn delete(&self, filter: TupleFilter) -> Result<usize, AuthzError> {
        if filter.is_empty() {
            return Err(AuthzError::InvalidArgument(
                "delete requires a non-empty filter".to_string(),
            ));
        }
        let matching: Vec<TupleKey> = self
            .by_key
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.key().clone())
            .collect();
        let count = matching.len();
        for key in matching {
            if let Some((_, tuple)) = self.by_key.remove(&key) {
                self.index_remove(&tuple);
            }
        }
        Ok(count)
    }

    async fn find_tuples(&self, filter: TupleFilter) -> Result<Vec<Tuple>, AuthzError> {
        Ok(self
            .by_key
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn find_subjects(&self, object: &Object, relation: &str) -> Result<Vec<Subject>, AuthzError> {
        let now = Utc::now();
        let key = (object.object_type.clone(), object.object_id.clone(), relation.to_string());
        let Some(keys) = self.by_object_relation.get(&key) else {
            return Ok(Vec::new());
        };
        Ok(keys
            .iter()
            .filter_map(|k| self.by_key.get(k))
            .filter(|tuple| tuple.is_active_at(now))
            .map(|tuple| tuple.subject.clone())
            .collect())
    }

    async fn find_objects(&self, subject: &Subject, relation: &str) -> Result<Vec<Object>, AuthzError> {
        let now = Utc::now();
        let key = (subject.subject_type.clone(), subject.subject_id.clone(), relation.to_string());
        let Some(keys) = self.by_subject_relation.get(&key) else {
            return Ok(Vec::new());
        };
        Ok(keys
            .iter()
            .filter_map(|k| self.by_key.get(k))
            .filter(|tuple| tuple.is_active_at(now))
            .map(|tuple| tuple.object.clone())
            .collect())
    }
}

/// Convenience alias for the common `Arc<dyn TupleStore>` facade shape.
pub type SharedTupleStore = Arc<dyn TupleStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Condition;
    use chrono::Duration;

    #[tokio::test]
    async fn test_write_upserts_by_five_key() {
        let store = InMemoryTupleStore::new();
        let tuple = Tuple::new(Subject::new("user", "alice"), "editor", Object::new("document", "doc1"));
        store.write(vec![tuple.clone()]).await.expect("write");
        store.write(vec![tuple.clone()]).await.expect("write");

        let found = store
            .find_tuples(TupleFilter {
                subject: Some(Subject::new("user", "alice")),
                ..Default::default()
            })
            .await
            .expect("find");
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_rejects_empty_filter() {
        let store = InMemoryTupleStore::new();
        let result = store.delete(TupleFilter::default()).await;
        assert!(matches!(result, Err(AuthzError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_find_objects_excludes_inactive_tuples() {
        let store = InMemoryTupleStore::new();
        let yesterday = Utc::now() - Duration::days(1);
        let tuple = Tuple::new(Subject::new("user", "bob"), "editor", Object::new("document", "doc1"))
            .with_condition(Condition::until(yesterday));
        store.write(vec![tuple]).await.expect("write");

        let objects = store
            .find_objects(&Subject::new("user", "bob"), "editor")
            .await
            .expect("find_objects");
        assert!(objects.is_empty());
    }

    #[tokio::test]
    async fn test_index_is_consistent_after_overwrite_and_delete() {
        let store = InMemoryTupleStore::new();
        let tuple = Tuple::new(Subject::new("user", "alice"), "editor", Object::new("document", "doc1"));
        store.write(vec![tuple.clone()]).await.expect("write");
        store.write(vec![tuple.clone()]).await.expect("write again");

        let objects = store
            .find_objects(&Subject::new("user", "alice"), "editor")
            .await
            .expect("find_objects");
        assert_eq!(objects.len(), 1);

        store
            .delete(TupleFilter {
                subject: Some(Subject::new("user", "alice")),
                ..Default::default()
            })
            .await
            .expect("delete");

        let objects = store
            .find_objects(&Subject::new("user", "alice"), "editor")
            .await
            .expect("find_objects after delete");
        assert!(objects.is_empty());
    }
}
