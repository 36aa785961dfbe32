//! The public API façade: `allow`, `disallow_all_matching`, `add_member`,
//! `remove_member`, `set_parent`, `remove_parent`, `check`,
//! `list_accessible_objects`, `list_tuples` (spec.md §4.5). Write-side calls
//! translate directly to [`crate::storage::TupleStore`] operations; `check`
//! and `list_accessible_objects` are read-only and delegate to
//! [`crate::check::CheckEngine`] / [`crate::expand::ListAccessibleEngine`].

use std::sync::Arc;

use tracing::info;

use crate::check::CheckEngine;
use crate::config::EngineConfig;
use crate::error::AuthzError;
use crate::expand::ListAccessibleEngine;
use crate::models::{AccessibleObject, Condition, Object, Subject, Tuple, TupleFilter};
use crate::schema::Schema;
use crate::storage::{InMemoryTupleStore, SharedTupleStore};

/// Owns a schema, a storage backend and the two read engines built on top of
/// it. Cheap to clone the pieces it hands out (`Arc<Schema>`,
/// `Arc<dyn TupleStore>`); the engine itself holds no mutable state of its
/// own — all synchronisation lives inside storage (spec.md §5).
pub struct AuthzEngine {
    store: SharedTupleStore,
    schema: Arc<Schema>,
    check_engine: CheckEngine,
    list_engine: ListAccessibleEngine,
}

impl AuthzEngine {
    /// Builds an engine over `store` and `schema` with the default
    /// [`EngineConfig`].
    pub fn new(store: SharedTupleStore, schema: Schema) -> Self {
        Self::with_config(store, schema, EngineConfig::default())
    }

    /// Builds an engine with an explicit [`EngineConfig`] (depth budget,
    /// field separator, depth-exceeded policy).
    pub fn with_config(store: SharedTupleStore, schema: Schema, config: EngineConfig) -> Self {
        let schema = Arc::new(schema);
        let check_engine = CheckEngine::new(store.clone(), schema.clone(), config.clone());
        let list_engine = ListAccessibleEngine::new(store.clone(), schema.clone(), config);
        Self {
            store,
            schema,
            check_engine,
            list_engine,
        }
    }

    /// Convenience constructor wiring the reference [`InMemoryTupleStore`]
    /// behind a given schema — the shape most unit tests and small
    /// single-process deployments reach for.
    pub fn in_memory(schema: Schema) -> Self {
        Self::new(Arc::new(InMemoryTupleStore::new()), schema)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    // ------------------------------------------------------------------
    // Write side
    // ------------------------------------------------------------------

    /// Writes `(who, to_be, on_what)`. `to_be` must name a direct relation —
    /// group membership and parent edges go through [`Self::add_member`] and
    /// [`Self::set_parent`] instead, so each write path enforces the
    /// relation flavour it's meant for.
    pub async fn allow(
        &self,
        who: Subject,
        to_be: impl Into<String>,
        on_what: Object,
        when: Option<Condition>,
    ) -> Result<Tuple, AuthzError> {
        let relation = to_be.into();
        require_non_empty("subject", &who.subject_id)?;
        require_non_empty("object", &on_what.object_id)?;
        self.require_known_subject_type(&who.subject_type)?;
        self.require_known_object_type(&on_what.object_type)?;
        if !self.schema.is_direct(&relation) {
            return Err(AuthzError::Schema(format!(
                "relation '{relation}' is not direct; allow() only writes direct relations"
            )));
        }

        let mut tuple = Tuple::new(who, relation, on_what);
        if let Some(condition) = when {
            tuple = tuple.with_condition(condition);
        }
        info!(tuple = %tuple, "allow");
        self.write_one(tuple).await
    }

    /// Writes `(member, group_relation, group)`. Fails with
    /// [`AuthzError::Schema`] if the schema declares no group relation.
    pub async fn add_member(&self, member: Subject, group: Object) -> Result<Tuple, AuthzError> {
        require_non_empty("subject", &member.subject_id)?;
        require_non_empty("object", &group.object_id)?;
        self.require_known_subject_type(&member.subject_type)?;
        self.require_known_object_type(&group.object_type)?;
        let relation = self.require_group_relation()?;
        let tuple = Tuple::new(member, relation, group);
        info!(tuple = %tuple, "add_member");
        self.write_one(tuple).await
    }

    /// Deletes `(member, group_relation, group)`, if present.
    pub async fn remove_member(&self, member: Subject, group: Object) -> Result<usize, AuthzError> {
        let relation = self.require_group_relation()?;
        self.store
            .delete(TupleFilter {
                subject: Some(member),
                relation: Some(relation),
                object: Some(group),
                ..Default::default()
            })
            .await
    }

    /// Replaces any existing parent of `child` with `parent`: deletes every
    /// `(child, hierarchy_relation, *)` tuple, then writes the new one. A
    /// child has at most one parent at any time (spec.md §3).
    pub async fn set_parent(&self, child: Object, parent: Object) -> Result<Tuple, AuthzError> {
        require_non_empty("object", &child.object_id)?;
        require_non_empty("object", &parent.object_id)?;
        self.require_known_object_type(&child.object_type)?;
        self.require_known_object_type(&parent.object_type)?;
        let relation = self.require_hierarchy_relation()?;

        self.store
            .delete(TupleFilter {
                subject: Some(Subject::from_object(&child)),
                relation: Some(relation.clone()),
                ..Default::default()
            })
            .await?;

        let tuple = Tuple::new(Subject::from_object(&child), relation, parent);
        info!(tuple = %tuple, "set_parent");
        self.write_one(tuple).await
    }

    /// Deletes `child`'s parent tuple, if any.
    pub async fn remove_parent(&self, child: Object) -> Result<usize, AuthzError> {
        let relation = self.require_hierarchy_relation()?;
        self.store
            .delete(TupleFilter {
                subject: Some(Subject::from_object(&child)),
                relation: Some(relation),
                ..Default::default()
            })
            .await
    }

    /// Bulk delete via storage. Storage itself enforces the non-empty-filter
    /// safety invariant (spec.md §4.2); the façade adds nothing on top of
    /// that so there is exactly one place this rule lives.
    pub async fn disallow_all_matching(&self, filter: TupleFilter) -> Result<usize, AuthzError> {
        self.store.delete(filter).await
    }

    // ------------------------------------------------------------------
    // Read side
    // ------------------------------------------------------------------

    /// May `who` perform `can_they` on `on_what`? Never raises on "denied" —
    /// returns `false` (spec.md §4.3, §7).
    pub async fn check(&self, who: &Subject, can_they: &str, on_what: &Object) -> Result<bool, AuthzError> {
        self.check_engine.check(who, can_they, on_what).await
    }

    /// Every object of `of_type` that `who` can reach, with the actions each
    /// grants (spec.md §4.4).
    pub async fn list_accessible_objects(
        &self,
        who: &Subject,
        of_type: &str,
        can_they: Option<&str>,
    ) -> Result<Vec<AccessibleObject>, AuthzError> {
        self.list_engine.list_accessible_objects(who, of_type, can_they).await
    }

    /// Raw tuple lookup, bypassing check/list-accessible semantics.
    pub async fn list_tuples(&self, filter: TupleFilter) -> Result<Vec<Tuple>, AuthzError> {
        self.store.find_tuples(filter).await
    }

    async fn write_one(&self, tuple: Tuple) -> Result<Tuple, AuthzError> {
        let mut stored = self.store.write(vec![tuple]).await?;
        stored
            .pop()
            .ok_or_else(|| AuthzError::Storage(anyhow::anyhow!("storage returned no tuple for a single-tuple write")))
    }

    fn require_group_relation(&self) -> Result<String, AuthzError> {
        self.schema
            .group_relation()
            .map(str::to_string)
            .ok_or_else(|| AuthzError::Schema("schema declares no group relation".to_string()))
    }

    fn require_hierarchy_relation(&self) -> Result<String, AuthzError> {
        self.schema
            .hierarchy_relation()
            .map(str::to_string)
            .ok_or_else(|| AuthzError::Schema("schema declares no hierarchy relation".to_string()))
    }

    fn require_known_subject_type(&self, subject_type: &str) -> Result<(), AuthzError> {
        if !self.schema.is_known_subject_type(subject_type) {
            return Err(AuthzError::InvalidArgument(format!(
                "unknown subject type '{subject_type}'"
            )));
        }
        Ok(())
    }

    fn require_known_object_type(&self, object_type: &str) -> Result<(), AuthzError> {
        if !self.schema.is_known_object_type(object_type) {
            return Err(AuthzError::InvalidArgument(format!(
                "unknown object type '{object_type}'"
            )));
        }
        Ok(())
    }
}

fn require_non_empty(label: &str, id: &str) -> Result<(), AuthzError> {
    if id.trim().is_empty() {
        return Err(AuthzError::InvalidArgument(format!("{label} id must not be empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::reference_schema;
    use chrono::{Duration, Utc};

    fn engine() -> AuthzEngine {
        AuthzEngine::in_memory(reference_schema().expect("valid schema"))
    }

    #[tokio::test]
    async fn test_allow_rejects_non_direct_relation() {
        let engine = engine();
        let result = engine
            .allow(
                Subject::new("user", "alice"),
                "member",
                Object::new("document", "doc1"),
                None,
            )
            .await;
        assert!(matches!(result, Err(AuthzError::Schema(_))));
    }

    #[tokio::test]
    async fn test_direct_grant_then_check_round_trips() {
        let engine = engine();
        let alice = Subject::new("user", "alice");
        let doc1 = Object::new("document", "doc1");

        engine.allow(alice.clone(), "owner", doc1.clone(), None).await.expect("allow");
        assert!(engine.check(&alice, "delete", &doc1).await.expect("check"));
        assert!(!engine
            .check(&Subject::new("user", "bob"), "view", &doc1)
            .await
            .expect("check"));
    }

    #[tokio::test]
    async fn test_add_member_fails_without_group_relation() {
        let schema = Schema::builder()
            .object_type("document")
            .object_type("team")
            .relation("owner", crate::schema::RelationKind::Direct)
            .action("view", vec!["owner".to_string()])
            .build()
            .expect("valid schema");
        let engine = AuthzEngine::in_memory(schema);
        let result = engine
            .add_member(Subject::new("user", "alice"), Object::new("team", "eng"))
            .await;
        assert!(matches!(result, Err(AuthzError::Schema(_))));
    }

    #[tokio::test]
    async fn test_set_parent_replaces_previous_parent() {
        let engine = engine();
        let doc1 = Object::new("document", "doc1");
        let folder_a = Object::new("folder", "folder-a");
        let folder_b = Object::new("folder", "folder-b");

        engine.set_parent(doc1.clone(), folder_a.clone()).await.expect("set_parent a");
        engine.set_parent(doc1.clone(), folder_b.clone()).await.expect("set_parent b");

        let parents = engine
            .list_tuples(TupleFilter {
                subject: Some(Subject::from_object(&doc1)),
                relation: Some("parent".to_string()),
                ..Default::default()
            })
            .await
            .expect("list_tuples");

        assert_eq!(parents.len(), 1);
        assert_eq!(parents[0].object, folder_b);
    }

    #[tokio::test]
    async fn test_disallow_all_matching_rejects_empty_filter() {
        let engine = engine();
        let result = engine.disallow_all_matching(TupleFilter::default()).await;
        assert!(matches!(result, Err(AuthzError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_time_bounded_allow_expires() {
        let engine = engine();
        let bob = Subject::new("user", "bob");
        let doc1 = Object::new("document", "doc1");
        let yesterday = Utc::now() - Duration::days(1);

        engine
            .allow(bob.clone(), "editor", doc1.clone(), Some(Condition::until(yesterday)))
            .await
            .expect("allow");

        assert!(!engine.check(&bob, "edit", &doc1).await.expect("check"));
    }

    #[tokio::test]
    async fn test_allow_rejects_empty_subject_id() {
        let engine = engine();
        let result = engine
            .allow(Subject::new("user", ""), "owner", Object::new("document", "doc1"), None)
            .await;
        assert!(matches!(result, Err(AuthzError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_allow_rejects_unknown_subject_type() {
        let engine = engine();
        let result = engine
            .allow(
                Subject::new("not_a_real_type", "alice"),
                "owner",
                Object::new("document", "doc1"),
                None,
            )
            .await;
        assert!(matches!(result, Err(AuthzError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_allow_rejects_unknown_object_type() {
        let engine = engine();
        let result = engine
            .allow(
                Subject::new("user", "alice"),
                "owner",
                Object::new("not_a_real_type", "x"),
                None,
            )
            .await;
        assert!(matches!(result, Err(AuthzError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_add_member_rejects_unknown_group_object_type() {
        let engine = engine();
        let result = engine
            .add_member(Subject::new("user", "alice"), Object::new("not_a_real_type", "g"))
            .await;
        assert!(matches!(result, Err(AuthzError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_set_parent_rejects_unknown_object_type() {
        let engine = engine();
        let result = engine
            .set_parent(Object::new("not_a_real_type", "x"), Object::new("folder", "folder-a"))
            .await;
        assert!(matches!(result, Err(AuthzError::InvalidArgument(_))));
    }
}
