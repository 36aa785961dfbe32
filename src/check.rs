use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::AuthzError;
use crate::models::{Object, Subject};
use crate::schema::Schema;
use crate::storage::SharedTupleStore;
use crate::traverse::{depth_exceeded, Budget, Entry, Role};

/// Evaluates `check(who, action, on_what)` against the recursive algorithm
/// in spec.md §4.3: direct match, field fallback, group expansion and
/// hierarchy propagation, all sharing one depth budget and visited set per
/// top-level call.
pub struct CheckEngine {
    store: SharedTupleStore,
    schema: Arc<Schema>,
    config: EngineConfig,
}

impl CheckEngine {
    pub fn new(store: SharedTupleStore, schema: Arc<Schema>, config: EngineConfig) -> Self {
        Self {
            store,
            schema,
            config,
        }
    }

    pub async fn check(&self, who: &Subject, action: &str, on_what: &Object) -> Result<bool, AuthzError> {
        let relations = self.schema.relations_for_action(action);
        let propagation = self.schema.propagation_for_action(action);
        if relations.is_empty() && propagation.is_empty() {
            debug!(action, "unknown action grants nothing");
            return Ok(false);
        }

        let mut budget = Budget::new(&self.config);
        self.check_action(who, action, on_what, &mut budget).await
    }

    /// Evaluates one action against one object: direct check (with field
    /// fallback), group expansion, then hierarchy propagation into a
    /// (possibly different) action on the parent. The hierarchy step's
    /// parent lookup is itself field-fallback-aware — spec.md §4.3 step 3
    /// says the fallback rewrite "recurse[s] into step 2-5", which includes
    /// step 5 — so a child object's base id contributes its own parents
    /// alongside the literal object's.
    fn check_action<'a>(
        &'a self,
        who: &'a Subject,
        action: &'a str,
        on_what: &'a Object,
        budget: &'a mut Budget,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<bool, AuthzError>> + Send + 'a>> {
        Box::pin(async move {
            let relations = self.schema.relations_for_action(action);

            if !relations.is_empty() {
                if self.direct_check_with_fallback(who, relations, on_what, budget).await? {
                    return Ok(true);
                }

                if let Some(group_relation) = self.schema.group_relation() {
                    if self
                        .check_groups(who, relations, on_what, group_relation, budget)
                        .await?
                    {
                        return Ok(true);
                    }
                }
            }

            if let Some(hierarchy_relation) = self.schema.hierarchy_relation() {
                let propagating = self.schema.propagation_for_action(action);
                if !propagating.is_empty() {
                    let parents = self.hierarchy_parents_with_fallback(on_what, hierarchy_relation).await?;
                    for parent in parents {
                        match budget.enter(Role::Hierarchy, &parent.object_type, &parent.object_id) {
                            Entry::AlreadyVisited => continue,
                            Entry::DepthExceeded => {
                                depth_exceeded(&self.config, "hierarchy propagation")?;
                                continue;
                            }
                            Entry::Proceed => {}
                        }
                        for parent_action in propagating {
                            if self.check_action(who, parent_action, &parent, budget).await? {
                                return Ok(true);
                            }
                        }
                    }
                }
            }

            Ok(false)
        })
    }

    /// Direct-tuple check for `relations` on `on_what`, then — if the
    /// object id carries a field suffix — the same check against the base
    /// object (field fallback, spec.md §4.3 step 3). The fallback reruns
    /// the full per-action algorithm on the base object so that group and
    /// hierarchy access compose through it too.
    fn direct_check_with_fallback<'a>(
        &'a self,
        who: &'a Subject,
        relations: &'a [String],
        on_what: &'a Object,
        budget: &'a mut Budget,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<bool, AuthzError>> + Send + 'a>> {
        Box::pin(async move {
            if self.direct_check(who, relations, on_what).await? {
                return Ok(true);
            }

            if let Some((base, _field)) = on_what.split_field(&self.config.field_separator) {
                match budget.enter(Role::FieldFallback, &base.object_type, &base.object_id) {
                    Entry::AlreadyVisited => return Ok(false),
                    Entry::DepthExceeded => {
                        depth_exceeded(&self.config, "field fallback")?;
                        return Ok(false);
                    }
                    Entry::Proceed => {}
                }
                if self.direct_check_with_fallback(who, relations, &base, budget).await? {
                    return Ok(true);
                }
                if let Some(group_relation) = self.schema.group_relation() {
                    return self
                        .check_groups(who, relations, &base, group_relation, budget)
                        .await;
                }
            }

            Ok(false)
        })
    }

    async fn direct_check(&self, who: &Subject, relations: &[String], on_what: &Object) -> Result<bool, AuthzError> {
        let now = Utc::now();
        for relation in relations {
            let objects = self.store.find_objects(who, relation).await?;
            if objects.iter().any(|object| object == on_what) {
                debug!(subject = %who, relation, object = %on_what, "direct grant matched");
                return Ok(true);
            }
        }
        let _ = now;
        Ok(false)
    }

    /// Breadth-first traversal of `who`'s transitive groups; at each
    /// reached group, re-runs the direct-check-with-fallback against
    /// `on_what`.
    async fn check_groups(
        &self,
        who: &Subject,
        relations: &[String],
        on_what: &Object,
        group_relation: &str,
        budget: &mut Budget,
    ) -> Result<bool, AuthzError> {
        let mut frontier: VecDeque<Subject> = VecDeque::new();
        frontier.push_back(who.clone());

        while let Some(current) = frontier.pop_front() {
            let groups = self.store.find_objects(&current, group_relation).await?;
            for group in groups {
                let group_subject = Subject::from_object(&group);
                match budget.enter(Role::Group, &group_subject.subject_type, &group_subject.subject_id) {
                    Entry::AlreadyVisited => continue,
                    Entry::DepthExceeded => {
                        depth_exceeded(&self.config, "group expansion")?;
                        continue;
                    }
                    Entry::Proceed => {}
                }

                if self
                    .direct_check_with_fallback(&group_subject, relations, on_what, budget)
                    .await?
                {
                    return Ok(true);
                }
                frontier.push_back(group_subject);
            }
        }

        Ok(false)
    }

    /// Parents of `on_what` via `hierarchy_relation`, plus — if `on_what`
    /// carries a field suffix — the base object's parents too, deduplicated.
    /// Lets a base-object grant propagate through the hierarchy to a
    /// field-scoped child the same way it already covers that child
    /// directly (spec.md §4.3 step 3 applies to step 5, not just 2 and 4).
    async fn hierarchy_parents_with_fallback(
        &self,
        on_what: &Object,
        hierarchy_relation: &str,
    ) -> Result<Vec<Object>, AuthzError> {
        let mut parents = self
            .store
            .find_objects(&Subject::from_object(on_what), hierarchy_relation)
            .await?;

        if let Some((base, _field)) = on_what.split_field(&self.config.field_separator) {
            let base_parents = self
                .store
                .find_objects(&Subject::from_object(&base), hierarchy_relation)
                .await?;
            for parent in base_parents {
                if !parents.contains(&parent) {
                    parents.push(parent);
                }
            }
        }

        Ok(parents)
    }
}
