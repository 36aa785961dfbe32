//! The inverse of [`crate::check::CheckEngine`]: enumerate every object of a
//! given type a subject may reach, together with the actions each grants
//! (spec.md §4.4). Shares the group-traversal shape of the check engine and
//! the same depth/visited-set bookkeeping from [`crate::traverse`], since
//! both walk the same two graphs under the same adversarial-schema
//! constraints.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::AuthzError;
use crate::models::{AccessibleObject, Object, Subject};
use crate::schema::Schema;
use crate::storage::SharedTupleStore;
use crate::traverse::{depth_exceeded, Budget, Entry, Role};

/// Evaluates `list_accessible_objects(who, of_type, can_they?)` against the
/// algorithm in spec.md §4.4.
pub struct ListAccessibleEngine {
    store: SharedTupleStore,
    schema: Arc<Schema>,
    config: EngineConfig,
}

impl ListAccessibleEngine {
    pub fn new(store: SharedTupleStore, schema: Arc<Schema>, config: EngineConfig) -> Self {
        Self {
            store,
            schema,
            config,
        }
    }

    pub async fn list_accessible_objects(
        &self,
        who: &Subject,
        of_type: &str,
        can_they: Option<&str>,
    ) -> Result<Vec<AccessibleObject>, AuthzError> {
        let candidate_relations: Vec<String> = match can_they {
            Some(action) => self.schema.relations_for_action(action).to_vec(),
            None => self.schema.direct_and_group_relations(),
        };

        let mut budget = Budget::new(&self.config);

        // object -> direct/group relations held on it, across *every* type —
        // a reached object outside `of_type` (e.g. a folder while listing
        // documents) is still a valid seed for hierarchy propagation below.
        let mut held: HashMap<Object, HashSet<String>> = HashMap::new();
        self.collect_direct(who, &candidate_relations, &mut held).await?;

        if let Some(group_relation) = self.schema.group_relation() {
            let mut frontier: VecDeque<Subject> = VecDeque::new();
            frontier.push_back(who.clone());

            while let Some(current) = frontier.pop_front() {
                let groups = self.store.find_objects(&current, group_relation).await?;
                for group in groups {
                    let group_subject = Subject::from_object(&group);
                    match budget.enter(
                        Role::Group,
                        &group_subject.subject_type,
                        &group_subject.subject_id,
                    ) {
                        Entry::AlreadyVisited => continue,
                        Entry::DepthExceeded => {
                            depth_exceeded(&self.config, "list_accessible_objects group expansion")?;
                            continue;
                        }
                        Entry::Proceed => {}
                    }
                    self.collect_direct(&group_subject, &candidate_relations, &mut held)
                        .await?;
                    frontier.push_back(group_subject);
                }
            }
        }

        let mut results: HashMap<Object, AccessibleObject> = HashMap::new();
        for (object, relations) in &held {
            if object.object_type != of_type {
                continue;
            }
            let actions = self.actions_for(relations, can_they);
            results.insert(
                object.clone(),
                AccessibleObject {
                    object: object.clone(),
                    actions,
                    parent: None,
                },
            );
        }

        if let Some(hierarchy_relation) = self.schema.hierarchy_relation() {
            let seeds: Vec<Object> = held.keys().cloned().collect();
            for seed in seeds {
                let seed_actions = self.actions_for(&held[&seed], can_they);
                self.propagate_descendants(
                    &seed,
                    &seed_actions,
                    &held,
                    of_type,
                    can_they,
                    hierarchy_relation,
                    &mut budget,
                    &mut results,
                )
                .await?;
            }
        }

        Ok(results.into_values().collect())
    }

    async fn collect_direct(
        &self,
        subject: &Subject,
        relations: &[String],
        held: &mut HashMap<Object, HashSet<String>>,
    ) -> Result<(), AuthzError> {
        for relation in relations {
            let objects = self.store.find_objects(subject, relation).await?;
            for object in objects {
                held.entry(object).or_default().insert(relation.clone());
            }
        }
        Ok(())
    }

    /// Actions granted by a held relation set, narrowed to `can_they` when an
    /// action filter is supplied — matching the open question in spec.md §9
    /// ("the reference consumer appears to want only matching").
    fn actions_for(&self, relations_held: &HashSet<String>, can_they: Option<&str>) -> HashSet<String> {
        match can_they {
            Some(action) => {
                if self
                    .schema
                    .relations_for_action(action)
                    .iter()
                    .any(|r| relations_held.contains(r))
                {
                    HashSet::from([action.to_string()])
                } else {
                    HashSet::new()
                }
            }
            None => self.schema.actions_granted_by(relations_held),
        }
    }

    /// Actions propagated onto a child given the actions held on its parent,
    /// narrowed to `can_they` when supplied.
    fn propagated_actions(&self, parent_actions: &HashSet<String>, can_they: Option<&str>) -> HashSet<String> {
        match can_they {
            Some(action) => {
                let requirements = self.schema.propagation_for_action(action);
                if requirements.iter().any(|parent_action| parent_actions.contains(parent_action)) {
                    HashSet::from([action.to_string()])
                } else {
                    HashSet::new()
                }
            }
            None => {
                let mut out = HashSet::new();
                for (action, requirements) in self.schema.hierarchy_propagation_map() {
                    if requirements.iter().any(|parent_action| parent_actions.contains(parent_action)) {
                        out.insert(action.clone());
                    }
                }
                out
            }
        }
    }

    /// Breadth-first walk down the hierarchy from `root`, recording
    /// propagated actions on every `of_type` descendant (spec.md §4.4 step
    /// 4). `held` supplies each descendant's own direct/group relations so
    /// that propagation composes through multi-level hierarchies.
    #[allow(clippy::too_many_arguments)]
    async fn propagate_descendants(
        &self,
        root: &Object,
        root_actions: &HashSet<String>,
        held: &HashMap<Object, HashSet<String>>,
        of_type: &str,
        can_they: Option<&str>,
        hierarchy_relation: &str,
        budget: &mut Budget,
        results: &mut HashMap<Object, AccessibleObject>,
    ) -> Result<(), AuthzError> {
        let mut frontier: VecDeque<(Object, HashSet<String>)> = VecDeque::new();
        frontier.push_back((root.clone(), root_actions.clone()));

        while let Some((current, current_actions)) = frontier.pop_front() {
            let children = self.store.find_subjects(&current, hierarchy_relation).await?;
            for child_subject in children {
                let child = Object::from_subject(&child_subject);
                match budget.enter(Role::Hierarchy, &child.object_type, &child.object_id) {
                    Entry::AlreadyVisited => continue,
                    Entry::DepthExceeded => {
                        depth_exceeded(&self.config, "list_accessible_objects hierarchy propagation")?;
                        continue;
                    }
                    Entry::Proceed => {}
                }

                let propagated = self.propagated_actions(&current_actions, can_they);

                if child.object_type == of_type && !propagated.is_empty() {
                    let entry = results.entry(child.clone()).or_insert_with(|| AccessibleObject {
                        object: child.clone(),
                        actions: HashSet::new(),
                        parent: None,
                    });
                    entry.actions.extend(propagated.iter().cloned());
                    if entry.parent.is_none() {
                        entry.parent = Some(current.clone());
                    }
                }

                let mut next_actions = propagated;
                if let Some(own_relations) = held.get(&child) {
                    next_actions.extend(self.actions_for(own_relations, can_they));
                }
                frontier.push_back((child, next_actions));
            }
        }

        Ok(())
    }
}
