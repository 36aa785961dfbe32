use crate::error::AuthzError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The flavour of a declared relation. Closed, tagged set per design —
/// deliberately not open to extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// A permission-granting relation (`owner`, `editor`, ...).
    Direct,
    /// A membership relation. At most one per schema.
    Group,
    /// A parent relation. At most one per schema.
    Hierarchy,
}

/// A validated, immutable authorization schema: declared types, relations
/// and the maps that connect actions to relations and to hierarchy
/// propagation rules.
///
/// Construction is fallible — every invariant below is checked once, at
/// build time, rather than left to be violated lazily at call time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    subject_types: Vec<String>,
    object_types: Vec<String>,
    relations: HashMap<String, RelationKind>,
    action_to_relations: HashMap<String, Vec<String>>,
    hierarchy_propagation: HashMap<String, Vec<String>>,
}

impl Schema {
    /// Builds and validates a schema.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::Schema`] if:
    /// - a relation referenced in `action_to_relations` or
    ///   `hierarchy_propagation` is not declared in `relations`;
    /// - more than one relation has kind [`RelationKind::Group`] or
    ///   [`RelationKind::Hierarchy`];
    /// - `hierarchy_propagation` is non-empty but no relation has kind
    ///   [`RelationKind::Hierarchy`].
    pub fn new(
        subject_types: Vec<String>,
        object_types: Vec<String>,
        relations: HashMap<String, RelationKind>,
        action_to_relations: HashMap<String, Vec<String>>,
        hierarchy_propagation: HashMap<String, Vec<String>>,
    ) -> Result<Self, AuthzError> {
        let group_count = relations
            .values()
            .filter(|kind| matches!(kind, RelationKind::Group))
            .count();
        if group_count > 1 {
            return Err(AuthzError::Schema(format!(
                "schema declares {group_count} group relations, at most one is allowed"
            )));
        }

        let hierarchy_count = relations
            .values()
            .filter(|kind| matches!(kind, RelationKind::Hierarchy))
            .count();
        if hierarchy_count > 1 {
            return Err(AuthzError::Schema(format!(
                "schema declares {hierarchy_count} hierarchy relations, at most one is allowed"
            )));
        }

        for (action, rels) in &action_to_relations {
            for relation in rels {
                if !relations.contains_key(relation) {
                    return Err(AuthzError::Schema(format!(
                        "action '{action}' references undeclared relation '{relation}'"
                    )));
                }
            }
        }

        if !hierarchy_propagation.is_empty() && hierarchy_count == 0 {
            return Err(AuthzError::Schema(
                "hierarchy_propagation is declared but no hierarchy relation exists".to_string(),
            ));
        }

        for action in hierarchy_propagation.keys() {
            if !action_to_relations.contains_key(action) {
                return Err(AuthzError::Schema(format!(
                    "hierarchy_propagation references action '{action}' with no relation mapping"
                )));
            }
        }

        Ok(Self {
            subject_types,
            object_types,
            relations,
            action_to_relations,
            hierarchy_propagation,
        })
    }

    pub fn subject_types(&self) -> &[String] {
        &self.subject_types
    }

    pub fn object_types(&self) -> &[String] {
        &self.object_types
    }

    pub fn relation_kind(&self, relation: &str) -> Option<RelationKind> {
        self.relations.get(relation).copied()
    }

    pub fn is_direct(&self, relation: &str) -> bool {
        matches!(self.relation_kind(relation), Some(RelationKind::Direct))
    }

    pub fn is_declared(&self, relation: &str) -> bool {
        self.relations.contains_key(relation)
    }

    /// Whether `subject_type` may appear as a subject. Declared object
    /// types count too — a group or hierarchy node is addressed by its
    /// object type when it appears as the subject of a `member`/`parent`
    /// tuple (spec.md §3).
    pub fn is_known_subject_type(&self, subject_type: &str) -> bool {
        self.subject_types.iter().any(|t| t == subject_type)
            || self.object_types.iter().any(|t| t == subject_type)
    }

    /// Whether `object_type` is declared as an object type.
    pub fn is_known_object_type(&self, object_type: &str) -> bool {
        self.object_types.iter().any(|t| t == object_type)
    }

    /// The relations that grant `action`, or an empty slice if the action is
    /// unknown.
    pub fn relations_for_action(&self, action: &str) -> &[String] {
        self.action_to_relations
            .get(action)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All relations whose flavour is [`RelationKind::Direct`] or
    /// [`RelationKind::Group`] — the candidate set `list_accessible_objects`
    /// uses when no action filter is supplied.
    pub fn direct_and_group_relations(&self) -> Vec<String> {
        self.relations
            .iter()
            .filter(|(_, kind)| !matches!(kind, RelationKind::Hierarchy))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// The parent-side actions that, if held, grant `action` on a child.
    pub fn propagation_for_action(&self, action: &str) -> &[String] {
        self.hierarchy_propagation
            .get(action)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn hierarchy_propagation_map(&self) -> &HashMap<String, Vec<String>> {
        &self.hierarchy_propagation
    }

    pub fn group_relation(&self) -> Option<&str> {
        self.relations
            .iter()
            .find(|(_, kind)| matches!(kind, RelationKind::Group))
            .map(|(name, _)| name.as_str())
    }

    pub fn hierarchy_relation(&self) -> Option<&str> {
        self.relations
            .iter()
            .find(|(_, kind)| matches!(kind, RelationKind::Hierarchy))
            .map(|(name, _)| name.as_str())
    }

    /// Inverts `action_to_relations` over `relations_held`: the set of
    /// actions granted by holding any of the given relations.
    pub fn actions_granted_by(&self, relations_held: &std::collections::HashSet<String>) -> std::collections::HashSet<String> {
        self.action_to_relations
            .iter()
            .filter(|(_, rels)| rels.iter().any(|r| relations_held.contains(r)))
            .map(|(action, _)| action.clone())
            .collect()
    }

    /// Convenience builder mirroring the chained-setter style used
    /// elsewhere in this crate's public API.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }
}

/// Incrementally assembles a [`Schema`], deferring validation to
/// [`SchemaBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    subject_types: Vec<String>,
    object_types: Vec<String>,
    relations: HashMap<String, RelationKind>,
    action_to_relations: HashMap<String, Vec<String>>,
    hierarchy_propagation: HashMap<String, Vec<String>>,
}

impl SchemaBuilder {
    pub fn subject_type(mut self, name: impl Into<String>) -> Self {
        self.subject_types.push(name.into());
        self
    }

    pub fn object_type(mut self, name: impl Into<String>) -> Self {
        self.object_types.push(name.into());
        self
    }

    pub fn relation(mut self, name: impl Into<String>, kind: RelationKind) -> Self {
        self.relations.insert(name.into(), kind);
        self
    }

    pub fn action(mut self, name: impl Into<String>, relations: Vec<String>) -> Self {
        self.action_to_relations.insert(name.into(), relations);
        self
    }

    pub fn propagate(mut self, action: impl Into<String>, parent_actions: Vec<String>) -> Self {
        self.hierarchy_propagation
            .insert(action.into(), parent_actions);
        self
    }

    pub fn build(self) -> Result<Schema, AuthzError> {
        Schema::new(
            self.subject_types,
            self.object_types,
            self.relations,
            self.action_to_relations,
            self.hierarchy_propagation,
        )
    }
}

/// The reference schema used throughout spec.md §8: a document/folder/team
/// application with `owner`/`editor`/`viewer` direct relations, a `member`
/// group relation and a `parent` hierarchy relation.
pub fn reference_schema() -> Result<Schema, AuthzError> {
    Schema::builder()
        .subject_type("user")
        .subject_type("team")
        .object_type("document")
        .object_type("folder")
        .object_type("team")
        .relation("owner", RelationKind::Direct)
        .relation("editor", RelationKind::Direct)
        .relation("viewer", RelationKind::Direct)
        .relation("member", RelationKind::Group)
        .relation("parent", RelationKind::Hierarchy)
        .action(
            "view",
            vec![
                "owner".to_string(),
                "editor".to_string(),
                "viewer".to_string(),
                "member".to_string(),
            ],
        )
        .action("edit", vec!["owner".to_string(), "editor".to_string()])
        .action("delete", vec!["owner".to_string()])
        .action("share", vec!["owner".to_string(), "editor".to_string()])
        .propagate("view", vec!["view".to_string()])
        .propagate("edit", vec!["edit".to_string()])
        .build()
}
