use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

/// An actor whose access is being evaluated — a `(type, id)` pair.
///
/// `subject_type` is usually one of the schema's declared subject types, but
/// because group and hierarchy objects may themselves appear as subjects of
/// `member`/`parent` tuples, any declared object type is also a valid
/// subject type in practice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    pub subject_type: String,
    pub subject_id: String,
}

impl Subject {
    pub fn new(subject_type: impl Into<String>, subject_id: impl Into<String>) -> Self {
        Self {
            subject_type: subject_type.into(),
            subject_id: subject_id.into(),
        }
    }

    pub fn from_object(object: &Object) -> Self {
        Self {
            subject_type: object.object_type.clone(),
            subject_id: object.object_id.clone(),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.subject_type, self.subject_id)
    }
}

/// A resource being accessed — a `(type, id)` pair whose id may carry a
/// field suffix (see [`Object::split_field`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Object {
    pub object_type: String,
    pub object_id: String,
}

impl Object {
    pub fn new(object_type: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            object_id: object_id.into(),
        }
    }

    pub fn from_subject(subject: &Subject) -> Self {
        Self {
            object_type: subject.subject_type.clone(),
            object_id: subject.subject_id.clone(),
        }
    }

    /// Splits `object_id` on the first occurrence of `separator`, returning
    /// the base object and the field remainder. Only the first occurrence
    /// matters: `"emp123#salary#q3"` splits into base id `"emp123"` and
    /// field `"salary#q3"` — the remainder is not re-split.
    pub fn split_field(&self, separator: &str) -> Option<(Object, &str)> {
        if separator.is_empty() {
            return None;
        }
        let (base_id, field) = self.object_id.split_once(separator)?;
        Some((Object::new(self.object_type.clone(), base_id), field))
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_type, self.object_id)
    }
}

/// A time-bounded validity window attached to a tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Condition {
    pub valid_since: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

impl Condition {
    pub fn since(valid_since: DateTime<Utc>) -> Self {
        Self {
            valid_since: Some(valid_since),
            valid_until: None,
        }
    }

    pub fn until(valid_until: DateTime<Utc>) -> Self {
        Self {
            valid_since: None,
            valid_until: Some(valid_until),
        }
    }

    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        let after_start = self.valid_since.map(|t| t <= at).unwrap_or(true);
        let before_end = self.valid_until.map(|t| at <= t).unwrap_or(true);
        after_start && before_end
    }
}

/// A stored relationship edge `(subject, relation, object)` with an optional
/// validity window. Storage assigns `id` and `created_at`; the uniqueness
/// key is `(subject, relation, object)` — rewriting the same key overwrites
/// the stored condition in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tuple {
    pub id: Uuid,
    pub subject: Subject,
    pub relation: String,
    pub object: Object,
    pub condition: Option<Condition>,
    pub created_at: DateTime<Utc>,
}

impl Tuple {
    pub fn new(subject: Subject, relation: impl Into<String>, object: Object) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject,
            relation: relation.into(),
            object,
            condition: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.condition.map(|c| c.is_active_at(at)).unwrap_or(true)
    }

    /// The 5-attribute key that determines tuple identity for upsert/delete.
    pub fn key(&self) -> TupleKey {
        TupleKey {
            subject_type: self.subject.subject_type.clone(),
            subject_id: self.subject.subject_id.clone(),
            relation: self.relation.clone(),
            object_type: self.object.object_type.clone(),
            object_id: self.object.object_id.clone(),
        }
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.subject, self.relation, self.object)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TupleKey {
    pub subject_type: String,
    pub subject_id: String,
    pub relation: String,
    pub object_type: String,
    pub object_id: String,
}

/// A conjunctive, partial filter over tuples. Every populated field narrows
/// the match; an entirely empty filter matches everything, which `delete`
/// refuses to act on (see [`TupleFilter::is_empty`]).
#[derive(Debug, Clone, Default)]
pub struct TupleFilter {
    pub subject: Option<Subject>,
    pub subject_type: Option<String>,
    pub relation: Option<String>,
    pub object: Option<Object>,
    pub object_type: Option<String>,
}

impl TupleFilter {
    pub fn is_empty(&self) -> bool {
        self.subject.is_none()
            && self.subject_type.is_none()
            && self.relation.is_none()
            && self.object.is_none()
            && self.object_type.is_none()
    }

    pub fn matches(&self, tuple: &Tuple) -> bool {
        if let Some(subject) = &self.subject {
            if &tuple.subject != subject {
                return false;
            }
        }
        if let Some(subject_type) = &self.subject_type {
            if &tuple.subject.subject_type != subject_type {
                return false;
            }
        }
        if let Some(relation) = &self.relation {
            if &tuple.relation != relation {
                return false;
            }
        }
        if let Some(object) = &self.object {
            if &tuple.object != object {
                return false;
            }
        }
        if let Some(object_type) = &self.object_type {
            if &tuple.object.object_type != object_type {
                return false;
            }
        }
        true
    }
}

/// One node in the enumeration produced by `list_accessible_objects`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessibleObject {
    pub object: Object,
    pub actions: HashSet<String>,
    pub parent: Option<Object>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_object_id_on_first_separator_only() {
        let object = Object::new("profile", "emp123#salary#q3");
        let (base, field) = object.split_field("#").expect("should split");
        assert_eq!(base, Object::new("profile", "emp123"));
        assert_eq!(field, "salary#q3");
    }

    #[test]
    fn test_object_without_separator_does_not_split() {
        let object = Object::new("profile", "emp123");
        assert!(object.split_field("#").is_none());
    }

    #[test]
    fn test_condition_respects_both_bounds() {
        let now = Utc::now();
        let earlier = now - chrono::Duration::days(1);
        let later = now + chrono::Duration::days(1);

        let window = Condition {
            valid_since: Some(earlier),
            valid_until: Some(later),
        };
        assert!(window.is_active_at(now));
        assert!(!window.is_active_at(earlier - chrono::Duration::seconds(1)));
        assert!(!window.is_active_at(later + chrono::Duration::seconds(1)));
    }
}
