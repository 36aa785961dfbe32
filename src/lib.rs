//! Relationship-based (Zanzibar-style) authorization core.
//!
//! This crate implements the core of a Google-Zanzibar-inspired
//! authorization engine: a declarative schema, an immutable tuple model, a
//! recursive `check` algorithm (direct match, field fallback, group
//! expansion, hierarchy propagation) and its inverse,
//! `list_accessible_objects`. Storage is abstracted behind a narrow
//! five-operation [`storage::TupleStore`] trait so the engines are
//! indifferent to whether tuples live in memory or in Postgres.
//!
//! # Core concepts
//!
//! - **Subject** — the actor whose access is being evaluated.
//! - **Object** — the resource being accessed; its id may carry a field
//!   suffix (`profile:emp123#salary`).
//! - **Relation** — a named edge with one of three flavours: direct
//!   (permission-granting), group (membership) or hierarchy (parent).
//! - **Tuple** — a stored `(subject, relation, object)` edge with an
//!   optional validity window.
//! - **Action** — a capability name the schema maps onto the relations (and
//!   parent-propagated actions) that grant it.
//!
//! # Example
//!
//! ```rust
//! use authz_core::{AuthzEngine, Condition, InMemoryTupleStore, Object, Subject};
//! use authz_core::schema::reference_schema;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), authz_core::AuthzError> {
//! let store = Arc::new(InMemoryTupleStore::new());
//! let engine = AuthzEngine::new(store, reference_schema()?);
//!
//! let alice = Subject::new("user", "alice");
//! let doc1 = Object::new("document", "doc1");
//!
//! engine.allow(alice.clone(), "owner", doc1.clone(), None).await?;
//! assert!(engine.check(&alice, "delete", &doc1).await?);
//! # let _ = Condition::default();
//! # Ok(())
//! # }
//! ```

pub mod check;
pub mod config;
pub mod engine;
pub mod error;
pub mod expand;
pub mod models;
pub mod schema;
pub mod storage;
mod traverse;

pub use config::EngineConfig;
pub use engine::AuthzEngine;
pub use error::{AuthzError, Result};
pub use models::{AccessibleObject, Condition, Object, Subject, Tuple, TupleFilter, TupleKey};
pub use schema::{RelationKind, Schema, SchemaBuilder};
pub use storage::{InMemoryTupleStore, SharedTupleStore, TupleStore};
