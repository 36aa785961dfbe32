//! Shared recursion bookkeeping for the check and list-accessible engines.
//!
//! Both engines walk the same two graphs — group membership and object
//! hierarchy — and both need the same safety net: a single depth counter and
//! a per-call visited set, so an adversarial schema cannot dodge the cap by
//! alternating between group and hierarchy edges (spec.md §9).

use ahash::AHashSet;

use crate::config::EngineConfig;
use crate::error::AuthzError;

/// Distinguishes the two traversal roles that share one visited set. The
/// spec describes the set as keyed on bare `(type, id)`; subject-space and
/// object-space types are disjoint in every schema this crate validates, but
/// tagging the role keeps group and hierarchy traversal from colliding by
/// construction rather than by convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Role {
    Group,
    Hierarchy,
    FieldFallback,
}

/// What the caller should do after attempting to enter a node.
pub(crate) enum Entry {
    /// First visit — proceed, the node has been recorded as visited and the
    /// step counted against the budget.
    Proceed,
    /// This exact node was already visited on this call; skip it without
    /// treating the skip as a failure of the branch that reached it.
    AlreadyVisited,
    /// The depth budget is exhausted.
    DepthExceeded,
}

/// Depth counter and visited set for a single top-level `check` or
/// `list_accessible_objects` call.
pub(crate) struct Budget {
    steps: u32,
    max_depth: u32,
    visited: AHashSet<(Role, String, String)>,
}

impl Budget {
    pub(crate) fn new(config: &EngineConfig) -> Self {
        Self {
            steps: 0,
            max_depth: config.default_check_depth,
            visited: AHashSet::default(),
        }
    }

    pub(crate) fn enter(&mut self, role: Role, node_type: &str, node_id: &str) -> Entry {
        let key = (role, node_type.to_string(), node_id.to_string());
        if self.visited.contains(&key) {
            return Entry::AlreadyVisited;
        }
        if self.steps >= self.max_depth {
            return Entry::DepthExceeded;
        }
        self.visited.insert(key);
        self.steps += 1;
        Entry::Proceed
    }
}

/// Handles a [`Entry::DepthExceeded`] result the way spec.md §4.3/§5 wants:
/// log a warning, and either stop this branch (`Ok(false)`-equivalent) or
/// raise, depending on configuration.
pub(crate) fn depth_exceeded(config: &EngineConfig, context: &str) -> Result<(), AuthzError> {
    tracing::warn!(context, "maximum check depth exceeded");
    if config.throw_on_max_depth {
        Err(AuthzError::MaxDepthExceeded)
    } else {
        Ok(())
    }
}
