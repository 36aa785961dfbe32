use thiserror::Error;

/// The error taxonomy surfaced across the public API.
///
/// Schema and invalid-argument errors are programmer errors, raised
/// immediately at the API boundary. Storage errors propagate unchanged from
/// whatever backend is plugged in. `check` never raises on "denied" — it
/// returns `false`; depth exhaustion is a policy decision gated by
/// [`crate::config::EngineConfig::throw_on_max_depth`], not a bug.
#[derive(Error, Debug)]
pub enum AuthzError {
    /// An undeclared relation was used, a required group/hierarchy relation
    /// is absent, or a propagation rule references an unknown relation.
    #[error("schema error: {0}")]
    Schema(String),

    /// An empty filter was given to a bulk delete, an id was empty, or an
    /// unknown subject/object type was supplied.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The combined group/hierarchy recursion budget was exhausted and the
    /// engine is configured to raise rather than return `false`.
    #[error("maximum check depth exceeded")]
    MaxDepthExceeded,

    /// Propagated verbatim from the storage backend.
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AuthzError>;
