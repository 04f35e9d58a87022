//! Typed errors and the status mapping consumed by the transport layer.

use thiserror::Error;

/// One problem found while validating an entity document. Non-fatal: the
/// offending entity is excluded and the rest of the document still loads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Entity name, or "<document>" for problems with the document itself.
    pub entity: String,
    /// Path within the entity config, e.g. "list.columns[2].name".
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(entity: impl Into<String>, path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue {
            entity: entity.into(),
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "entity '{}' {}: {}", self.entity, self.path, self.message)
    }
}

/// Data-store failure with entity and operation context. Display stays free
/// of query text; the source error is for logs only.
#[derive(Error, Debug)]
#[error("database error during {operation} on '{entity}'")]
pub struct RepoError {
    pub entity: String,
    pub operation: &'static str,
    #[source]
    pub source: sqlx::Error,
}

impl RepoError {
    pub fn new(entity: &str, operation: &'static str, source: sqlx::Error) -> Self {
        RepoError {
            entity: entity.to_string(),
            operation,
            source,
        }
    }
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("unknown entity '{0}'")]
    EntityNotFound(String),
    #[error("{entity} not found")]
    RecordNotFound { entity: String },
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl ServiceError {
    /// Status the external transport is expected to map this to.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::EntityNotFound(_) => 404,
            ServiceError::RecordNotFound { .. } => 404,
            ServiceError::Repo(_) => 500,
        }
    }
}
