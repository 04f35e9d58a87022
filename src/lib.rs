//! Configuration-driven data access: a YAML entity schema is validated into an
//! immutable registry, and a generic repository/service pair serves list,
//! detail, form, save, lookup, and custom-action operations for every entity
//! in it. Table and column names only ever enter SQL through identifiers
//! validated at load time; every value is bound as a parameter.

pub mod error;
pub mod repo;
pub mod schema;
pub mod service;
pub mod sql;
pub mod state;

pub use error::{RepoError, ServiceError, ValidationIssue};
pub use repo::{ListPage, ListQuery, PgRepository, Repository};
pub use schema::{load, EntityDefinition, LoadResult, SchemaRegistry};
pub use service::{
    ActionHandler, ActionOutcome, ActionRegistry, DetailContext, FormContext, FormMode,
    GenericService, ListContext, SaveOutcome,
};
pub use state::{AppState, SharedRegistry};
