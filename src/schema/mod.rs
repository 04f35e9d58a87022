//! Entity schema: raw config types, loader/validator, and the resolved model.

pub mod loader;
pub mod model;
pub mod types;

pub use loader::{load, LoadResult};
pub use model::*;
pub use types::*;
