//! Shared application state. The registry is reloadable: readers take an
//! `Arc` snapshot, reloads swap a single reference, so an in-flight request
//! never observes a half-installed registry.

use crate::schema::SchemaRegistry;
use sqlx::PgPool;
use std::sync::{Arc, RwLock};

#[derive(Clone)]
pub struct SharedRegistry {
    inner: Arc<RwLock<Arc<SchemaRegistry>>>,
}

impl SharedRegistry {
    pub fn new(registry: SchemaRegistry) -> Self {
        SharedRegistry {
            inner: Arc::new(RwLock::new(Arc::new(registry))),
        }
    }

    /// A consistent snapshot; stays valid across a concurrent reload.
    pub fn snapshot(&self) -> Arc<SchemaRegistry> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            // the lock only ever guards a pointer swap, so a poisoned
            // guard still holds a usable registry
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Atomically install a freshly loaded registry.
    pub fn swap(&self, registry: SchemaRegistry) {
        tracing::info!(entities = registry.len(), "installing schema registry");
        let next = Arc::new(registry);
        match self.inner.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }
}

/// Everything a host needs to serve requests.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub registry: SharedRegistry,
}
