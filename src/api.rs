//! HTTP API for the triage conversation graph

mod handlers;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::db::Database;
use crate::runtime::ProductionManager;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<ProductionManager>,
}

impl AppState {
    pub fn new(sessions: ProductionManager) -> Self {
        Self {
            sessions: Arc::new(sessions),
        }
    }

    pub fn db(&self) -> &Database {
        self.sessions.runtime().storage().inner()
    }
}
