//! Shared types for the HTTP layer.

use std::sync::Arc;

use crate::core_state::EngineState;

/// Handler state. Cheap to clone.
#[derive(Clone)]
pub struct ApiContext {
    pub engine: Arc<EngineState>,
}

impl ApiContext {
    pub fn new(engine: Arc<EngineState>) -> Self {
        Self { engine }
    }
}

/// Listing page size when the caller gives none.
pub const DEFAULT_PAGE_LIMIT: usize = 50;
