//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use flight_assistant_core::context::ServiceContext;
use flight_assistant_core::ports::{
    EmbeddingService, FlightStore, TextGenerationService, VectorIndex,
};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
///
/// The model adapters and the index are optional: without credentials the
/// service still ingests and lists flights, and search degrades to empty results.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn FlightStore>,
    pub config: Arc<Config>,
    pub generator: Option<Arc<dyn TextGenerationService>>,
    pub embedder: Option<Arc<dyn EmbeddingService>>,
    pub index: Option<Arc<dyn VectorIndex>>,
}

impl AppState {
    /// The collaborators handed to core operations.
    pub fn context(&self) -> ServiceContext {
        ServiceContext {
            generator: self.generator.clone(),
            embedder: self.embedder.clone(),
            index: self.index.clone(),
        }
    }
}
