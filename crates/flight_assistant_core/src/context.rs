//! crates/flight_assistant_core/src/context.rs
//!
//! The explicit set of collaborators handed to every core call.

use std::sync::Arc;

use crate::ports::{EmbeddingService, TextGenerationService, VectorIndex};

/// Models and index available to a core operation.
///
/// Any of them may be absent (no credential, model failed to load, index not
/// built yet); core operations degrade instead of failing in that case.
#[derive(Clone, Default)]
pub struct ServiceContext {
    pub generator: Option<Arc<dyn TextGenerationService>>,
    pub embedder: Option<Arc<dyn EmbeddingService>>,
    pub index: Option<Arc<dyn VectorIndex>>,
}

impl ServiceContext {
    pub fn with_generator(mut self, generator: Arc<dyn TextGenerationService>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingService>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }
}
