//! crates/flight_assistant_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or model APIs.

use async_trait::async_trait;
use serde_json::Value;

use chrono::{DateTime, Utc};

use crate::domain::{
    AircraftTypeCount, FlightFilter, FlightId, FlightRecord, FlightRow, IndexedDocument,
    MetadataFilter, ScoredDocument, StoredFlight,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Operation not supported: {0}")]
    Unsupported(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait FlightStore: Send + Sync {
    /// Upserts a record on its natural key and returns the row identifier.
    async fn store(&self, record: &FlightRecord) -> PortResult<FlightId>;

    async fn fetch_all_raw(&self) -> PortResult<Vec<(FlightId, String)>>;

    async fn fetch_all(&self) -> PortResult<Vec<StoredFlight>>;

    async fn fetch_by_id(&self, id: FlightId) -> PortResult<StoredFlight>;

    /// Returns the tabular projection of up to `limit` flights matching `filter`, in id order.
    async fn fetch_projection(
        &self,
        filter: &FlightFilter,
        limit: usize,
    ) -> PortResult<Vec<FlightRow>>;

    /// Returns projections for the given ids, preserving the order of `ids`.
    async fn fetch_rows_by_ids(&self, ids: &[FlightId]) -> PortResult<Vec<FlightRow>>;

    /// Flight counts grouped by aircraft type, largest group first.
    async fn count_by_aircraft_type(&self) -> PortResult<Vec<AircraftTypeCount>>;

    async fn count(&self) -> PortResult<usize>;

    async fn delete(&self, id: FlightId) -> PortResult<()>;

    async fn clear(&self) -> PortResult<()>;
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Replaces the whole index with the given documents and their embeddings.
    async fn build(&self, entries: Vec<(IndexedDocument, Vec<f32>)>) -> PortResult<usize>;

    /// Ranks documents by similarity to `vector`, applying `filter` as a hard constraint.
    async fn similarity_search(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> PortResult<Vec<ScoredDocument>>;

    async fn len(&self) -> PortResult<usize>;

    /// When the index was last rebuilt, if the backend records it.
    async fn built_at(&self) -> PortResult<Option<DateTime<Utc>>> {
        Ok(None)
    }

    async fn clear(&self) -> PortResult<()>;
}

#[async_trait]
pub trait TextGenerationService: Send + Sync {
    /// Generates a plain-text completion for the prompt.
    async fn generate(&self, prompt: &str) -> PortResult<String>;

    /// Extracts a JSON object matching `schema` from `text`.
    async fn extract_structured(&self, _text: &str, _schema: &Value) -> PortResult<Value> {
        Err(PortError::Unsupported(
            "structured extraction is not available for this backend".to_string(),
        ))
    }
}

#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed_query(&self, text: &str) -> PortResult<Vec<f32>>;

    async fn embed_documents(&self, texts: &[String]) -> PortResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed_query(text).await?);
        }
        Ok(vectors)
    }
}
