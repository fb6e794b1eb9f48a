pub mod airports;
pub mod context;
pub mod domain;
pub mod export;
pub mod extractor;
pub mod ingest;
pub mod ports;
pub mod retrieval;
pub mod synthesizer;

#[cfg(test)]
mod testing;

pub use context::ServiceContext;
pub use domain::{
    AircraftTypeCount, DocumentMetadata, FlightFilter, FlightId, FlightRecord, FlightRow,
    IndexedDocument, MetadataFilter, ProjectionField, ScoredDocument, SearchHit, SearchOutcome,
    StoredFlight,
};
pub use extractor::{extract, ExtractionMode};
pub use ingest::{ingest_batch, reprocess_stored, IngestDocument, IngestOutcome, IngestReport};
pub use ports::{
    EmbeddingService, FlightStore, PortError, PortResult, TextGenerationService, VectorIndex,
};
pub use retrieval::{rebuild_index, search, IndexReport, SearchMode};
pub use synthesizer::synthesize;
