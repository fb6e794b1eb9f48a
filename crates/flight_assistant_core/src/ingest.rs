//! crates/flight_assistant_core/src/ingest.rs
//!
//! Batch ingestion: extract every uploaded document and persist the result.

use serde::Serialize;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::context::ServiceContext;
use crate::domain::FlightId;
use crate::extractor::{self, ExtractionMode};
use crate::ports::{FlightStore, PortResult};

/// One uploaded XML document.
#[derive(Debug, Clone)]
pub struct IngestDocument {
    /// File name or other caller-supplied label.
    pub source: String,
    pub xml: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    pub source: String,
    pub stored: bool,
    pub flight_id: Option<FlightId>,
    pub summary: String,
    /// Extraction or storage problem, if any. A record may be stored and still carry one.
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub batch_id: Uuid,
    pub outcomes: Vec<IngestOutcome>,
    pub stored_count: usize,
}

/// Re-runs extraction over every stored source document, e.g. after switching modes.
///
/// Sources are labelled `flight:{id}` after the row they were read from. When a
/// re-extracted record lands on a different row, the row it came from is deleted
/// so each source document is stored once.
pub async fn reprocess_stored(
    mode: ExtractionMode,
    context: &ServiceContext,
    store: &dyn FlightStore,
) -> PortResult<IngestReport> {
    let stored = store.fetch_all_raw().await?;
    let source_ids: Vec<FlightId> = stored.iter().map(|(id, _)| *id).collect();
    let documents = stored
        .into_iter()
        .map(|(id, xml)| IngestDocument {
            source: format!("flight:{id}"),
            xml,
        })
        .collect();

    let report = ingest_batch(documents, mode, context, store).await;

    for (source_id, outcome) in source_ids.iter().zip(&report.outcomes) {
        let Some(new_id) = outcome.flight_id.filter(|id| id != source_id) else {
            continue;
        };
        match store.delete(*source_id).await {
            Ok(()) => info!(source_id, new_id, "Removed row superseded by re-extraction"),
            Err(e) => warn!(source_id, error = %e, "Failed to remove superseded flight row"),
        }
    }
    Ok(report)
}

/// Extracts and stores each document in order. A failed store does not stop the batch.
pub async fn ingest_batch(
    documents: Vec<IngestDocument>,
    mode: ExtractionMode,
    context: &ServiceContext,
    store: &dyn FlightStore,
) -> IngestReport {
    let batch_id = Uuid::new_v4();
    let span = info_span!("ingest_batch", %batch_id, documents = documents.len(), %mode);

    async move {
        let mut outcomes = Vec::with_capacity(documents.len());
        for document in documents {
            let record = extractor::extract(&document.xml, mode, context).await;
            let summary = record.label();

            let outcome = match store.store(&record).await {
                Ok(id) => IngestOutcome {
                    source: document.source,
                    stored: true,
                    flight_id: Some(id),
                    summary,
                    error: record.error,
                },
                Err(e) => {
                    error!(source = %document.source, error = %e, "Failed to store flight record");
                    IngestOutcome {
                        source: document.source,
                        stored: false,
                        flight_id: None,
                        summary,
                        error: Some(e.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }

        let stored_count = outcomes.iter().filter(|o| o.stored).count();
        info!(stored_count, total = outcomes.len(), "Batch ingested");
        IngestReport {
            batch_id,
            outcomes,
            stored_count,
        }
    }
    .instrument(span)
    .await
}
