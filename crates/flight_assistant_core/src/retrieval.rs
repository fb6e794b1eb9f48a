//! crates/flight_assistant_core/src/retrieval.rs
//!
//! Semantic retrieval over indexed flight documents.
//!
//! Two strategies are supported:
//! - standard: embed the query and rank by similarity, restricted to a departure
//!   port when the query names a known city;
//! - hypothetical document (HyDE): have the model write a plausible flight
//!   document for the query and rank by similarity to that document instead.
//!
//! Both degrade to an empty outcome when a collaborator is missing or fails.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::airports;
use crate::context::ServiceContext;
use crate::domain::{
    DocumentMetadata, FlightId, FlightRecord, IndexedDocument, MetadataFilter, ScoredDocument,
    SearchHit, SearchOutcome,
};
use crate::ports::{
    EmbeddingService, FlightStore, PortError, PortResult, TextGenerationService, VectorIndex,
};

pub const DEFAULT_TOP_K: usize = 3;

const HYDE_PROMPT: &str = r#"Generate a detailed flight information document that would be a perfect match for the query: "{query}"

Format it as a document describing a single flight with information such as:
- Flight number and airline
- Departure airport and time
- Arrival airport and time
- Aircraft information

Make sure to be specific about which airport is the departure and which is the arrival."#;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    #[default]
    Standard,
    /// Hypothetical document embeddings.
    #[serde(alias = "hypothetical")]
    Hyde,
}

/// Ranks indexed flights against `query`. Never fails.
#[instrument(skip(context))]
pub async fn search(
    query: &str,
    context: &ServiceContext,
    mode: SearchMode,
    top_k: usize,
) -> SearchOutcome {
    let k = top_k.max(1);
    let (Some(index), Some(embedder)) = (context.index.as_deref(), context.embedder.as_deref())
    else {
        warn!("Search requested without a loaded index or embedding model");
        return SearchOutcome::empty();
    };

    let result = match mode {
        SearchMode::Standard => standard_search(query, embedder, index, k)
            .await
            .map(|hits| SearchOutcome {
                hits,
                hypothetical_document: None,
            }),
        SearchMode::Hyde => match context.generator.as_deref() {
            Some(generator) => hypothetical_search(query, generator, embedder, index, k).await,
            None => Err(PortError::Unavailable("no generation model".to_string())),
        },
    };

    match result {
        Ok(outcome) => {
            info!(hits = outcome.hits.len(), "Search complete");
            outcome
        }
        Err(e) => {
            warn!(error = %e, "Search failed; returning no results");
            SearchOutcome::empty()
        }
    }
}

async fn standard_search(
    query: &str,
    embedder: &dyn EmbeddingService,
    index: &dyn VectorIndex,
    k: usize,
) -> PortResult<Vec<SearchHit>> {
    let filter = airports::code_for_city_in(query).map(|code| {
        debug!(code, "Restricting search to departures from the named city");
        MetadataFilter::DeparturePort(code.to_string())
    });
    let vector = embedder.embed_query(query).await?;
    let documents = index.similarity_search(&vector, k, filter.as_ref()).await?;
    Ok(into_hits(documents))
}

async fn hypothetical_search(
    query: &str,
    generator: &dyn TextGenerationService,
    embedder: &dyn EmbeddingService,
    index: &dyn VectorIndex,
    k: usize,
) -> PortResult<SearchOutcome> {
    let document = generator.generate(&HYDE_PROMPT.replace("{query}", query)).await?;
    debug!(chars = document.len(), "Hypothetical document generated");

    let vector = embedder.embed_query(&document).await?;
    let documents = index.similarity_search(&vector, k, None).await?;
    Ok(SearchOutcome {
        hits: into_hits(documents),
        hypothetical_document: Some(document),
    })
}

fn into_hits(documents: Vec<ScoredDocument>) -> Vec<SearchHit> {
    documents
        .into_iter()
        .map(|scored| SearchHit {
            flight_id: scored.document.metadata.flight_id,
            score: scored.score,
        })
        .collect()
}

/// Cosine similarity; 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

//=========================================================================================
// Index documents
//=========================================================================================

/// Builds the searchable document for a stored flight; `None` for unusable records.
pub fn build_document(flight_id: FlightId, record: &FlightRecord) -> Option<IndexedDocument> {
    if !record.is_usable() {
        return None;
    }
    Some(IndexedDocument {
        content: describe(record),
        metadata: DocumentMetadata {
            flight_id,
            departure_port: record.departure_port.clone(),
        },
    })
}

fn describe(record: &FlightRecord) -> String {
    let field = |value: &Option<String>| value.as_deref().unwrap_or("unknown").to_string();
    let mut lines = Vec::new();

    let mut carrier = format!(
        "Flight {} {}",
        field(&record.airline),
        field(&record.flight_number)
    );
    if let Some(alternate) = &record.airline2 {
        carrier.push_str(&format!(" (also marketed as {alternate})"));
    }
    if let Some(date) = &record.origin_date_local {
        carrier.push_str(&format!(" on {date}"));
    }
    lines.push(carrier);

    lines.push(describe_port(
        "Departs from",
        &record.departure_port,
        &record.departure_country,
        &record.departure_time,
    ));
    lines.push(describe_port(
        "Arrives at",
        &record.arrival_port,
        &record.arrival_country,
        &record.arrival_time,
    ));

    if record.aircraft_type.is_some() || record.aircraft_registration.is_some() {
        let mut aircraft = format!(
            "Aircraft {} registration {}",
            field(&record.aircraft_type),
            field(&record.aircraft_registration)
        );
        if let Some(owner) = &record.aircraft_owner_airline {
            aircraft.push_str(&format!(", owned by {owner}"));
        }
        if let Some(capacity) = record.capacity {
            aircraft.push_str(&format!(", {capacity} seats"));
        }
        lines.push(aircraft);
    }

    if let Some(status) = &record.status {
        lines.push(format!("Status: {status}"));
    }
    if let Some(domain) = &record.domain {
        lines.push(format!("{domain} flight"));
    }

    lines.join(". ")
}

fn describe_port(
    verb: &str,
    code: &Option<String>,
    country: &Option<String>,
    time: &Option<String>,
) -> String {
    let code = code.as_deref().unwrap_or("unknown");
    let mut line = format!("{verb} {} ({code})", airports::display_name(code));
    if let Some(country) = country {
        line.push_str(&format!(", {country}"));
    }
    if let Some(time) = time {
        line.push_str(&format!(" at {time}"));
    }
    line
}

//=========================================================================================
// Index rebuild
//=========================================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub indexed: usize,
    pub skipped_unusable: usize,
}

/// Rebuilds the whole vector index from the store. The previous index is replaced.
#[instrument(skip_all)]
pub async fn rebuild_index(
    store: &dyn FlightStore,
    context: &ServiceContext,
) -> PortResult<IndexReport> {
    let (Some(index), Some(embedder)) = (context.index.as_deref(), context.embedder.as_deref())
    else {
        return Err(PortError::Unavailable(
            "an embedding model and a vector index are required to build the index".to_string(),
        ));
    };

    let flights = store.fetch_all().await?;
    let mut documents = Vec::with_capacity(flights.len());
    for flight in &flights {
        match build_document(flight.id, &flight.record) {
            Some(document) => documents.push(document),
            None => debug!(flight_id = flight.id, "Skipping unusable record"),
        }
    }
    let skipped_unusable = flights.len() - documents.len();

    if documents.is_empty() {
        index.clear().await?;
        warn!(skipped_unusable, "No searchable flights; index cleared");
        return Ok(IndexReport {
            indexed: 0,
            skipped_unusable,
        });
    }

    let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
    let vectors = embedder.embed_documents(&texts).await?;
    if vectors.len() != documents.len() {
        return Err(PortError::Unexpected(format!(
            "embedding model returned {} vectors for {} documents",
            vectors.len(),
            documents.len()
        )));
    }

    let indexed = index.build(documents.into_iter().zip(vectors).collect()).await?;
    info!(indexed, skipped_unusable, "Vector index rebuilt");
    Ok(IndexReport {
        indexed,
        skipped_unusable,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::{
        document, usable_record, KeywordEmbedder, MemoryIndex, MemoryStore, ScriptedGenerator,
    };

    fn auckland_sydney_index() -> Arc<MemoryIndex> {
        // The SYD document is deliberately the closer vector.
        Arc::new(MemoryIndex::with_entries(vec![
            (document(1, "AKL"), vec![0.0, 1.0, 0.0]),
            (document(2, "SYD"), vec![1.0, 0.0, 1.0]),
        ]))
    }

    fn context(index: Arc<MemoryIndex>, embedder: Arc<KeywordEmbedder>) -> ServiceContext {
        ServiceContext::default()
            .with_index(index)
            .with_embedder(embedder)
    }

    #[tokio::test]
    async fn city_in_query_is_a_hard_departure_filter() {
        let embedder = Arc::new(KeywordEmbedder::new(vec!["flights", "auckland", "from"]));
        let context = context(auckland_sydney_index(), embedder);

        let outcome = search("flights from Auckland", &context, SearchMode::Standard, 3).await;

        let ids: Vec<FlightId> = outcome.hits.iter().map(|h| h.flight_id).collect();
        assert_eq!(ids, vec![1]);
        assert!(outcome.hypothetical_document.is_none());
    }

    #[tokio::test]
    async fn query_without_city_ranks_the_whole_index() {
        let embedder = Arc::new(KeywordEmbedder::new(vec!["flights", "auckland", "from"]));
        let context = context(auckland_sydney_index(), embedder);

        let outcome = search("flights from anywhere", &context, SearchMode::Standard, 3).await;

        let ids: Vec<FlightId> = outcome.hits.iter().map(|h| h.flight_id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn top_k_limits_results_and_zero_means_one() {
        let embedder = Arc::new(KeywordEmbedder::new(vec!["flights", "auckland", "from"]));
        let context = context(auckland_sydney_index(), embedder);

        let outcome = search("flights", &context, SearchMode::Standard, 0).await;
        assert_eq!(outcome.hits.len(), 1);
    }

    #[tokio::test]
    async fn missing_or_failing_collaborators_yield_empty_results() {
        let outcome = search("flights", &ServiceContext::default(), SearchMode::Standard, 3).await;
        assert_eq!(outcome, SearchOutcome::empty());

        let context = context(auckland_sydney_index(), Arc::new(KeywordEmbedder::failing()));
        let outcome = search("flights", &context, SearchMode::Standard, 3).await;
        assert_eq!(outcome, SearchOutcome::empty());
    }

    #[tokio::test]
    async fn hyde_embeds_the_generated_document_not_the_query() {
        let embedder = Arc::new(KeywordEmbedder::new(vec!["flights", "auckland", "from"]));
        let generator = Arc::new(ScriptedGenerator::replying(vec![Ok(
            "Flight NZ 101 departs Auckland (AKL) at 09:00 and arrives Sydney".to_string(),
        )]));
        let context = context(auckland_sydney_index(), embedder.clone())
            .with_generator(generator.clone());

        let outcome = search("morning trans-tasman", &context, SearchMode::Hyde, 3).await;

        assert_eq!(
            outcome.hypothetical_document.as_deref(),
            Some("Flight NZ 101 departs Auckland (AKL) at 09:00 and arrives Sydney")
        );
        assert_eq!(outcome.hits.first().map(|h| h.flight_id), Some(1));
        assert_eq!(
            embedder.seen.lock().unwrap().as_slice(),
            ["Flight NZ 101 departs Auckland (AKL) at 09:00 and arrives Sydney"]
        );

        let prompt = &generator.prompts()[0];
        assert!(prompt.contains("\"morning trans-tasman\""));
        assert!(prompt.contains("which airport is the departure and which is the arrival"));
    }

    #[tokio::test]
    async fn hyde_generation_failure_yields_nothing() {
        let embedder = Arc::new(KeywordEmbedder::new(vec!["flights"]));
        let generator = Arc::new(ScriptedGenerator::replying(vec![Err(
            PortError::Unavailable("rate limited".into()),
        )]));
        let context = context(auckland_sydney_index(), embedder).with_generator(generator);

        let outcome = search("anything", &context, SearchMode::Hyde, 3).await;

        assert!(outcome.hits.is_empty());
        assert!(outcome.hypothetical_document.is_none());
    }

    #[tokio::test]
    async fn hyde_embedding_failure_discards_the_generated_document() {
        let generator = Arc::new(ScriptedGenerator::replying(vec![Ok("Flight QF 1".into())]));
        let context = context(auckland_sydney_index(), Arc::new(KeywordEmbedder::failing()))
            .with_generator(generator);

        let outcome = search("anything", &context, SearchMode::Hyde, 3).await;
        assert_eq!(outcome, SearchOutcome::empty());
    }

    #[tokio::test]
    async fn hyde_without_generator_is_empty() {
        let context = context(
            auckland_sydney_index(),
            Arc::new(KeywordEmbedder::new(vec!["x"])),
        );
        let outcome = search("anything", &context, SearchMode::Hyde, 3).await;
        assert_eq!(outcome, SearchOutcome::empty());
    }

    #[test]
    fn document_describes_route_with_city_names() {
        let mut record = usable_record("QFA", "123", "CNS", "LAX");
        record.aircraft_type = Some("B738".into());
        record.capacity = Some(174);

        let doc = build_document(7, &record).unwrap();

        assert!(doc.content.starts_with("Flight QFA 123 on 2024-12-09"));
        assert!(doc.content.contains("Departs from Cairns (CNS) at 08:00"));
        assert!(doc.content.contains("Arrives at LAX (LAX) at 11:00"));
        assert!(doc.content.contains("Aircraft B738 registration unknown, 174 seats"));
        assert!(doc.content.contains("Status: Planned"));
        assert_eq!(doc.metadata.flight_id, 7);
        assert_eq!(doc.metadata.departure_port.as_deref(), Some("CNS"));
    }

    #[test]
    fn unusable_records_produce_no_document() {
        let mut record = usable_record("QFA", "123", "CNS", "AKL");
        record.arrival_port = None;
        assert!(build_document(1, &record).is_none());
    }

    #[tokio::test]
    async fn rebuild_indexes_usable_records_only() {
        let store = MemoryStore::default();
        store.store(&usable_record("QFA", "1", "CNS", "AKL")).await.unwrap();
        store.store(&usable_record("NZ", "2", "AKL", "SYD")).await.unwrap();
        store.store(&FlightRecord::failed("<x/>", "Flight element not found")).await.unwrap();

        let index = Arc::new(MemoryIndex::default());
        let context = ServiceContext::default()
            .with_index(index.clone())
            .with_embedder(Arc::new(KeywordEmbedder::new(vec!["auckland", "cairns"])));

        let report = rebuild_index(&store, &context).await.unwrap();

        assert_eq!(report, IndexReport { indexed: 2, skipped_unusable: 1 });
        assert_eq!(index.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn rebuild_replaces_previous_entries_and_requires_an_embedder() {
        let store = MemoryStore::default();
        let index = auckland_sydney_index();
        let context = ServiceContext::default()
            .with_index(index.clone())
            .with_embedder(Arc::new(KeywordEmbedder::new(vec!["x"])));

        let report = rebuild_index(&store, &context).await.unwrap();
        assert_eq!(report, IndexReport::default());
        assert_eq!(index.len().await.unwrap(), 0);

        let without_embedder = ServiceContext::default().with_index(index);
        assert!(matches!(
            rebuild_index(&store, &without_embedder).await,
            Err(PortError::Unavailable(_))
        ));
    }

    #[test]
    fn cosine_handles_degenerate_vectors() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-6);
    }
}
