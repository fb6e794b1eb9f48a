//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::AppState;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use flight_assistant_core::{
    domain::{AircraftTypeCount, FlightFilter, FlightId, FlightRecord, FlightRow},
    export::{parse_fields, render_csv, CSV_FILE_NAME},
    extractor::{direct::SUMMARY_PLACEHOLDER, ExtractionMode},
    ingest::{ingest_batch, reprocess_stored, IngestDocument, IngestOutcome, IngestReport},
    ports::PortError,
    retrieval::{rebuild_index, search, IndexReport, SearchMode},
    synthesizer::synthesize,
    ServiceContext,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

const DEFAULT_LIST_LIMIT: usize = 10;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        upload_flights_handler,
        list_flights_handler,
        aircraft_type_stats_handler,
        get_flight_handler,
        clear_flights_handler,
        reprocess_flights_handler,
        rebuild_index_handler,
        search_handler,
        health_handler,
    ),
    components(
        schemas(
            UploadResponse,
            DocumentOutcome,
            IndexResponse,
            FlightListResponse,
            AircraftTypeCountView,
            FlightDetailResponse,
            SearchRequest,
            SearchResponse,
            SearchHitView,
            HealthResponse,
        )
    ),
    tags(
        (name = "Flight Assistant API", description = "Ingest ATOM flight messages and ask questions about them.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ExtractionParams {
    /// `direct` or `assisted`. Defaults to the configured mode.
    #[param(value_type = Option<String>)]
    pub mode: Option<ExtractionMode>,
}

/// Representation of a flight listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListFormat {
    #[default]
    Json,
    Csv,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// Maximum number of flights (default 10 for JSON, unlimited for CSV).
    pub limit: Option<usize>,
    /// Exact airline code, e.g. `QFA`.
    pub airline: Option<String>,
    /// Exact departure airport code, e.g. `DUD`.
    pub departure_port: Option<String>,
    /// Exact arrival airport code, e.g. `AKL`.
    pub arrival_port: Option<String>,
    /// Local origin date, e.g. `2024-12-09`.
    pub date: Option<String>,
    /// `json` (default) or `csv`.
    #[param(value_type = Option<String>)]
    pub format: Option<ListFormat>,
    /// Comma-separated CSV columns. Defaults to every column.
    pub fields: Option<String>,
}

impl ListParams {
    pub fn filter(&self) -> FlightFilter {
        let given = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        FlightFilter {
            airline: given(&self.airline),
            departure_port: given(&self.departure_port),
            arrival_port: given(&self.arrival_port),
            origin_date_local: given(&self.date),
        }
    }
}

/// Per-document result of an upload.
#[derive(Debug, Serialize, ToSchema)]
pub struct DocumentOutcome {
    pub source: String,
    pub stored: bool,
    pub flight_id: Option<FlightId>,
    pub summary: String,
    pub error: Option<String>,
}

impl From<IngestOutcome> for DocumentOutcome {
    fn from(outcome: IngestOutcome) -> Self {
        Self {
            source: outcome.source,
            stored: outcome.stored,
            flight_id: outcome.flight_id,
            summary: outcome.summary,
            error: outcome.error,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IndexResponse {
    pub indexed: usize,
    pub skipped_unusable: usize,
}

impl From<IndexReport> for IndexResponse {
    fn from(report: IndexReport) -> Self {
        Self {
            indexed: report.indexed,
            skipped_unusable: report.skipped_unusable,
        }
    }
}

/// The response payload sent after ingesting a batch of documents.
#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    pub batch_id: Uuid,
    pub stored_count: usize,
    pub documents: Vec<DocumentOutcome>,
    /// Present when the index was rebuilt after storing.
    pub index: Option<IndexResponse>,
    /// Why the index could not be rebuilt, if it was attempted and failed.
    pub index_error: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FlightListResponse {
    pub total: usize,
    #[schema(value_type = Vec<Object>)]
    pub flights: Vec<FlightRow>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AircraftTypeCountView {
    /// `None` groups flights without a recorded aircraft type.
    pub aircraft_type: Option<String>,
    pub flights: usize,
}

impl From<AircraftTypeCount> for AircraftTypeCountView {
    fn from(count: AircraftTypeCount) -> Self {
        Self {
            aircraft_type: count.aircraft_type,
            flights: count.flights,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FlightDetailResponse {
    pub id: FlightId,
    #[schema(value_type = Object)]
    pub record: FlightRecord,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SearchRequest {
    pub query: String,
    /// `standard` (default) or `hyde`.
    #[serde(default)]
    #[schema(value_type = String, example = "standard")]
    pub method: SearchMode,
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SearchHitView {
    pub flight_id: FlightId,
    pub score: f32,
    /// `None` when the index refers to a flight that has since been removed.
    #[schema(value_type = Option<Object>)]
    pub flight: Option<FlightRecord>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResponse {
    pub hits: Vec<SearchHitView>,
    pub hypothetical_document: Option<String>,
    pub answer: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub flights: usize,
    pub indexed_documents: Option<usize>,
    pub index_built_at: Option<DateTime<Utc>>,
    pub generator: bool,
    pub embedder: bool,
}

//=========================================================================================
// Shared Operations
//=========================================================================================

/// Maps a port failure to an HTTP error and logs the detail.
fn port_failure(action: &str, e: PortError) -> (StatusCode, String) {
    error!("Failed to {}: {:?}", action, e);
    match e {
        PortError::NotFound(message) => (StatusCode::NOT_FOUND, message),
        PortError::Unavailable(message) => (StatusCode::SERVICE_UNAVAILABLE, message),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to {}", action),
        ),
    }
}

fn upload_response(
    report: IngestReport,
    index: Option<Result<IndexReport, PortError>>,
) -> UploadResponse {
    let (index, index_error) = match index {
        Some(Ok(index_report)) => (Some(IndexResponse::from(index_report)), None),
        Some(Err(e)) => (None, Some(e.to_string())),
        None => (None, None),
    };
    UploadResponse {
        batch_id: report.batch_id,
        stored_count: report.stored_count,
        documents: report.outcomes.into_iter().map(Into::into).collect(),
        index,
        index_error,
    }
}

async fn refresh_index_after(
    app_state: &AppState,
    context: &ServiceContext,
    report: &IngestReport,
) -> Option<Result<IndexReport, PortError>> {
    if report.stored_count == 0 {
        return None;
    }
    let result = rebuild_index(app_state.db.as_ref(), context).await;
    if let Err(e) = &result {
        warn!(batch_id = %report.batch_id, error = %e, "Stored flights could not be indexed");
    }
    Some(result)
}

/// Ingests `documents` and rebuilds the index when anything was stored.
pub async fn ingest_and_index(
    app_state: &AppState,
    documents: Vec<IngestDocument>,
    mode: ExtractionMode,
) -> UploadResponse {
    let context = app_state.context();
    let report = ingest_batch(documents, mode, &context, app_state.db.as_ref()).await;
    let index = refresh_index_after(app_state, &context, &report).await;
    upload_response(report, index)
}

/// One file part of an upload, as received.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub source: String,
    pub bytes: Vec<u8>,
}

/// Decodes each upload, then ingests and indexes every readable one.
///
/// A file that is not UTF-8 text gets a failed outcome in its position; the
/// rest of the batch is still ingested.
pub async fn ingest_uploads(
    app_state: &AppState,
    uploads: Vec<UploadedFile>,
    mode: ExtractionMode,
) -> UploadResponse {
    let mut documents = Vec::with_capacity(uploads.len());
    let mut rejected = Vec::with_capacity(uploads.len());
    for upload in uploads {
        match String::from_utf8(upload.bytes) {
            Ok(xml) => {
                rejected.push(None);
                documents.push(IngestDocument {
                    source: upload.source,
                    xml,
                });
            }
            Err(e) => {
                warn!(source = %upload.source, error = %e, "Upload is not valid UTF-8 text");
                rejected.push(Some(DocumentOutcome {
                    source: upload.source,
                    stored: false,
                    flight_id: None,
                    summary: SUMMARY_PLACEHOLDER.to_string(),
                    error: Some(format!("Document is not valid UTF-8 text: {}", e)),
                }));
            }
        }
    }

    let mut response = ingest_and_index(app_state, documents, mode).await;
    let mut ingested = std::mem::take(&mut response.documents).into_iter();
    response.documents = rejected
        .into_iter()
        .filter_map(|slot| slot.or_else(|| ingested.next()))
        .collect();
    response
}

/// Retrieves matching flights and answers the question from them.
pub async fn run_search(
    app_state: &AppState,
    request: &SearchRequest,
) -> Result<SearchResponse, PortError> {
    let context = app_state.context();
    let top_k = request.top_k.unwrap_or(app_state.config.search_top_k);
    let outcome = search(&request.query, &context, request.method, top_k).await;

    let ids: Vec<FlightId> = outcome.hits.iter().map(|hit| hit.flight_id).collect();
    let mut hits = Vec::with_capacity(outcome.hits.len());
    for hit in outcome.hits {
        let flight = match app_state.db.fetch_by_id(hit.flight_id).await {
            Ok(stored) => Some(stored.record),
            Err(PortError::NotFound(_)) => {
                warn!(flight_id = hit.flight_id, "Index refers to a flight that is no longer stored");
                None
            }
            Err(e) => return Err(e),
        };
        hits.push(SearchHitView {
            flight_id: hit.flight_id,
            score: hit.score,
            flight,
        });
    }

    let rows = app_state.db.fetch_rows_by_ids(&ids).await?;
    let answer = synthesize(&request.query, &rows, app_state.generator.as_deref()).await;

    Ok(SearchResponse {
        hits,
        hypothetical_document: outcome.hypothetical_document,
        answer,
    })
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Upload one or more ATOM XML documents.
///
/// Every file part of the multipart form is extracted and stored. When at least
/// one record is stored the vector index is rebuilt.
#[utoipa::path(
    post,
    path = "/flights",
    request_body(content_type = "multipart/form-data", description = "One or more ATOM XML files."),
    params(ExtractionParams),
    responses(
        (status = 201, description = "Documents processed", body = UploadResponse),
        (status = 400, description = "Bad request (e.g., no file or unreadable multipart data)"),
    )
)]
pub async fn upload_flights_handler(
    State(app_state): State<Arc<AppState>>,
    Query(params): Query<ExtractionParams>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut uploads = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Failed to read multipart data: {}", e),
        )
    })? {
        let source = field
            .file_name()
            .or_else(|| field.name())
            .unwrap_or("upload.xml")
            .to_string();
        let data = field.bytes().await.map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                format!("Failed to read file bytes: {}", e),
            )
        })?;
        uploads.push(UploadedFile {
            source,
            bytes: data.to_vec(),
        });
    }

    if uploads.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Multipart form must include at least one file".to_string(),
        ));
    }

    let mode = params.mode.unwrap_or(app_state.config.extraction_mode);
    info!(documents = uploads.len(), %mode, "Processing upload");
    let response = ingest_uploads(&app_state, uploads, mode).await;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Count stored flights and list those matching the filters, as JSON or CSV.
#[utoipa::path(
    get,
    path = "/flights",
    params(ListParams),
    responses(
        (status = 200, description = "Matching flights, or a CSV download when `format=csv`",
            content((FlightListResponse = "application/json"), (String = "text/csv"))),
        (status = 400, description = "Unknown CSV column"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_flights_handler(
    State(app_state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Response, (StatusCode, String)> {
    let format = params.format.unwrap_or_default();
    let limit = params.limit.unwrap_or(match format {
        ListFormat::Json => DEFAULT_LIST_LIMIT,
        ListFormat::Csv => usize::MAX,
    });
    let fields = parse_fields(params.fields.as_deref().unwrap_or(""))
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;

    let flights = app_state
        .db
        .fetch_projection(&params.filter(), limit)
        .await
        .map_err(|e| port_failure("list flights", e))?;

    if format == ListFormat::Csv {
        let disposition = format!("attachment; filename=\"{}\"", CSV_FILE_NAME);
        return Ok((
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            render_csv(&flights, &fields),
        )
            .into_response());
    }

    let total = app_state
        .db
        .count()
        .await
        .map_err(|e| port_failure("count flights", e))?;
    Ok(Json(FlightListResponse { total, flights }).into_response())
}

/// Count stored flights per aircraft type.
#[utoipa::path(
    get,
    path = "/flights/stats/aircraft-types",
    responses(
        (status = 200, description = "Flight counts, largest first", body = Vec<AircraftTypeCountView>),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn aircraft_type_stats_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let counts = app_state
        .db
        .count_by_aircraft_type()
        .await
        .map_err(|e| port_failure("count flights by aircraft type", e))?;
    let counts: Vec<AircraftTypeCountView> = counts.into_iter().map(Into::into).collect();
    Ok(Json(counts))
}

/// Fetch one stored flight, including its source XML.
#[utoipa::path(
    get,
    path = "/flights/{id}",
    params(("id" = i64, Path, description = "Store identifier of the flight.")),
    responses(
        (status = 200, description = "The stored flight", body = FlightDetailResponse),
        (status = 404, description = "No flight with this identifier")
    )
)]
pub async fn get_flight_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<FlightId>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let stored = app_state
        .db
        .fetch_by_id(id)
        .await
        .map_err(|e| port_failure("fetch flight", e))?;

    Ok(Json(FlightDetailResponse {
        id: stored.id,
        record: stored.record,
    }))
}

/// Delete every stored flight and empty the vector index.
#[utoipa::path(
    delete,
    path = "/flights",
    responses(
        (status = 204, description = "Store and index cleared"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn clear_flights_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    app_state
        .db
        .clear()
        .await
        .map_err(|e| port_failure("clear flights", e))?;
    if let Some(index) = &app_state.index {
        index
            .clear()
            .await
            .map_err(|e| port_failure("clear the vector index", e))?;
    }
    info!("Flight store and index cleared");
    Ok(StatusCode::NO_CONTENT)
}

/// Re-extract every stored document, e.g. after switching extraction modes.
#[utoipa::path(
    post,
    path = "/flights/reprocess",
    params(ExtractionParams),
    responses(
        (status = 200, description = "Documents re-extracted", body = UploadResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn reprocess_flights_handler(
    State(app_state): State<Arc<AppState>>,
    Query(params): Query<ExtractionParams>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mode = params.mode.unwrap_or(app_state.config.extraction_mode);
    let context = app_state.context();
    let report = reprocess_stored(mode, &context, app_state.db.as_ref())
        .await
        .map_err(|e| port_failure("read stored documents", e))?;
    let index = refresh_index_after(&app_state, &context, &report).await;
    Ok(Json(upload_response(report, index)))
}

/// Rebuild the vector index from every usable stored flight.
#[utoipa::path(
    post,
    path = "/index/rebuild",
    responses(
        (status = 200, description = "Index rebuilt", body = IndexResponse),
        (status = 503, description = "No embedding model or index configured")
    )
)]
pub async fn rebuild_index_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let report = rebuild_index(app_state.db.as_ref(), &app_state.context())
        .await
        .map_err(|e| port_failure("rebuild the index", e))?;
    Ok(Json(IndexResponse::from(report)))
}

/// Search stored flights and answer the question from the best matches.
#[utoipa::path(
    post,
    path = "/search",
    request_body = SearchRequest,
    responses(
        (status = 200, description = "Matches and a synthesized answer", body = SearchResponse),
        (status = 400, description = "Empty query"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn search_handler(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if request.query.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Query must not be empty".to_string()));
    }
    let response = run_search(&app_state, &request)
        .await
        .map_err(|e| port_failure("load search results", e))?;
    Ok(Json(response))
}

/// Liveness plus store and index counts.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let flights = app_state
        .db
        .count()
        .await
        .map_err(|e| port_failure("count flights", e))?;
    let (indexed_documents, index_built_at) = match &app_state.index {
        Some(index) => (
            index.len().await.ok(),
            index.built_at().await.ok().flatten(),
        ),
        None => (None, None),
    };

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        flights,
        indexed_documents,
        index_built_at,
        generator: app_state.generator.is_some(),
        embedder: app_state.embedder.is_some(),
    }))
}
