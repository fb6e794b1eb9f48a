pub mod rest;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub use rest::{
    aircraft_type_stats_handler, clear_flights_handler, get_flight_handler, health_handler,
    list_flights_handler, rebuild_index_handler, reprocess_flights_handler, search_handler,
    upload_flights_handler,
};
use state::AppState;

/// Upload size limit for a whole multipart request.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Builds the API router. CORS and Swagger UI are layered on by the binary.
pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/flights",
            post(upload_flights_handler)
                .get(list_flights_handler)
                .delete(clear_flights_handler),
        )
        .route("/flights/reprocess", post(reprocess_flights_handler))
        .route("/flights/stats/aircraft-types", get(aircraft_type_stats_handler))
        .route("/flights/{id}", get(get_flight_handler))
        .route("/index/rebuild", post(rebuild_index_handler))
        .route("/search", post(search_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(app_state)
}
