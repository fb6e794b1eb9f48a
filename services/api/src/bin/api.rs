//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        openai_client, DbAdapter, OpenAiEmbeddingAdapter, OpenAiGenerationAdapter,
        SqliteVectorIndex,
    },
    config::Config,
    error::ApiError,
    web::{rest::ApiDoc, router, state::AppState},
};
use axum::http::{header::{ACCEPT, CONTENT_TYPE}, HeaderValue, Method};
use axum::Router;
use flight_assistant_core::ports::{EmbeddingService, TextGenerationService, VectorIndex};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = DbAdapter::connect(&config.database_url).await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Model Adapters ---
    let (generator, embedder) = match openai_client(&config) {
        Some(client) => {
            let generator: Arc<dyn TextGenerationService> = Arc::new(OpenAiGenerationAdapter::new(
                client.clone(),
                config.llm_model.clone(),
                config.llm_temperature,
            ));
            let embedder: Arc<dyn EmbeddingService> = Arc::new(OpenAiEmbeddingAdapter::new(
                client,
                config.embedding_model.clone(),
            ));
            info!(backend = ?config.model_backend, model = %config.llm_model, "Model adapters ready");
            (Some(generator), Some(embedder))
        }
        None => {
            warn!("OPENAI_API_KEY is not set; search and answers are disabled");
            (None, None)
        }
    };

    // --- 4. Open the Vector Index ---
    let index: Option<Arc<dyn VectorIndex>> =
        match SqliteVectorIndex::load(&config.vector_index_path).await {
            Ok(index) => {
                info!(path = %config.vector_index_path.display(), "Vector index opened");
                Some(Arc::new(index))
            }
            Err(e) => {
                warn!(error = %e, "Vector index unavailable; search is disabled");
                None
            }
        };

    // --- 5. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        db: db_adapter,
        config: config.clone(),
        generator,
        embedder,
        index,
    });

    let cors_origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS origin '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    // --- 6. Create the Web Router ---
    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(router(app_state).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
