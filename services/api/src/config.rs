//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use flight_assistant_core::retrieval::DEFAULT_TOP_K;
use flight_assistant_core::ExtractionMode;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which family of model server the generation and embedding clients talk to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelBackend {
    /// The hosted OpenAI API. Requires `OPENAI_API_KEY`.
    OpenAi,
    /// A local OpenAI-compatible server (llama.cpp, Ollama). No key needed.
    Local,
}

impl ModelBackend {
    fn default_api_base(self) -> Option<&'static str> {
        match self {
            Self::OpenAi => None,
            Self::Local => Some("http://localhost:11434/v1"),
        }
    }

    /// Each backend keeps its own index, since their embeddings are not comparable.
    fn default_index_path(self) -> &'static str {
        match self {
            Self::OpenAi => "database/vector/flight_vectors_openai.db",
            Self::Local => "database/vector/flight_vectors_llama.db",
        }
    }
}

impl FromStr for ModelBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "local" | "llama" => Ok(Self::Local),
            other => Err(format!("'{other}' is not a model backend (openai|local)")),
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub model_backend: ModelBackend,
    pub openai_api_key: Option<String>,
    pub llm_api_base: Option<String>,
    pub llm_model: String,
    pub llm_temperature: f32,
    pub embedding_model: String,
    pub vector_index_path: PathBuf,
    pub search_top_k: usize,
    pub extraction_mode: ExtractionMode,
    pub cors_origin: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let or_default = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        // --- Load Server and Database Settings ---
        let bind_address = parse_var("BIND_ADDRESS", or_default("BIND_ADDRESS", "0.0.0.0:3000"))?;
        let database_url = or_default("DATABASE_URL", "sqlite://flight_data.db");

        let log_level_str = or_default("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Model Settings ---
        let model_backend: ModelBackend =
            parse_var("MODEL_BACKEND", or_default("MODEL_BACKEND", "openai"))?;
        let openai_api_key = var("OPENAI_API_KEY").filter(|key| !key.trim().is_empty());
        let llm_api_base = var("LLM_API_BASE")
            .or_else(|| model_backend.default_api_base().map(str::to_string));
        let llm_model = or_default("LLM_MODEL", "gpt-3.5-turbo");
        let llm_temperature = parse_var("LLM_TEMPERATURE", or_default("LLM_TEMPERATURE", "0"))?;
        let embedding_model = or_default("EMBEDDING_MODEL", "text-embedding-3-small");

        // --- Load Retrieval and Ingestion Settings ---
        let vector_index_path = PathBuf::from(or_default(
            "VECTOR_INDEX_PATH",
            model_backend.default_index_path(),
        ));
        let search_top_k = parse_var(
            "SEARCH_TOP_K",
            or_default("SEARCH_TOP_K", &DEFAULT_TOP_K.to_string()),
        )?;
        let extraction_mode = parse_var("EXTRACTION_MODE", or_default("EXTRACTION_MODE", "direct"))?;

        let cors_origin = or_default("CORS_ORIGIN", "http://localhost:3000");

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            model_backend,
            openai_api_key,
            llm_api_base,
            llm_model,
            llm_temperature,
            embedding_model,
            vector_index_path,
            search_top_k,
            extraction_mode,
            cors_origin,
        })
    }

    /// Whether model clients can be built. The hosted backend needs a key.
    pub fn models_enabled(&self) -> bool {
        match self.model_backend {
            ModelBackend::OpenAi => self.openai_api_key.is_some(),
            ModelBackend::Local => true,
        }
    }
}

fn parse_var<T>(key: &str, raw: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string()))
}
