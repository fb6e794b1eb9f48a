//! Shared helpers for the api integration tests.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use api_lib::adapters::{DbAdapter, SqliteVectorIndex};
use api_lib::config::Config;
use api_lib::web::state::AppState;
use async_trait::async_trait;
use flight_assistant_core::ports::{EmbeddingService, PortError, PortResult, TextGenerationService};
use tempfile::TempDir;

pub const ATOM_NAMESPACE: &str = "urn://valence.aero/schemas/airtransport/ATOM/300";

/// A minimal but complete ATOM flight message.
pub fn atom_flight(airline: &str, number: &str, departure: &str, arrival: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<FlightMessage xmlns="{ATOM_NAMESPACE}">
  <Flight>
    <Service>
      <Identifier>
        <Airline>{airline}</Airline>
        <FlightNumber>{number}</FlightNumber>
        <OriginDate><Local>2024-12-09</Local><UTC>2024-12-08</UTC></OriginDate>
      </Identifier>
      <Domain>International</Domain>
    </Service>
    <Leg>
      <Departure><Port Country="AU">{departure}</Port><Schedule>2024-12-09T08:00:00+10:00</Schedule></Departure>
      <Arrival><Port Country="NZ">{arrival}</Port><Schedule>2024-12-09T14:10:00+13:00</Schedule></Arrival>
      <Status>Planned</Status>
    </Leg>
  </Flight>
</FlightMessage>"#
    )
}

/// A migrated SQLite database in a temporary directory.
pub struct TestDb {
    pub dir: TempDir,
    pub adapter: DbAdapter,
}

impl TestDb {
    pub fn index_path(&self) -> PathBuf {
        self.dir.path().join("vector").join("flights.db")
    }
}

pub async fn test_db() -> TestDb {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("flights.db").display());
    let pool = DbAdapter::connect(&url).await.expect("connect");
    let adapter = DbAdapter::new(pool);
    adapter.run_migrations().await.expect("migrations");
    TestDb { dir, adapter }
}

pub fn test_config() -> Config {
    Config::from_lookup(|_| None).expect("default config")
}

/// Full application state over temporary storage with scripted models.
pub async fn test_state(
    db: &TestDb,
    generator: Option<Arc<dyn TextGenerationService>>,
    embedder: Option<Arc<dyn EmbeddingService>>,
) -> AppState {
    let index = SqliteVectorIndex::load(&db.index_path()).await.expect("index");
    AppState {
        db: Arc::new(db.adapter.clone()),
        config: Arc::new(test_config()),
        generator,
        embedder,
        index: Some(Arc::new(index)),
    }
}

/// Embeds text as counts of known airport codes and city names.
pub struct CityEmbedder;

const TERMS: [&str; 6] = ["cns", "cairns", "akl", "auckland", "syd", "sydney"];

#[async_trait]
impl EmbeddingService for CityEmbedder {
    async fn embed_query(&self, text: &str) -> PortResult<Vec<f32>> {
        let lower = text.to_lowercase();
        Ok(TERMS
            .iter()
            .map(|term| lower.matches(term).count() as f32 + 0.01)
            .collect())
    }
}

/// Answers every prompt with a fixed reply and remembers the prompts.
pub struct FixedGenerator {
    pub reply: Option<String>,
    pub prompts: Mutex<Vec<String>>,
}

impl FixedGenerator {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TextGenerationService for FixedGenerator {
    async fn generate(&self, prompt: &str) -> PortResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply
            .clone()
            .ok_or_else(|| PortError::Unavailable("model offline".to_string()))
    }
}
