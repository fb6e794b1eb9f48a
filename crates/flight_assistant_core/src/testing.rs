//! Fixtures and in-memory port doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{
    AircraftTypeCount, FlightFilter, FlightId, FlightRecord, FlightRow, IndexedDocument,
    MetadataFilter, ScoredDocument, StoredFlight,
};
use crate::extractor::direct::ATOM_NAMESPACE;
use crate::ports::{
    EmbeddingService, FlightStore, PortError, PortResult, TextGenerationService, VectorIndex,
};

const FLIGHT_BODY: &str = r#"
  <Flight>
    <Service>
      <Identifier>
        <Airline>QFA</Airline>
        <Airline2>QF</Airline2>
        <FlightNumber>123</FlightNumber>
        <OriginDate>
          <Local>2024-12-09</Local>
          <UTC>2024-12-08</UTC>
        </OriginDate>
      </Identifier>
      <Domain>International</Domain>
      <Categories>
        <Tag>Passenger</Tag>
        <Tag>Scheduled</Tag>
      </Categories>
    </Service>
    <Leg>
      <Departure>
        <Port Country="AU">CNS</Port>
        <Schedule>2024-12-09T08:00:00+10:00</Schedule>
      </Departure>
      <Arrival>
        <Port Country="NZ">AKL</Port>
        <Schedule>2024-12-09T14:10:00+13:00</Schedule>
      </Arrival>
      <Status>Planned</Status>
      <Operation>
        <Aircraft>
          <Registration>VH-XZA</Registration>
          <Type>B738</Type>
          <Owner>
            <Airline>QFA</Airline>
          </Owner>
          <Configuration>
            <Cabin>
              <Physical>
                <Capacity>__CAPACITY__</Capacity>
              </Physical>
            </Cabin>
          </Configuration>
        </Aircraft>
      </Operation>
    </Leg>
  </Flight>
"#;

/// A complete ATOM document in the default namespace.
pub fn atom_flight(capacity: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<FlightMessage xmlns=\"{ATOM_NAMESPACE}\">{}</FlightMessage>",
        FLIGHT_BODY.replace("__CAPACITY__", capacity)
    )
}

/// The same document with an `atom:` prefix on every element.
pub fn prefixed_atom_flight() -> String {
    let body = FLIGHT_BODY
        .replace("__CAPACITY__", "174")
        .replace("</", "</atom:")
        .replace('<', "<atom:")
        .replace("<atom:/atom:", "</atom:");
    format!("<atom:FlightMessage xmlns:atom=\"{ATOM_NAMESPACE}\">{body}</atom:FlightMessage>")
}

pub fn strip_namespace(xml: &str) -> String {
    xml.replace(&format!(" xmlns=\"{ATOM_NAMESPACE}\""), "")
}

/// The record every complete fixture is expected to produce.
pub fn complete_record_for(xml: &str) -> FlightRecord {
    FlightRecord {
        airline: Some("QFA".into()),
        airline2: Some("QF".into()),
        flight_number: Some("123".into()),
        origin_date_local: Some("2024-12-09".into()),
        origin_date_utc: Some("2024-12-08".into()),
        domain: Some("International".into()),
        category: Some("Passenger".into()),
        departure_port: Some("CNS".into()),
        departure_country: Some("AU".into()),
        departure_time: Some("2024-12-09T08:00:00+10:00".into()),
        arrival_port: Some("AKL".into()),
        arrival_country: Some("NZ".into()),
        arrival_time: Some("2024-12-09T14:10:00+13:00".into()),
        status: Some("Planned".into()),
        aircraft_registration: Some("VH-XZA".into()),
        aircraft_type: Some("B738".into()),
        aircraft_owner_airline: Some("QFA".into()),
        capacity: Some(174),
        raw_data: xml.to_string(),
        error: None,
    }
}

pub fn usable_record(airline: &str, number: &str, dep: &str, arr: &str) -> FlightRecord {
    FlightRecord {
        airline: Some(airline.into()),
        flight_number: Some(number.into()),
        origin_date_local: Some("2024-12-09".into()),
        departure_port: Some(dep.into()),
        departure_time: Some("08:00".into()),
        arrival_port: Some(arr.into()),
        arrival_time: Some("11:00".into()),
        status: Some("Planned".into()),
        raw_data: format!("<Flight>{airline}{number}</Flight>"),
        ..Default::default()
    }
}

pub fn document(flight_id: FlightId, departure_port: &str) -> IndexedDocument {
    IndexedDocument {
        content: format!("flight {flight_id} from {departure_port}"),
        metadata: crate::domain::DocumentMetadata {
            flight_id,
            departure_port: Some(departure_port.to_string()),
        },
    }
}

//=========================================================================================
// Port doubles
//=========================================================================================

/// Replays scripted responses and records every prompt it receives.
#[derive(Default)]
pub struct ScriptedGenerator {
    pub responses: Mutex<VecDeque<PortResult<String>>>,
    pub structured: Mutex<VecDeque<PortResult<Value>>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn replying(responses: Vec<PortResult<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Default::default()
        }
    }

    pub fn with_structured(self, structured: Vec<PortResult<Value>>) -> Self {
        *self.structured.lock().unwrap() = structured.into();
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerationService for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> PortResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(PortError::Unavailable("no scripted response".into())))
    }

    async fn extract_structured(&self, _text: &str, _schema: &Value) -> PortResult<Value> {
        self.structured
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(PortError::Unsupported("no scripted object".into())))
    }
}

/// Embeds text as keyword counts so similar texts land close together.
pub struct KeywordEmbedder {
    pub keywords: Vec<&'static str>,
    pub fail: bool,
    pub seen: Mutex<Vec<String>>,
}

impl KeywordEmbedder {
    pub fn new(keywords: Vec<&'static str>) -> Self {
        Self {
            keywords,
            fail: false,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }
}

#[async_trait]
impl EmbeddingService for KeywordEmbedder {
    async fn embed_query(&self, text: &str) -> PortResult<Vec<f32>> {
        if self.fail {
            return Err(PortError::Unavailable("embedding model offline".into()));
        }
        self.seen.lock().unwrap().push(text.to_string());
        let lower = text.to_lowercase();
        Ok(self
            .keywords
            .iter()
            .map(|k| lower.matches(&k.to_lowercase()).count() as f32 + 0.01)
            .collect())
    }
}

/// Brute-force in-memory index.
#[derive(Default)]
pub struct MemoryIndex {
    pub entries: Mutex<Vec<(IndexedDocument, Vec<f32>)>>,
}

impl MemoryIndex {
    pub fn with_entries(entries: Vec<(IndexedDocument, Vec<f32>)>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn build(&self, entries: Vec<(IndexedDocument, Vec<f32>)>) -> PortResult<usize> {
        let count = entries.len();
        *self.entries.lock().unwrap() = entries;
        Ok(count)
    }

    async fn similarity_search(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> PortResult<Vec<ScoredDocument>> {
        let mut scored: Vec<ScoredDocument> = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(doc, _)| filter.map_or(true, |f| f.matches(&doc.metadata)))
            .map(|(doc, emb)| ScoredDocument {
                document: doc.clone(),
                score: crate::retrieval::cosine_similarity(vector, emb),
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }

    async fn len(&self) -> PortResult<usize> {
        Ok(self.entries.lock().unwrap().len())
    }

    async fn clear(&self) -> PortResult<()> {
        self.entries.lock().unwrap().clear();
        Ok(())
    }
}

/// Store keyed by the natural flight key, with optional failure injection.
#[derive(Default)]
pub struct MemoryStore {
    pub rows: Mutex<Vec<StoredFlight>>,
    pub reject_airline: Option<String>,
}

#[async_trait]
impl FlightStore for MemoryStore {
    async fn store(&self, record: &FlightRecord) -> PortResult<FlightId> {
        if record.airline.is_some() && record.airline == self.reject_airline {
            return Err(PortError::Unexpected("constraint failed".into()));
        }
        let mut rows = self.rows.lock().unwrap();
        // Like SQL NULLs, a key with a missing part never matches another.
        let key = record.unique_key();
        let complete = key.airline.is_some()
            && key.flight_number.is_some()
            && key.origin_date_local.is_some()
            && key.departure_port.is_some()
            && key.arrival_port.is_some();
        if let Some(existing) = rows
            .iter_mut()
            .find(|r| complete && r.record.unique_key() == key)
        {
            existing.record = record.clone();
            return Ok(existing.id);
        }
        let id = rows.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        rows.push(StoredFlight {
            id,
            record: record.clone(),
        });
        Ok(id)
    }

    async fn fetch_all_raw(&self) -> PortResult<Vec<(FlightId, String)>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .map(|r| (r.id, r.record.raw_data.clone()))
            .collect())
    }

    async fn fetch_all(&self) -> PortResult<Vec<StoredFlight>> {
        Ok(self.rows.lock().unwrap().clone())
    }

    async fn fetch_by_id(&self, id: FlightId) -> PortResult<StoredFlight> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Flight {id} not found")))
    }

    async fn fetch_projection(
        &self,
        filter: &FlightFilter,
        limit: usize,
    ) -> PortResult<Vec<FlightRow>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| filter.matches(&r.record))
            .take(limit)
            .map(|r| FlightRow::from(&r.record))
            .collect())
    }

    async fn fetch_rows_by_ids(&self, ids: &[FlightId]) -> PortResult<Vec<FlightRow>> {
        let rows = self.rows.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| rows.iter().find(|r| r.id == *id))
            .map(|r| FlightRow::from(&r.record))
            .collect())
    }

    async fn count_by_aircraft_type(&self) -> PortResult<Vec<AircraftTypeCount>> {
        let mut counts: Vec<AircraftTypeCount> = Vec::new();
        for row in self.rows.lock().unwrap().iter() {
            let aircraft_type = &row.record.aircraft_type;
            match counts.iter_mut().find(|c| &c.aircraft_type == aircraft_type) {
                Some(count) => count.flights += 1,
                None => counts.push(AircraftTypeCount {
                    aircraft_type: aircraft_type.clone(),
                    flights: 1,
                }),
            }
        }
        counts.sort_by(|a, b| b.flights.cmp(&a.flights));
        Ok(counts)
    }

    async fn count(&self) -> PortResult<usize> {
        Ok(self.rows.lock().unwrap().len())
    }

    async fn delete(&self, id: FlightId) -> PortResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| r.id != id);
        if rows.len() == before {
            return Err(PortError::NotFound(format!("Flight {id} not found")));
        }
        Ok(())
    }

    async fn clear(&self) -> PortResult<()> {
        self.rows.lock().unwrap().clear();
        Ok(())
    }
}
