//! crates/flight_assistant_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database, XML library or model backend.

use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// Identifier assigned to a flight record by the persistent store.
pub type FlightId = i64;

/// The canonical structured representation of one flight leg.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightRecord {
    pub airline: Option<String>,
    pub airline2: Option<String>,
    pub flight_number: Option<String>,
    pub origin_date_local: Option<String>,
    pub origin_date_utc: Option<String>,
    pub domain: Option<String>,
    pub category: Option<String>,
    pub departure_port: Option<String>,
    pub departure_country: Option<String>,
    pub departure_time: Option<String>,
    pub arrival_port: Option<String>,
    pub arrival_country: Option<String>,
    pub arrival_time: Option<String>,
    pub status: Option<String>,
    pub aircraft_registration: Option<String>,
    pub aircraft_type: Option<String>,
    pub aircraft_owner_airline: Option<String>,
    #[serde(default, deserialize_with = "lenient_capacity")]
    pub capacity: Option<i64>,
    /// The original XML text, verbatim.
    #[serde(default)]
    pub raw_data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The natural key used by the store to upsert records.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlightKey {
    pub airline: Option<String>,
    pub flight_number: Option<String>,
    pub origin_date_local: Option<String>,
    pub departure_port: Option<String>,
    pub arrival_port: Option<String>,
}

impl FlightRecord {
    /// An empty record that only carries the source document.
    pub fn from_raw(raw_data: &str) -> Self {
        Self {
            raw_data: raw_data.to_string(),
            ..Default::default()
        }
    }

    /// A record for a document whose required structure could not be located.
    pub fn failed(raw_data: &str, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::from_raw(raw_data)
        }
    }

    /// Names of the identifying fields that are still missing.
    pub fn missing_required(&self) -> Vec<&'static str> {
        [
            ("airline", &self.airline),
            ("flight_number", &self.flight_number),
            ("departure_port", &self.departure_port),
            ("arrival_port", &self.arrival_port),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| name)
        .collect()
    }

    /// A record is searchable only when all four identifying fields are present.
    pub fn is_usable(&self) -> bool {
        self.missing_required().is_empty()
    }

    pub fn unique_key(&self) -> FlightKey {
        FlightKey {
            airline: self.airline.clone(),
            flight_number: self.flight_number.clone(),
            origin_date_local: self.origin_date_local.clone(),
            departure_port: self.departure_port.clone(),
            arrival_port: self.arrival_port.clone(),
        }
    }

    /// Short human-readable label, e.g. `QFA 123 CNS→AKL`.
    pub fn label(&self) -> String {
        format!(
            "{} {} {}→{}",
            self.airline.as_deref().unwrap_or("?"),
            self.flight_number.as_deref().unwrap_or("?"),
            self.departure_port.as_deref().unwrap_or("?"),
            self.arrival_port.as_deref().unwrap_or("?"),
        )
    }
}

/// Accepts integers, integral floats and numeric strings; everything else is `None`.
fn lenient_capacity<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}

/// A flight record as held by the persistent store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredFlight {
    pub id: FlightId,
    pub record: FlightRecord,
}

/// Tabular projection of a stored flight, used for listings and answer context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlightRow {
    pub airline: Option<String>,
    pub flight_number: Option<String>,
    pub origin_date_local: Option<String>,
    pub departure_port: Option<String>,
    pub departure_time: Option<String>,
    pub arrival_port: Option<String>,
    pub arrival_time: Option<String>,
    pub status: Option<String>,
}

impl From<&FlightRecord> for FlightRow {
    fn from(record: &FlightRecord) -> Self {
        Self {
            airline: record.airline.clone(),
            flight_number: record.flight_number.clone(),
            origin_date_local: record.origin_date_local.clone(),
            departure_port: record.departure_port.clone(),
            departure_time: record.departure_time.clone(),
            arrival_port: record.arrival_port.clone(),
            arrival_time: record.arrival_time.clone(),
            status: record.status.clone(),
        }
    }
}

/// A column of the tabular projection. Names match the store's columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionField {
    Airline,
    FlightNumber,
    OriginDateLocal,
    DeparturePort,
    DepartureTime,
    ArrivalPort,
    ArrivalTime,
    Status,
}

impl ProjectionField {
    /// Every column, in display order.
    pub const ALL: [ProjectionField; 8] = [
        Self::Airline,
        Self::FlightNumber,
        Self::OriginDateLocal,
        Self::DeparturePort,
        Self::DepartureTime,
        Self::ArrivalPort,
        Self::ArrivalTime,
        Self::Status,
    ];

    pub fn column(self) -> &'static str {
        match self {
            Self::Airline => "airline",
            Self::FlightNumber => "flight_number",
            Self::OriginDateLocal => "origin_date_local",
            Self::DeparturePort => "departure_port",
            Self::DepartureTime => "departure_time",
            Self::ArrivalPort => "arrival_port",
            Self::ArrivalTime => "arrival_time",
            Self::Status => "status",
        }
    }

    pub fn value(self, row: &FlightRow) -> Option<&str> {
        let value = match self {
            Self::Airline => &row.airline,
            Self::FlightNumber => &row.flight_number,
            Self::OriginDateLocal => &row.origin_date_local,
            Self::DeparturePort => &row.departure_port,
            Self::DepartureTime => &row.departure_time,
            Self::ArrivalPort => &row.arrival_port,
            Self::ArrivalTime => &row.arrival_time,
            Self::Status => &row.status,
        };
        value.as_deref()
    }
}

impl FromStr for ProjectionField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Self::ALL
            .into_iter()
            .find(|field| field.column().eq_ignore_ascii_case(name))
            .ok_or_else(|| format!("'{name}' is not a flight column"))
    }
}

/// Exact-match filters over stored flights. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlightFilter {
    pub airline: Option<String>,
    pub departure_port: Option<String>,
    pub arrival_port: Option<String>,
    pub origin_date_local: Option<String>,
}

impl FlightFilter {
    /// The set constraints as `(column, value)` pairs.
    pub fn conditions(&self) -> Vec<(&'static str, &str)> {
        [
            ("airline", &self.airline),
            ("departure_port", &self.departure_port),
            ("arrival_port", &self.arrival_port),
            ("origin_date_local", &self.origin_date_local),
        ]
        .into_iter()
        .filter_map(|(column, value)| value.as_deref().map(|v| (column, v)))
        .collect()
    }

    pub fn matches(&self, record: &FlightRecord) -> bool {
        let wanted = |filter: &Option<String>, actual: &Option<String>| {
            filter.is_none() || filter == actual
        };
        wanted(&self.airline, &record.airline)
            && wanted(&self.departure_port, &record.departure_port)
            && wanted(&self.arrival_port, &record.arrival_port)
            && wanted(&self.origin_date_local, &record.origin_date_local)
    }
}

/// Number of stored flights per aircraft type. `None` groups records without one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AircraftTypeCount {
    pub aircraft_type: Option<String>,
    pub flights: usize,
}

/// Metadata attached to every indexed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub flight_id: FlightId,
    pub departure_port: Option<String>,
}

/// A retrievable unit derived from a usable flight record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub content: String,
    pub metadata: DocumentMetadata,
}

/// Exact-match constraint applied before similarity ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataFilter {
    DeparturePort(String),
}

impl MetadataFilter {
    pub fn matches(&self, metadata: &DocumentMetadata) -> bool {
        match self {
            MetadataFilter::DeparturePort(code) => {
                metadata.departure_port.as_deref() == Some(code.as_str())
            }
        }
    }
}

/// A document returned by the vector index with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredDocument {
    pub document: IndexedDocument,
    pub score: f32,
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub flight_id: FlightId,
    pub score: f32,
}

/// The result of a retrieval call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub hits: Vec<SearchHit>,
    /// The synthesized document used for hypothetical-document search.
    pub hypothetical_document: Option<String>,
}

impl SearchOutcome {
    pub fn empty() -> Self {
        Self::default()
    }
}
