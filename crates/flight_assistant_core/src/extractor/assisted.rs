//! crates/flight_assistant_core/src/extractor/assisted.rs
//!
//! Model-assisted extraction: a structured request against a fixed field schema,
//! then a free-form JSON prompt when that fails.

use serde_json::{json, Map, Value};
use tracing::{info, warn};

use super::direct;
use crate::domain::FlightRecord;
use crate::ports::TextGenerationService;

/// Upper bound on the XML text embedded in the fallback prompt.
const MAX_PROMPT_XML_CHARS: usize = 10_000;

const FALLBACK_PROMPT: &str = r#"Extract structured information from this ATOM XML flight data for {summary}.

XML:
{xml}

Extract the following as a JSON object:
- airline: The airline code (e.g., QFA)
- airline2: The alternative airline code (e.g., QF)
- flight_number: The flight number
- origin_date_local: The local date of origin
- origin_date_utc: The UTC date of origin
- domain: Flight domain (e.g., Domestic, International)
- category: Flight category from the Categories/Tag element
- departure_port: Departure airport code
- departure_country: Departure country code
- departure_time: Scheduled departure time
- arrival_port: Arrival airport code
- arrival_country: Arrival country code
- arrival_time: Scheduled arrival time
- status: Flight status
- aircraft_registration: Aircraft registration number
- aircraft_type: Aircraft type code
- aircraft_owner_airline: Airline that owns the aircraft
- capacity: Aircraft capacity as an integer

Return ONLY a valid JSON object with no additional text."#;

/// The field schema sent with structured extraction requests.
pub fn extraction_schema() -> Value {
    let text = |description: &str| json!({ "type": "string", "description": description });
    json!({
        "type": "object",
        "properties": {
            "airline": text("The airline code (e.g., QFA)"),
            "airline2": text("The alternative airline code (e.g., QF)"),
            "flight_number": text("The flight number"),
            "origin_date_local": text("The local date of origin"),
            "origin_date_utc": text("The UTC date of origin"),
            "domain": text("Flight domain (e.g., Domestic, International)"),
            "category": text("Flight category from the Categories/Tag element"),
            "departure_port": text("Departure airport code"),
            "departure_country": text("Departure country code"),
            "departure_time": text("Scheduled departure time"),
            "arrival_port": text("Arrival airport code"),
            "arrival_country": text("Arrival country code"),
            "arrival_time": text("Scheduled arrival time"),
            "status": text("Flight status (e.g., Planned)"),
            "aircraft_registration": text("Aircraft registration number"),
            "aircraft_type": text("Aircraft type code"),
            "aircraft_owner_airline": text("Airline that owns the aircraft"),
            "capacity": { "type": "integer", "description": "Aircraft capacity" }
        },
        "required": ["airline", "flight_number", "departure_port", "arrival_port"]
    })
}

pub(crate) async fn extract_assisted(
    xml: &str,
    generator: &dyn TextGenerationService,
) -> FlightRecord {
    let simplified = xml.split_whitespace().collect::<Vec<_>>().join(" ");

    match generator.extract_structured(&simplified, &extraction_schema()).await {
        Ok(value) => match record_from_value(value, xml) {
            Ok(record) => return record,
            Err(e) => warn!(error = %e, "Structured extraction returned an unusable object"),
        },
        Err(e) => warn!(error = %e, "Structured extraction failed"),
    }

    info!("Falling back to prompt-based extraction");
    prompt_extraction(generator, &simplified, xml).await
}

async fn prompt_extraction(
    generator: &dyn TextGenerationService,
    simplified: &str,
    xml: &str,
) -> FlightRecord {
    let truncated: String = simplified.chars().take(MAX_PROMPT_XML_CHARS).collect();
    let prompt = FALLBACK_PROMPT
        .replace("{summary}", &direct::summary_or_placeholder(xml))
        .replace("{xml}", &truncated);

    let content = match generator.generate(&prompt).await {
        Ok(content) => content,
        Err(e) => {
            warn!(error = %e, "Prompt-based extraction failed");
            return FlightRecord::failed(xml, "Extraction failed");
        }
    };

    let Some(object) = json_object_span(&content) else {
        return FlightRecord::failed(xml, "Could not extract data");
    };

    match serde_json::from_str::<Value>(object).and_then(|v| record_from_value(v, xml)) {
        Ok(record) => record,
        Err(e) => {
            warn!(error = %e, "Model response was not a valid flight object");
            FlightRecord::failed(xml, "Extraction failed")
        }
    }
}

/// The substring from the first `{` through the last `}`.
fn json_object_span(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

fn record_from_value(value: Value, xml: &str) -> Result<FlightRecord, serde_json::Error> {
    let value = match value {
        Value::Array(items) => items.into_iter().next().unwrap_or(Value::Null),
        other => other,
    };
    let value = match value {
        Value::Object(fields) => Value::Object(stringify_scalars(fields)),
        other => other,
    };

    let mut record: FlightRecord = serde_json::from_value(value)?;
    record.raw_data = xml.to_string();
    Ok(record)
}

/// Models often answer `"flight_number": 123`; text fields accept that as a string.
fn stringify_scalars(fields: Map<String, Value>) -> Map<String, Value> {
    fields
        .into_iter()
        .map(|(key, value)| match value {
            Value::Number(n) if key != "capacity" => (key, Value::String(n.to_string())),
            Value::Bool(b) => (key, Value::String(b.to_string())),
            other => (key, other),
        })
        .collect()
}
