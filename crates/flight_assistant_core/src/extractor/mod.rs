//! crates/flight_assistant_core/src/extractor/mod.rs
//!
//! Turns one ATOM XML document into a `FlightRecord`.

pub mod assisted;
pub mod direct;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::context::ServiceContext;
use crate::domain::FlightRecord;

/// How structured fields are pulled out of the XML.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// Deterministic tree walk; no model call.
    #[default]
    Direct,
    /// Delegates to the text-generation model.
    Assisted,
}

impl FromStr for ExtractionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "assisted" | "llm" => Ok(Self::Assisted),
            other => Err(format!("'{other}' is not an extraction mode (direct|assisted)")),
        }
    }
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => f.write_str("direct"),
            Self::Assisted => f.write_str("assisted"),
        }
    }
}

/// Extracts one flight record. Never fails; `raw_data` always equals `xml`.
#[instrument(skip_all, fields(mode = %mode, bytes = xml.len()))]
pub async fn extract(xml: &str, mode: ExtractionMode, context: &ServiceContext) -> FlightRecord {
    match (mode, context.generator.as_deref()) {
        (ExtractionMode::Direct, _) => direct::extract_direct(xml),
        (ExtractionMode::Assisted, Some(generator)) => {
            assisted::extract_assisted(xml, generator).await
        }
        (ExtractionMode::Assisted, None) => {
            warn!("Assisted extraction requested without a generation model; using direct extraction");
            direct::extract_direct(xml)
        }
    }
}
