//! crates/flight_assistant_core/src/synthesizer.rs
//!
//! Produces a natural-language answer from retrieved flight rows.

use tracing::{error, instrument, warn};

use crate::domain::FlightRow;
use crate::ports::TextGenerationService;

pub const NO_MODEL_ANSWER: &str = "Error: LLM model could not be initialized";

const ANSWER_PROMPT: &str = "Based on the following flight data, answer this question: {query}

Flight data:
{lines}

If you can't answer based on the data, say \"I don't have enough information about that.\"";

/// One line of answer context, e.g. `QFA 123 on 2024-12-09: CNS (08:00) to AKL (14:10)`.
pub fn format_row(row: &FlightRow) -> String {
    let show = |value: &Option<String>| value.as_deref().unwrap_or("None").to_string();
    format!(
        "{} {} on {}: {} ({}) to {} ({})",
        show(&row.airline),
        show(&row.flight_number),
        show(&row.origin_date_local),
        show(&row.departure_port),
        show(&row.departure_time),
        show(&row.arrival_port),
        show(&row.arrival_time),
    )
}

pub fn answer_prompt(query: &str, rows: &[FlightRow]) -> String {
    let lines = rows.iter().map(format_row).collect::<Vec<_>>().join("\n");
    ANSWER_PROMPT
        .replace("{lines}", &lines)
        .replace("{query}", query)
}

/// Answers `query` from `rows`. Failures become the answer text.
#[instrument(skip(rows, generator), fields(rows = rows.len()))]
pub async fn synthesize(
    query: &str,
    rows: &[FlightRow],
    generator: Option<&dyn TextGenerationService>,
) -> String {
    let Some(generator) = generator else {
        warn!("No generation model available to answer the question");
        return NO_MODEL_ANSWER.to_string();
    };

    match generator.generate(&answer_prompt(query, rows)).await {
        Ok(answer) => answer,
        Err(e) => {
            error!(error = %e, "Answer generation failed");
            format!("Error generating answer: {e}")
        }
    }
}
