//! crates/flight_assistant_core/src/export.rs
//!
//! CSV rendering of flight projections for download.

use crate::domain::{FlightRow, ProjectionField};

/// File name offered to clients downloading a projection.
pub const CSV_FILE_NAME: &str = "flight_query_results.csv";

/// Parses a comma-separated column list. An empty list selects every column.
pub fn parse_fields(list: &str) -> Result<Vec<ProjectionField>, String> {
    let fields = list
        .split(',')
        .filter(|name| !name.trim().is_empty())
        .map(|name| name.parse::<ProjectionField>())
        .collect::<Result<Vec<ProjectionField>, String>>()?;

    if fields.is_empty() {
        return Ok(ProjectionField::ALL.to_vec());
    }
    Ok(fields)
}

/// Renders `rows` with a header line. Missing values are empty cells.
pub fn render_csv(rows: &[FlightRow], fields: &[ProjectionField]) -> String {
    let mut out = String::new();
    push_line(&mut out, fields.iter().map(|field| field.column()));
    for row in rows {
        push_line(
            &mut out,
            fields.iter().map(|field| field.value(row).unwrap_or("")),
        );
    }
    out
}

fn push_line<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>) {
    for (i, cell) in cells.enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_cell(out, cell);
    }
    out.push('\n');
}

/// Quotes cells containing separators, quotes or line breaks.
fn push_cell(out: &mut String, cell: &str) {
    if cell.contains([',', '"', '\n', '\r']) {
        out.push('"');
        out.push_str(&cell.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(cell);
    }
}
