//! crates/flight_assistant_core/src/extractor/direct.rs
//!
//! Deterministic extraction by walking the ATOM XML tree.
//!
//! The chain is: namespace-qualified child paths, then a namespace-blind pass
//! with descendant lookups, then a degraded summary record. A document that
//! parses but lacks required fields is a soft failure and only triggers the
//! second pass; a document that cannot be parsed at all is a hard failure and
//! ends in the degraded record.

use roxmltree::{Document, Node, ParsingOptions};
use tracing::{debug, warn};

use crate::domain::FlightRecord;

pub const ATOM_NAMESPACE: &str = "urn://valence.aero/schemas/airtransport/ATOM/300";

/// Summary used when not even the identifier block can be recovered.
pub const SUMMARY_PLACEHOLDER: &str = "ATOM XML Flight Data";

/// How element names are matched while walking a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookup {
    /// `./atom:A/atom:B`: direct children in the ATOM namespace.
    Qualified,
    /// `.//A/B`: first hop anywhere below, later hops among children, any namespace.
    Unqualified,
}

impl Lookup {
    fn matches(self, node: &Node, name: &str) -> bool {
        if !node.is_element() || node.tag_name().name() != name {
            return false;
        }
        match self {
            Lookup::Qualified => node.tag_name().namespace() == Some(ATOM_NAMESPACE),
            Lookup::Unqualified => true,
        }
    }

    fn find_flight<'a, 'input>(self, doc: &'a Document<'input>) -> Option<Node<'a, 'input>> {
        doc.descendants().find(|n| self.matches(n, "Flight"))
    }

    /// Resolves a slash-separated path below `node`.
    fn find<'a, 'input>(self, node: Node<'a, 'input>, path: &str) -> Option<Node<'a, 'input>> {
        let mut steps = path.split('/');
        let first = steps.next()?;
        let mut current = match self {
            Lookup::Qualified => node.children().find(|n| self.matches(n, first)),
            Lookup::Unqualified => node.descendants().skip(1).find(|n| self.matches(n, first)),
        }?;
        for step in steps {
            current = current.children().find(|n| self.matches(n, step))?;
        }
        Some(current)
    }

    fn text(self, node: Node, path: &str) -> Option<String> {
        self.find(node, path).and_then(|n| n.text()).map(str::to_string)
    }
}

/// Extracts a flight record without any model call. Never fails.
pub fn extract_direct(xml: &str) -> FlightRecord {
    match extract_qualified(xml) {
        Some(record) if record.is_usable() => return record,
        Some(record) => debug!(
            missing = ?record.missing_required(),
            "Namespaced pass is missing required fields; retrying without namespaces"
        ),
        None => debug!("Namespaced pass found no ATOM Flight element; retrying without namespaces"),
    }

    match extract_unqualified(xml) {
        Ok(record) => record,
        Err(e) => {
            warn!(error = %e, "Flight document could not be parsed; building degraded record");
            degraded_record(xml)
        }
    }
}

/// Parses `xml`, accepting a DOCTYPE declaration as producers sometimes emit one.
fn parse_document(xml: &str) -> Result<Document<'_>, roxmltree::Error> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    Document::parse_with_options(xml, options)
}

/// `None` when the document does not parse or has no qualified `Flight`.
fn extract_qualified(xml: &str) -> Option<FlightRecord> {
    let doc = parse_document(xml).ok()?;
    let flight = Lookup::Qualified.find_flight(&doc)?;
    Some(read_flight(flight, Lookup::Qualified, xml))
}

/// `Err` only on a hard parse failure; a missing `Flight` is an error record.
fn extract_unqualified(xml: &str) -> Result<FlightRecord, roxmltree::Error> {
    let doc = parse_document(xml)?;
    let Some(flight) = Lookup::Unqualified.find_flight(&doc) else {
        return Ok(FlightRecord::failed(xml, "Flight element not found"));
    };
    Ok(read_flight(flight, Lookup::Unqualified, xml))
}

fn read_flight(flight: Node, lookup: Lookup, xml: &str) -> FlightRecord {
    let mut record = FlightRecord::from_raw(xml);

    if let Some(service) = lookup.find(flight, "Service") {
        if let Some(identifier) = lookup.find(service, "Identifier") {
            record.airline = lookup.text(identifier, "Airline");
            record.airline2 = lookup.text(identifier, "Airline2");
            record.flight_number = lookup.text(identifier, "FlightNumber");

            if let Some(origin_date) = lookup.find(identifier, "OriginDate") {
                record.origin_date_local = lookup.text(origin_date, "Local");
                record.origin_date_utc = lookup.text(origin_date, "UTC");
            }
        }
        record.domain = lookup.text(service, "Domain");
        record.category = lookup.text(service, "Categories/Tag");
    }

    let Some(leg) = lookup.find(flight, "Leg") else {
        return record;
    };

    if let Some(departure) = lookup.find(leg, "Departure") {
        if let Some(port) = lookup.find(departure, "Port") {
            record.departure_port = port.text().map(str::to_string);
            record.departure_country = port.attribute("Country").map(str::to_string);
        }
        record.departure_time = lookup.text(departure, "Schedule");
    }

    if let Some(arrival) = lookup.find(leg, "Arrival") {
        if let Some(port) = lookup.find(arrival, "Port") {
            record.arrival_port = port.text().map(str::to_string);
            record.arrival_country = port.attribute("Country").map(str::to_string);
        }
        record.arrival_time = lookup.text(arrival, "Schedule");
    }

    record.status = lookup.text(leg, "Status");

    if let Some(aircraft) = lookup.find(leg, "Operation").and_then(|op| lookup.find(op, "Aircraft")) {
        record.aircraft_registration = lookup.text(aircraft, "Registration");
        record.aircraft_type = lookup.text(aircraft, "Type");
        record.aircraft_owner_airline = lookup
            .find(aircraft, "Owner")
            .and_then(|owner| lookup.text(owner, "Airline"));
        record.capacity = lookup
            .find(aircraft, "Configuration/Cabin/Physical")
            .and_then(|physical| lookup.text(physical, "Capacity"))
            .and_then(|text| parse_capacity(&text));
    }

    record
}

fn parse_capacity(text: &str) -> Option<i64> {
    text.trim().parse().ok()
}

/// One-line description recovered from the identifier block, if reachable.
pub fn flight_summary(xml: &str) -> Option<String> {
    let lookup = Lookup::Unqualified;
    let doc = parse_document(xml).ok()?;
    let flight = lookup.find_flight(&doc)?;
    let identifier = lookup
        .find(flight, "Service")
        .and_then(|service| lookup.find(service, "Identifier"))?;

    let airline = lookup.text(identifier, "Airline")?;
    let flight_number = lookup.text(identifier, "FlightNumber")?;
    let mut summary = format!("Flight {airline} {flight_number}");

    if let Some(leg) = lookup.find(flight, "Leg") {
        if let (Some(dep), Some(arr)) = (
            lookup.find(leg, "Departure/Port"),
            lookup.find(leg, "Arrival/Port"),
        ) {
            summary.push_str(&format!(
                " from {} to {}",
                dep.text().unwrap_or("None"),
                arr.text().unwrap_or("None")
            ));
        }
    }

    Some(summary)
}

pub fn summary_or_placeholder(xml: &str) -> String {
    flight_summary(xml).unwrap_or_else(|| SUMMARY_PLACEHOLDER.to_string())
}

/// Last-resort record: airline and flight number guessed from the summary tokens.
pub(crate) fn degraded_record(xml: &str) -> FlightRecord {
    let Some(summary) = flight_summary(xml) else {
        return FlightRecord::failed(
            xml,
            format!("Unparseable flight document: {SUMMARY_PLACEHOLDER}"),
        );
    };

    let tokens: Vec<&str> = summary.split_whitespace().collect();
    FlightRecord {
        airline: tokens.get(1).map(|t| t.to_string()),
        flight_number: tokens.get(2).map(|t| t.to_string()),
        error: Some(format!("Unparseable flight document: {summary}")),
        ..FlightRecord::from_raw(xml)
    }
}
