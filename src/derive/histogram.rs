//! Histogram derivation for XES event logs
//!
//! Tallies occurrences of the `concept:name` attribute across all
//! trace/event nodes of an XES document, in traversal order. The canonical
//! payload is a JSON array of `[name, count]` pairs preserving first-seen
//! order — deliberately not sorted by count or name, since downstream
//! consumers render the bars in log order.

use crate::derive::Derivation;
use crate::error::{Error, Result};
use crate::metadata::{MetadataObject, ResourceType};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;

const CONCEPT_NAME_KEY: &[u8] = b"concept:name";

/// Derives a histogram of event names from an event log
pub struct HistogramDerivation;

impl Derivation for HistogramDerivation {
    fn input_type(&self) -> ResourceType {
        ResourceType::EventLog
    }

    fn output_type(&self) -> ResourceType {
        ResourceType::Histogram
    }

    fn role(&self) -> &str {
        "Log"
    }

    fn file_type(&self) -> &str {
        "json"
    }

    fn file_extension(&self) -> &str {
        "json"
    }

    fn derived_label(&self, source: &MetadataObject) -> String {
        format!("Histogram from log: {}", source.resource_label)
    }

    fn derived_description(&self, source: &MetadataObject) -> String {
        format!(
            "Histogram generated from log with label {} and ID: {}",
            source.resource_label, source.resource_id
        )
    }

    fn compute(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let tally = tally_event_names(payload)?;
        Ok(serde_json::to_vec_pretty(&tally)?)
    }
}

/// Count `concept:name` values over `<trace>/<event>` attribute nodes,
/// keeping first-seen order. The key match is case-sensitive and exact.
fn tally_event_names(payload: &[u8]) -> Result<Vec<(String, u64)>> {
    let mut reader = Reader::from_reader(payload);
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut tally: Vec<(String, u64)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if under_trace_event(&stack) {
                    record_attribute(&e, &mut tally, &mut index)?;
                }
                stack.push(e.local_name().as_ref().to_vec());
            }
            Ok(Event::Empty(e)) => {
                if under_trace_event(&stack) {
                    record_attribute(&e, &mut tally, &mut index)?;
                }
            }
            Ok(Event::End(_)) => {
                stack.pop();
            }
            Ok(Event::Eof) => {
                if !stack.is_empty() {
                    return Err(Error::Computation(
                        "malformed XES document: unexpected end of input".to_string(),
                    ));
                }
                break;
            }
            Ok(_) => {}
            Err(e) => {
                return Err(Error::Computation(format!("malformed XES document: {}", e)));
            }
        }
    }

    Ok(tally)
}

/// Attribute nodes of interest sit directly under an `<event>` inside a
/// `<trace>`
fn under_trace_event(stack: &[Vec<u8>]) -> bool {
    let n = stack.len();
    n >= 2 && stack[n - 1] == b"event" && stack[n - 2] == b"trace"
}

fn record_attribute(
    element: &BytesStart<'_>,
    tally: &mut Vec<(String, u64)>,
    index: &mut HashMap<String, usize>,
) -> Result<()> {
    let mut key = None;
    let mut value = None;
    for attr in element.attributes() {
        let attr = attr.map_err(|e| Error::Computation(format!("malformed attribute: {}", e)))?;
        match attr.key.as_ref() {
            b"key" => key = Some(attr.value.into_owned()),
            b"value" => {
                let unescaped = attr
                    .unescape_value()
                    .map_err(|e| Error::Computation(format!("malformed attribute: {}", e)))?;
                value = Some(unescaped.into_owned());
            }
            _ => {}
        }
    }

    if key.as_deref() != Some(CONCEPT_NAME_KEY) {
        return Ok(());
    }
    let Some(name) = value else { return Ok(()) };

    match index.get(&name) {
        Some(&i) => tally[i].1 += 1,
        None => {
            index.insert(name.clone(), tally.len());
            tally.push((name, 1));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compute(doc: &str) -> Result<Vec<(String, u64)>> {
        let payload = HistogramDerivation.compute(doc.as_bytes())?;
        Ok(serde_json::from_slice(&payload).unwrap())
    }

    fn event(key: &str, value: &str) -> String {
        format!("<event><string key=\"{}\" value=\"{}\"/></event>", key, value)
    }

    #[test]
    fn test_first_seen_order_preserved() {
        let doc = format!(
            "<log><trace>{}{}{}{}{}</trace></log>",
            event("concept:name", "A"),
            event("concept:name", "B"),
            event("concept:name", "A"),
            event("concept:name", "C"),
            event("concept:name", "B"),
        );

        let tally = compute(&doc).unwrap();
        assert_eq!(
            tally,
            vec![
                ("A".to_string(), 2),
                ("B".to_string(), 2),
                ("C".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_counts_across_traces() {
        let doc = format!(
            "<log><trace>{}</trace><trace>{}{}</trace></log>",
            event("concept:name", "submit"),
            event("concept:name", "review"),
            event("concept:name", "submit"),
        );

        let tally = compute(&doc).unwrap();
        assert_eq!(
            tally,
            vec![("submit".to_string(), 2), ("review".to_string(), 1)]
        );
    }

    #[test]
    fn test_key_match_is_case_sensitive_and_exact() {
        let doc = format!(
            "<log><trace>{}{}{}</trace></log>",
            event("Concept:Name", "A"),
            event("concept:name ", "B"),
            event("concept:name", "C"),
        );

        let tally = compute(&doc).unwrap();
        assert_eq!(tally, vec![("C".to_string(), 1)]);
    }

    #[test]
    fn test_other_attribute_keys_ignored() {
        let doc = "<log><trace><event>\
                   <string key=\"org:resource\" value=\"alice\"/>\
                   <string key=\"concept:name\" value=\"approve\"/>\
                   <date key=\"time:timestamp\" value=\"2024-01-01\"/>\
                   </event></trace></log>";

        let tally = compute(doc).unwrap();
        assert_eq!(tally, vec![("approve".to_string(), 1)]);
    }

    #[test]
    fn test_events_outside_traces_ignored() {
        let doc = format!(
            "<log>{}<trace>{}</trace></log>",
            event("concept:name", "stray"),
            event("concept:name", "kept"),
        );

        let tally = compute(&doc).unwrap();
        assert_eq!(tally, vec![("kept".to_string(), 1)]);
    }

    #[test]
    fn test_escaped_values_are_unescaped() {
        let doc = "<log><trace><event>\
                   <string key=\"concept:name\" value=\"check &amp; pay\"/>\
                   </event></trace></log>";

        let tally = compute(doc).unwrap();
        assert_eq!(tally, vec![("check & pay".to_string(), 1)]);
    }

    #[test]
    fn test_empty_log_yields_empty_tally() {
        let tally = compute("<log></log>").unwrap();
        assert!(tally.is_empty());

        let payload = HistogramDerivation.compute(b"<log></log>").unwrap();
        let json: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(json, serde_json::json!([]));
    }

    #[test]
    fn test_truncated_document_is_computation_error() {
        let err = compute("<log><trace>").unwrap_err();
        assert!(matches!(err, Error::Computation(_)));
    }

    #[test]
    fn test_mismatched_tags_are_computation_error() {
        let err = compute("<log><trace></event></log>").unwrap_err();
        assert!(matches!(err, Error::Computation(_)));
    }

    #[test]
    fn test_payload_shape_is_array_of_pairs() {
        let doc = format!(
            "<log><trace>{}{}</trace></log>",
            event("concept:name", "A"),
            event("concept:name", "A"),
        );
        let payload = HistogramDerivation.compute(doc.as_bytes()).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(json, serde_json::json!([["A", 2]]));
    }
}
