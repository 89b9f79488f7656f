use plotline_chart::{ChartSpec, specs_from_payload};

use crate::frame::RawFrame;

/// Literal marker the backend embeds in token payloads in place of newlines,
/// because a raw newline would break SSE line framing.
pub const NEWLINE_MARKER: &str = "<|n|>";

/// Typed query-stream event after frame decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryEvent {
    /// Progress message; non-empty payloads also append to the status log.
    Status(String),
    /// Incremental answer delta, newline markers already decoded.
    Token(String),
    /// Authoritative wholesale replacement for previously streamed text.
    Correction(String),
    /// Wholesale replacement of the follow-up suggestion list.
    Suggestions(Vec<String>),
    /// Wholesale replacement of the chart specs; `None` clears the section.
    Chart(Option<Vec<ChartSpec>>),
    /// Terminal completion marker; the payload is ignored.
    Done,
}

impl QueryEvent {
    /// Maps one raw frame to a typed event.
    ///
    /// Unrecognized event types return `None` and are dropped without error
    /// so the backend can add frame types without breaking older clients.
    pub fn from_frame(frame: &RawFrame) -> Option<Self> {
        match frame.event.as_str() {
            "status" => Some(Self::Status(frame.data.clone())),
            "token" => Some(Self::Token(decode_newlines(&frame.data))),
            "correction" => Some(Self::Correction(decode_newlines(&frame.data))),
            "suggestions" => Some(Self::Suggestions(parse_suggestions(&frame.data))),
            "chart" => Some(Self::Chart(specs_from_payload(&frame.data))),
            "done" => Some(Self::Done),
            other => {
                tracing::debug!(event_type = other, "dropping unrecognized stream event");
                None
            }
        }
    }
}

/// Replaces the backend's `<|n|>` markers with real newlines.
pub fn decode_newlines(payload: &str) -> String {
    payload.replace(NEWLINE_MARKER, "\n")
}

/// Parses a suggestions payload, accepting a bare array of strings or an
/// object carrying a `suggestions` array.
///
/// Malformed payloads reset the list to empty rather than failing the
/// stream; one bad frame must never end the session.
fn parse_suggestions(payload: &str) -> Vec<String> {
    let value: serde_json::Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(error) => {
            tracing::debug!(%error, "malformed suggestions payload, resetting to empty");
            return Vec::new();
        }
    };

    let entries = match &value {
        serde_json::Value::Array(entries) => entries.as_slice(),
        serde_json::Value::Object(fields) => match fields.get("suggestions") {
            Some(serde_json::Value::Array(entries)) => entries.as_slice(),
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    entries
        .iter()
        .filter_map(|entry| entry.as_str().map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(event: &str, data: &str) -> RawFrame {
        RawFrame {
            event: event.to_string(),
            data: data.to_string(),
        }
    }

    #[test]
    fn token_payload_decodes_newline_markers() {
        let event = QueryEvent::from_frame(&frame("token", "line1<|n|>line2"));
        assert_eq!(event, Some(QueryEvent::Token("line1\nline2".to_string())));
    }

    #[test]
    fn correction_payload_decodes_newline_markers() {
        let event = QueryEvent::from_frame(&frame("correction", "a<|n|>b<|n|>c"));
        assert_eq!(event, Some(QueryEvent::Correction("a\nb\nc".to_string())));
    }

    #[test]
    fn suggestions_accept_bare_array_and_wrapped_object() {
        let bare = QueryEvent::from_frame(&frame("suggestions", r#"["one", "two"]"#));
        let wrapped =
            QueryEvent::from_frame(&frame("suggestions", r#"{"suggestions": ["one", "two"]}"#));

        let expected = QueryEvent::Suggestions(vec!["one".to_string(), "two".to_string()]);
        assert_eq!(bare, Some(expected.clone()));
        assert_eq!(wrapped, Some(expected));
    }

    #[test]
    fn malformed_suggestions_reset_to_empty() {
        for payload in ["not json", "{\"other\": 1}", "42", r#"{"suggestions": "nope"}"#] {
            let event = QueryEvent::from_frame(&frame("suggestions", payload));
            assert_eq!(event, Some(QueryEvent::Suggestions(Vec::new())), "{payload}");
        }
    }

    #[test]
    fn malformed_chart_clears_the_section() {
        let event = QueryEvent::from_frame(&frame("chart", "{{nope"));
        assert_eq!(event, Some(QueryEvent::Chart(None)));
    }

    #[test]
    fn unrecognized_event_type_is_dropped() {
        assert_eq!(QueryEvent::from_frame(&frame("telemetry", "x")), None);
    }

    #[test]
    fn done_ignores_its_payload() {
        assert_eq!(
            QueryEvent::from_frame(&frame("done", "anything")),
            Some(QueryEvent::Done)
        );
    }
}
