use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Chart encodings the renderer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    #[default]
    Line,
    Bar,
    Area,
}

/// One row of tabular chart data, keyed by column name.
pub type ChartRow = Map<String, Value>;

/// Backend-provided declarative chart description.
///
/// Deserialization is deliberately lenient: the backend does not guarantee
/// row homogeneity or full field coverage, so every field falls back to a
/// default and value coercion happens at render time.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChartSpec {
    #[serde(default)]
    pub chart_type: ChartType,
    #[serde(default)]
    pub title: String,
    /// Data column used for the category axis.
    #[serde(default)]
    pub x_field: String,
    #[serde(default)]
    pub x_label: String,
    /// Data columns plotted as series; order is series order is color order.
    #[serde(default)]
    pub y_fields: Vec<String>,
    #[serde(default)]
    pub y_label: String,
    #[serde(default)]
    pub data: Vec<ChartRow>,
    /// Markdown footnote rendered below the plot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

/// Normalizes a chart event payload into a spec list.
///
/// Accepted shapes, in priority order: a bare array, `{"charts": [...]}`,
/// `{"chart": {...}}`, and a bare object treated as a single spec. Malformed
/// JSON or any other shape yields `None`, meaning "no chart section to
/// render" rather than an error.
pub fn specs_from_payload(payload: &str) -> Option<Vec<ChartSpec>> {
    let value: Value = serde_json::from_str(payload).ok()?;
    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(fields) => match fields.get("charts") {
            Some(Value::Array(entries)) => entries.clone(),
            _ => match fields.get("chart") {
                Some(chart) => vec![chart.clone()],
                None => vec![Value::Object(fields)],
            },
        },
        _ => return None,
    };

    entries
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<ChartSpec>, _>>()
        .ok()
}
