use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde_json::Value;

use crate::render::{SeriesModel, category_labels, plot_height, series_models};
use crate::spec::{ChartRow, ChartSpec};

/// Axis, legend, and sizing options derived independently of series data.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotOptions {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub height: u32,
    pub show_legend: bool,
}

/// Fully derived view of one chart spec, ready for a drawing surface.
#[derive(Debug, Clone)]
pub struct ChartView {
    pub labels: Arc<Vec<String>>,
    pub series: Arc<Vec<SeriesModel>>,
    pub options: Arc<PlotOptions>,
    /// Raw markdown for the shared text renderer; no chart-specific
    /// sanitization happens here.
    pub caption: Option<String>,
}

/// Stateless chart presenter with content-keyed memoization.
///
/// Each derived value recomputes only when the sub-fields it depends on
/// change: labels on `x_field` + `data`, series on `y_fields` + `data` +
/// `chart_type`, options on the chart chrome. Re-rendering an unchanged
/// spec serves the same `Arc`s back, so downstream diffing stays cheap.
#[derive(Debug)]
pub struct ChartRenderer {
    labels: MemoCell<Vec<String>>,
    series: MemoCell<Vec<SeriesModel>>,
    options: MemoCell<PlotOptions>,
}

impl ChartRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&self, spec: &ChartSpec) -> ChartView {
        let labels = self
            .labels
            .get_or_insert(labels_key(spec), || category_labels(spec));
        let series = self
            .series
            .get_or_insert(series_key(spec), || series_models(spec));
        let options = self.options.get_or_insert(options_key(spec), || PlotOptions {
            title: spec.title.clone(),
            x_label: spec.x_label.clone(),
            y_label: spec.y_label.clone(),
            height: plot_height(spec.data.len()),
            show_legend: spec.y_fields.len() > 1,
        });

        ChartView {
            labels,
            series,
            options,
            caption: spec.caption.clone(),
        }
    }
}

impl Default for ChartRenderer {
    fn default() -> Self {
        Self {
            labels: MemoCell::empty(),
            series: MemoCell::empty(),
            options: MemoCell::empty(),
        }
    }
}

/// Single-slot memo keyed by a content hash of the relevant spec sub-fields.
#[derive(Debug)]
struct MemoCell<T> {
    slot: ArcSwapOption<Memoized<T>>,
}

#[derive(Debug)]
struct Memoized<T> {
    key: u64,
    value: Arc<T>,
}

impl<T> MemoCell<T> {
    fn empty() -> Self {
        Self {
            slot: ArcSwapOption::empty(),
        }
    }

    fn get_or_insert(&self, key: u64, compute: impl FnOnce() -> T) -> Arc<T> {
        if let Some(cached) = self.slot.load_full()
            && cached.key == key
        {
            return Arc::clone(&cached.value);
        }

        let value = Arc::new(compute());
        self.slot.store(Some(Arc::new(Memoized {
            key,
            value: Arc::clone(&value),
        })));
        value
    }
}

fn labels_key(spec: &ChartSpec) -> u64 {
    let mut hasher = DefaultHasher::new();
    spec.x_field.hash(&mut hasher);
    hash_rows(&spec.data, &mut hasher);
    hasher.finish()
}

fn series_key(spec: &ChartSpec) -> u64 {
    let mut hasher = DefaultHasher::new();
    spec.chart_type.hash(&mut hasher);
    spec.y_fields.hash(&mut hasher);
    hash_rows(&spec.data, &mut hasher);
    hasher.finish()
}

fn options_key(spec: &ChartSpec) -> u64 {
    let mut hasher = DefaultHasher::new();
    spec.chart_type.hash(&mut hasher);
    spec.title.hash(&mut hasher);
    spec.x_label.hash(&mut hasher);
    spec.y_label.hash(&mut hasher);
    spec.data.len().hash(&mut hasher);
    spec.y_fields.len().hash(&mut hasher);
    hasher.finish()
}

fn hash_rows(rows: &[ChartRow], hasher: &mut impl Hasher) {
    rows.len().hash(hasher);
    for row in rows {
        row.len().hash(hasher);
        for (key, value) in row {
            key.hash(hasher);
            hash_value(value, hasher);
        }
    }
}

fn hash_value(value: &Value, hasher: &mut impl Hasher) {
    match value {
        Value::Null => 0u8.hash(hasher),
        Value::Bool(flag) => {
            1u8.hash(hasher);
            flag.hash(hasher);
        }
        Value::Number(number) => {
            2u8.hash(hasher);
            number.to_string().hash(hasher);
        }
        Value::String(text) => {
            3u8.hash(hasher);
            text.hash(hasher);
        }
        Value::Array(entries) => {
            4u8.hash(hasher);
            entries.len().hash(hasher);
            for entry in entries {
                hash_value(entry, hasher);
            }
        }
        Value::Object(fields) => {
            5u8.hash(hasher);
            fields.len().hash(hasher);
            for (key, entry) in fields {
                key.hash(hasher);
                hash_value(entry, hasher);
            }
        }
    }
}
