use serde_json::Value;

use crate::spec::{ChartSpec, ChartType};

/// Fixed series palette, sized so eight concurrent series never share a
/// color; a ninth series wraps back to the first entry.
pub const SERIES_PALETTE: [&str; 8] = [
    "#6366f1", "#22c55e", "#f59e0b", "#ef4444", "#06b6d4", "#a855f7", "#ec4899", "#84cc16",
];

/// Row count above which line/area point markers are hidden.
pub const POINT_MARKER_MAX_ROWS: usize = 30;
/// Alpha of the top stop of an area gradient; the bottom stop is transparent.
pub const AREA_GRADIENT_TOP_ALPHA: f32 = 0.33;
/// Bar fill alpha; the border stays solid.
pub const BAR_FILL_ALPHA: f32 = 0.6;
/// Bar corner radius in pixels.
pub const BAR_CORNER_RADIUS: f32 = 4.0;

/// Plot heights for the three row-density bands.
const HEIGHT_COMPACT: u32 = 320;
const HEIGHT_MEDIUM: u32 = 380;
const HEIGHT_TALL: u32 = 440;
/// Row counts delimiting the density bands.
const COMPACT_MAX_ROWS: usize = 12;
const MEDIUM_MAX_ROWS: usize = 24;

/// Compile-time validation of the density band constants.
const _: () = {
    assert!(HEIGHT_COMPACT < HEIGHT_MEDIUM);
    assert!(HEIGHT_MEDIUM < HEIGHT_TALL);
    assert!(COMPACT_MAX_ROWS < MEDIUM_MAX_ROWS);
};

/// Per-chart-type drawing parameters shared by every series of one chart.
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesStyle {
    /// Semi-transparent fill with a solid border and rounded corners.
    Bar { fill_alpha: f32, corner_radius: f32 },
    /// No fill; markers are hidden on dense charts.
    Line { show_points: bool },
    /// Line with a gradient fill spanning the rendered plot bounds
    /// top-to-bottom, not a fixed pixel range.
    Area {
        show_points: bool,
        gradient_top_alpha: f32,
        gradient_bottom_alpha: f32,
    },
}

/// One renderable series: values in row order plus its assigned color.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesModel {
    pub name: String,
    pub color: &'static str,
    pub values: Vec<f64>,
    pub style: SeriesStyle,
}

/// Declarative rendering instructions derived from a chart spec.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderModel {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub labels: Vec<String>,
    pub series: Vec<SeriesModel>,
    pub height: u32,
    pub show_legend: bool,
    pub caption: Option<String>,
}

/// Maps a chart spec into renderable series data. Pure; never fails — empty
/// data produces an empty plot with axes and no series points.
pub fn to_render_model(spec: &ChartSpec) -> RenderModel {
    let labels = category_labels(spec);
    let series = series_models(spec);

    RenderModel {
        title: spec.title.clone(),
        x_label: spec.x_label.clone(),
        y_label: spec.y_label.clone(),
        show_legend: series.len() > 1,
        height: plot_height(spec.data.len()),
        labels,
        series,
        caption: spec.caption.clone(),
    }
}

/// Category labels in row order; absent or null cells become empty strings.
pub fn category_labels(spec: &ChartSpec) -> Vec<String> {
    spec.data
        .iter()
        .map(|row| cell_label(row.get(&spec.x_field)))
        .collect()
}

/// One series per `y_field`, in declaration order; colors cycle the palette
/// by index so series keep their color across re-renders.
pub fn series_models(spec: &ChartSpec) -> Vec<SeriesModel> {
    let style = series_style(spec.chart_type, spec.data.len());

    spec.y_fields
        .iter()
        .enumerate()
        .map(|(index, field)| SeriesModel {
            name: field.clone(),
            color: SERIES_PALETTE[index % SERIES_PALETTE.len()],
            values: spec.data.iter().map(|row| cell_value(row.get(field))).collect(),
            style: style.clone(),
        })
        .collect()
}

/// Density-adaptive plot height keeps axis labels readable as rows grow.
pub fn plot_height(row_count: usize) -> u32 {
    if row_count <= COMPACT_MAX_ROWS {
        HEIGHT_COMPACT
    } else if row_count <= MEDIUM_MAX_ROWS {
        HEIGHT_MEDIUM
    } else {
        HEIGHT_TALL
    }
}

/// Formats a y-axis tick: `1.5M`, `12K`, or a grouped plain number.
pub fn format_axis_tick(value: f64) -> String {
    let magnitude = value.abs();
    // The K format rounds to the nearest integer, so 999,500 and up would
    // print as "1000K"; promote those to the M band instead.
    if magnitude >= 999_500.0 {
        format!("{:.1}M", value / 1_000_000.0)
    } else if magnitude >= 1_000.0 {
        format!("{:.0}K", value / 1_000.0)
    } else {
        format_plain(value)
    }
}

fn series_style(chart_type: ChartType, row_count: usize) -> SeriesStyle {
    let show_points = row_count <= POINT_MARKER_MAX_ROWS;
    match chart_type {
        ChartType::Bar => SeriesStyle::Bar {
            fill_alpha: BAR_FILL_ALPHA,
            corner_radius: BAR_CORNER_RADIUS,
        },
        ChartType::Line => SeriesStyle::Line { show_points },
        ChartType::Area => SeriesStyle::Area {
            show_points,
            gradient_top_alpha: AREA_GRADIENT_TOP_ALPHA,
            gradient_bottom_alpha: 0.0,
        },
    }
}

fn cell_label(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

/// Numeric coercion for one data cell; absent or non-numeric values count
/// as zero so heterogeneous rows still plot.
fn cell_value(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0),
        Some(Value::String(text)) => text.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn format_plain(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        group_integer(value as i64)
    } else {
        format!("{value}")
    }
}

fn group_integer(value: i64) -> String {
    let digits = value.abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    if value < 0 { format!("-{grouped}") } else { grouped }
}
