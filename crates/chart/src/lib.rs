pub mod render;
pub mod renderer;
pub mod spec;

pub use render::{
    RenderModel, SERIES_PALETTE, SeriesModel, SeriesStyle, format_axis_tick, plot_height,
    to_render_model,
};
pub use renderer::{ChartRenderer, ChartView, PlotOptions};
pub use spec::{ChartRow, ChartSpec, ChartType, specs_from_payload};
