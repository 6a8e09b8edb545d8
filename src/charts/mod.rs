//! Charts module - Chart building and rendering

mod plotter;
mod renderer;
pub mod style;

pub use plotter::{
    BarOptions, BoxOptions, ChartOptions, DataVisualizer, HeatmapOptions, HistogramOptions, LineOptions, PieOptions,
    ScatterOptions, VizError, DEFAULT_COLOR, DEFAULT_DPI,
};
pub use renderer::{Figure, NamedSeries, Plot};
pub use style::{ChartStyle, Colormap, ImageFormat};
