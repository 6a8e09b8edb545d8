//! Static Chart Renderer
//! Draws a retained `Figure` onto a plotters backend (PNG/JPEG bitmap or SVG).
//!
//! Layout:
//! 1. Optional title centered at the top
//! 2. Plot panel filled with the style's panel colour, grid from the style
//! 3. Axis descriptions from the figure's labels
//! 4. Legend in the upper right when more than one series is drawn

use crate::charts::style::{contrasting_text, ChartStyle, Colormap, ImageFormat, PALETTE};
use crate::charts::VizError;
use crate::stats::{BoxStats, StatsCalculator};
use plotters::coord::Shift;
use plotters::drawing::DrawingAreaErrorKind;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::path::Path;

/// Median line colour for box plots.
const MEDIAN_COLOR: RGBColor = RGBColor(255, 127, 14);
/// Points used to trace the KDE curve.
const KDE_POINTS: usize = 200;
/// Most category ticks drawn on a line chart axis.
const MAX_LINE_TICKS: usize = 12;

/// A named numeric series; missing values are NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedSeries {
    pub name: String,
    pub values: Vec<f64>,
}

/// Chart body; each variant carries everything needed to draw it.
#[derive(Debug, Clone)]
pub enum Plot {
    Bar {
        labels: Vec<String>,
        series: Vec<NamedSeries>,
        colors: Vec<RGBColor>,
        horizontal: bool,
        value_labels: bool,
    },
    Line {
        labels: Vec<String>,
        series: Vec<NamedSeries>,
        colors: Vec<RGBColor>,
        marker: bool,
        grid: bool,
    },
    Pie {
        labels: Vec<String>,
        values: Vec<f64>,
        start_angle: f64,
        shadow: bool,
        explode: Vec<f64>,
    },
    Heatmap {
        rows: Vec<String>,
        columns: Vec<String>,
        values: Vec<Vec<f64>>,
        cmap: Colormap,
        annotate: bool,
        decimals: usize,
        linewidth: f64,
    },
    Histogram {
        values: Vec<f64>,
        bins: usize,
        color: RGBColor,
        kde: bool,
    },
    Box {
        labels: Vec<String>,
        stats: Vec<BoxStats>,
        color: RGBColor,
        vertical: bool,
    },
    Scatter {
        x: Vec<f64>,
        y: Vec<f64>,
        color: RGBColor,
        alpha: f64,
        size: f64,
    },
}

impl Plot {
    pub fn kind(&self) -> &'static str {
        match self {
            Plot::Bar { .. } => "bar",
            Plot::Line { .. } => "line",
            Plot::Pie { .. } => "pie",
            Plot::Heatmap { .. } => "heatmap",
            Plot::Histogram { .. } => "histogram",
            Plot::Box { .. } => "box",
            Plot::Scatter { .. } => "scatter",
        }
    }
}

/// A rendered-on-demand chart. Fields are public so callers can adjust
/// labels or styling and save again.
#[derive(Debug, Clone)]
pub struct Figure {
    pub title: Option<String>,
    pub xlabel: Option<String>,
    pub ylabel: Option<String>,
    /// Size in inches.
    pub figsize: (f64, f64),
    pub style: ChartStyle,
    pub plot: Plot,
}

impl<E: std::error::Error + Send + Sync> From<DrawingAreaErrorKind<E>> for VizError {
    fn from(err: DrawingAreaErrorKind<E>) -> Self {
        VizError::Render(err.to_string())
    }
}

/// Font sizes are given in points and scaled by `dpi / 72`.
struct Theme {
    style: ChartStyle,
    scale: f64,
}

impl Theme {
    fn new(style: ChartStyle, dpi: u32) -> Self {
        Self {
            style,
            scale: dpi.max(1) as f64 / 72.0,
        }
    }

    fn px(&self, points: f64) -> u32 {
        (points * self.scale).round().max(1.0) as u32
    }

    fn font(&self, points: f64) -> TextStyle<'static> {
        ("sans-serif", points * self.scale)
            .into_font()
            .color(&self.style.text())
    }

    fn font_colored(&self, points: f64, color: RGBColor) -> TextStyle<'static> {
        ("sans-serif", points * self.scale).into_font().color(&color)
    }

    /// Label area wide enough for the longest tick label.
    fn label_area(&self, labels: &[String]) -> u32 {
        let longest = labels.iter().map(|l| l.chars().count()).max().unwrap_or(4);
        self.px(16.0 + 6.0 * longest.min(30) as f64)
    }
}

impl Figure {
    /// Pixel dimensions at the given DPI.
    pub fn dimensions(&self, dpi: u32) -> (u32, u32) {
        let (w, h) = self.figsize;
        let dpi = dpi.max(1) as f64;
        (
            (w * dpi).round().max(1.0) as u32,
            (h * dpi).round().max(1.0) as u32,
        )
    }

    /// Write the figure to `path`; the format follows the file extension.
    pub fn save(&self, path: impl AsRef<Path>, dpi: u32) -> Result<(), VizError> {
        let path = path.as_ref();
        let format = ImageFormat::from_path(path)?;
        let size = self.dimensions(dpi);
        match format {
            ImageFormat::Png | ImageFormat::Jpg => {
                let root = BitMapBackend::new(path, size).into_drawing_area();
                self.draw(&root, dpi)?;
                root.present()?;
            }
            ImageFormat::Svg => {
                let root = SVGBackend::new(path, size).into_drawing_area();
                self.draw(&root, dpi)?;
                root.present()?;
            }
        }
        log::debug!("Rendered {} chart to {}", self.plot.kind(), path.display());
        Ok(())
    }

    /// Render to an in-memory SVG document.
    pub fn to_svg(&self, dpi: u32) -> Result<String, VizError> {
        let mut buffer = String::new();
        {
            let root = SVGBackend::with_string(&mut buffer, self.dimensions(dpi)).into_drawing_area();
            self.draw(&root, dpi)?;
            root.present()?;
        }
        Ok(buffer)
    }

    /// Draw onto any plotters drawing area.
    pub fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>, dpi: u32) -> Result<(), VizError> {
        let theme = Theme::new(self.style, dpi);
        root.fill(&theme.style.background())?;
        let pad = theme.px(8.0) as i32;
        let padded = root.margin(pad, pad, pad, pad);
        let area = match &self.title {
            Some(title) if !title.is_empty() => padded.titled(title, theme.font(14.0))?,
            _ => padded,
        };

        match &self.plot {
            Plot::Bar {
                labels,
                series,
                colors,
                horizontal,
                value_labels,
            } => self.draw_bar(&area, &theme, labels, series, colors, *horizontal, *value_labels),
            Plot::Line {
                labels,
                series,
                colors,
                marker,
                grid,
            } => self.draw_line(&area, &theme, labels, series, colors, *marker, *grid),
            Plot::Pie {
                labels,
                values,
                start_angle,
                shadow,
                explode,
            } => Self::draw_pie(&area, &theme, labels, values, *start_angle, *shadow, explode),
            Plot::Heatmap {
                rows,
                columns,
                values,
                cmap,
                annotate,
                decimals,
                linewidth,
            } => Self::draw_heatmap(
                &area, &theme, rows, columns, values, *cmap, *annotate, *decimals, *linewidth,
            ),
            Plot::Histogram {
                values,
                bins,
                color,
                kde,
            } => self.draw_histogram(&area, &theme, values, *bins, *color, *kde),
            Plot::Box {
                labels,
                stats,
                color,
                vertical,
            } => self.draw_box(&area, &theme, labels, stats, *color, *vertical),
            Plot::Scatter {
                x,
                y,
                color,
                alpha,
                size,
            } => self.draw_scatter(&area, &theme, x, y, *color, *alpha, *size),
        }
    }

    fn xdesc(&self) -> String {
        self.xlabel.clone().unwrap_or_default()
    }

    fn ydesc(&self) -> String {
        self.ylabel.clone().unwrap_or_default()
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_bar<DB: DrawingBackend>(
        &self,
        area: &DrawingArea<DB, Shift>,
        theme: &Theme,
        labels: &[String],
        series: &[NamedSeries],
        colors: &[RGBColor],
        horizontal: bool,
        value_labels: bool,
    ) -> Result<(), VizError> {
        let n = labels.len();
        let (lo, hi) = value_span(series.iter().flat_map(|s| s.values.iter().copied()));
        let max = hi.max(0.0);
        let lo = lo.min(0.0);
        let top = if max > 0.0 { max * 1.12 } else { 1.0 };
        let bottom = if lo < 0.0 { lo * 1.1 } else { 0.0 };
        let fmt = |v: &f64| label_at(labels, *v);
        let label_offset = max * 0.01;

        let mut builder = ChartBuilder::on(area);
        builder.margin(theme.px(6.0));
        if horizontal {
            builder
                .x_label_area_size(theme.px(36.0))
                .y_label_area_size(theme.label_area(labels));
            let mut chart = builder.build_cartesian_2d(bottom..top, -0.5..n as f64 - 0.5)?;
            chart.plotting_area().fill(&theme.style.panel())?;
            chart
                .configure_mesh()
                .x_desc(self.xdesc())
                .y_desc(self.ydesc())
                .label_style(theme.font(10.0))
                .axis_desc_style(theme.font(12.0))
                .bold_line_style(theme.style.grid())
                .max_light_lines(0)
                .disable_y_mesh()
                .y_labels(n)
                .y_label_formatter(&fmt)
                .draw()?;
            let anchor = Pos::new(HPos::Left, VPos::Center);
            Self::draw_bar_series(&mut chart, theme, series, colors, value_labels, label_offset, anchor, |p, v| (v, p))?;
            if series.len() > 1 {
                Self::draw_legend(&mut chart, theme)?;
            }
        } else {
            builder
                .x_label_area_size(theme.px(36.0))
                .y_label_area_size(theme.px(56.0));
            let mut chart = builder.build_cartesian_2d(-0.5..n as f64 - 0.5, bottom..top)?;
            chart.plotting_area().fill(&theme.style.panel())?;
            chart
                .configure_mesh()
                .x_desc(self.xdesc())
                .y_desc(self.ydesc())
                .label_style(theme.font(10.0))
                .axis_desc_style(theme.font(12.0))
                .bold_line_style(theme.style.grid())
                .max_light_lines(0)
                .disable_x_mesh()
                .x_labels(n)
                .x_label_formatter(&fmt)
                .draw()?;
            let anchor = Pos::new(HPos::Center, VPos::Bottom);
            Self::draw_bar_series(&mut chart, theme, series, colors, value_labels, label_offset, anchor, |p, v| (p, v))?;
            if series.len() > 1 {
                Self::draw_legend(&mut chart, theme)?;
            }
        }
        Ok(())
    }

    /// Bars for every series side by side within each category slot.
    /// `pt` maps (category position, value) to chart coordinates.
    #[allow(clippy::too_many_arguments)]
    fn draw_bar_series<DB, X, Y, F>(
        chart: &mut ChartContext<'_, DB, Cartesian2d<X, Y>>,
        theme: &Theme,
        series: &[NamedSeries],
        colors: &[RGBColor],
        value_labels: bool,
        label_offset: f64,
        anchor: Pos,
        pt: F,
    ) -> Result<(), VizError>
    where
        DB: DrawingBackend,
        X: Ranged<ValueType = f64>,
        Y: Ranged<ValueType = f64>,
        F: Fn(f64, f64) -> (f64, f64),
    {
        let k = series.len().max(1);
        let width = 0.8 / k as f64;
        for (j, s) in series.iter().enumerate() {
            let color = colors.get(j).copied().unwrap_or(PALETTE[0]);
            let bars: Vec<_> = s
                .values
                .iter()
                .enumerate()
                .filter(|(_, v)| v.is_finite())
                .map(|(i, &v)| {
                    let x0 = i as f64 - 0.4 + j as f64 * width;
                    Rectangle::new([pt(x0, 0.0), pt(x0 + width, v)], color.filled())
                })
                .collect();
            let anno = chart.draw_series(bars)?;
            if k > 1 {
                let r = theme.px(5.0) as i32;
                anno.label(s.name.clone())
                    .legend(move |(x, y)| Rectangle::new([(x, y - r), (x + 2 * r, y + r)], color.filled()));
            }

            if value_labels {
                let style = theme.font_colored(9.0, contrasting_text(color)).pos(anchor);
                let texts: Vec<_> = s
                    .values
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| v.is_finite())
                    .map(|(i, &v)| {
                        let center = i as f64 - 0.4 + (j as f64 + 0.5) * width;
                        Text::new(format!("{:.2}", v), pt(center, v + label_offset), style.clone())
                    })
                    .collect();
                chart.draw_series(texts)?;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_line<DB: DrawingBackend>(
        &self,
        area: &DrawingArea<DB, Shift>,
        theme: &Theme,
        labels: &[String],
        series: &[NamedSeries],
        colors: &[RGBColor],
        marker: bool,
        grid: bool,
    ) -> Result<(), VizError> {
        let n = labels.len();
        let (lo, hi) = padded_span(series.iter().flat_map(|s| s.values.iter().copied()));
        let ticks = n.clamp(1, MAX_LINE_TICKS);
        let fmt = |v: &f64| label_at(labels, *v);

        let mut chart = ChartBuilder::on(area)
            .margin(theme.px(6.0))
            .x_label_area_size(theme.px(36.0))
            .y_label_area_size(theme.px(56.0))
            .build_cartesian_2d(-0.5..n as f64 - 0.5, lo..hi)?;
        chart.plotting_area().fill(&theme.style.panel())?;

        let mut mesh = chart.configure_mesh();
        mesh.x_desc(self.xdesc())
            .y_desc(self.ydesc())
            .label_style(theme.font(10.0))
            .axis_desc_style(theme.font(12.0))
            .bold_line_style(theme.style.grid())
            .max_light_lines(0)
            .x_labels(ticks)
            .x_label_formatter(&fmt);
        if !grid {
            mesh.disable_mesh();
        }
        mesh.draw()?;

        let stroke = theme.px(1.5);
        let radius = theme.px(3.0) as i32;
        for (j, s) in series.iter().enumerate() {
            let color = colors.get(j).copied().unwrap_or(PALETTE[0]);
            let runs = finite_runs(&s.values);
            let mut first = true;
            for run in &runs {
                let anno = chart.draw_series(LineSeries::new(run.iter().copied(), color.stroke_width(stroke)))?;
                if first && series.len() > 1 {
                    let r = theme.px(5.0) as i32;
                    anno.label(s.name.clone())
                        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 2 * r, y)], color.stroke_width(2)));
                }
                first = false;
            }
            if marker {
                chart.draw_series(
                    runs.iter()
                        .flatten()
                        .map(|&p| Circle::new(p, radius, color.filled())),
                )?;
            }
        }
        if series.len() > 1 {
            Self::draw_legend(&mut chart, theme)?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_pie<DB: DrawingBackend>(
        area: &DrawingArea<DB, Shift>,
        theme: &Theme,
        labels: &[String],
        values: &[f64],
        start_angle: f64,
        shadow: bool,
        explode: &[f64],
    ) -> Result<(), VizError> {
        let (w, h) = area.dim_in_pixel();
        let center = (w as f64 / 2.0, h as f64 / 2.0);
        let radius = 0.38 * w.min(h) as f64;
        let border = theme.px(1.0);

        for slice in pie_slices(values, start_angle, explode) {
            let color = PALETTE[slice.index % PALETTE.len()];
            let mid = (slice.start + slice.end) / 2.0;
            let shift = slice.explode * radius;
            let origin = (center.0 + shift * mid.cos(), center.1 - shift * mid.sin());
            let outline = arc_polygon(origin, radius, slice.start, slice.end);

            if shadow {
                let offset = (radius * 0.02).round() as i32;
                let shade: Vec<(i32, i32)> = outline.iter().map(|&(x, y)| (x + offset, y + offset)).collect();
                area.draw(&Polygon::new(shade, BLACK.mix(0.3).filled()))?;
            }
            area.draw(&Polygon::new(outline.clone(), color.filled()))?;
            let mut closed = outline;
            if let Some(&first) = closed.first() {
                closed.push(first);
            }
            area.draw(&PathElement::new(closed, WHITE.stroke_width(border)))?;

            let at = |r: f64| {
                (
                    (origin.0 + r * mid.cos()).round() as i32,
                    (origin.1 - r * mid.sin()).round() as i32,
                )
            };
            let pct_style = theme
                .font_colored(10.0, RGBColor(255, 255, 255))
                .pos(Pos::new(HPos::Center, VPos::Center));
            area.draw(&Text::new(format!("{:.1}%", slice.fraction * 100.0), at(radius * 0.6), pct_style))?;

            let h_pos = if mid.cos() >= 0.0 { HPos::Left } else { HPos::Right };
            let label_style = theme.font(11.0).pos(Pos::new(h_pos, VPos::Center));
            let label = labels.get(slice.index).cloned().unwrap_or_default();
            area.draw(&Text::new(label, at(radius * 1.1), label_style))?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_heatmap<DB: DrawingBackend>(
        area: &DrawingArea<DB, Shift>,
        theme: &Theme,
        rows: &[String],
        columns: &[String],
        values: &[Vec<f64>],
        cmap: Colormap,
        annotate: bool,
        decimals: usize,
        linewidth: f64,
    ) -> Result<(), VizError> {
        let (w, _) = area.dim_in_pixel();
        let (main, bar) = area.split_horizontally((w as f64 * 0.86) as i32);
        let (n_rows, n_cols) = (rows.len(), columns.len());
        let (vmin, vmax) = color_span(values.iter().flatten().copied());
        let norm = |v: f64| (v - vmin) / (vmax - vmin);

        // cells are centred on integer positions, row 0 at the top
        let x_fmt = |v: &f64| label_at(columns, *v);
        let y_fmt = |v: &f64| label_at(rows, (n_rows as f64 - 1.0) - *v);

        let mut chart = ChartBuilder::on(&main)
            .margin(theme.px(6.0))
            .x_label_area_size(theme.label_area(columns))
            .y_label_area_size(theme.label_area(rows))
            .build_cartesian_2d(-0.5..n_cols as f64 - 0.5, -0.5..n_rows as f64 - 0.5)?;
        chart
            .configure_mesh()
            .disable_mesh()
            .x_labels(n_cols)
            .y_labels(n_rows)
            .label_style(theme.font(10.0))
            .x_label_formatter(&x_fmt)
            .y_label_formatter(&y_fmt)
            .draw()?;

        let line = theme.px(linewidth);
        for (i, row) in values.iter().enumerate() {
            let y = (n_rows - i - 1) as f64;
            for (j, &v) in row.iter().enumerate() {
                let x = j as f64;
                let cell = [(x - 0.5, y - 0.5), (x + 0.5, y + 0.5)];
                let fill = if v.is_finite() {
                    cmap.color_at(norm(v))
                } else {
                    theme.style.background()
                };
                chart.draw_series(std::iter::once(Rectangle::new(cell, fill.filled())))?;
                if linewidth > 0.0 {
                    chart.draw_series(std::iter::once(Rectangle::new(cell, WHITE.stroke_width(line))))?;
                }
                if annotate && v.is_finite() {
                    let style = theme
                        .font_colored(9.0, contrasting_text(fill))
                        .pos(Pos::new(HPos::Center, VPos::Center));
                    chart.draw_series(std::iter::once(Text::new(
                        format!("{:.*}", decimals, v),
                        (x, y),
                        style,
                    )))?;
                }
            }
        }

        let mut colorbar = ChartBuilder::on(&bar)
            .margin_top(theme.px(6.0))
            .margin_bottom(theme.label_area(columns) + theme.px(6.0))
            .margin_right(theme.px(4.0))
            .y_label_area_size(theme.px(40.0))
            .build_cartesian_2d(0.0..1.0, vmin..vmax)?;
        colorbar
            .configure_mesh()
            .disable_mesh()
            .disable_x_axis()
            .y_labels(6)
            .label_style(theme.font(9.0))
            .draw()?;
        let steps = 100;
        let band = (vmax - vmin) / steps as f64;
        colorbar.draw_series((0..steps).map(|s| {
            let v = vmin + s as f64 * band;
            Rectangle::new([(0.0, v), (1.0, v + band)], cmap.color_at(norm(v + band / 2.0)).filled())
        }))?;
        Ok(())
    }

    fn draw_histogram<DB: DrawingBackend>(
        &self,
        area: &DrawingArea<DB, Shift>,
        theme: &Theme,
        values: &[f64],
        bins: usize,
        color: RGBColor,
        kde: bool,
    ) -> Result<(), VizError> {
        let binned = bin_counts(values, bins);
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        let end = binned.start + binned.width * binned.counts.len() as f64;

        let curve: Vec<(f64, f64)> = if kde && finite.len() > 1 {
            let grid: Vec<f64> = (0..KDE_POINTS)
                .map(|i| binned.start + (end - binned.start) * i as f64 / (KDE_POINTS - 1) as f64)
                .collect();
            let scale = finite.len() as f64 * binned.width;
            let density = StatsCalculator::kde(&finite, &grid);
            grid.into_iter().zip(density).map(|(x, d)| (x, d * scale)).collect()
        } else {
            Vec::new()
        };

        let peak = binned
            .counts
            .iter()
            .map(|&c| c as f64)
            .chain(curve.iter().map(|p| p.1))
            .fold(0.0, f64::max);
        let top = if peak > 0.0 { peak * 1.1 } else { 1.0 };

        let mut chart = ChartBuilder::on(area)
            .margin(theme.px(6.0))
            .x_label_area_size(theme.px(36.0))
            .y_label_area_size(theme.px(56.0))
            .build_cartesian_2d(binned.start..end, 0.0..top)?;
        chart.plotting_area().fill(&theme.style.panel())?;
        chart
            .configure_mesh()
            .x_desc(self.xdesc())
            .y_desc(self.ydesc())
            .label_style(theme.font(10.0))
            .axis_desc_style(theme.font(12.0))
            .bold_line_style(theme.style.grid())
            .max_light_lines(0)
            .draw()?;

        let edge = theme.px(0.5);
        chart.draw_series(binned.counts.iter().enumerate().map(|(i, &c)| {
            let x0 = binned.start + i as f64 * binned.width;
            Rectangle::new([(x0, 0.0), (x0 + binned.width, c as f64)], color.mix(0.75).filled())
        }))?;
        chart.draw_series(binned.counts.iter().enumerate().map(|(i, &c)| {
            let x0 = binned.start + i as f64 * binned.width;
            Rectangle::new([(x0, 0.0), (x0 + binned.width, c as f64)], WHITE.stroke_width(edge))
        }))?;
        if !curve.is_empty() {
            chart.draw_series(LineSeries::new(curve, color.stroke_width(theme.px(1.5))))?;
        }
        Ok(())
    }

    fn draw_box<DB: DrawingBackend>(
        &self,
        area: &DrawingArea<DB, Shift>,
        theme: &Theme,
        labels: &[String],
        stats: &[BoxStats],
        color: RGBColor,
        vertical: bool,
    ) -> Result<(), VizError> {
        let n = stats.len();
        let (lo, hi) = padded_span(stats.iter().flat_map(|s| {
            s.outliers
                .iter()
                .copied()
                .chain([s.whisker_low, s.whisker_high, s.q1, s.q3])
        }));
        let fmt = |v: &f64| label_at(labels, *v);

        let mut builder = ChartBuilder::on(area);
        builder.margin(theme.px(6.0));
        if vertical {
            builder
                .x_label_area_size(theme.px(36.0))
                .y_label_area_size(theme.px(56.0));
            let mut chart = builder.build_cartesian_2d(-0.5..n as f64 - 0.5, lo..hi)?;
            chart.plotting_area().fill(&theme.style.panel())?;
            chart
                .configure_mesh()
                .x_desc(self.xdesc())
                .y_desc(self.ydesc())
                .label_style(theme.font(10.0))
                .axis_desc_style(theme.font(12.0))
                .bold_line_style(theme.style.grid())
                .max_light_lines(0)
                .x_labels(n)
                .x_label_formatter(&fmt)
                .draw()?;
            Self::draw_box_series(&mut chart, theme, stats, color, |p, v| (p, v))
        } else {
            builder
                .x_label_area_size(theme.px(36.0))
                .y_label_area_size(theme.label_area(labels));
            let mut chart = builder.build_cartesian_2d(lo..hi, -0.5..n as f64 - 0.5)?;
            chart.plotting_area().fill(&theme.style.panel())?;
            chart
                .configure_mesh()
                .x_desc(self.xdesc())
                .y_desc(self.ydesc())
                .label_style(theme.font(10.0))
                .axis_desc_style(theme.font(12.0))
                .bold_line_style(theme.style.grid())
                .max_light_lines(0)
                .y_labels(n)
                .y_label_formatter(&fmt)
                .draw()?;
            Self::draw_box_series(&mut chart, theme, stats, color, |p, v| (v, p))
        }
    }

    fn draw_box_series<DB, X, Y, F>(
        chart: &mut ChartContext<'_, DB, Cartesian2d<X, Y>>,
        theme: &Theme,
        stats: &[BoxStats],
        color: RGBColor,
        pt: F,
    ) -> Result<(), VizError>
    where
        DB: DrawingBackend,
        X: Ranged<ValueType = f64>,
        Y: Ranged<ValueType = f64>,
        F: Fn(f64, f64) -> (f64, f64),
    {
        let half = 0.25;
        let cap = 0.125;
        let stroke = theme.px(1.0);
        let radius = theme.px(3.0) as i32;
        for (i, s) in stats.iter().enumerate() {
            let p = i as f64;
            chart.draw_series(std::iter::once(Rectangle::new(
                [pt(p - half, s.q1), pt(p + half, s.q3)],
                color.mix(0.7).filled(),
            )))?;
            chart.draw_series(std::iter::once(Rectangle::new(
                [pt(p - half, s.q1), pt(p + half, s.q3)],
                BLACK.stroke_width(stroke),
            )))?;
            let segments = [
                vec![pt(p - half, s.median), pt(p + half, s.median)],
                vec![pt(p, s.q1), pt(p, s.whisker_low)],
                vec![pt(p, s.q3), pt(p, s.whisker_high)],
                vec![pt(p - cap, s.whisker_low), pt(p + cap, s.whisker_low)],
                vec![pt(p - cap, s.whisker_high), pt(p + cap, s.whisker_high)],
            ];
            for (k, segment) in segments.into_iter().enumerate() {
                let line_color = if k == 0 { MEDIAN_COLOR } else { BLACK };
                chart.draw_series(std::iter::once(PathElement::new(
                    segment,
                    line_color.stroke_width(stroke),
                )))?;
            }
            chart.draw_series(
                s.outliers
                    .iter()
                    .map(|&v| Circle::new(pt(p, v), radius, BLACK.stroke_width(stroke))),
            )?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_scatter<DB: DrawingBackend>(
        &self,
        area: &DrawingArea<DB, Shift>,
        theme: &Theme,
        x: &[f64],
        y: &[f64],
        color: RGBColor,
        alpha: f64,
        size: f64,
    ) -> Result<(), VizError> {
        let points: Vec<(f64, f64)> = x
            .iter()
            .zip(y)
            .filter(|(a, b)| a.is_finite() && b.is_finite())
            .map(|(&a, &b)| (a, b))
            .collect();
        let (x_lo, x_hi) = padded_span(points.iter().map(|p| p.0));
        let (y_lo, y_hi) = padded_span(points.iter().map(|p| p.1));

        let mut chart = ChartBuilder::on(area)
            .margin(theme.px(6.0))
            .x_label_area_size(theme.px(36.0))
            .y_label_area_size(theme.px(56.0))
            .build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)?;
        chart.plotting_area().fill(&theme.style.panel())?;
        chart
            .configure_mesh()
            .x_desc(self.xdesc())
            .y_desc(self.ydesc())
            .label_style(theme.font(10.0))
            .axis_desc_style(theme.font(12.0))
            .bold_line_style(theme.style.grid().mix(0.7))
            .max_light_lines(0)
            .draw()?;

        // marker size is an area in points squared
        let radius = ((size.max(1.0).sqrt() / 2.0) * theme.scale).round().max(1.0) as i32;
        let fill = color.mix(alpha.clamp(0.0, 1.0)).filled();
        chart.draw_series(points.into_iter().map(|p| Circle::new(p, radius, fill)))?;
        Ok(())
    }

    fn draw_legend<'a, DB, X, Y>(chart: &mut ChartContext<'a, DB, Cartesian2d<X, Y>>, theme: &Theme) -> Result<(), VizError>
    where
        DB: DrawingBackend + 'a,
        X: Ranged<ValueType = f64>,
        Y: Ranged<ValueType = f64>,
    {
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .label_font(theme.font(10.0))
            .draw()?;
        Ok(())
    }
}

/// Label for a tick on a categorical axis; ticks between categories stay blank.
fn label_at(labels: &[String], position: f64) -> String {
    let i = position.round();
    if i < 0.0 || (position - i).abs() > 1e-6 {
        return String::new();
    }
    labels.get(i as usize).cloned().unwrap_or_default()
}

/// Min and max of the finite values; (0, 0) when there are none.
fn value_span(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if lo > hi {
        (0.0, 0.0)
    } else {
        (lo, hi)
    }
}

/// Value span widened by 5% on each side, never zero-width.
fn padded_span(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = value_span(values);
    let pad = if hi > lo { (hi - lo) * 0.05 } else { lo.abs().max(1.0) * 0.5 };
    (lo - pad, hi + pad)
}

fn color_span(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = value_span(values);
    if hi > lo {
        (lo, hi)
    } else {
        (lo - 0.5, hi + 0.5)
    }
}

/// Consecutive finite points, split wherever a value is missing.
fn finite_runs(values: &[f64]) -> Vec<Vec<(f64, f64)>> {
    let mut runs = Vec::new();
    let mut current = Vec::new();
    for (i, &v) in values.iter().enumerate() {
        if v.is_finite() {
            current.push((i as f64, v));
        } else if !current.is_empty() {
            runs.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

/// Equal-width histogram bins over the finite values.
#[derive(Debug, Clone, PartialEq)]
struct Bins {
    start: f64,
    width: f64,
    counts: Vec<usize>,
}

fn bin_counts(values: &[f64], bins: usize) -> Bins {
    let bins = bins.max(1);
    let (lo, hi) = value_span(values.iter().copied());
    let (lo, hi) = if hi > lo { (lo, hi) } else { (lo - 0.5, hi + 0.5) };
    let width = (hi - lo) / bins as f64;
    let mut counts = vec![0; bins];
    for &v in values.iter().filter(|v| v.is_finite()) {
        let i = (((v - lo) / width).floor() as usize).min(bins - 1);
        counts[i] += 1;
    }
    Bins {
        start: lo,
        width,
        counts,
    }
}

/// One pie wedge, angles in radians counter-clockwise from the positive x axis.
#[derive(Debug, Clone, PartialEq)]
struct Slice {
    index: usize,
    start: f64,
    end: f64,
    fraction: f64,
    explode: f64,
}

fn pie_slices(values: &[f64], start_angle: f64, explode: &[f64]) -> Vec<Slice> {
    let total: f64 = values.iter().filter(|v| v.is_finite() && **v > 0.0).sum();
    if total <= 0.0 {
        return Vec::new();
    }
    let mut angle = start_angle.to_radians();
    let mut slices = Vec::new();
    for (index, &v) in values.iter().enumerate() {
        if !(v.is_finite() && v > 0.0) {
            continue;
        }
        let fraction = v / total;
        let end = angle + fraction * std::f64::consts::TAU;
        slices.push(Slice {
            index,
            start: angle,
            end,
            fraction,
            explode: explode.get(index).copied().unwrap_or(0.0),
        });
        angle = end;
    }
    slices
}

fn arc_polygon(origin: (f64, f64), radius: f64, start: f64, end: f64) -> Vec<(i32, i32)> {
    let steps = (((end - start).abs() / std::f64::consts::TAU) * 180.0).ceil().max(2.0) as usize;
    let mut points = vec![(origin.0.round() as i32, origin.1.round() as i32)];
    for s in 0..=steps {
        let a = start + (end - start) * s as f64 / steps as f64;
        points.push((
            (origin.0 + radius * a.cos()).round() as i32,
            (origin.1 - radius * a.sin()).round() as i32,
        ));
    }
    points
}
