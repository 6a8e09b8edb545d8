//! Chart styling: named colours, palettes, colormaps and output formats.

use crate::charts::VizError;
use plotters::style::RGBColor;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Series palette (matplotlib tab10 order).
pub const PALETTE: [RGBColor; 10] = [
    RGBColor(31, 119, 180),  // Blue
    RGBColor(255, 127, 14),  // Orange
    RGBColor(44, 160, 44),   // Green
    RGBColor(214, 39, 40),   // Red
    RGBColor(148, 103, 189), // Purple
    RGBColor(140, 86, 75),   // Brown
    RGBColor(227, 119, 194), // Pink
    RGBColor(127, 127, 127), // Grey
    RGBColor(188, 189, 34),  // Olive
    RGBColor(23, 190, 207),  // Cyan
];

const NAMED_COLORS: [(&str, RGBColor); 22] = [
    ("steelblue", RGBColor(70, 130, 180)),
    ("black", RGBColor(0, 0, 0)),
    ("white", RGBColor(255, 255, 255)),
    ("red", RGBColor(255, 0, 0)),
    ("green", RGBColor(0, 128, 0)),
    ("blue", RGBColor(0, 0, 255)),
    ("yellow", RGBColor(255, 255, 0)),
    ("orange", RGBColor(255, 165, 0)),
    ("purple", RGBColor(128, 0, 128)),
    ("pink", RGBColor(255, 192, 203)),
    ("brown", RGBColor(165, 42, 42)),
    ("gray", RGBColor(128, 128, 128)),
    ("grey", RGBColor(128, 128, 128)),
    ("navy", RGBColor(0, 0, 128)),
    ("teal", RGBColor(0, 128, 128)),
    ("coral", RGBColor(255, 127, 80)),
    ("crimson", RGBColor(220, 20, 60)),
    ("darkgreen", RGBColor(0, 100, 0)),
    ("skyblue", RGBColor(135, 206, 235)),
    ("lightblue", RGBColor(173, 216, 230)),
    ("lightgreen", RGBColor(144, 238, 144)),
    ("gold", RGBColor(255, 215, 0)),
];

/// Parse a colour name or `#rrggbb` hex string.
pub fn parse_color(name: &str) -> Result<RGBColor, VizError> {
    let key = name.trim().to_ascii_lowercase();
    if let Some(hex) = key.strip_prefix('#') {
        if hex.len() == 6 {
            let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
            if let (Some(r), Some(g), Some(b)) = (channel(0), channel(2), channel(4)) {
                return Ok(RGBColor(r, g, b));
            }
        }
        return Err(VizError::UnknownColor(name.to_string()));
    }
    NAMED_COLORS
        .iter()
        .find(|(n, _)| *n == key)
        .map(|(_, c)| *c)
        .ok_or_else(|| VizError::UnknownColor(name.to_string()))
}

/// True when dark text reads better than white text on this colour.
pub fn is_light(color: RGBColor) -> bool {
    let RGBColor(r, g, b) = color;
    let luminance = (0.2126 * r as f64 + 0.7152 * g as f64 + 0.0722 * b as f64) / 255.0;
    luminance > 0.6
}

/// Label colour for text placed on or next to `color`.
pub fn contrasting_text(color: RGBColor) -> RGBColor {
    if is_light(color) {
        RGBColor(0, 0, 0)
    } else {
        RGBColor(255, 255, 255)
    }
}

/// Overall figure look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartStyle {
    /// Grey plot panel with white grid lines
    #[default]
    Ggplot,
    /// White plot panel with light grey grid lines
    Classic,
}

impl ChartStyle {
    pub fn background(self) -> RGBColor {
        RGBColor(255, 255, 255)
    }

    pub fn panel(self) -> RGBColor {
        match self {
            ChartStyle::Ggplot => RGBColor(229, 229, 229),
            ChartStyle::Classic => RGBColor(255, 255, 255),
        }
    }

    pub fn grid(self) -> RGBColor {
        match self {
            ChartStyle::Ggplot => RGBColor(255, 255, 255),
            ChartStyle::Classic => RGBColor(210, 210, 210),
        }
    }

    pub fn text(self) -> RGBColor {
        match self {
            ChartStyle::Ggplot => RGBColor(85, 85, 85),
            ChartStyle::Classic => RGBColor(0, 0, 0),
        }
    }
}

impl FromStr for ChartStyle {
    type Err = VizError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ggplot" => Ok(ChartStyle::Ggplot),
            "classic" => Ok(ChartStyle::Classic),
            other => Err(VizError::UnknownStyle(other.to_string())),
        }
    }
}

/// Image file formats the renderer can write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpg,
    Svg,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpg => "jpg",
            ImageFormat::Svg => "svg",
        }
    }

    /// Format implied by a file extension.
    pub fn from_path(path: &Path) -> Result<Self, VizError> {
        path.extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .parse()
    }
}

impl FromStr for ImageFormat {
    type Err = VizError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ext = s.trim().to_ascii_lowercase();
        match ext.as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpg" | "jpeg" => Ok(ImageFormat::Jpg),
            "svg" => Ok(ImageFormat::Svg),
            _ => Err(VizError::UnsupportedFormat(ext)),
        }
    }
}

/// Sequential and diverging colour scales for heatmaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Colormap {
    #[default]
    Coolwarm,
    Viridis,
    Blues,
    Reds,
    Greys,
}

const COOLWARM: [RGBColor; 5] = [
    RGBColor(59, 76, 192),
    RGBColor(141, 176, 254),
    RGBColor(221, 221, 221),
    RGBColor(244, 154, 123),
    RGBColor(180, 4, 38),
];
const VIRIDIS: [RGBColor; 5] = [
    RGBColor(68, 1, 84),
    RGBColor(59, 82, 139),
    RGBColor(33, 145, 140),
    RGBColor(94, 201, 98),
    RGBColor(253, 231, 37),
];
const BLUES: [RGBColor; 3] = [RGBColor(247, 251, 255), RGBColor(107, 174, 214), RGBColor(8, 48, 107)];
const REDS: [RGBColor; 3] = [RGBColor(255, 245, 240), RGBColor(251, 106, 74), RGBColor(103, 0, 13)];
const GREYS: [RGBColor; 3] = [RGBColor(255, 255, 255), RGBColor(150, 150, 150), RGBColor(0, 0, 0)];

impl Colormap {
    fn anchors(self) -> &'static [RGBColor] {
        match self {
            Colormap::Coolwarm => &COOLWARM,
            Colormap::Viridis => &VIRIDIS,
            Colormap::Blues => &BLUES,
            Colormap::Reds => &REDS,
            Colormap::Greys => &GREYS,
        }
    }

    /// Colour at position `t` in `[0, 1]`; values outside are clamped.
    pub fn color_at(self, t: f64) -> RGBColor {
        let anchors = self.anchors();
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.5 };
        let scaled = t * (anchors.len() - 1) as f64;
        let i = (scaled.floor() as usize).min(anchors.len() - 2);
        let frac = scaled - i as f64;
        let (RGBColor(r0, g0, b0), RGBColor(r1, g1, b1)) = (anchors[i], anchors[i + 1]);
        let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * frac).round() as u8;
        RGBColor(lerp(r0, r1), lerp(g0, g1), lerp(b0, b1))
    }
}

impl FromStr for Colormap {
    type Err = VizError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coolwarm" => Ok(Colormap::Coolwarm),
            "viridis" => Ok(Colormap::Viridis),
            "blues" => Ok(Colormap::Blues),
            "reds" => Ok(Colormap::Reds),
            "greys" | "grays" => Ok(Colormap::Greys),
            _ => Err(VizError::UnknownColormap(s.to_string())),
        }
    }
}
