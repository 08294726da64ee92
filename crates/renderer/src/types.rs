use std::path::PathBuf;
use std::time::Duration;

use crate::special::ColorRamp;

/// Straight (non-premultiplied) RGBA color with components in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const BLACK: Rgba = Rgba::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Rgba = Rgba::new(1.0, 1.0, 1.0, 1.0);
    pub const RED: Rgba = Rgba::new(1.0, 0.0, 0.0, 1.0);
    pub const YELLOW: Rgba = Rgba::new(1.0, 1.0, 0.0, 1.0);
    pub const ORANGE: Rgba = Rgba::new(1.0, 0.5, 0.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: f32, g: f32, b: f32) -> Self {
        Self::new(r, g, b, 1.0)
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }

    /// Scales the color components, leaving alpha untouched.
    pub fn scaled(self, factor: f32) -> Self {
        Self::new(self.r * factor, self.g * factor, self.b * factor, self.a)
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub(crate) fn to_skia(self) -> tiny_skia::Color {
        tiny_skia::Color::from_rgba(
            self.r.clamp(0.0, 1.0),
            self.g.clamp(0.0, 1.0),
            self.b.clamp(0.0, 1.0),
            self.a.clamp(0.0, 1.0),
        )
        .unwrap_or(tiny_skia::Color::BLACK)
    }
}

impl From<[f32; 3]> for Rgba {
    fn from(rgb: [f32; 3]) -> Self {
        Rgba::opaque(rgb[0], rgb[1], rgb[2])
    }
}

/// Physical unit of a channel's vertical axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unit {
    Volts,
    Amps,
    Watts,
    Hertz,
    Decibels,
    Counts,
}

const SI_PREFIXES: [(f64, &str); 9] = [
    (1e12, "T"),
    (1e9, "G"),
    (1e6, "M"),
    (1e3, "k"),
    (1.0, ""),
    (1e-3, "m"),
    (1e-6, "μ"),
    (1e-9, "n"),
    (1e-12, "p"),
];

impl Unit {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "V" | "v" | "volts" => Some(Unit::Volts),
            "A" | "a" | "amps" => Some(Unit::Amps),
            "W" | "w" | "watts" => Some(Unit::Watts),
            "Hz" | "hz" | "hertz" => Some(Unit::Hertz),
            "dB" | "db" | "decibels" => Some(Unit::Decibels),
            "" | "counts" => Some(Unit::Counts),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Unit::Volts => "V",
            Unit::Amps => "A",
            Unit::Watts => "W",
            Unit::Hertz => "Hz",
            Unit::Decibels => "dB",
            Unit::Counts => "",
        }
    }

    /// Formats `value` with an SI prefix, e.g. `0.5` volts as `500 mV`.
    pub fn pretty_print(self, value: f64) -> String {
        if matches!(self, Unit::Decibels | Unit::Counts) {
            return format!("{} {}", trim_number(value), self.symbol())
                .trim_end()
                .to_string();
        }
        let magnitude = value.abs();
        let (scale, prefix) = if magnitude == 0.0 || !magnitude.is_finite() {
            (1.0, "")
        } else {
            SI_PREFIXES
                .iter()
                .copied()
                .find(|(scale, _)| magnitude >= *scale * 0.9995)
                .unwrap_or((1e-12, "p"))
        };
        format!("{} {prefix}{}", trim_number(value / scale), self.symbol())
    }
}

fn trim_number(value: f64) -> String {
    let text = format!("{value:.3}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".into()
    } else {
        text.into()
    }
}

/// Where finished frames go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderMode {
    /// Interactive preview window driven by `winit`.
    Windowed,
    /// Render a single frame offscreen and write it as PNG.
    Export { path: PathBuf },
}

/// Immutable configuration passed to the renderer at start-up.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub surface_size: (u32, u32),
    pub mode: RenderMode,
    pub display: DisplaySettings,
    pub stats_interval: Duration,
}

/// Settings that shape every frame; fixed for the lifetime of a plot.
#[derive(Debug, Clone)]
pub struct DisplaySettings {
    pub trace_alpha: f32,
    pub color_ramp: ColorRamp,
    pub grid_max_lines: u32,
    /// Vertical inset of the plot rectangle, in pixels.
    pub padding: f32,
    pub label_font: Option<PathBuf>,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            trace_alpha: 0.5,
            color_ramp: ColorRamp::default(),
            grid_max_lines: 5,
            padding: 2.0,
            label_font: None,
        }
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            surface_size: (1280, 720),
            mode: RenderMode::Windowed,
            display: DisplaySettings::default(),
            stats_interval: Duration::from_secs(5),
        }
    }
}
