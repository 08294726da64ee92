//! Renderer crate for scopeview, a GPU waveform display.
//!
//! Captures arrive as [`waveform::Capture`]s attached to [`Channel`]s. Each
//! frame turns them into pixels like so:
//!
//! ```text
//!   Channel captures ──▶ geometry::build (rayon, per channel)
//!          │                    │ vertices + column index
//!          │                    ▼
//!          │            raster compute pass ──▶ coverage image per slot
//!          │
//!          ├─▶ special::density_for ──▶ density field + color ramp
//!          │
//!          └─▶ overlay (tiny-skia): underlay grid, decode rows, labels, cursors
//!
//!   composite: underlay ─▶ traces | density ─▶ overlay ─▶ present / PNG
//! ```
//!
//! [`WaveformArea`] owns the scene and sequences a frame through the
//! [`FrameSink`] trait; the wgpu implementation lives in `gpu`. `Renderer` is
//! the thin entry point choosing between the preview window and a one-shot
//! offscreen export.

pub mod compile;
pub mod decode;
pub mod font;
pub mod frame;
mod gpu;
pub mod geometry;
pub mod grid;
pub mod mapping;
pub mod overlay;
pub mod scene;
pub mod special;
pub mod stats;
pub mod types;
mod window;

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Local;

pub use frame::{CompositePass, FrameReport, FrameSink, WaveformArea};
pub use gpu::RasterConfig;
pub use mapping::{CoordinateMapper, Timebase};
pub use scene::{
    Channel, ChannelId, CursorMode, Cursors, DecodeOverlay, DisplayMode, TimebaseFollower,
    TriggerMarker, VerticalAxis, ViewGroup,
};
pub use special::ColorRamp;
pub use types::{DisplaySettings, RenderMode, RendererConfig, Rgba, Unit};
pub use window::WindowRuntime;

/// High-level entry point that owns the renderer configuration.
pub struct Renderer {
    config: RendererConfig,
}

impl Renderer {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Assembles a plot using this renderer's display settings and label font.
    pub fn area(
        &self,
        channels: Vec<Channel>,
        decodes: Vec<DecodeOverlay>,
        view: ViewGroup,
    ) -> WaveformArea {
        let font = font::load_label_font(self.config.display.label_font.as_deref());
        WaveformArea::new(
            channels,
            decodes,
            view,
            self.config.display.clone(),
            font,
            self.config.stats_interval,
        )
    }

    /// Shows `area` in a window, or exports a single frame of it, depending
    /// on the configured mode. Returns once the window closes or the file is
    /// written.
    pub fn run(&self, mut area: WaveformArea) -> Result<()> {
        match &self.config.mode {
            RenderMode::Windowed => self.spawn_window(area)?.wait(),
            RenderMode::Export { path } => self.export(&mut area, path),
        }
    }

    /// Opens the preview window on a background thread. Captures can be
    /// replaced through the returned runtime while it is open.
    pub fn spawn_window(&self, area: WaveformArea) -> Result<WindowRuntime> {
        WindowRuntime::spawn(self.config.clone(), area)
    }

    /// Renders one frame offscreen and writes it to `path` as PNG.
    pub fn export(&self, area: &mut WaveformArea, path: &Path) -> Result<()> {
        let size = self.config.surface_size;
        let mut gpu = gpu::GpuState::headless(size)?;
        area.rebind();
        let report = area.render(&mut gpu, size)?;
        tracing::debug!(traces = report.traces, density = report.density, "exported frame");
        gpu.save_frame(path)
    }
}

/// Timestamped file name used when an export path is not given.
pub fn default_export_path() -> PathBuf {
    PathBuf::from(format!(
        "scopeview-{}.png",
        Local::now().format("%Y%m%d-%H%M%S")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_export_path_is_timestamped_png() {
        let path = default_export_path();
        let name = path.to_string_lossy();
        assert!(name.starts_with("scopeview-"));
        assert!(name.ends_with(".png"));
        assert_eq!(name.len(), "scopeview-YYYYmmdd-HHMMSS.png".len());
    }
}
