//! Per-frame sequencing.
//!
//! ```text
//!   begin_frame ─▶ bind_output (first frame) ─▶ geometry ─▶ raster / density
//!        ─▶ layers ─▶ composite: underlay ─▶ traces | density ─▶ overlay ─▶ finish
//! ```
//!
//! The orchestrator talks to the GPU only through [`FrameSink`], so the whole
//! sequence runs against a recording sink in tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use rayon::prelude::*;
use tiny_skia::Pixmap;
use tracing::{debug, warn};
use waveform::{Capture, DensityField};

use crate::font::LabelFont;
use crate::geometry::{self, BuildTimings, GeometryError, TraceGeometry};
use crate::gpu::RasterConfig;
use crate::mapping::CoordinateMapper;
use crate::overlay::{LayerCompositor, LayerInputs};
use crate::scene::{Channel, ChannelId, DecodeOverlay, DisplayMode, VerticalAxis, ViewGroup};
use crate::special::{self, ColorRamp};
use crate::stats::{FrameStats, Stage};
use crate::types::{DisplaySettings, Rgba};

/// One blend step into the visible framebuffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompositePass {
    /// Opaque first write.
    Underlay,
    /// Raster coverage for `slot`, tinted with `color`.
    Trace {
        slot: usize,
        color: Rgba,
        plot_right: f32,
    },
    /// Special-mode density texture through the color ramp.
    Density { plot_right: f32 },
    /// Premultiplied layer drawn last.
    Overlay,
}

impl CompositePass {
    fn name(&self) -> &'static str {
        match self {
            CompositePass::Underlay => "underlay",
            CompositePass::Trace { .. } => "trace",
            CompositePass::Density { .. } => "density",
            CompositePass::Overlay => "overlay",
        }
    }
}

/// GPU side of a frame.
pub trait FrameSink {
    /// Acquires the target for a frame of `size`. Failing here skips the frame.
    fn begin_frame(&mut self, size: (u32, u32)) -> Result<()>;

    /// Captures the display's output target; called on the first frame only.
    fn bind_output(&mut self) -> Result<()>;

    /// Replaces the vertex and column buffers held for `slot`.
    fn upload_geometry(&mut self, slot: usize, geometry: &TraceGeometry) -> Result<()>;

    /// Rasterizes the buffers held for `slot` into its coverage image.
    fn raster_trace(&mut self, slot: usize, config: RasterConfig) -> Result<()>;

    fn upload_density(&mut self, field: &DensityField, ramp: ColorRamp) -> Result<()>;

    fn upload_layers(&mut self, underlay: &Pixmap, overlay: &Pixmap) -> Result<()>;

    fn composite(&mut self, pass: CompositePass) -> Result<()>;

    /// Submits the frame and reports any graphics error raised during it.
    fn finish(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompositeOrderError {
    #[error("{0} composited before the underlay")]
    BeforeUnderlay(&'static str),
    #[error("underlay composited twice")]
    DuplicateUnderlay,
    #[error("{0} composited after the overlay")]
    AfterOverlay(&'static str),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Phase {
    #[default]
    Start,
    Underlay,
    Traces,
    Overlay,
}

/// Enforces underlay, then traces, then overlay within one frame.
#[derive(Debug, Default)]
pub struct CompositeSequence {
    phase: Phase,
}

impl CompositeSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.phase = Phase::Start;
    }

    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Overlay
    }

    pub fn advance(&mut self, pass: &CompositePass) -> Result<(), CompositeOrderError> {
        let next = match (self.phase, pass) {
            (Phase::Overlay, pass) => return Err(CompositeOrderError::AfterOverlay(pass.name())),
            (Phase::Start, CompositePass::Underlay) => Phase::Underlay,
            (_, CompositePass::Underlay) => return Err(CompositeOrderError::DuplicateUnderlay),
            (Phase::Start, pass) => return Err(CompositeOrderError::BeforeUnderlay(pass.name())),
            (_, CompositePass::Overlay) => Phase::Overlay,
            (_, CompositePass::Trace { .. } | CompositePass::Density { .. }) => Phase::Traces,
        };
        self.phase = next;
        Ok(())
    }
}

/// Everything that decides whether a channel's geometry is still valid.
#[derive(Debug, Clone, Copy, PartialEq)]
struct GeometryKey {
    generation: u64,
    view_revision: u64,
    offset: u32,
    range: u32,
    padding: u32,
    plot: (u32, u32),
    axis: VerticalAxis,
    slot: usize,
}

impl GeometryKey {
    fn new(
        capture: &Capture,
        channel: &Channel,
        view: &ViewGroup,
        display: &DisplaySettings,
        plot: (u32, u32),
        slot: usize,
    ) -> Self {
        Self {
            generation: capture.generation(),
            view_revision: view.revision(),
            offset: channel.offset.to_bits(),
            range: channel.range.to_bits(),
            padding: display.padding.to_bits(),
            plot,
            axis: channel.axis,
            slot,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    key: GeometryKey,
    /// Sample count of the uploaded geometry; `None` when the build failed.
    depth: Option<u32>,
}

/// Remembers which channel geometries are already on the GPU.
#[derive(Debug, Default)]
pub struct GeometryCache {
    entries: HashMap<ChannelId, CacheEntry>,
    hits: u64,
    misses: u64,
}

impl GeometryCache {
    fn lookup(&mut self, id: ChannelId, key: &GeometryKey) -> Option<Option<u32>> {
        match self.entries.get(&id) {
            Some(entry) if entry.key == *key => {
                self.hits += 1;
                Some(entry.depth)
            }
            _ => {
                self.misses += 1;
                None
            }
        }
    }

    fn store(&mut self, id: ChannelId, key: GeometryKey, depth: Option<u32>) {
        self.entries.insert(id, CacheEntry { key, depth });
    }

    fn retain(&mut self, live: impl Fn(ChannelId) -> bool) {
        self.entries.retain(|id, _| live(*id));
    }

    pub fn invalidate(&mut self) {
        self.entries.clear();
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

/// What a frame ended up drawing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub traces: usize,
    pub density: bool,
}

struct TraceJob<'a> {
    id: ChannelId,
    slot: usize,
    key: GeometryKey,
    capture: &'a Capture,
    mapper: CoordinateMapper,
    axis: VerticalAxis,
}

/// A plot: its channels, decode rows, shared view and per-frame machinery.
pub struct WaveformArea {
    channels: Vec<Channel>,
    decodes: Vec<DecodeOverlay>,
    view: ViewGroup,
    display: DisplaySettings,
    layers: LayerCompositor,
    cache: GeometryCache,
    stats: FrameStats,
    sequence: CompositeSequence,
    first_frame: bool,
}

impl WaveformArea {
    pub fn new(
        channels: Vec<Channel>,
        decodes: Vec<DecodeOverlay>,
        view: ViewGroup,
        display: DisplaySettings,
        font: Box<dyn LabelFont>,
        stats_interval: Duration,
    ) -> Self {
        Self {
            channels,
            decodes,
            view,
            display,
            layers: LayerCompositor::new(font),
            cache: GeometryCache::default(),
            stats: FrameStats::new(stats_interval, Instant::now()),
            sequence: CompositeSequence::new(),
            first_frame: true,
        }
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn decodes(&self) -> &[DecodeOverlay] {
        &self.decodes
    }

    pub fn view(&self) -> &ViewGroup {
        &self.view
    }

    /// View state may only change between frames.
    pub fn view_mut(&mut self) -> &mut ViewGroup {
        &mut self.view
    }

    pub fn display(&self) -> &DisplaySettings {
        &self.display
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    pub fn cache(&self) -> &GeometryCache {
        &self.cache
    }

    /// Forgets everything tied to the previous sink. Call before rendering
    /// into a different sink: its output is bound again on the next frame and
    /// every trace is rebuilt and uploaded.
    pub fn rebind(&mut self) {
        self.first_frame = true;
        self.cache.invalidate();
    }

    pub fn plot_right(&self, width: u32) -> f32 {
        self.layers.plot_right(width)
    }

    /// Swaps in a new capture for channel `id`. Returns `false` if no such
    /// channel exists.
    pub fn replace_capture(&mut self, id: ChannelId, capture: Arc<Capture>) -> bool {
        match self.channels.iter_mut().find(|channel| channel.id == id) {
            Some(channel) => {
                channel.capture = Some(capture);
                true
            }
            None => false,
        }
    }

    /// Channel whose display mode decides between traces and density.
    fn primary(&self) -> Option<&Channel> {
        self.channels.iter().find(|channel| channel.enabled)
    }

    /// Renders one frame into `sink`. Only a failure to start the frame or a
    /// broken composite order is returned; every other problem is logged and
    /// the frame completes with whatever could be drawn.
    pub fn render(&mut self, sink: &mut dyn FrameSink, size: (u32, u32)) -> Result<FrameReport> {
        let started = Instant::now();
        self.stats.begin_frame(started);
        self.sequence.reset();
        sink.begin_frame(size)?;

        if self.first_frame {
            match sink.bind_output() {
                Ok(()) => self.first_frame = false,
                Err(err) => warn!(error = %err, "failed to bind display output"),
            }
        }

        let plot_right = self.layers.plot_right(size.0);
        let plot = (plot_right.ceil() as u32, size.1);
        let special = self
            .primary()
            .is_some_and(|channel| channel.display != DisplayMode::Trace);

        let traces = if special {
            Vec::new()
        } else {
            self.raster_traces(sink, plot)
        };

        let mut density = false;
        if special {
            let timebase = self.view.timebase();
            let upload = Instant::now();
            let field = self
                .channels
                .iter()
                .find(|channel| channel.enabled)
                .and_then(|channel| special::density_for(channel, timebase));
            if let Some(field) = field {
                match sink.upload_density(field, self.display.color_ramp) {
                    Ok(()) => density = true,
                    Err(err) => warn!(error = %err, "density upload failed"),
                }
            }
            self.stats.add(Stage::Upload, upload.elapsed());
        }

        let inputs = LayerInputs {
            channels: &self.channels,
            decodes: &self.decodes,
            view: &self.view,
            display: &self.display,
        };
        match self.layers.render(size, &inputs) {
            Ok(timings) => {
                self.stats.add(Stage::Underlay, timings.underlay);
                self.stats.add(Stage::Overlay, timings.overlay);
            }
            Err(err) => warn!(error = %err, "layer rendering failed"),
        }
        if let (Some(underlay), Some(overlay)) = (self.layers.underlay(), self.layers.overlay()) {
            let upload = Instant::now();
            if let Err(err) = sink.upload_layers(underlay, overlay) {
                warn!(error = %err, "layer upload failed");
            }
            self.stats.add(Stage::Upload, upload.elapsed());
        }

        self.composite(sink, CompositePass::Underlay)?;
        for &(slot, color) in &traces {
            self.composite(
                sink,
                CompositePass::Trace {
                    slot,
                    color,
                    plot_right,
                },
            )?;
        }
        if density {
            self.composite(sink, CompositePass::Density { plot_right })?;
        }
        self.composite(sink, CompositePass::Overlay)?;

        if let Err(err) = sink.finish() {
            warn!(error = %err, "graphics error during frame");
        }

        let now = Instant::now();
        self.stats.add(Stage::Render, now - started);
        self.stats.maybe_report(now);
        Ok(FrameReport {
            traces: traces.len(),
            density,
        })
    }

    fn composite(&mut self, sink: &mut dyn FrameSink, pass: CompositePass) -> Result<()> {
        self.sequence.advance(&pass)?;
        if let Err(err) = sink.composite(pass) {
            warn!(pass = pass.name(), error = %err, "composite failed");
        }
        Ok(())
    }

    /// Builds stale geometry in parallel, uploads it and dispatches the
    /// raster pass for every drawable channel. Returns the slots that hold a
    /// fresh coverage image along with their tint.
    fn raster_traces(&mut self, sink: &mut dyn FrameSink, plot: (u32, u32)) -> Vec<(usize, Rgba)> {
        let timebase = self.view.timebase();
        let live: Vec<ChannelId> = self.channels.iter().map(|c| c.id).collect();
        self.cache.retain(|id| live.contains(&id));

        let mut cached = Vec::new();
        let mut jobs = Vec::new();
        for (slot, channel) in self.channels.iter().enumerate() {
            if !channel.enabled || channel.display != DisplayMode::Trace {
                continue;
            }
            let Some(capture) = channel.capture.as_deref() else {
                continue;
            };
            let key = GeometryKey::new(capture, channel, &self.view, &self.display, plot, slot);
            match self.cache.lookup(channel.id, &key) {
                Some(depth) => cached.push((slot, depth)),
                None => jobs.push(TraceJob {
                    id: channel.id,
                    slot,
                    key,
                    capture,
                    mapper: CoordinateMapper::new(
                        timebase,
                        plot.1 as f32,
                        channel.range,
                        channel.offset,
                        self.display.padding,
                    ),
                    axis: channel.axis,
                }),
            }
        }

        let built: Vec<(&TraceJob<'_>, Result<(TraceGeometry, BuildTimings), GeometryError>)> = jobs
            .par_iter()
            .map(|job| (job, geometry::build(job.capture, &job.mapper, job.axis, plot.0)))
            .collect();

        let mut ready = cached;
        for (job, result) in built {
            match result {
                Ok((geometry, timings)) => {
                    self.stats.add(Stage::Prepare, timings.transform);
                    self.stats.add(Stage::Index, timings.scan);
                    let upload = Instant::now();
                    let uploaded = sink.upload_geometry(job.slot, &geometry);
                    self.stats.add(Stage::Upload, upload.elapsed());
                    match uploaded {
                        Ok(()) => {
                            let depth = geometry.sample_count() as u32;
                            self.cache.store(job.id, job.key, Some(depth));
                            ready.push((job.slot, Some(depth)));
                        }
                        Err(err) => warn!(slot = job.slot, error = %err, "geometry upload failed"),
                    }
                }
                Err(err) => {
                    debug!(slot = job.slot, error = %err, "skipping trace");
                    self.cache.store(job.id, job.key, None);
                }
            }
        }
        ready.sort_by_key(|&(slot, _)| slot);

        let mut drawn = Vec::new();
        for (slot, depth) in ready {
            let Some(depth) = depth else { continue };
            let config = RasterConfig::new(plot.0, plot.1, depth, self.display.trace_alpha);
            match sink.raster_trace(slot, config) {
                Ok(()) => drawn.push((slot, self.channels[slot].color)),
                Err(err) => warn!(slot, error = %err, "raster dispatch failed"),
            }
        }
        drawn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::BitmapFont;
    use crate::mapping::Timebase;
    use waveform::{CaptureData, SampleSeries};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Begin((u32, u32)),
        Bind,
        Geometry(usize, usize),
        Raster(usize, RasterConfig),
        Density(u32, u32),
        Layers,
        Composite(CompositePass),
        Finish,
    }

    #[derive(Default)]
    struct RecordingSink {
        calls: Vec<Call>,
        fail_finish: bool,
    }

    impl FrameSink for RecordingSink {
        fn begin_frame(&mut self, size: (u32, u32)) -> Result<()> {
            self.calls.push(Call::Begin(size));
            Ok(())
        }

        fn bind_output(&mut self) -> Result<()> {
            self.calls.push(Call::Bind);
            Ok(())
        }

        fn upload_geometry(&mut self, slot: usize, geometry: &TraceGeometry) -> Result<()> {
            self.calls.push(Call::Geometry(slot, geometry.sample_count()));
            Ok(())
        }

        fn raster_trace(&mut self, slot: usize, config: RasterConfig) -> Result<()> {
            self.calls.push(Call::Raster(slot, config));
            Ok(())
        }

        fn upload_density(&mut self, field: &DensityField, _ramp: ColorRamp) -> Result<()> {
            self.calls.push(Call::Density(field.width(), field.height()));
            Ok(())
        }

        fn upload_layers(&mut self, _underlay: &Pixmap, _overlay: &Pixmap) -> Result<()> {
            self.calls.push(Call::Layers);
            Ok(())
        }

        fn composite(&mut self, pass: CompositePass) -> Result<()> {
            self.calls.push(Call::Composite(pass));
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            self.calls.push(Call::Finish);
            if self.fail_finish {
                anyhow::bail!("validation error");
            }
            Ok(())
        }
    }

    impl RecordingSink {
        fn composites(&self) -> Vec<&'static str> {
            self.calls
                .iter()
                .filter_map(|call| match call {
                    Call::Composite(pass) => Some(pass.name()),
                    _ => None,
                })
                .collect()
        }

        fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
            self.calls.iter().filter(|call| matches(call)).count()
        }
    }

    fn analog(values: Vec<f32>) -> Capture {
        Capture::new(CaptureData::Analog(SampleSeries::dense(values)), 1, 0.0)
    }

    fn area(channels: Vec<Channel>) -> WaveformArea {
        WaveformArea::new(
            channels,
            Vec::new(),
            ViewGroup::new(Timebase::new(1.0, 0)),
            DisplaySettings::default(),
            Box::new(BitmapFont::default()),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn empty_capture_skips_raster_but_completes_frame() {
        let channel = Channel::new(ChannelId(0), "CH1").with_capture(analog(Vec::new()));
        let mut area = area(vec![channel]);
        let mut sink = RecordingSink::default();
        let report = area.render(&mut sink, (320, 200)).unwrap();

        assert_eq!(report, FrameReport::default());
        assert_eq!(sink.count(|c| matches!(c, Call::Raster(..))), 0);
        assert_eq!(sink.count(|c| matches!(c, Call::Geometry(..))), 0);
        assert_eq!(sink.composites(), vec!["underlay", "overlay"]);
        assert_eq!(sink.calls.last(), Some(&Call::Finish));
    }

    #[test]
    fn traces_composite_between_layers() {
        let channels = vec![
            Channel::new(ChannelId(0), "CH1").with_capture(analog(vec![0.0; 64])),
            Channel::new(ChannelId(1), "CH2").with_capture(analog(vec![0.5; 32])),
        ];
        let mut area = area(channels);
        let mut sink = RecordingSink::default();
        let report = area.render(&mut sink, (320, 200)).unwrap();

        assert_eq!(report.traces, 2);
        assert_eq!(sink.composites(), vec!["underlay", "trace", "trace", "overlay"]);
        assert_eq!(sink.calls[0], Call::Begin((320, 200)));
        assert_eq!(sink.calls[1], Call::Bind);
        let plot_width = area.plot_right(320).ceil() as u32;
        assert!(sink.calls.contains(&Call::Raster(
            1,
            RasterConfig::new(plot_width, 200, 32, 0.5)
        )));
    }

    #[test]
    fn output_is_bound_on_first_frame_only() {
        let channel = Channel::new(ChannelId(0), "CH1").with_capture(analog(vec![0.0; 8]));
        let mut area = area(vec![channel]);
        let mut sink = RecordingSink::default();
        area.render(&mut sink, (320, 200)).unwrap();
        area.render(&mut sink, (320, 200)).unwrap();
        assert_eq!(sink.count(|c| *c == Call::Bind), 1);
    }

    #[test]
    fn new_sink_is_bound_and_receives_geometry_after_rebind() {
        let channel = Channel::new(ChannelId(0), "CH1").with_capture(analog(vec![0.0; 8]));
        let mut area = area(vec![channel]);
        let mut first = RecordingSink::default();
        area.render(&mut first, (320, 200)).unwrap();

        let mut second = RecordingSink::default();
        area.rebind();
        area.render(&mut second, (320, 200)).unwrap();
        assert_eq!(second.count(|c| *c == Call::Bind), 1);
        assert_eq!(second.count(|c| *c == Call::Geometry(0, 8)), 1);
        assert_eq!(second.count(|c| matches!(c, Call::Raster(..))), 1);
        assert_eq!(second.composites(), vec!["underlay", "trace", "overlay"]);
    }

    #[test]
    fn unchanged_geometry_is_not_rebuilt() {
        let channel = Channel::new(ChannelId(0), "CH1").with_capture(analog(vec![0.0; 8]));
        let mut area = area(vec![channel]);
        let mut sink = RecordingSink::default();
        area.render(&mut sink, (320, 200)).unwrap();
        area.render(&mut sink, (320, 200)).unwrap();
        assert_eq!(sink.count(|c| matches!(c, Call::Geometry(..))), 1);
        assert_eq!(sink.count(|c| matches!(c, Call::Raster(..))), 2);
        assert_eq!(area.cache().hits(), 1);

        area.view_mut().zoom_about(10.0, 2.0);
        area.render(&mut sink, (320, 200)).unwrap();
        assert_eq!(sink.count(|c| matches!(c, Call::Geometry(..))), 2);

        assert!(area.replace_capture(ChannelId(0), Arc::new(analog(vec![1.0; 4]))));
        area.render(&mut sink, (320, 200)).unwrap();
        assert_eq!(sink.calls.iter().filter(|c| **c == Call::Geometry(0, 4)).count(), 1);
    }

    #[test]
    fn special_mode_uploads_density_instead_of_traces() {
        let field = DensityField::new(4, 3, vec![1.0; 12]).unwrap();
        let mut eye =
            Channel::new(ChannelId(0), "EYE").with_capture(Capture::new(CaptureData::Eye(field), 1, 0.0));
        eye.display = DisplayMode::Eye;
        let other = Channel::new(ChannelId(1), "CH2").with_capture(analog(vec![0.0; 8]));
        let mut area = area(vec![eye, other]);
        let mut sink = RecordingSink::default();
        let report = area.render(&mut sink, (320, 200)).unwrap();

        assert!(report.density);
        assert_eq!(report.traces, 0);
        assert!(sink.calls.contains(&Call::Density(4, 3)));
        assert_eq!(sink.composites(), vec!["underlay", "density", "overlay"]);
    }

    #[test]
    fn graphics_errors_do_not_fail_the_frame() {
        let channel = Channel::new(ChannelId(0), "CH1").with_capture(analog(vec![0.0; 8]));
        let mut area = area(vec![channel]);
        let mut sink = RecordingSink {
            fail_finish: true,
            ..RecordingSink::default()
        };
        assert!(area.render(&mut sink, (320, 200)).is_ok());
        assert_eq!(area.stats().frames(), 1);
    }

    #[test]
    fn overlay_before_trace_is_rejected() {
        let mut sequence = CompositeSequence::new();
        let trace = CompositePass::Trace {
            slot: 0,
            color: Rgba::WHITE,
            plot_right: 100.0,
        };
        sequence.advance(&CompositePass::Underlay).unwrap();
        sequence.advance(&CompositePass::Overlay).unwrap();
        assert_eq!(
            sequence.advance(&trace),
            Err(CompositeOrderError::AfterOverlay("trace"))
        );
        assert!(sequence.is_complete());
    }

    #[test]
    fn underlay_must_come_first_and_once() {
        let mut sequence = CompositeSequence::new();
        assert_eq!(
            sequence.advance(&CompositePass::Overlay),
            Err(CompositeOrderError::BeforeUnderlay("overlay"))
        );
        sequence.advance(&CompositePass::Underlay).unwrap();
        assert_eq!(
            sequence.advance(&CompositePass::Underlay),
            Err(CompositeOrderError::DuplicateUnderlay)
        );
        sequence
            .advance(&CompositePass::Density { plot_right: 10.0 })
            .unwrap();
        sequence.advance(&CompositePass::Overlay).unwrap();
    }
}
