//! CPU-rasterized layers drawn below and above the GPU trace.
//!
//! ```text
//!   underlay: background gradient, grid, axis labels, trigger marker   (opaque)
//!   overlay:  decode rows, channel info box, cursors                   (transparent)
//! ```
//!
//! Both layers are regenerated every frame into pixmaps that are reused while
//! the surface size stays the same.

mod annotations;
mod canvas;
mod cursors;
mod label;
mod slots;
mod underlay;

use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use tiny_skia::Pixmap;
use tracing::debug;

use crate::font::LabelFont;
use crate::mapping::CoordinateMapper;
use crate::scene::{Channel, DecodeOverlay, ViewGroup};
use crate::types::{DisplaySettings, Rgba};

pub use annotations::{SLOT_HEIGHT, SLOT_SPACING};
pub use canvas::Canvas;
pub use slots::{OverlaySlots, MAX_OVERLAY_SLOTS};

use self::underlay::UnderlayParams;

/// Widest label the axis gutter is sized for.
const GUTTER_SAMPLE: &str = "500 mV_xxx";
const INFO_SPACING: f32 = 2.0;

/// Per-frame inputs to the layer passes.
pub struct LayerInputs<'a> {
    pub channels: &'a [Channel],
    pub decodes: &'a [DecodeOverlay],
    pub view: &'a ViewGroup,
    pub display: &'a DisplaySettings,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LayerTimings {
    pub underlay: Duration,
    pub overlay: Duration,
}

pub struct LayerCompositor {
    font: Box<dyn LabelFont>,
    slots: OverlaySlots,
    underlay: Option<Pixmap>,
    overlay: Option<Pixmap>,
}

impl LayerCompositor {
    pub fn new(font: Box<dyn LabelFont>) -> Self {
        Self {
            font,
            slots: OverlaySlots::new(),
            underlay: None,
            overlay: None,
        }
    }

    pub fn gutter_width(&self) -> f32 {
        self.font.measure(GUTTER_SAMPLE).0
    }

    /// Right edge of the plot area for a surface `width` pixels wide.
    pub fn plot_right(&self, width: u32) -> f32 {
        (width as f32 - self.gutter_width()).max(0.0)
    }

    pub fn slots(&self) -> &OverlaySlots {
        &self.slots
    }

    pub fn underlay(&self) -> Option<&Pixmap> {
        self.underlay.as_ref()
    }

    pub fn overlay(&self) -> Option<&Pixmap> {
        self.overlay.as_ref()
    }

    /// Redraws both layers at `size`.
    pub fn render(&mut self, size: (u32, u32), inputs: &LayerInputs<'_>) -> Result<LayerTimings> {
        let plot_right = self.plot_right(size.0);
        let started = Instant::now();

        let mut underlay = reuse_or_allocate(self.underlay.take(), size)?;
        {
            let mut canvas = Canvas::new(&mut underlay, self.font.as_ref());
            let active = inputs.channels.iter().find(|c| c.enabled).map(|channel| {
                let mapper = CoordinateMapper::new(
                    inputs.view.timebase(),
                    size.1 as f32,
                    channel.range,
                    channel.offset,
                    inputs.display.padding,
                );
                (channel, mapper)
            });
            underlay::draw_underlay(
                &mut canvas,
                &UnderlayParams {
                    active,
                    plot_right,
                    padding: inputs.display.padding,
                    grid_max_lines: inputs.display.grid_max_lines,
                    trigger: inputs.view.trigger,
                },
            );
        }
        self.underlay = Some(underlay);
        let underlay_done = Instant::now();

        let mut overlay = reuse_or_allocate(self.overlay.take(), size)?;
        self.draw_overlay(&mut overlay, plot_right, inputs);
        self.overlay = Some(overlay);

        Ok(LayerTimings {
            underlay: underlay_done - started,
            overlay: underlay_done.elapsed(),
        })
    }

    fn draw_overlay(&mut self, pixmap: &mut Pixmap, plot_right: f32, inputs: &LayerInputs<'_>) {
        let mut canvas = Canvas::new(pixmap, self.font.as_ref());
        canvas.clear(Rgba::new(0.0, 0.0, 0.0, 0.0));
        let timebase = inputs.view.timebase();
        let padding = inputs.display.padding;

        self.slots
            .retain(|id| inputs.decodes.iter().any(|decode| decode.id == id));
        for decode in inputs.decodes {
            match self.slots.assign(decode.id) {
                Some(slot) => annotations::draw_decode_row(
                    &mut canvas,
                    decode,
                    slot,
                    padding,
                    plot_right,
                    timebase,
                ),
                None => debug!(decode = %decode.name, "no free overlay slot"),
            }
        }

        let mut top = canvas.height() - padding;
        for channel in inputs.channels.iter().filter(|c| c.enabled) {
            let text = label::channel_label(channel);
            let bottom = top - label::info_box_height(&canvas, &text);
            label::draw_info_box(&mut canvas, &text, channel.color, bottom);
            top = bottom - INFO_SPACING;
        }

        cursors::draw_cursors(&mut canvas, &inputs.view.cursors, timebase);
    }
}

fn reuse_or_allocate(existing: Option<Pixmap>, size: (u32, u32)) -> Result<Pixmap> {
    match existing {
        Some(pixmap) if pixmap.width() == size.0 && pixmap.height() == size.1 => Ok(pixmap),
        _ => Pixmap::new(size.0, size.1)
            .ok_or_else(|| anyhow!("failed to allocate {}x{} layer", size.0, size.1)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::decode::DigitalLevels;
    use crate::font::BitmapFont;
    use crate::mapping::Timebase;
    use crate::scene::{ChannelId, CursorMode};
    use waveform::{Capture, CaptureData, SampleSeries};

    fn decode(id: u32) -> DecodeOverlay {
        let capture = Arc::new(Capture::new(
            CaptureData::Digital(SampleSeries::dense(vec![true, false, true])),
            1,
            0.0,
        ));
        DecodeOverlay {
            id: ChannelId(id),
            name: format!("D{id}"),
            color: Rgba::opaque(0.0, 1.0, 1.0),
            capture: capture.clone(),
            renderer: Arc::new(DigitalLevels::new(capture)),
        }
    }

    fn render(compositor: &mut LayerCompositor, decodes: &[DecodeOverlay], view: &ViewGroup) {
        let channels = vec![Channel::new(ChannelId(0), "CH1")];
        let display = DisplaySettings::default();
        let inputs = LayerInputs {
            channels: &channels,
            decodes,
            view,
            display: &display,
        };
        compositor.render((200, 120), &inputs).unwrap();
    }

    #[test]
    fn decode_slots_persist_across_frames() {
        let mut compositor = LayerCompositor::new(Box::new(BitmapFont::default()));
        let view = ViewGroup::new(Timebase::new(1.0, 0));
        let (a, b, c) = (decode(1), decode(2), decode(3));

        render(&mut compositor, &[a.clone(), b.clone()], &view);
        assert_eq!(compositor.slots().slot_of(a.id), Some(0));
        assert_eq!(compositor.slots().slot_of(b.id), Some(1));

        render(&mut compositor, &[b.clone(), c.clone()], &view);
        assert_eq!(compositor.slots().slot_of(a.id), None);
        assert_eq!(compositor.slots().slot_of(b.id), Some(1));
        assert_eq!(compositor.slots().slot_of(c.id), Some(0));
    }

    #[test]
    fn overlay_is_cleared_between_frames() {
        let mut compositor = LayerCompositor::new(Box::new(BitmapFont::default()));
        let mut view = ViewGroup::new(Timebase::new(1.0, 0));
        view.cursors = crate::scene::Cursors {
            mode: CursorMode::Single,
            positions: [150, 0],
        };
        render(&mut compositor, &[], &view);
        let column_alpha = |pixmap: &Pixmap| pixmap.data()[(60 * 200 + 150) * 4 + 3];
        assert_eq!(column_alpha(compositor.overlay().unwrap()), 255);

        view.cursors.mode = CursorMode::None;
        render(&mut compositor, &[], &view);
        assert_eq!(column_alpha(compositor.overlay().unwrap()), 0);
    }

    #[test]
    fn layers_match_surface_size() {
        let mut compositor = LayerCompositor::new(Box::new(BitmapFont::default()));
        let view = ViewGroup::new(Timebase::new(1.0, 0));
        render(&mut compositor, &[], &view);
        let underlay = compositor.underlay().unwrap();
        assert_eq!((underlay.width(), underlay.height()), (200, 120));
        assert_eq!(compositor.plot_right(200), 200.0 - compositor.gutter_width());
    }
}
