use std::fmt;
use std::sync::Arc;

use waveform::Capture;

use crate::decode::AnnotationRenderer;
use crate::mapping::Timebase;
use crate::types::{Rgba, Unit};

/// Stable identity of a channel or decoded stream across frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u32);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VerticalAxis {
    #[default]
    Linear,
    /// Spectral display: values map through `20·log10` onto a dB scale.
    Decibel,
}

/// How a channel's capture reaches the screen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DisplayMode {
    #[default]
    Trace,
    Eye,
    Waterfall,
}

/// Producer of a waterfall field that windows its data to the visible
/// timebase. Called once per frame before the field is uploaded.
pub trait TimebaseFollower: Send + Sync {
    fn follow_timebase(&self, timebase: Timebase);
}

/// Display attributes of one signal. The renderer reads these but never
/// edits them; captures are swapped wholesale by whoever owns the channel.
#[derive(Clone)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub color: Rgba,
    pub enabled: bool,
    /// Added to every value before vertical scaling.
    pub offset: f32,
    /// Vertical span covered by the full plot height.
    pub range: f32,
    pub unit: Unit,
    pub axis: VerticalAxis,
    pub display: DisplayMode,
    /// Physical channels show sample depth and rate in their label.
    pub physical: bool,
    pub capture: Option<Arc<Capture>>,
    pub timebase_follower: Option<Arc<dyn TimebaseFollower>>,
}

impl Channel {
    pub fn new(id: ChannelId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            color: Rgba::opaque(1.0, 1.0, 0.5),
            enabled: true,
            offset: 0.0,
            range: 1.0,
            unit: Unit::Volts,
            axis: VerticalAxis::Linear,
            display: DisplayMode::Trace,
            physical: true,
            capture: None,
            timebase_follower: None,
        }
    }

    pub fn with_capture(mut self, capture: Capture) -> Self {
        self.capture = Some(Arc::new(capture));
        self
    }

    pub fn pixels_per_volt(&self, plot_height: f32) -> f32 {
        plot_height / self.range
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("offset", &self.offset)
            .field("range", &self.range)
            .field("display", &self.display)
            .field("capture", &self.capture.as_ref().map(|c| c.generation()))
            .finish()
    }
}

/// One decoded stream drawn as an annotation row in the overlay.
#[derive(Clone)]
pub struct DecodeOverlay {
    pub id: ChannelId,
    pub name: String,
    pub color: Rgba,
    pub capture: Arc<Capture>,
    pub renderer: Arc<dyn AnnotationRenderer>,
}

impl fmt::Debug for DecodeOverlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeOverlay")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("samples", &self.capture.sample_count())
            .finish()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CursorMode {
    #[default]
    None,
    Single,
    Dual,
}

/// Vertical cursors, positioned in x-axis units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cursors {
    pub mode: CursorMode,
    pub positions: [i64; 2],
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TriggerMarker {
    pub channel: ChannelId,
    pub level: f32,
    pub dragging: bool,
}

/// Horizontal state shared by every channel in a plot, plus cursor and
/// trigger-marker state. Setters bump `revision` so cached geometry can tell
/// when the timebase moved.
#[derive(Clone, Debug)]
pub struct ViewGroup {
    timebase: Timebase,
    revision: u64,
    pub cursors: Cursors,
    pub trigger: Option<TriggerMarker>,
}

impl ViewGroup {
    pub fn new(timebase: Timebase) -> Self {
        Self {
            timebase,
            revision: 0,
            cursors: Cursors::default(),
            trigger: None,
        }
    }

    pub fn timebase(&self) -> Timebase {
        self.timebase
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn set_timebase(&mut self, timebase: Timebase) {
        if timebase != self.timebase {
            self.timebase = timebase;
            self.revision += 1;
        }
    }

    /// Scales the timebase by `factor` keeping the time under `pixel_x` fixed.
    pub fn zoom_about(&mut self, pixel_x: f64, factor: f64) {
        if !(factor.is_finite() && factor > 0.0) {
            return;
        }
        let anchor = self.timebase.pixel_to_x_units(pixel_x);
        let pixels_per_x_unit = self.timebase.pixels_per_x_unit * factor;
        let x_axis_offset = (anchor - pixel_x / pixels_per_x_unit).round() as i64;
        self.set_timebase(Timebase::new(pixels_per_x_unit, x_axis_offset));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revision_tracks_timebase_changes() {
        let mut view = ViewGroup::new(Timebase::new(1.0, 0));
        view.set_timebase(Timebase::new(1.0, 0));
        assert_eq!(view.revision(), 0);
        view.set_timebase(Timebase::new(2.0, 0));
        assert_eq!(view.revision(), 1);
    }

    #[test]
    fn zoom_keeps_anchor_in_place() {
        let mut view = ViewGroup::new(Timebase::new(0.5, 100));
        let before = view.timebase().pixel_to_x_units(200.0);
        view.zoom_about(200.0, 2.0);
        let after = view.timebase().pixel_to_x_units(200.0);
        assert_eq!(view.timebase().pixels_per_x_unit, 1.0);
        assert!((before - after).abs() <= 1.0);
    }

    #[test]
    fn zoom_ignores_bad_factors() {
        let mut view = ViewGroup::new(Timebase::new(0.5, 100));
        view.zoom_about(10.0, 0.0);
        view.zoom_about(10.0, f64::NAN);
        assert_eq!(view.revision(), 0);
    }

    #[test]
    fn pixels_per_volt_follows_range() {
        let mut channel = Channel::new(ChannelId(0), "CH1");
        channel.range = 4.0;
        assert_eq!(channel.pixels_per_volt(400.0), 100.0);
    }
}
