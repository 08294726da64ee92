//! Eye-diagram and waterfall displays.
//!
//! These modes skip trace geometry entirely: the capture already holds a
//! density field, which is uploaded as a texture and mapped through a color
//! ramp by the density pass.

use tracing::debug;
use waveform::{CaptureData, DensityField};

use crate::mapping::Timebase;
use crate::scene::{Channel, DisplayMode};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ColorRamp {
    #[default]
    Crt,
    Ironbow,
    Grayscale,
    Viridis,
    Rainbow,
}

type Stop = (f32, [f32; 3]);

const CRT: &[Stop] = &[
    (0.0, [0.0, 0.05, 0.0]),
    (0.3, [0.0, 0.4, 0.1]),
    (0.7, [0.2, 1.0, 0.3]),
    (1.0, [0.9, 1.0, 0.9]),
];
const IRONBOW: &[Stop] = &[
    (0.0, [0.0, 0.0, 0.1]),
    (0.25, [0.3, 0.0, 0.55]),
    (0.5, [0.85, 0.15, 0.35]),
    (0.75, [1.0, 0.6, 0.0]),
    (1.0, [1.0, 1.0, 0.9]),
];
const GRAYSCALE: &[Stop] = &[(0.0, [0.0, 0.0, 0.0]), (1.0, [1.0, 1.0, 1.0])];
const VIRIDIS: &[Stop] = &[
    (0.0, [0.267, 0.005, 0.329]),
    (0.25, [0.229, 0.322, 0.546]),
    (0.5, [0.128, 0.567, 0.551]),
    (0.75, [0.369, 0.789, 0.383]),
    (1.0, [0.993, 0.906, 0.144]),
];
const RAINBOW: &[Stop] = &[
    (0.0, [0.0, 0.0, 1.0]),
    (0.25, [0.0, 1.0, 1.0]),
    (0.5, [0.0, 1.0, 0.0]),
    (0.75, [1.0, 1.0, 0.0]),
    (1.0, [1.0, 0.0, 0.0]),
];

impl ColorRamp {
    pub const ALL: [ColorRamp; 5] = [
        ColorRamp::Crt,
        ColorRamp::Ironbow,
        ColorRamp::Grayscale,
        ColorRamp::Viridis,
        ColorRamp::Rainbow,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ColorRamp::Crt => "crt",
            ColorRamp::Ironbow => "ironbow",
            ColorRamp::Grayscale => "grayscale",
            ColorRamp::Viridis => "viridis",
            ColorRamp::Rainbow => "rainbow",
        }
    }

    fn stops(self) -> &'static [Stop] {
        match self {
            ColorRamp::Crt => CRT,
            ColorRamp::Ironbow => IRONBOW,
            ColorRamp::Grayscale => GRAYSCALE,
            ColorRamp::Viridis => VIRIDIS,
            ColorRamp::Rainbow => RAINBOW,
        }
    }

    /// 256-entry RGBA8 lookup table. Entry 0 is fully transparent so empty
    /// bins show the underlay.
    pub fn lut(self) -> [[u8; 4]; 256] {
        let stops = self.stops();
        let mut table = [[0u8; 4]; 256];
        for (index, entry) in table.iter_mut().enumerate().skip(1) {
            let t = index as f32 / 255.0;
            let upper = stops
                .iter()
                .position(|&(at, _)| at >= t)
                .unwrap_or(stops.len() - 1)
                .max(1);
            let (t0, c0) = stops[upper - 1];
            let (t1, c1) = stops[upper];
            let mix = ((t - t0) / (t1 - t0).max(f32::EPSILON)).clamp(0.0, 1.0);
            for channel in 0..3 {
                let value = c0[channel] + (c1[channel] - c0[channel]) * mix;
                entry[channel] = (value * 255.0).round().clamp(0.0, 255.0) as u8;
            }
            entry[3] = 255;
        }
        table
    }
}

/// Density field to show for `channel` this frame, if its display mode is
/// a special mode and the capture carries a matching field.
///
/// Waterfall producers are told the current timebase first so the next
/// field they publish lines up with the view.
pub fn density_for(channel: &Channel, timebase: Timebase) -> Option<&DensityField> {
    if channel.display == DisplayMode::Waterfall {
        if let Some(follower) = &channel.timebase_follower {
            follower.follow_timebase(timebase);
        }
    }

    let capture = channel.capture.as_deref()?;
    match (channel.display, capture.data()) {
        (DisplayMode::Trace, _) => None,
        (DisplayMode::Eye, CaptureData::Eye(field))
        | (DisplayMode::Waterfall, CaptureData::Waterfall(field)) => Some(field),
        (mode, _) => {
            debug!(
                channel = %channel.name,
                ?mode,
                kind = %capture.kind(),
                "capture does not match display mode; skipping"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::scene::{ChannelId, TimebaseFollower};
    use waveform::{Capture, SampleSeries};

    fn field() -> DensityField {
        DensityField::new(2, 2, vec![0.0, 1.0, 2.0, 3.0]).unwrap()
    }

    #[test]
    fn ramps_start_transparent_and_end_opaque() {
        for ramp in ColorRamp::ALL {
            let lut = ramp.lut();
            assert_eq!(lut[0][3], 0, "{}", ramp.name());
            assert!(lut[1..].iter().all(|entry| entry[3] == 255));
        }
    }

    #[test]
    fn grayscale_is_linear() {
        let lut = ColorRamp::Grayscale.lut();
        assert_eq!(lut[128][0], 128);
        assert_eq!(lut[255], [255, 255, 255, 255]);
    }

    #[test]
    fn eye_mode_needs_eye_capture() {
        let mut channel = Channel::new(ChannelId(0), "EYE")
            .with_capture(Capture::new(CaptureData::Eye(field()), 1, 0.0));
        let timebase = Timebase::new(1.0, 0);
        assert!(density_for(&channel, timebase).is_none());
        channel.display = DisplayMode::Eye;
        assert_eq!(density_for(&channel, timebase).unwrap().width(), 2);
        channel.display = DisplayMode::Waterfall;
        assert!(density_for(&channel, timebase).is_none());
    }

    #[test]
    fn analog_capture_in_eye_mode_is_skipped() {
        let mut channel = Channel::new(ChannelId(0), "CH1").with_capture(Capture::new(
            CaptureData::Analog(SampleSeries::dense(vec![0.0; 4])),
            1,
            0.0,
        ));
        channel.display = DisplayMode::Eye;
        assert!(density_for(&channel, Timebase::new(1.0, 0)).is_none());
    }

    struct Recorder(Mutex<Vec<Timebase>>);

    impl TimebaseFollower for Recorder {
        fn follow_timebase(&self, timebase: Timebase) {
            self.0.lock().unwrap().push(timebase);
        }
    }

    #[test]
    fn waterfall_follows_timebase() {
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let mut channel = Channel::new(ChannelId(0), "FFT")
            .with_capture(Capture::new(CaptureData::Waterfall(field()), 1, 0.0));
        channel.display = DisplayMode::Waterfall;
        channel.timebase_follower = Some(recorder.clone());
        let timebase = Timebase::new(0.25, 42);
        assert!(density_for(&channel, timebase).is_some());
        assert_eq!(*recorder.0.lock().unwrap(), vec![timebase]);
    }
}
