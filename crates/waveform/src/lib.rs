//! Capture data model shared by the loader and the renderer.
//!
//! A [`Capture`] is one acquisition of one stream: an ordered run of samples
//! (analog, digital or bus) or a precomputed density field (eye diagram,
//! waterfall). Captures are immutable once built and are swapped wholesale
//! when a new acquisition arrives; every construction draws a fresh
//! generation number so consumers can detect replacement cheaply.
//!
//! [`format`] reads and writes the raw sample-buffer layouts used on disk.

mod capture;
pub mod format;

pub use capture::{
    Capture, CaptureData, CaptureError, CaptureKind, DensityField, SampleSeries, Timing,
};
pub use format::{stream_file_name, FormatError, SampleFormat};
