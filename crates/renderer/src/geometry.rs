//! Trace geometry: per-sample pixel positions plus a per-column sample index.
//!
//! ```text
//!   capture ──▶ transform_samples ──▶ vertices [x0 y0 x1 y1 ...]
//!                                        │
//!                                        ▼
//!                                  scan_columns ──▶ columns [s(0) s(1) ... s(w-1)]
//! ```
//!
//! `columns[j]` tells the raster kernel where to start walking samples for
//! pixel column `j`. It holds the first sample starting inside the column if
//! one does, otherwise the last sample starting before it. Columns past the
//! end of the final sample hold the sentinel `count`.

use std::time::{Duration, Instant};

use rayon::prelude::*;
use waveform::{Capture, CaptureData, CaptureKind, SampleSeries};

use crate::mapping::CoordinateMapper;
use crate::scene::VerticalAxis;

/// Narrowest on-screen width given to the final sample.
const MIN_SAMPLE_WIDTH: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GeometryError {
    #[error("capture holds no samples")]
    Empty,
    #[error("{0} capture cannot be drawn as a trace")]
    Incompatible(CaptureKind),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraceGeometry {
    pub vertices: Vec<[f32; 2]>,
    pub columns: Vec<u32>,
}

impl TraceGeometry {
    pub fn sample_count(&self) -> usize {
        self.vertices.len()
    }

    /// Value stored for columns with nothing to draw.
    pub fn sentinel(&self) -> u32 {
        self.vertices.len() as u32
    }
}

/// Wall time spent in each build step.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildTimings {
    pub transform: Duration,
    pub scan: Duration,
}

/// Builds the vertex and column buffers for an analog capture.
pub fn build(
    capture: &Capture,
    mapper: &CoordinateMapper,
    axis: VerticalAxis,
    plot_width: u32,
) -> Result<(TraceGeometry, BuildTimings), GeometryError> {
    let series = match capture.data() {
        CaptureData::Analog(series) => series,
        _ => return Err(GeometryError::Incompatible(capture.kind())),
    };
    if series.is_empty() {
        return Err(GeometryError::Empty);
    }

    let started = Instant::now();
    let vertices = transform_samples(series, capture, mapper, axis);
    let transformed = Instant::now();

    let last = series.len() - 1;
    let xscale = capture.timescale() as f64 * mapper.timebase.pixels_per_x_unit;
    let last_width = (series.duration(last) as f64 * xscale) as f32;
    let last_end = vertices[last][0] + last_width.max(MIN_SAMPLE_WIDTH);
    let columns = scan_columns(&vertices, last_end, plot_width);

    let timings = BuildTimings {
        transform: transformed - started,
        scan: transformed.elapsed(),
    };
    Ok((TraceGeometry { vertices, columns }, timings))
}

/// Maps every sample to pixel space. Samples are independent, so the work is
/// split across the rayon pool.
pub fn transform_samples(
    series: &SampleSeries<f32>,
    capture: &Capture,
    mapper: &CoordinateMapper,
    axis: VerticalAxis,
) -> Vec<[f32; 2]> {
    let timebase = mapper.timebase;
    let xscale = capture.timescale() as f64 * timebase.pixels_per_x_unit;
    let xoff = (capture.trigger_phase() - timebase.x_axis_offset as f64) * timebase.pixels_per_x_unit;

    let mut vertices = vec![[0.0f32; 2]; series.len()];
    vertices
        .par_iter_mut()
        .enumerate()
        .for_each(|(index, vertex)| {
            let x = series.offset(index) as f64 * xscale + xoff;
            let value = *series.value(index);
            let y = match axis {
                VerticalAxis::Linear => mapper.volts_to_pixel_y(value),
                VerticalAxis::Decibel => {
                    mapper.decibels_to_pixel_y(20.0 * value.abs().max(1e-20).log10())
                }
            };
            *vertex = [x as f32, y];
        });
    vertices
}

/// Single forward pass over columns and samples; both sequences are
/// non-decreasing so the sample cursor never moves backward.
pub fn scan_columns(vertices: &[[f32; 2]], last_end: f32, plot_width: u32) -> Vec<u32> {
    let count = vertices.len();
    let sentinel = count as u32;
    let mut columns = vec![sentinel; plot_width as usize];
    if count == 0 {
        return columns;
    }

    let mut s = 0usize;
    for (j, slot) in columns.iter_mut().enumerate() {
        let left = j as f32;
        if left >= last_end {
            break;
        }
        let right = left + 1.0;
        while s + 1 < count && vertices[s + 1][0] < left {
            s += 1;
        }
        let next_starts_here = s + 1 < count && vertices[s + 1][0] < right;
        *slot = if next_starts_here && vertices[s][0] < left {
            (s + 1) as u32
        } else {
            s as u32
        };
    }
    columns
}
