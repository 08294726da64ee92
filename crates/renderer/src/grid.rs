//! Horizontal gridline placement for the underlay.

use crate::mapping::{CoordinateMapper, DECIBEL_FLOOR};

/// Decades covered by the step candidates, `10^-9` up to `5 * 10^9`.
const STEP_DECADES: std::ops::RangeInclusive<i32> = -9..=9;

pub const MIN_GRID_LINES: u32 = 2;
pub const DECIBEL_STEP: f32 = 10.0;
/// Lowest labelled line on a decibel axis.
pub const DECIBEL_GRID_FLOOR: f32 = -60.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridLine {
    pub value: f32,
    pub y: f32,
}

/// Candidate steps in the 1-2-5 family, largest first.
pub fn step_candidates() -> impl Iterator<Item = f32> {
    STEP_DECADES.rev().flat_map(|exp| {
        [5.0, 2.0, 1.0].into_iter().map(move |mantissa: f64| {
            let step = if exp < 0 {
                mantissa / 10f64.powi(-exp)
            } else {
                mantissa * 10f64.powi(exp)
            };
            step as f32
        })
    })
}

/// Largest candidate that splits `half_span` into between
/// [`MIN_GRID_LINES`] and `max_lines` steps.
pub fn pick_step(half_span: f32, max_lines: u32) -> Option<f32> {
    if !(half_span.is_finite() && half_span > 0.0) {
        return None;
    }
    step_candidates().find(|&step| {
        let lines = half_span / step;
        lines >= MIN_GRID_LINES as f32 && lines <= max_lines as f32
    })
}

/// Gridlines for a linear axis at every multiple of the chosen step inside
/// the plot. Lines whose labels would run off the plot edges are dropped;
/// the zero line is kept whenever it is visible.
pub fn linear_lines(mapper: &CoordinateMapper, label_height: f32, max_lines: u32) -> Vec<GridLine> {
    let top = mapper.plot_top();
    let bottom = mapper.plot_bottom();

    let half_span = mapper.pixels_to_volts(mapper.height() / 2.0);
    let Some(step) = pick_step(half_span, max_lines) else {
        let zero = mapper.volts_to_pixel_y(0.0);
        return if (bottom..=top).contains(&zero) {
            vec![GridLine { value: 0.0, y: zero }]
        } else {
            Vec::new()
        };
    };

    let low = mapper.pixel_y_to_volts(bottom);
    let high = mapper.pixel_y_to_volts(top);
    let first = (low.min(high) / step).ceil() as i64;
    let last = (low.max(high) / step).floor() as i64;

    (first..=last)
        .filter_map(|n| {
            let value = n as f32 * step;
            let y = mapper.volts_to_pixel_y(value);
            let fits = match n.signum() {
                1 => y <= top - label_height / 2.0 && y >= bottom,
                -1 => y >= bottom + label_height / 2.0 && y <= top,
                _ => (bottom..=top).contains(&y),
            };
            fits.then_some(GridLine { value, y })
        })
        .collect()
}

/// Fixed 10 dB lines from 0 dB down to [`DECIBEL_GRID_FLOOR`].
pub fn decibel_lines(mapper: &CoordinateMapper) -> Vec<GridLine> {
    debug_assert!(DECIBEL_GRID_FLOOR > DECIBEL_FLOOR);
    let steps = (-DECIBEL_GRID_FLOOR / DECIBEL_STEP) as i32;
    (0..=steps)
        .rev()
        .map(|n| {
            let value = -(n as f32) * DECIBEL_STEP;
            GridLine {
                value,
                y: mapper.decibels_to_pixel_y(value),
            }
        })
        .collect()
}
