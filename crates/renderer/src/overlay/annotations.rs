//! Decode rows: one horizontal band per decoded stream, drawn either as
//! labelled hexagonal spans or as a stepped logic trace.

use tiny_skia::PathBuilder;
use waveform::Capture;

use crate::decode::{LevelAnnotations, TextAnnotations};
use crate::mapping::Timebase;
use crate::overlay::canvas::Canvas;
use crate::overlay::label::{draw_info_box, info_box_height};
use crate::scene::DecodeOverlay;
use crate::types::Rgba;

pub const SLOT_HEIGHT: f32 = 20.0;
pub const SLOT_SPACING: f32 = 30.0;
const SLOT_MIDLINE: f32 = 15.0;
const CHAMFER: f32 = 5.0;
/// Wider gaps between drawn level segments lift the pen.
const PEN_UP_GAP: f32 = 2.0;
const LEVEL_INSET: f32 = 3.0;
const ROW_BACKGROUND: Rgba = Rgba::new(0.0, 0.0, 0.0, 0.6);
/// Space between a row's name box and its first annotation.
const TEXT_GAP: f32 = 4.0;

/// Horizontal extent of a decode row and its vertical band.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RowLayout {
    pub slot: usize,
    pub padding: f32,
    pub text_right: f32,
    pub plot_right: f32,
}

impl RowLayout {
    pub fn midline(&self) -> f32 {
        self.padding + self.slot as f32 * SLOT_SPACING + SLOT_MIDLINE
    }

    pub fn top(&self) -> f32 {
        self.midline() + SLOT_HEIGHT / 2.0
    }

    pub fn bottom(&self) -> f32 {
        self.midline() - SLOT_HEIGHT / 2.0
    }

    fn clamp(&self, x: f32) -> f32 {
        x.clamp(self.text_right, self.plot_right)
    }
}

/// Pixel extent `(start, end)` of one sample.
pub(crate) fn sample_extent(capture: &Capture, index: usize, timebase: Timebase) -> Option<(f32, f32)> {
    let (offset, duration) = capture.span(index)?;
    let timescale = capture.timescale() as f64;
    let start = offset as f64 * timescale + capture.trigger_phase();
    let end = start + duration as f64 * timescale;
    Some((
        timebase.x_units_to_pixel(start) as f32,
        timebase.x_units_to_pixel(end) as f32,
    ))
}

/// Samples overlapping `[text_right, plot_right]`, in order.
pub(crate) fn visible_samples(
    capture: &Capture,
    timebase: Timebase,
    text_right: f32,
    plot_right: f32,
) -> impl Iterator<Item = (usize, f32, f32)> + '_ {
    (0..capture.sample_count())
        .filter_map(move |index| {
            sample_extent(capture, index, timebase).map(|(start, end)| (index, start, end))
        })
        .take_while(move |&(_, start, _)| start <= plot_right)
        .filter(move |&(_, _, end)| end >= text_right)
}

/// Draws the row for `decode` in band `slot`: background, name box, then
/// either text spans or a level trace.
pub(crate) fn draw_decode_row(
    canvas: &mut Canvas<'_>,
    decode: &DecodeOverlay,
    slot: usize,
    padding: f32,
    plot_right: f32,
    timebase: Timebase,
) {
    let mut layout = RowLayout {
        slot,
        padding,
        text_right: 0.0,
        plot_right,
    };
    canvas.fill_rect(0.0, layout.bottom(), plot_right.max(0.0), SLOT_HEIGHT, ROW_BACKGROUND);
    let name_bottom = layout.midline() - info_box_height(canvas, &decode.name) / 2.0;
    let name_right = draw_info_box(canvas, &decode.name, decode.color, name_bottom);
    layout.text_right = name_right + TEXT_GAP;

    if let Some(text) = decode.renderer.as_text() {
        draw_text_spans(canvas, decode, text, layout, timebase);
    } else if let Some(levels) = decode.renderer.as_levels() {
        let samples = visible_samples(&decode.capture, timebase, layout.text_right, layout.plot_right);
        for polyline in level_polylines(levels, samples, layout) {
            let mut builder = PathBuilder::new();
            let mut points = polyline.iter();
            if let Some(&(x, y)) = points.next() {
                builder.move_to(x, y);
            }
            for &(x, y) in points {
                builder.line_to(x, y);
            }
            if let Some(path) = builder.finish() {
                canvas.stroke_path(&path, decode.color, 1.0);
            }
        }
    }
}

fn draw_text_spans(
    canvas: &mut Canvas<'_>,
    decode: &DecodeOverlay,
    text: &dyn TextAnnotations,
    layout: RowLayout,
    timebase: Timebase,
) {
    let (mid, top, bottom) = (layout.midline(), layout.top(), layout.bottom());
    for (index, start, end) in
        visible_samples(&decode.capture, timebase, layout.text_right, layout.plot_right)
    {
        let (left, right) = (layout.clamp(start), layout.clamp(end));
        let width = right - left;
        if width < 1.0 {
            continue;
        }
        let chamfer = CHAMFER.min(width / 2.0);
        let hexagon = [
            (left, mid),
            (left + chamfer, top),
            (right - chamfer, top),
            (right, mid),
            (right - chamfer, bottom),
            (left + chamfer, bottom),
        ];
        if let Some(path) = Canvas::polygon(&hexagon) {
            canvas.fill_path(&path, text.color(index));
        }

        let label = text.text(index);
        if label.is_empty() {
            continue;
        }
        let (label_width, _) = canvas.measure(&label);
        if label_width + 2.0 * chamfer <= width {
            let x = left + (width - label_width) / 2.0;
            canvas.text_centered_y(x, mid, &label, Rgba::WHITE);
        }
    }
}

/// Stepped level trace split into pen-down runs.
pub(crate) fn level_polylines(
    levels: &dyn LevelAnnotations,
    samples: impl Iterator<Item = (usize, f32, f32)>,
    layout: RowLayout,
) -> Vec<Vec<(f32, f32)>> {
    let high = layout.top() - LEVEL_INSET;
    let low = layout.bottom() + LEVEL_INSET;
    let mut runs: Vec<Vec<(f32, f32)>> = Vec::new();
    let mut last_end = -100.0f32;

    for (index, start, end) in samples {
        let (start, end) = (layout.clamp(start), layout.clamp(end));
        let y = if levels.level(index) { high } else { low };
        match runs.last_mut() {
            Some(run) if start - last_end <= PEN_UP_GAP => {
                run.push((start, y));
            }
            _ => runs.push(vec![(start, y)]),
        }
        if let Some(run) = runs.last_mut() {
            run.push((end, y));
        }
        last_end = end;
    }
    runs
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::decode::{DigitalLevels, SymbolTable};
    use crate::font::BitmapFont;
    use crate::scene::ChannelId;
    use tiny_skia::Pixmap;
    use waveform::{CaptureData, SampleSeries};

    fn layout() -> RowLayout {
        RowLayout {
            slot: 0,
            padding: 0.0,
            text_right: 20.0,
            plot_right: 200.0,
        }
    }

    fn digital(offsets: Vec<i64>, durations: Vec<i64>, levels: Vec<bool>) -> Arc<Capture> {
        Arc::new(Capture::new(
            CaptureData::Digital(SampleSeries::sparse(offsets, durations, levels).unwrap()),
            1,
            0.0,
        ))
    }

    #[test]
    fn culls_samples_outside_plot() {
        let capture = digital(vec![0, 15, 100, 210], vec![10, 10, 10, 10], vec![true; 4]);
        let visible: Vec<usize> = visible_samples(&capture, Timebase::new(1.0, 0), 20.0, 200.0)
            .map(|(index, _, _)| index)
            .collect();
        assert_eq!(visible, vec![1, 2]);
    }

    #[test]
    fn extent_applies_timescale_and_phase() {
        let capture = Capture::new(
            CaptureData::Digital(SampleSeries::sparse(vec![3], vec![2], vec![true]).unwrap()),
            10,
            5.0,
        );
        let extent = sample_extent(&capture, 0, Timebase::new(0.5, 10)).unwrap();
        assert_eq!(extent, (12.5, 22.5));
        assert!(sample_extent(&capture, 1, Timebase::new(0.5, 10)).is_none());
    }

    #[test]
    fn level_trace_lifts_pen_on_gaps() {
        let capture = digital(
            vec![20, 30, 40, 80],
            vec![10, 10, 10, 10],
            vec![true, false, true, false],
        );
        let levels = DigitalLevels::new(capture.clone());
        let samples = visible_samples(&capture, Timebase::new(1.0, 0), 20.0, 200.0);
        let runs = level_polylines(&levels, samples, layout());
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].len(), 6);
        let (high, low) = (layout().top() - LEVEL_INSET, layout().bottom() + LEVEL_INSET);
        assert_eq!(runs[0][0], (20.0, high));
        assert_eq!(runs[0][2], (30.0, low));
        assert_eq!(runs[1], vec![(80.0, low), (90.0, low)]);
    }

    #[test]
    fn text_spans_fill_inside_row() {
        let capture = Arc::new(Capture::new(
            CaptureData::Protocol(SampleSeries::sparse(vec![40], vec![100], vec![0]).unwrap()),
            1,
            0.0,
        ));
        let green = Rgba::opaque(0.0, 1.0, 0.0);
        let decode = DecodeOverlay {
            id: ChannelId(9),
            name: "UART".into(),
            color: Rgba::WHITE,
            capture: capture.clone(),
            renderer: Arc::new(SymbolTable::new(capture, vec![("A".into(), green)])),
        };
        let font = BitmapFont::default();
        let mut pixmap = Pixmap::new(220, 40).unwrap();
        let mut canvas = Canvas::new(&mut pixmap, &font);
        draw_decode_row(&mut canvas, &decode, 0, 0.0, 200.0, Timebase::new(1.0, 0));

        // Raster row 25 is plot y 14, just under the midline; x 50 is inside the span.
        let at = (25 * 220 + 50) * 4;
        assert_eq!(&pixmap.data()[at..at + 4], &[0, 255, 0, 255]);
        let outside = (25 * 220 + 30) * 4;
        assert_eq!(pixmap.data()[outside + 1], 0);
        assert!(pixmap.data()[outside + 3] > 0);
    }
}
