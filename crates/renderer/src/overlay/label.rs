use tiny_skia::PathBuilder;

use crate::overlay::canvas::Canvas;
use crate::scene::Channel;
use crate::types::Rgba;

pub(crate) const INFO_MARGIN: f32 = 2.0;
const INFO_LEFT: f32 = 2.0;
const INFO_FILL: Rgba = Rgba::new(0.0, 0.0, 0.0, 0.75);

/// `name : depth` plus a sample-rate line for physical channels holding a
/// time-domain capture; just the name otherwise.
pub(crate) fn channel_label(channel: &Channel) -> String {
    let Some(capture) = channel.capture.as_ref().filter(|_| channel.physical) else {
        return channel.name.clone();
    };
    if capture.sample_count() == 0 {
        return channel.name.clone();
    }
    format!(
        "{} : {}\n{}",
        channel.name,
        format_depth(capture.sample_count()),
        format_rate(capture.timescale())
    )
}

pub(crate) fn format_depth(samples: usize) -> String {
    let depth = samples as f64;
    if depth > 1e6 {
        format!("{:.0} MS", depth * 1e-6)
    } else if depth > 1e3 {
        format!("{:.0} kS", depth * 1e-3)
    } else {
        format!("{samples} S")
    }
}

/// `timescale` is the sample period in picoseconds.
pub(crate) fn format_rate(timescale: i64) -> String {
    let gsps = 1000.0 / timescale.max(1) as f64;
    if gsps > 1.0 {
        format!("{gsps:.0} GS/s")
    } else if gsps > 0.001 {
        format!("{:.0} MS/s", gsps * 1e3)
    } else {
        format!("{:.1} kS/s", gsps * 1e6)
    }
}

/// Rounded, outlined text box with its lower-left corner at plot
/// `(INFO_LEFT, bottom)`. Returns the box's right edge.
pub(crate) fn draw_info_box(canvas: &mut Canvas<'_>, text: &str, outline: Rgba, bottom: f32) -> f32 {
    let (text_width, text_height) = canvas.measure(text);
    let m = INFO_MARGIN;
    let (left, right) = (INFO_LEFT, INFO_LEFT + text_width + 2.0 * m);
    let top = bottom + text_height + 2.0 * m;

    let mut builder = PathBuilder::new();
    builder.move_to(left + m, bottom);
    builder.line_to(right - m, bottom);
    builder.quad_to(right, bottom, right, bottom + m);
    builder.line_to(right, top - m);
    builder.quad_to(right, top, right - m, top);
    builder.line_to(left + m, top);
    builder.quad_to(left, top, left, top - m);
    builder.line_to(left, bottom + m);
    builder.quad_to(left, bottom, left + m, bottom);
    builder.close();
    if let Some(path) = builder.finish() {
        canvas.fill_path(&path, INFO_FILL);
        canvas.stroke_path(&path, outline.with_alpha(1.0), 1.0);
    }

    canvas.text(left + m, bottom + m, text, Rgba::WHITE);
    right
}

/// Height of the box [`draw_info_box`] would draw for `text`.
pub(crate) fn info_box_height(canvas: &Canvas<'_>, text: &str) -> f32 {
    canvas.measure(text).1 + 2.0 * INFO_MARGIN
}
