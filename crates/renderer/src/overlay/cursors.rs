use crate::mapping::Timebase;
use crate::overlay::canvas::Canvas;
use crate::scene::{CursorMode, Cursors};
use crate::types::Rgba;

const SPAN_FILL: Rgba = Rgba::new(1.0, 1.0, 0.0, 0.2);

/// Pixel x of each visible cursor, in cursor order.
pub(crate) fn cursor_positions(cursors: &Cursors, timebase: Timebase) -> Vec<f32> {
    let count = match cursors.mode {
        CursorMode::None => 0,
        CursorMode::Single => 1,
        CursorMode::Dual => 2,
    };
    cursors.positions[..count]
        .iter()
        .map(|&t| timebase.x_units_to_pixel(t as f64) as f32)
        .collect()
}

pub(crate) fn draw_cursors(canvas: &mut Canvas<'_>, cursors: &Cursors, timebase: Timebase) {
    let height = canvas.height();
    match cursor_positions(cursors, timebase)[..] {
        [x] => canvas.vline(x, 0.0, height, Rgba::YELLOW),
        [x0, x1] => {
            let (left, right) = (x0.min(x1), x0.max(x1));
            canvas.fill_rect(left, 0.0, right - left, height, SPAN_FILL);
            canvas.vline(x0, 0.0, height, Rgba::YELLOW);
            canvas.vline(x1, 0.0, height, Rgba::ORANGE);
        }
        _ => {}
    }
}
