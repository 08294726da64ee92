use crate::grid::{decibel_lines, linear_lines};
use crate::mapping::CoordinateMapper;
use crate::overlay::canvas::Canvas;
use crate::scene::{Channel, DisplayMode, TriggerMarker, VerticalAxis};
use crate::types::Rgba;

const GRID_COLOR: Rgba = Rgba::new(0.7, 0.7, 0.7, 1.0);
const GRID_DIM_ALPHA: f32 = 0.25;
const BACKGROUND_TINT: f32 = 0.1;
const TRIGGER_SIZE: f32 = 5.0;
const LABEL_MARGIN: f32 = 2.0;

pub(crate) struct UnderlayParams<'a> {
    /// Active channel and its mapper; `None` draws an empty plot.
    pub active: Option<(&'a Channel, CoordinateMapper)>,
    pub plot_right: f32,
    pub padding: f32,
    pub grid_max_lines: u32,
    pub trigger: Option<TriggerMarker>,
}

pub(crate) fn draw_underlay(canvas: &mut Canvas<'_>, params: &UnderlayParams<'_>) {
    canvas.clear(Rgba::BLACK);
    let height = canvas.height();
    let plot_right = params.plot_right;

    let Some((channel, mapper)) = params.active else {
        canvas.vline(plot_right, 0.0, height, GRID_COLOR.with_alpha(GRID_DIM_ALPHA));
        return;
    };

    canvas.fill_vertical_gradient(
        (0.0, 0.0, plot_right, height),
        params.padding,
        channel.color.scaled(BACKGROUND_TINT).with_alpha(1.0),
        height - 2.0 * params.padding,
        Rgba::BLACK,
    );
    canvas.vline(plot_right, 0.0, height, GRID_COLOR.with_alpha(GRID_DIM_ALPHA));

    // Waterfall rows are time slices, not voltages.
    if channel.display != DisplayMode::Waterfall {
        draw_grid(canvas, channel, &mapper, plot_right, params.grid_max_lines);
    }

    if let Some(trigger) = params.trigger.filter(|t| t.channel == channel.id) {
        let y = mapper.volts_to_pixel_y(trigger.level);
        let color = if trigger.dragging {
            Rgba::RED
        } else {
            channel.color
        };
        let points = [
            (plot_right, y),
            (plot_right + TRIGGER_SIZE, y + TRIGGER_SIZE),
            (plot_right + TRIGGER_SIZE, y - TRIGGER_SIZE),
        ];
        if let Some(path) = Canvas::polygon(&points) {
            canvas.fill_path(&path, color);
        }
    }
}

fn draw_grid(
    canvas: &mut Canvas<'_>,
    channel: &Channel,
    mapper: &CoordinateMapper,
    plot_right: f32,
    max_lines: u32,
) {
    let label_height = canvas.font().measure("0").1;
    let lines = match channel.axis {
        VerticalAxis::Linear => linear_lines(mapper, label_height, max_lines),
        VerticalAxis::Decibel => decibel_lines(mapper),
    };

    for line in lines {
        let color = if line.value == 0.0 {
            GRID_COLOR
        } else {
            GRID_COLOR.with_alpha(GRID_DIM_ALPHA)
        };
        canvas.hline(0.0, plot_right, line.y, color);

        let label = match channel.axis {
            VerticalAxis::Linear => channel.unit.pretty_print(f64::from(line.value)),
            VerticalAxis::Decibel => format!("{:.0} dB", line.value),
        };
        let (width, _) = canvas.measure(&label);
        let x = canvas.width() - LABEL_MARGIN - width;
        canvas.text_centered_y(x, line.y, &label, Rgba::WHITE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::BitmapFont;
    use crate::mapping::Timebase;
    use crate::scene::ChannelId;
    use tiny_skia::Pixmap;

    fn pixel(pixmap: &Pixmap, x: u32, y_up: u32) -> [u8; 4] {
        let y = pixmap.height() - 1 - y_up;
        let at = ((y * pixmap.width() + x) * 4) as usize;
        pixmap.data()[at..at + 4].try_into().unwrap()
    }

    fn render(trigger: Option<TriggerMarker>) -> Pixmap {
        let font = BitmapFont::default();
        let channel = Channel::new(ChannelId(0), "CH1");
        let mapper = CoordinateMapper::new(Timebase::new(1.0, 0), 100.0, 2.0, 0.0, 2.0);
        let mut pixmap = Pixmap::new(160, 100).unwrap();
        let mut canvas = Canvas::new(&mut pixmap, &font);
        draw_underlay(
            &mut canvas,
            &UnderlayParams {
                active: Some((&channel, mapper)),
                plot_right: 100.0,
                padding: 2.0,
                grid_max_lines: 5,
                trigger,
            },
        );
        pixmap
    }

    #[test]
    fn underlay_is_opaque() {
        let pixmap = render(None);
        assert!(pixmap.data().chunks(4).all(|px| px[3] == 255));
    }

    #[test]
    fn center_line_is_brighter_than_others() {
        let pixmap = render(None);
        let center = pixel(&pixmap, 40, 50);
        let half = pixel(&pixmap, 40, 75);
        assert!(center[0] > 150);
        assert!(half[0] < center[0]);
        assert!(half[0] > pixel(&pixmap, 40, 60)[0]);
    }

    #[test]
    fn trigger_marker_sits_in_gutter() {
        let channel = ChannelId(0);
        let idle = render(None);
        let armed = render(Some(TriggerMarker {
            channel,
            level: 0.5,
            dragging: true,
        }));
        let y = 75;
        assert_eq!(pixel(&armed, 102, y)[1], 0);
        assert!(pixel(&armed, 102, y)[0] > 200);
        assert_ne!(pixel(&idle, 102, y), pixel(&armed, 102, y));
    }
}
