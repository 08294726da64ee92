use tiny_skia::{
    BlendMode, FillRule, GradientStop, LinearGradient, Paint, Path, PathBuilder, Pixmap, Point,
    Rect, Shader, SpreadMode, Stroke, Transform,
};

use crate::font::LabelFont;
use crate::types::Rgba;

/// Drawing surface over one layer pixmap.
///
/// Geometry coordinates use the plot convention (origin bottom-left, y up),
/// applied through a flip transform. Text is positioned in the same space but
/// drawn upright.
pub struct Canvas<'a> {
    pixmap: &'a mut Pixmap,
    font: &'a dyn LabelFont,
    flip: Transform,
}

impl<'a> Canvas<'a> {
    pub fn new(pixmap: &'a mut Pixmap, font: &'a dyn LabelFont) -> Self {
        let height = pixmap.height() as f32;
        Self {
            pixmap,
            font,
            flip: Transform::from_row(1.0, 0.0, 0.0, -1.0, 0.0, height),
        }
    }

    pub fn width(&self) -> f32 {
        self.pixmap.width() as f32
    }

    pub fn height(&self) -> f32 {
        self.pixmap.height() as f32
    }

    pub fn font(&self) -> &dyn LabelFont {
        self.font
    }

    /// Overwrites every pixel, alpha included.
    pub fn clear(&mut self, color: Rgba) {
        let mut paint = solid(color);
        paint.blend_mode = BlendMode::Source;
        if let Some(rect) = Rect::from_xywh(0.0, 0.0, self.width(), self.height()) {
            self.pixmap
                .fill_rect(rect, &paint, Transform::identity(), None);
        }
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Rgba) {
        if let Some(rect) = Rect::from_xywh(x, y, width, height) {
            self.pixmap.fill_rect(rect, &solid(color), self.flip, None);
        }
    }

    /// Fills a rectangle with a vertical gradient from `bottom` at `y0` to
    /// `top` at `y1`, padding beyond either end.
    pub fn fill_vertical_gradient(
        &mut self,
        rect: (f32, f32, f32, f32),
        y0: f32,
        bottom: Rgba,
        y1: f32,
        top: Rgba,
    ) {
        let (x, y, width, height) = rect;
        let Some(rect) = Rect::from_xywh(x, y, width, height) else {
            return;
        };
        let shader = LinearGradient::new(
            Point::from_xy(0.0, y0),
            Point::from_xy(0.0, y1),
            vec![
                GradientStop::new(0.0, bottom.to_skia()),
                GradientStop::new(1.0, top.to_skia()),
            ],
            SpreadMode::Pad,
            Transform::identity(),
        );
        let mut paint = Paint::default();
        paint.shader = match shader {
            Some(shader) => shader,
            None => Shader::SolidColor(bottom.to_skia()),
        };
        self.pixmap.fill_rect(rect, &paint, self.flip, None);
    }

    pub fn line(&mut self, from: (f32, f32), to: (f32, f32), color: Rgba, width: f32) {
        let mut builder = PathBuilder::new();
        builder.move_to(from.0, from.1);
        builder.line_to(to.0, to.1);
        if let Some(path) = builder.finish() {
            self.stroke_path(&path, color, width);
        }
    }

    /// Horizontal line snapped to the pixel grid.
    pub fn hline(&mut self, x0: f32, x1: f32, y: f32, color: Rgba) {
        let y = y.floor() + 0.5;
        self.line((x0, y), (x1, y), color, 1.0);
    }

    /// Vertical line snapped to the pixel grid.
    pub fn vline(&mut self, x: f32, y0: f32, y1: f32, color: Rgba) {
        let x = x.floor() + 0.5;
        self.line((x, y0), (x, y1), color, 1.0);
    }

    pub fn stroke_path(&mut self, path: &Path, color: Rgba, width: f32) {
        let stroke = Stroke {
            width,
            ..Stroke::default()
        };
        self.pixmap
            .stroke_path(path, &solid(color), &stroke, self.flip, None);
    }

    pub fn fill_path(&mut self, path: &Path, color: Rgba) {
        self.pixmap
            .fill_path(path, &solid(color), FillRule::Winding, self.flip, None);
    }

    /// Closed polygon through `points`.
    pub fn polygon(points: &[(f32, f32)]) -> Option<Path> {
        let (first, rest) = points.split_first()?;
        let mut builder = PathBuilder::new();
        builder.move_to(first.0, first.1);
        for &(x, y) in rest {
            builder.line_to(x, y);
        }
        builder.close();
        builder.finish()
    }

    pub fn measure(&self, text: &str) -> (f32, f32) {
        self.font.measure_block(text)
    }

    /// Draws `text` with the bottom-left of its block at plot `(x, y)`.
    pub fn text(&mut self, x: f32, y: f32, text: &str, color: Rgba) {
        let (_, block_height) = self.font.measure_block(text);
        let mut top = self.height() - y - block_height;
        for line in text.lines() {
            self.font.draw(self.pixmap, x, top, line, color);
            top += self.font.line_height();
        }
    }

    /// Draws one line of text whose vertical center sits at plot `y`.
    pub fn text_centered_y(&mut self, x: f32, y: f32, text: &str, color: Rgba) {
        let (_, height) = self.font.measure(text);
        self.text(x, y - height / 2.0, text, color);
    }
}

fn solid(color: Rgba) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(color.to_skia());
    paint.anti_alias = true;
    paint
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::BitmapFont;

    fn alpha_at(pixmap: &Pixmap, x: u32, y: u32) -> u8 {
        pixmap.data()[((y * pixmap.width() + x) * 4 + 3) as usize]
    }

    #[test]
    fn geometry_origin_is_bottom_left() {
        let font = BitmapFont::default();
        let mut pixmap = Pixmap::new(10, 10).unwrap();
        let mut canvas = Canvas::new(&mut pixmap, &font);
        canvas.fill_rect(0.0, 0.0, 2.0, 2.0, Rgba::WHITE);
        assert_eq!(alpha_at(&pixmap, 0, 9), 255);
        assert_eq!(alpha_at(&pixmap, 0, 0), 0);
    }

    #[test]
    fn clear_overwrites_alpha() {
        let font = BitmapFont::default();
        let mut pixmap = Pixmap::new(4, 4).unwrap();
        pixmap.fill(tiny_skia::Color::WHITE);
        let mut canvas = Canvas::new(&mut pixmap, &font);
        canvas.clear(Rgba::new(0.0, 0.0, 0.0, 0.0));
        assert!(pixmap.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn text_lands_above_its_anchor() {
        let font = BitmapFont::default();
        let mut pixmap = Pixmap::new(20, 20).unwrap();
        let mut canvas = Canvas::new(&mut pixmap, &font);
        canvas.text(0.0, 0.0, "|", Rgba::WHITE);
        // Bottom glyph row of "|" lands on the last raster row.
        assert_eq!(alpha_at(&pixmap, 2, 19), 255);
        assert_eq!(alpha_at(&pixmap, 2, 12), 0);
    }
}
