//! Label text measurement and drawing for the vector layers.
//!
//! Fonts draw in raster coordinates (origin top-left) so glyphs stay upright
//! regardless of the transform the layer geometry uses.

use std::path::Path;

use tiny_skia::Pixmap;
use tracing::warn;

use crate::types::Rgba;

pub trait LabelFont: Send + Sync {
    /// Width and height in pixels of one line of `text`.
    fn measure(&self, text: &str) -> (f32, f32);

    /// Draws one line of `text` with its top-left corner at raster `(x, y)`.
    fn draw(&self, pixmap: &mut Pixmap, x: f32, y: f32, text: &str, color: Rgba);

    /// Vertical distance between consecutive lines.
    fn line_height(&self) -> f32 {
        self.measure("Xg").1 + 2.0
    }

    /// Size of a block of `\n`-separated lines.
    fn measure_block(&self, text: &str) -> (f32, f32) {
        let lines: Vec<&str> = text.lines().collect();
        let width = lines
            .iter()
            .map(|line| self.measure(line).0)
            .fold(0.0, f32::max);
        let count = lines.len().max(1) as f32;
        let last = self.measure("Xg").1;
        (width, (count - 1.0) * self.line_height() + last)
    }
}

/// Source-over blend of `color` at `coverage` into one premultiplied pixel.
pub(crate) fn blend_pixel(pixmap: &mut Pixmap, x: i32, y: i32, color: Rgba, coverage: f32) {
    let (width, height) = (pixmap.width() as i32, pixmap.height() as i32);
    if x < 0 || y < 0 || x >= width || y >= height {
        return;
    }
    let alpha = (color.a * coverage).clamp(0.0, 1.0);
    if alpha <= 0.0 {
        return;
    }
    let offset = (y as usize * width as usize + x as usize) * 4;
    let data = pixmap.data_mut();
    let keep = 1.0 - alpha;
    let source = [color.r, color.g, color.b, 1.0];
    for (channel, src) in source.iter().enumerate() {
        let dst = f32::from(data[offset + channel]);
        let value = src.clamp(0.0, 1.0) * alpha * 255.0 + dst * keep;
        data[offset + channel] = value.round().min(255.0) as u8;
    }
}

const GLYPH_COLUMNS: usize = 5;
const GLYPH_ROWS: u32 = 7;

/// Column-major 5x7 glyphs for printable ASCII; bit 0 is the top row.
const GLYPHS: [[u8; GLYPH_COLUMNS]; 95] = [
    [0x00, 0x00, 0x00, 0x00, 0x00],
    [0x00, 0x00, 0x5f, 0x00, 0x00],
    [0x00, 0x07, 0x00, 0x07, 0x00],
    [0x14, 0x7f, 0x14, 0x7f, 0x14],
    [0x24, 0x2a, 0x7f, 0x2a, 0x12],
    [0x23, 0x13, 0x08, 0x64, 0x62],
    [0x36, 0x49, 0x55, 0x22, 0x50],
    [0x00, 0x05, 0x03, 0x00, 0x00],
    [0x00, 0x1c, 0x22, 0x41, 0x00],
    [0x00, 0x41, 0x22, 0x1c, 0x00],
    [0x14, 0x08, 0x3e, 0x08, 0x14],
    [0x08, 0x08, 0x3e, 0x08, 0x08],
    [0x00, 0x50, 0x30, 0x00, 0x00],
    [0x08, 0x08, 0x08, 0x08, 0x08],
    [0x00, 0x60, 0x60, 0x00, 0x00],
    [0x20, 0x10, 0x08, 0x04, 0x02],
    [0x3e, 0x51, 0x49, 0x45, 0x3e],
    [0x00, 0x42, 0x7f, 0x40, 0x00],
    [0x42, 0x61, 0x51, 0x49, 0x46],
    [0x21, 0x41, 0x45, 0x4b, 0x31],
    [0x18, 0x14, 0x12, 0x7f, 0x10],
    [0x27, 0x45, 0x45, 0x45, 0x39],
    [0x3c, 0x4a, 0x49, 0x49, 0x30],
    [0x01, 0x71, 0x09, 0x05, 0x03],
    [0x36, 0x49, 0x49, 0x49, 0x36],
    [0x06, 0x49, 0x49, 0x29, 0x1e],
    [0x00, 0x36, 0x36, 0x00, 0x00],
    [0x00, 0x56, 0x36, 0x00, 0x00],
    [0x08, 0x14, 0x22, 0x41, 0x00],
    [0x14, 0x14, 0x14, 0x14, 0x14],
    [0x00, 0x41, 0x22, 0x14, 0x08],
    [0x02, 0x01, 0x51, 0x09, 0x06],
    [0x32, 0x49, 0x79, 0x41, 0x3e],
    [0x7e, 0x11, 0x11, 0x11, 0x7e],
    [0x7f, 0x49, 0x49, 0x49, 0x36],
    [0x3e, 0x41, 0x41, 0x41, 0x22],
    [0x7f, 0x41, 0x41, 0x22, 0x1c],
    [0x7f, 0x49, 0x49, 0x49, 0x41],
    [0x7f, 0x09, 0x09, 0x09, 0x01],
    [0x3e, 0x41, 0x49, 0x49, 0x7a],
    [0x7f, 0x08, 0x08, 0x08, 0x7f],
    [0x00, 0x41, 0x7f, 0x41, 0x00],
    [0x20, 0x40, 0x41, 0x3f, 0x01],
    [0x7f, 0x08, 0x14, 0x22, 0x41],
    [0x7f, 0x40, 0x40, 0x40, 0x40],
    [0x7f, 0x02, 0x0c, 0x02, 0x7f],
    [0x7f, 0x04, 0x08, 0x10, 0x7f],
    [0x3e, 0x41, 0x41, 0x41, 0x3e],
    [0x7f, 0x09, 0x09, 0x09, 0x06],
    [0x3e, 0x41, 0x51, 0x21, 0x5e],
    [0x7f, 0x09, 0x19, 0x29, 0x46],
    [0x46, 0x49, 0x49, 0x49, 0x31],
    [0x01, 0x01, 0x7f, 0x01, 0x01],
    [0x3f, 0x40, 0x40, 0x40, 0x3f],
    [0x1f, 0x20, 0x40, 0x20, 0x1f],
    [0x3f, 0x40, 0x38, 0x40, 0x3f],
    [0x63, 0x14, 0x08, 0x14, 0x63],
    [0x07, 0x08, 0x70, 0x08, 0x07],
    [0x61, 0x51, 0x49, 0x45, 0x43],
    [0x00, 0x7f, 0x41, 0x41, 0x00],
    [0x02, 0x04, 0x08, 0x10, 0x20],
    [0x00, 0x41, 0x41, 0x7f, 0x00],
    [0x04, 0x02, 0x01, 0x02, 0x04],
    [0x40, 0x40, 0x40, 0x40, 0x40],
    [0x00, 0x01, 0x02, 0x04, 0x00],
    [0x20, 0x54, 0x54, 0x54, 0x78],
    [0x7f, 0x48, 0x44, 0x44, 0x38],
    [0x38, 0x44, 0x44, 0x44, 0x20],
    [0x38, 0x44, 0x44, 0x48, 0x7f],
    [0x38, 0x54, 0x54, 0x54, 0x18],
    [0x08, 0x7e, 0x09, 0x01, 0x02],
    [0x0c, 0x52, 0x52, 0x52, 0x3e],
    [0x7f, 0x08, 0x04, 0x04, 0x78],
    [0x00, 0x44, 0x7d, 0x40, 0x00],
    [0x20, 0x40, 0x44, 0x3d, 0x00],
    [0x7f, 0x10, 0x28, 0x44, 0x00],
    [0x00, 0x41, 0x7f, 0x40, 0x00],
    [0x7c, 0x04, 0x18, 0x04, 0x78],
    [0x7c, 0x08, 0x04, 0x04, 0x78],
    [0x38, 0x44, 0x44, 0x44, 0x38],
    [0x7c, 0x14, 0x14, 0x14, 0x08],
    [0x08, 0x14, 0x14, 0x18, 0x7c],
    [0x7c, 0x08, 0x04, 0x04, 0x08],
    [0x48, 0x54, 0x54, 0x54, 0x20],
    [0x04, 0x3f, 0x44, 0x40, 0x20],
    [0x3c, 0x40, 0x40, 0x20, 0x7c],
    [0x1c, 0x20, 0x40, 0x20, 0x1c],
    [0x3c, 0x40, 0x30, 0x40, 0x3c],
    [0x44, 0x28, 0x10, 0x28, 0x44],
    [0x0c, 0x50, 0x50, 0x50, 0x3c],
    [0x44, 0x64, 0x54, 0x4c, 0x44],
    [0x00, 0x08, 0x36, 0x41, 0x00],
    [0x00, 0x00, 0x7f, 0x00, 0x00],
    [0x00, 0x41, 0x36, 0x08, 0x00],
    [0x10, 0x08, 0x08, 0x10, 0x08],
];

/// Built-in monospace font used when no TrueType file is configured.
#[derive(Debug, Clone, Copy)]
pub struct BitmapFont {
    scale: u32,
}

impl BitmapFont {
    pub fn new(scale: u32) -> Self {
        Self {
            scale: scale.max(1),
        }
    }

    fn glyph(ch: char) -> &'static [u8; GLYPH_COLUMNS] {
        let code = ch as u32;
        if (0x20..0x7f).contains(&code) {
            &GLYPHS[(code - 0x20) as usize]
        } else {
            &GLYPHS['?' as usize - 0x20]
        }
    }
}

impl Default for BitmapFont {
    fn default() -> Self {
        Self::new(1)
    }
}

impl LabelFont for BitmapFont {
    fn measure(&self, text: &str) -> (f32, f32) {
        let chars = text.chars().count() as u32;
        let advance = (GLYPH_COLUMNS as u32 + 1) * self.scale;
        let width = (chars * advance).saturating_sub(self.scale);
        (width as f32, (GLYPH_ROWS * self.scale) as f32)
    }

    fn draw(&self, pixmap: &mut Pixmap, x: f32, y: f32, text: &str, color: Rgba) {
        let scale = self.scale as i32;
        let advance = (GLYPH_COLUMNS as i32 + 1) * scale;
        let (left, top) = (x.round() as i32, y.round() as i32);
        for (n, ch) in text.chars().enumerate() {
            let origin = left + n as i32 * advance;
            for (column, bits) in Self::glyph(ch).iter().enumerate() {
                for row in 0..GLYPH_ROWS as i32 {
                    if bits & (1 << row) == 0 {
                        continue;
                    }
                    for dy in 0..scale {
                        for dx in 0..scale {
                            let px = origin + column as i32 * scale + dx;
                            let py = top + row * scale + dy;
                            blend_pixel(pixmap, px, py, color, 1.0);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(feature = "truetype")]
pub use truetype::TrueTypeFont;

#[cfg(feature = "truetype")]
mod truetype {
    use std::fs;
    use std::path::Path;

    use anyhow::{anyhow, Context, Result};
    use rusttype::{point, Font, Scale};
    use tiny_skia::Pixmap;

    use super::{blend_pixel, LabelFont};
    use crate::types::Rgba;

    pub struct TrueTypeFont {
        font: Font<'static>,
        scale: Scale,
    }

    impl TrueTypeFont {
        pub fn load(path: &Path, pixel_size: f32) -> Result<Self> {
            let bytes = fs::read(path)
                .with_context(|| format!("failed to read font at {}", path.display()))?;
            let font = Font::try_from_vec(bytes)
                .ok_or_else(|| anyhow!("{} is not a usable TrueType font", path.display()))?;
            Ok(Self {
                font,
                scale: Scale::uniform(pixel_size),
            })
        }
    }

    impl LabelFont for TrueTypeFont {
        fn measure(&self, text: &str) -> (f32, f32) {
            let metrics = self.font.v_metrics(self.scale);
            let width = self
                .font
                .layout(text, self.scale, point(0.0, 0.0))
                .last()
                .map(|glyph| {
                    glyph.position().x + glyph.unpositioned().h_metrics().advance_width
                })
                .unwrap_or(0.0);
            (width.ceil(), (metrics.ascent - metrics.descent).ceil())
        }

        fn draw(&self, pixmap: &mut Pixmap, x: f32, y: f32, text: &str, color: Rgba) {
            let metrics = self.font.v_metrics(self.scale);
            for glyph in self
                .font
                .layout(text, self.scale, point(x, y + metrics.ascent))
            {
                if let Some(bounds) = glyph.pixel_bounding_box() {
                    glyph.draw(|gx, gy, coverage| {
                        blend_pixel(
                            pixmap,
                            bounds.min.x + gx as i32,
                            bounds.min.y + gy as i32,
                            color,
                            coverage,
                        );
                    });
                }
            }
        }
    }
}

/// Loads the configured label font, falling back to [`BitmapFont`].
pub fn load_label_font(path: Option<&Path>) -> Box<dyn LabelFont> {
    let Some(path) = path else {
        return Box::new(BitmapFont::new(1));
    };

    #[cfg(feature = "truetype")]
    match TrueTypeFont::load(path, 13.0) {
        Ok(font) => return Box::new(font),
        Err(err) => warn!(error = %err, "falling back to built-in label font"),
    }

    #[cfg(not(feature = "truetype"))]
    warn!(
        path = %path.display(),
        "TrueType support disabled; using built-in label font"
    );

    Box::new(BitmapFont::new(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmap_font_measures_monospace_cells() {
        let font = BitmapFont::new(2);
        assert_eq!(font.measure("abc"), (34.0, 14.0));
        assert_eq!(font.measure(""), (0.0, 14.0));
    }

    #[test]
    fn measures_multi_line_blocks() {
        let font = BitmapFont::default();
        let (width, height) = font.measure_block("CH1 : 10 kS\n1 GS/s");
        assert_eq!(width, font.measure("CH1 : 10 kS").0);
        assert_eq!(height, font.line_height() + 7.0);
    }

    #[test]
    fn draws_glyph_pixels() {
        let mut pixmap = Pixmap::new(8, 8).unwrap();
        BitmapFont::default().draw(&mut pixmap, 0.0, 0.0, "|", Rgba::WHITE);
        let column: Vec<u8> = (0..7).map(|y| pixmap.data()[(y * 8 + 2) * 4 + 3]).collect();
        assert!(column.iter().all(|&alpha| alpha == 255));
        assert_eq!(pixmap.data()[3], 0);
    }

    #[test]
    fn blend_clips_to_pixmap() {
        let mut pixmap = Pixmap::new(2, 2).unwrap();
        blend_pixel(&mut pixmap, -1, 0, Rgba::WHITE, 1.0);
        blend_pixel(&mut pixmap, 2, 1, Rgba::WHITE, 1.0);
        assert!(pixmap.data().iter().all(|&b| b == 0));
        blend_pixel(&mut pixmap, 1, 1, Rgba::RED, 0.5);
        assert_eq!(&pixmap.data()[12..16], &[128, 0, 0, 128]);
    }

    #[test]
    fn missing_font_falls_back() {
        let font = load_label_font(Some(Path::new("/nonexistent/label.ttf")));
        assert_eq!(font.measure("ab"), BitmapFont::default().measure("ab"));
    }
}
