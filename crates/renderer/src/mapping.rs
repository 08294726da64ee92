//! Conversions between sample time, vertical units and plot pixels.
//!
//! Pixel space has its origin at the bottom-left of the plot: x grows to the
//! right, y grows upward. Both the trace raster and the vector layers draw in
//! this space.

/// Lowest value on a decibel axis; maps to the bottom of the plot area.
pub const DECIBEL_FLOOR: f32 = -70.0;

/// Horizontal mapping shared by every channel drawn in one plot.
///
/// A copy is taken at the start of each frame so the timebase cannot change
/// while channels are being drawn.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timebase {
    pub pixels_per_x_unit: f64,
    pub x_axis_offset: i64,
}

impl Timebase {
    pub fn new(pixels_per_x_unit: f64, x_axis_offset: i64) -> Self {
        Self {
            pixels_per_x_unit,
            x_axis_offset,
        }
    }

    pub fn x_units_to_pixel(&self, t: f64) -> f64 {
        (t - self.x_axis_offset as f64) * self.pixels_per_x_unit
    }

    pub fn pixel_to_x_units(&self, pixel: f64) -> f64 {
        self.x_axis_offset as f64 + pixel / self.pixels_per_x_unit
    }

    pub fn x_units_to_pixels(&self, span: f64) -> f64 {
        span * self.pixels_per_x_unit
    }

    pub fn pixels_to_x_units(&self, pixels: f64) -> f64 {
        pixels / self.pixels_per_x_unit
    }
}

/// Per-channel mapping for one frame: the shared timebase plus the channel's
/// vertical scale and offset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoordinateMapper {
    pub timebase: Timebase,
    height: f32,
    pixels_per_volt: f32,
    offset: f32,
    padding: f32,
}

impl CoordinateMapper {
    /// `range` is the full-height vertical span; `offset` is added to every
    /// value before scaling.
    pub fn new(timebase: Timebase, height: f32, range: f32, offset: f32, padding: f32) -> Self {
        Self {
            timebase,
            height,
            pixels_per_volt: height / range,
            offset,
            padding,
        }
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn pixels_per_volt(&self) -> f32 {
        self.pixels_per_volt
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }

    pub fn padding(&self) -> f32 {
        self.padding
    }

    /// Top edge of the usable plot area.
    pub fn plot_top(&self) -> f32 {
        self.height - self.padding
    }

    /// Bottom edge of the usable plot area.
    pub fn plot_bottom(&self) -> f32 {
        self.padding
    }

    pub fn x_units_to_pixel(&self, t: f64) -> f64 {
        self.timebase.x_units_to_pixel(t)
    }

    pub fn pixel_to_x_units(&self, pixel: f64) -> f64 {
        self.timebase.pixel_to_x_units(pixel)
    }

    pub fn volts_to_pixel_y(&self, volts: f32) -> f32 {
        self.height / 2.0 + (volts + self.offset) * self.pixels_per_volt
    }

    pub fn pixel_y_to_volts(&self, y: f32) -> f32 {
        (y - self.height / 2.0) / self.pixels_per_volt - self.offset
    }

    pub fn volts_to_pixels(&self, volts: f32) -> f32 {
        volts * self.pixels_per_volt
    }

    pub fn pixels_to_volts(&self, pixels: f32) -> f32 {
        pixels / self.pixels_per_volt
    }

    /// 0 dB sits at the top of the plot area, [`DECIBEL_FLOOR`] at the bottom.
    pub fn decibels_to_pixel_y(&self, db: f32) -> f32 {
        let plot_height = self.height - 2.0 * self.padding;
        self.padding + plot_height * (1.0 - db / DECIBEL_FLOOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> CoordinateMapper {
        CoordinateMapper::new(Timebase::new(0.25, -400), 400.0, 2.0, 0.1, 2.0)
    }

    #[test]
    fn time_round_trips() {
        let tb = Timebase::new(0.013, 12_345);
        for t in [-1.0e6, -3.5, 0.0, 17.25, 9.99e8] {
            let back = tb.pixel_to_x_units(tb.x_units_to_pixel(t));
            assert!((back - t).abs() <= 1e-6 * t.abs().max(1.0), "{t} -> {back}");
        }
        for px in [0.0, 0.5, 799.0, -20.0] {
            let back = tb.x_units_to_pixel(tb.pixel_to_x_units(px));
            assert!((back - px).abs() < 1e-6, "{px} -> {back}");
        }
    }

    #[test]
    fn voltage_round_trips() {
        let m = mapper();
        for v in [-1.1, -0.5, 0.0, 0.123, 0.9] {
            let back = m.pixel_y_to_volts(m.volts_to_pixel_y(v));
            assert!((back - v).abs() < 1e-5, "{v} -> {back}");
        }
    }

    #[test]
    fn zero_with_offset_shifts_from_center() {
        let m = mapper();
        assert_eq!(m.pixels_per_volt(), 200.0);
        assert!((m.volts_to_pixel_y(-0.1) - 200.0).abs() < 1e-4);
        assert!((m.volts_to_pixel_y(0.9) - 400.0).abs() < 1e-4);
    }

    #[test]
    fn decibel_axis_spans_plot() {
        let m = mapper();
        assert!((m.decibels_to_pixel_y(0.0) - m.plot_top()).abs() < 1e-4);
        assert!((m.decibels_to_pixel_y(DECIBEL_FLOOR) - m.plot_bottom()).abs() < 1e-4);
        assert!(m.decibels_to_pixel_y(-90.0) < m.plot_bottom());
    }

    #[test]
    fn timebase_offsets_origin() {
        let tb = Timebase::new(0.25, -400);
        assert_eq!(tb.x_units_to_pixel(-400.0), 0.0);
        assert_eq!(tb.x_units_to_pixel(0.0), 100.0);
        assert_eq!(tb.x_units_to_pixels(8.0), 2.0);
        assert_eq!(tb.pixels_to_x_units(2.0), 8.0);
    }
}
