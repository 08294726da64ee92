use bytemuck::{Pod, Zeroable};

use crate::types::Rgba;

/// Configuration block for the raster compute pass.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RasterConfig {
    pub window_height: u32,
    pub window_width: u32,
    /// Number of samples in the vertex buffer; also the column sentinel.
    pub depth: u32,
    pub alpha: f32,
}

unsafe impl Zeroable for RasterConfig {}
unsafe impl Pod for RasterConfig {}

impl RasterConfig {
    pub fn new(plot_width: u32, plot_height: u32, depth: u32, alpha: f32) -> Self {
        Self {
            window_height: plot_height,
            window_width: plot_width,
            depth,
            alpha: alpha.clamp(0.0, 1.0),
        }
    }
}

/// Color-correction pass parameters.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug)]
pub(crate) struct TraceUniforms {
    pub color: [f32; 4],
    /// `(plot_right, surface_height, 0, 0)`.
    pub plot: [f32; 4],
}

unsafe impl Zeroable for TraceUniforms {}
unsafe impl Pod for TraceUniforms {}

impl TraceUniforms {
    pub fn new(color: Rgba, plot_right: f32, height: u32) -> Self {
        Self {
            color: [color.r, color.g, color.b, 1.0],
            plot: [plot_right, height as f32, 0.0, 0.0],
        }
    }
}

/// Density pass parameters.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug)]
pub(crate) struct DensityUniforms {
    /// `(plot_right, surface_height, field_width, field_height)`.
    pub plot: [f32; 4],
    /// `x` holds the reciprocal of the field's peak value.
    pub scale: [f32; 4],
}

unsafe impl Zeroable for DensityUniforms {}
unsafe impl Pod for DensityUniforms {}

impl DensityUniforms {
    pub fn new(plot_right: f32, height: u32, field: (u32, u32), peak: f32) -> Self {
        let inverse = if peak > 0.0 { 1.0 / peak } else { 0.0 };
        Self {
            plot: [plot_right, height as f32, field.0 as f32, field.1 as f32],
            scale: [inverse, 0.0, 0.0, 0.0],
        }
    }
}
