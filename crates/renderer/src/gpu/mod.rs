//! wgpu backend for the frame orchestrator.
//!
//! - `context` owns the instance, device and optional window surface, and
//!   reconfigures the surface when the window resizes.
//! - `pipeline` builds the raster compute pipeline and the four composite
//!   pipelines with their blend states.
//! - `textures` wraps size-tracked textures for layers, coverage images and
//!   density fields.
//! - `uniforms` mirrors the WGSL uniform blocks.
//! - `readback` copies the offscreen target back for PNG export.
//! - `state` implements [`crate::frame::FrameSink`] on top of all of it.

mod context;
mod pipeline;
mod readback;
mod state;
mod textures;
mod uniforms;

pub(crate) use state::GpuState;
pub use uniforms::RasterConfig;
