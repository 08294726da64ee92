use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tiny_skia::Pixmap;
use waveform::DensityField;

use crate::compile::raster_workgroups;
use crate::frame::{CompositePass, FrameSink};
use crate::geometry::TraceGeometry;
use crate::special::ColorRamp;

use super::context::GpuContext;
use super::pipeline::Pipelines;
use super::readback;
use super::textures::{coverage_usage, layer_usage, SizedTexture, LAYER_FORMAT, SCALAR_FORMAT};
use super::uniforms::{DensityUniforms, RasterConfig, TraceUniforms};

/// Storage buffer that only ever grows.
struct GrowBuffer {
    buffer: wgpu::Buffer,
    capacity: u64,
}

impl GrowBuffer {
    fn write(
        slot: &mut Option<GrowBuffer>,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        bytes: &[u8],
    ) {
        let needed = (bytes.len() as u64).max(16);
        if slot.as_ref().is_none_or(|buffer| buffer.capacity < needed) {
            let capacity = needed.next_power_of_two();
            tracing::debug!(label, capacity, "growing storage buffer");
            *slot = Some(GrowBuffer {
                buffer: device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(label),
                    size: capacity,
                    usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                }),
                capacity,
            });
        }
        if let Some(buffer) = slot {
            queue.write_buffer(&buffer.buffer, 0, bytes);
        }
    }
}

/// GPU resources belonging to one channel slot.
struct TraceSlot {
    vertices: Option<GrowBuffer>,
    columns: Option<GrowBuffer>,
    config: wgpu::Buffer,
    uniforms: wgpu::Buffer,
    coverage: Option<SizedTexture>,
}

impl TraceSlot {
    fn new(device: &wgpu::Device) -> Self {
        Self {
            vertices: None,
            columns: None,
            config: uniform_buffer::<RasterConfig>(device, "raster config"),
            uniforms: uniform_buffer::<TraceUniforms>(device, "trace uniforms"),
            coverage: None,
        }
    }
}

struct DensityResources {
    field: Option<SizedTexture>,
    ramp: SizedTexture,
    ramp_kind: Option<ColorRamp>,
    uniforms: wgpu::Buffer,
    peak: f32,
}

/// Encoder and target for the frame in flight.
struct Frame {
    encoder: wgpu::CommandEncoder,
    surface: Option<wgpu::SurfaceTexture>,
    view: wgpu::TextureView,
}

/// wgpu implementation of [`FrameSink`], presenting to a window or an
/// offscreen texture.
pub(crate) struct GpuState {
    context: GpuContext,
    pipelines: Option<Pipelines>,
    offscreen: Option<SizedTexture>,
    slots: Vec<TraceSlot>,
    underlay: Option<SizedTexture>,
    overlay: Option<SizedTexture>,
    density: Option<DensityResources>,
    frame: Option<Frame>,
}

impl GpuState {
    pub(crate) fn windowed<T>(target: &T, size: (u32, u32)) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        Ok(Self::from_context(GpuContext::windowed(target, size)?))
    }

    pub(crate) fn headless(size: (u32, u32)) -> Result<Self> {
        Ok(Self::from_context(GpuContext::headless(size)?))
    }

    fn from_context(context: GpuContext) -> Self {
        Self {
            context,
            pipelines: None,
            offscreen: None,
            slots: Vec::new(),
            underlay: None,
            overlay: None,
            density: None,
            frame: None,
        }
    }

    pub(crate) fn size(&self) -> (u32, u32) {
        self.context.size
    }

    pub(crate) fn resize(&mut self, size: (u32, u32)) {
        self.context.resize(size);
    }

    /// Writes the last offscreen frame to `path` as a PNG.
    pub(crate) fn save_frame(&self, path: &Path) -> Result<()> {
        let target = self
            .offscreen
            .as_ref()
            .context("no offscreen frame has been rendered")?;
        let pixels = readback::read_rgba(
            &self.context.device,
            &self.context.queue,
            &target.texture,
            target.size,
            self.context.format,
        )?;
        readback::save_png(path, pixels, target.size)
    }

    fn acquire(&mut self) -> Result<(Option<wgpu::SurfaceTexture>, wgpu::TextureView)> {
        if let Some(surface) = &self.context.surface {
            let texture = match surface.get_current_texture() {
                Ok(texture) => texture,
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    let size = self.context.size;
                    self.context.resize(size);
                    bail!("surface was lost; reconfigured");
                }
                Err(err) => return Err(err.into()),
            };
            let view = texture
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default());
            return Ok((Some(texture), view));
        }

        let (target, _) = SizedTexture::ensure(
            &mut self.offscreen,
            &self.context.device,
            "offscreen target",
            self.context.size,
            self.context.format,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        );
        let view = target
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        Ok((None, view))
    }

    fn slot_mut(&mut self, slot: usize) -> &mut TraceSlot {
        while self.slots.len() <= slot {
            self.slots.push(TraceSlot::new(&self.context.device));
        }
        &mut self.slots[slot]
    }

    fn pop_error_scope(&self) -> Option<wgpu::Error> {
        pollster::block_on(self.context.device.pop_error_scope())
    }
}

impl FrameSink for GpuState {
    fn begin_frame(&mut self, size: (u32, u32)) -> Result<()> {
        if self.frame.take().is_some() {
            tracing::warn!("previous frame was never finished; dropping it");
            if let Some(err) = self.pop_error_scope() {
                tracing::warn!(error = %err, "graphics error in dropped frame");
            }
        }
        if size != self.context.size {
            self.context.resize(size);
        }

        let (surface, view) = self.acquire()?;
        self.context
            .device
            .push_error_scope(wgpu::ErrorFilter::Validation);
        let encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame encoder"),
            });
        self.frame = Some(Frame {
            encoder,
            surface,
            view,
        });
        Ok(())
    }

    fn bind_output(&mut self) -> Result<()> {
        let format = self.context.format;
        tracing::debug!(?format, "building pipelines for output target");
        self.pipelines = Some(Pipelines::new(&self.context.device, format));
        Ok(())
    }

    fn upload_geometry(&mut self, slot: usize, geometry: &TraceGeometry) -> Result<()> {
        let device = self.context.device.clone();
        let queue = self.context.queue.clone();
        let trace = self.slot_mut(slot);
        GrowBuffer::write(
            &mut trace.vertices,
            &device,
            &queue,
            "trace vertices",
            bytemuck::cast_slice(&geometry.vertices),
        );
        GrowBuffer::write(
            &mut trace.columns,
            &device,
            &queue,
            "trace columns",
            bytemuck::cast_slice(&geometry.columns),
        );
        Ok(())
    }

    fn raster_trace(&mut self, slot: usize, config: RasterConfig) -> Result<()> {
        let frame = self.frame.as_mut().context("raster outside a frame")?;
        let pipelines = self.pipelines.as_ref().context("output not bound")?;
        let trace = self
            .slots
            .get_mut(slot)
            .ok_or_else(|| anyhow!("slot {slot} has no geometry"))?;
        let (Some(vertices), Some(columns)) = (&trace.vertices, &trace.columns) else {
            bail!("slot {slot} has no geometry");
        };

        let (coverage, _) = SizedTexture::ensure(
            &mut trace.coverage,
            &self.context.device,
            "trace coverage",
            (config.window_width, config.window_height),
            SCALAR_FORMAT,
            coverage_usage(),
        );
        self.context
            .queue
            .write_buffer(&trace.config, 0, bytemuck::bytes_of(&config));

        let bind_group = self
            .context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("raster bind group"),
                layout: &pipelines.raster_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: trace.config.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: vertices.buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: columns.buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::TextureView(&coverage.view),
                    },
                ],
            });

        let mut pass = frame
            .encoder
            .begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("raster pass"),
                timestamp_writes: None,
            });
        pass.set_pipeline(&pipelines.raster);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(raster_workgroups(config.window_width), 1, 1);
        Ok(())
    }

    fn upload_density(&mut self, field: &DensityField, ramp: ColorRamp) -> Result<()> {
        let device = &self.context.device;
        let queue = &self.context.queue;
        let density = self.density.get_or_insert_with(|| DensityResources {
            field: None,
            ramp: SizedTexture::new(
                device,
                "color ramp",
                (256, 1),
                LAYER_FORMAT,
                layer_usage(),
            ),
            ramp_kind: None,
            uniforms: uniform_buffer::<DensityUniforms>(device, "density uniforms"),
            peak: 0.0,
        });

        let (texture, _) = SizedTexture::ensure(
            &mut density.field,
            device,
            "density field",
            (field.width(), field.height()),
            SCALAR_FORMAT,
            layer_usage(),
        );
        texture.write(queue, bytemuck::cast_slice(field.data()), 4);
        density.peak = field.peak();

        if density.ramp_kind != Some(ramp) {
            let lut = ramp.lut();
            density.ramp.write(queue, bytemuck::cast_slice(&lut), 4);
            density.ramp_kind = Some(ramp);
        }
        Ok(())
    }

    fn upload_layers(&mut self, underlay: &Pixmap, overlay: &Pixmap) -> Result<()> {
        let device = &self.context.device;
        let queue = &self.context.queue;
        for (slot, pixmap, label) in [
            (&mut self.underlay, underlay, "underlay layer"),
            (&mut self.overlay, overlay, "overlay layer"),
        ] {
            let (texture, _) = SizedTexture::ensure(
                slot,
                device,
                label,
                (pixmap.width(), pixmap.height()),
                LAYER_FORMAT,
                layer_usage(),
            );
            texture.write(queue, pixmap.data(), 4);
        }
        Ok(())
    }

    fn composite(&mut self, pass: CompositePass) -> Result<()> {
        let frame = self.frame.as_mut().context("composite outside a frame")?;
        let pipelines = self.pipelines.as_ref().context("output not bound")?;
        let device = &self.context.device;
        let queue = &self.context.queue;
        let (width, height) = self.context.size;

        let (pipeline, bind_group, scissor) = match pass {
            CompositePass::Underlay | CompositePass::Overlay => {
                let (layer, pipeline) = if pass == CompositePass::Underlay {
                    (&self.underlay, &pipelines.underlay)
                } else {
                    (&self.overlay, &pipelines.overlay)
                };
                let layer = layer.as_ref().context("layer not uploaded")?;
                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("layer bind group"),
                    layout: &pipelines.layer_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&layer.view),
                    }],
                });
                (pipeline, bind_group, None)
            }
            CompositePass::Trace {
                slot,
                color,
                plot_right,
            } => {
                let trace = self
                    .slots
                    .get(slot)
                    .ok_or_else(|| anyhow!("slot {slot} was never rasterized"))?;
                let coverage = trace
                    .coverage
                    .as_ref()
                    .ok_or_else(|| anyhow!("slot {slot} was never rasterized"))?;
                let uniforms = TraceUniforms::new(color, plot_right, coverage.size.1);
                queue.write_buffer(&trace.uniforms, 0, bytemuck::bytes_of(&uniforms));
                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("trace bind group"),
                    layout: &pipelines.trace_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(&coverage.view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: trace.uniforms.as_entire_binding(),
                        },
                    ],
                });
                (&pipelines.trace, bind_group, None)
            }
            CompositePass::Density { plot_right } => {
                let density = self.density.as_ref().context("density not uploaded")?;
                let field = density.field.as_ref().context("density not uploaded")?;
                let uniforms = DensityUniforms::new(plot_right, height, field.size, density.peak);
                queue.write_buffer(&density.uniforms, 0, bytemuck::bytes_of(&uniforms));
                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("density bind group"),
                    layout: &pipelines.density_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(&field.view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(&density.ramp.view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: density.uniforms.as_entire_binding(),
                        },
                    ],
                });
                let right = (plot_right.ceil().max(0.0) as u32).min(width);
                (&pipelines.density, bind_group, Some(right))
            }
        };

        let load = if pass == CompositePass::Underlay {
            wgpu::LoadOp::Clear(wgpu::Color::BLACK)
        } else {
            wgpu::LoadOp::Load
        };
        let mut render_pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("composite pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &frame.view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        if let Some(right) = scissor {
            if right == 0 {
                return Ok(());
            }
            render_pass.set_scissor_rect(0, 0, right, height);
        }
        render_pass.set_pipeline(pipeline);
        render_pass.set_bind_group(0, &bind_group, &[]);
        render_pass.draw(0..3, 0..1);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let frame = self.frame.take().context("finish outside a frame")?;
        self.context.queue.submit(Some(frame.encoder.finish()));
        if let Some(surface) = frame.surface {
            surface.present();
        }
        match self.pop_error_scope() {
            Some(err) => Err(anyhow!("graphics error: {err}")),
            None => Ok(()),
        }
    }
}

fn uniform_buffer<T>(device: &wgpu::Device, label: &str) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: std::mem::size_of::<T>() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}
