use crate::compile;

use super::textures::SCALAR_FORMAT;

/// Every pipeline a frame uses, along with their bind group layouts.
pub(crate) struct Pipelines {
    pub raster_layout: wgpu::BindGroupLayout,
    pub raster: wgpu::ComputePipeline,
    pub layer_layout: wgpu::BindGroupLayout,
    /// Opaque replace; the first write of every frame.
    pub underlay: wgpu::RenderPipeline,
    /// Premultiplied source-over.
    pub overlay: wgpu::RenderPipeline,
    pub trace_layout: wgpu::BindGroupLayout,
    pub trace: wgpu::RenderPipeline,
    pub density_layout: wgpu::BindGroupLayout,
    pub density: wgpu::RenderPipeline,
}

impl Pipelines {
    pub(crate) fn new(device: &wgpu::Device, target: wgpu::TextureFormat) -> Self {
        let vertex = compile::vertex_module(device);

        let raster_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("raster layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::COMPUTE),
                storage_entry(1),
                storage_entry(2),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: SCALAR_FORMAT,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
            ],
        });
        let raster_module = compile::raster_module(device);
        let raster = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("raster pipeline"),
            layout: Some(&pipeline_layout(device, "raster", &raster_layout)),
            module: &raster_module,
            entry_point: Some("cs_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        let layer_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("layer layout"),
            entries: &[texture_entry(0)],
        });
        let layer_module = compile::layer_module(device);
        let layer_pipeline_layout = pipeline_layout(device, "layer", &layer_layout);
        let underlay = render_pipeline(
            device,
            RenderStage {
                label: "underlay pipeline",
                layout: &layer_pipeline_layout,
                vertex: &vertex,
                fragment: &layer_module,
                entry_point: "fs_layer",
                target,
                blend: None,
            },
        );
        let overlay = render_pipeline(
            device,
            RenderStage {
                label: "overlay pipeline",
                layout: &layer_pipeline_layout,
                vertex: &vertex,
                fragment: &layer_module,
                entry_point: "fs_layer",
                target,
                blend: Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
            },
        );

        let trace_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("trace layout"),
            entries: &[texture_entry(0), uniform_entry(1, wgpu::ShaderStages::FRAGMENT)],
        });
        let trace_module = compile::trace_module(device);
        let trace = render_pipeline(
            device,
            RenderStage {
                label: "trace pipeline",
                layout: &pipeline_layout(device, "trace", &trace_layout),
                vertex: &vertex,
                fragment: &trace_module,
                entry_point: "fs_trace",
                target,
                blend: Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
            },
        );

        let density_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("density layout"),
            entries: &[
                texture_entry(0),
                texture_entry(1),
                uniform_entry(2, wgpu::ShaderStages::FRAGMENT),
            ],
        });
        let density_module = compile::density_module(device);
        let density = render_pipeline(
            device,
            RenderStage {
                label: "density pipeline",
                layout: &pipeline_layout(device, "density", &density_layout),
                vertex: &vertex,
                fragment: &density_module,
                entry_point: "fs_density",
                target,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
            },
        );

        Self {
            raster_layout,
            raster,
            layer_layout,
            underlay,
            overlay,
            trace_layout,
            trace,
            density_layout,
            density,
        }
    }
}

struct RenderStage<'a> {
    label: &'a str,
    layout: &'a wgpu::PipelineLayout,
    vertex: &'a wgpu::ShaderModule,
    fragment: &'a wgpu::ShaderModule,
    entry_point: &'a str,
    target: wgpu::TextureFormat,
    blend: Option<wgpu::BlendState>,
}

fn render_pipeline(device: &wgpu::Device, stage: RenderStage<'_>) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(stage.label),
        layout: Some(stage.layout),
        vertex: wgpu::VertexState {
            module: stage.vertex,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: stage.fragment,
            entry_point: Some(stage.entry_point),
            targets: &[Some(wgpu::ColorTargetState {
                format: stage.target,
                blend: stage.blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    })
}

fn pipeline_layout(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::BindGroupLayout,
) -> wgpu::PipelineLayout {
    device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    })
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}
