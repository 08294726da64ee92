//! WGSL sources for every GPU pass and helpers that turn them into modules.
//!
//! Coordinates: fragment shaders see framebuffer positions with the origin at
//! the top-left, while the coverage image and density fields store row 0 at
//! the bottom of the plot. The trace and density passes flip y when reading.

/// Threads per workgroup in the raster pass; one thread per pixel column.
pub(crate) const RASTER_WORKGROUP_SIZE: u32 = 16;

const WORKGROUP_PLACEHOLDER: &str = "{{WORKGROUP_SIZE}}";

/// Workgroups needed to cover `plot_width` columns.
pub(crate) fn raster_workgroups(plot_width: u32) -> u32 {
    plot_width.div_ceil(RASTER_WORKGROUP_SIZE)
}

pub(crate) fn vertex_module(device: &wgpu::Device) -> wgpu::ShaderModule {
    wgsl_module(device, "fullscreen triangle vertex", VERTEX_SHADER_WGSL.into())
}

pub(crate) fn raster_module(device: &wgpu::Device) -> wgpu::ShaderModule {
    wgsl_module(device, "trace raster compute", raster_shader_source())
}

pub(crate) fn layer_module(device: &wgpu::Device) -> wgpu::ShaderModule {
    wgsl_module(device, "layer fragment", LAYER_SHADER_WGSL.into())
}

pub(crate) fn trace_module(device: &wgpu::Device) -> wgpu::ShaderModule {
    wgsl_module(device, "trace color fragment", TRACE_SHADER_WGSL.into())
}

pub(crate) fn density_module(device: &wgpu::Device) -> wgpu::ShaderModule {
    wgsl_module(device, "density fragment", DENSITY_SHADER_WGSL.into())
}

fn wgsl_module(device: &wgpu::Device, label: &str, source: String) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    })
}

/// Raster compute source with the workgroup size substituted.
pub(crate) fn raster_shader_source() -> String {
    RASTER_SHADER_WGSL.replace(WORKGROUP_PLACEHOLDER, &RASTER_WORKGROUP_SIZE.to_string())
}

const VERTEX_SHADER_WGSL: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> VertexOutput {
    var positions = array<vec2<f32>, 3>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(3.0, -1.0),
        vec2<f32>(-1.0, 3.0),
    );
    var out: VertexOutput;
    out.position = vec4<f32>(positions[index], 0.0, 1.0);
    return out;
}
"#;

/// One invocation per pixel column. `columns[x]` names the first sample to
/// look at; the walk starts one sample earlier so the segment entering the
/// column is included, and stops at the first sample starting past it.
const RASTER_SHADER_WGSL: &str = r#"
struct RasterConfig {
    window_height: u32,
    window_width: u32,
    depth: u32,
    alpha: f32,
};

@group(0) @binding(0) var<uniform> config: RasterConfig;
@group(0) @binding(1) var<storage, read> vertices: array<vec2<f32>>;
@group(0) @binding(2) var<storage, read> columns: array<u32>;
@group(0) @binding(3) var coverage: texture_storage_2d<r32float, write>;

@compute @workgroup_size({{WORKGROUP_SIZE}}, 1, 1)
fn cs_main(@builtin(global_invocation_id) id: vec3<u32>) {
    let x = id.x;
    if (x >= config.window_width) {
        return;
    }

    let left = f32(x);
    let right = left + 1.0;
    var lo = 0.0;
    var hi = 0.0;
    var hit = false;

    let first = columns[x];
    if (first < config.depth) {
        var i = max(first, 1u) - 1u;
        loop {
            if (i >= config.depth) {
                break;
            }
            let a = vertices[i];
            if (a.x >= right) {
                break;
            }
            var b = vec2<f32>(max(right, a.x), a.y);
            if (i + 1u < config.depth) {
                b = vertices[i + 1u];
            }
            if (b.x >= left) {
                var y0 = a.y;
                var y1 = b.y;
                let span = b.x - a.x;
                if (span > 0.0) {
                    y0 = mix(a.y, b.y, clamp((left - a.x) / span, 0.0, 1.0));
                    y1 = mix(a.y, b.y, clamp((right - a.x) / span, 0.0, 1.0));
                }
                if (!hit) {
                    lo = min(y0, y1);
                    hi = max(y0, y1);
                    hit = true;
                } else {
                    lo = min(lo, min(y0, y1));
                    hi = max(hi, max(y0, y1));
                }
            }
            i = i + 1u;
        }
    }

    for (var y = 0u; y < config.window_height; y = y + 1u) {
        let fy = f32(y);
        var value = 0.0;
        if (hit && fy + 1.0 > lo && fy <= hi) {
            value = config.alpha;
        }
        textureStore(coverage, vec2<i32>(i32(x), i32(y)), vec4<f32>(value, 0.0, 0.0, 1.0));
    }
}
"#;

const LAYER_SHADER_WGSL: &str = r#"
@group(0) @binding(0) var layer: texture_2d<f32>;

@fragment
fn fs_layer(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {
    let dims = vec2<i32>(textureDimensions(layer));
    let at = vec2<i32>(frag.xy);
    if (at.x >= dims.x || at.y >= dims.y) {
        discard;
    }
    return textureLoad(layer, at, 0);
}
"#;

const TRACE_SHADER_WGSL: &str = r#"
struct TraceUniforms {
    color: vec4<f32>,
    plot: vec4<f32>,
};

@group(0) @binding(0) var coverage: texture_2d<f32>;
@group(0) @binding(1) var<uniform> trace: TraceUniforms;

@fragment
fn fs_trace(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {
    if (frag.x >= trace.plot.x) {
        discard;
    }
    let dims = vec2<i32>(textureDimensions(coverage));
    let x = i32(frag.x);
    let y = i32(trace.plot.y) - 1 - i32(frag.y);
    if (x >= dims.x || y < 0 || y >= dims.y) {
        discard;
    }
    let c = textureLoad(coverage, vec2<i32>(x, y), 0).r;
    return vec4<f32>(trace.color.rgb * c, c);
}
"#;

const DENSITY_SHADER_WGSL: &str = r#"
struct DensityUniforms {
    plot: vec4<f32>,
    scale: vec4<f32>,
};

@group(0) @binding(0) var field: texture_2d<f32>;
@group(0) @binding(1) var ramp: texture_2d<f32>;
@group(0) @binding(2) var<uniform> density: DensityUniforms;

@fragment
fn fs_density(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {
    if (frag.x >= density.plot.x) {
        discard;
    }
    let u = frag.x / density.plot.x;
    let v = 1.0 - frag.y / density.plot.y;
    let fx = clamp(i32(u * density.plot.z), 0, i32(density.plot.z) - 1);
    let fy = clamp(i32(v * density.plot.w), 0, i32(density.plot.w) - 1);
    let value = textureLoad(field, vec2<i32>(fx, fy), 0).r * density.scale.x;
    let index = clamp(i32(value * 255.0), 0, 255);
    return textureLoad(ramp, vec2<i32>(index, 0), 0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(source: &str) -> naga::Module {
        let module = naga::front::wgsl::parse_str(source).expect("wgsl parses");
        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::default(),
        )
        .validate(&module)
        .expect("wgsl validates");
        module
    }

    fn has_entry_point(module: &naga::Module, name: &str) -> bool {
        module.entry_points.iter().any(|entry| entry.name == name)
    }

    #[test]
    fn raster_shader_substitutes_workgroup_size() {
        let source = raster_shader_source();
        assert!(!source.contains(WORKGROUP_PLACEHOLDER));
        let module = validate(&source);
        let entry = module
            .entry_points
            .iter()
            .find(|entry| entry.name == "cs_main")
            .unwrap();
        assert_eq!(entry.workgroup_size, [RASTER_WORKGROUP_SIZE, 1, 1]);
    }

    #[test]
    fn render_shaders_validate() {
        assert!(has_entry_point(&validate(VERTEX_SHADER_WGSL), "vs_main"));
        assert!(has_entry_point(&validate(LAYER_SHADER_WGSL), "fs_layer"));
        assert!(has_entry_point(&validate(TRACE_SHADER_WGSL), "fs_trace"));
        assert!(has_entry_point(&validate(DENSITY_SHADER_WGSL), "fs_density"));
    }

    #[test]
    fn workgroups_cover_plot_width() {
        assert_eq!(raster_workgroups(0), 0);
        assert_eq!(raster_workgroups(1), 1);
        assert_eq!(raster_workgroups(16), 1);
        assert_eq!(raster_workgroups(17), 2);
    }
}
