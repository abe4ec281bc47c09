//! WGSL sources and render pipeline construction for every pass the
//! executor, mask engine, and matte engine need: a textured quad blit (used
//! by `DrawImage`/`DrawShape`/`DrawStroke` and the mask inner-content
//! composite), a mesh pipeline that writes solid coverage into an R8
//! target, a fullscreen ping-pong combine pass, and a fullscreen matte
//! composite pass.
//!
//! Follows the teacher's `effect.rs` idiom: WGSL kept as string constants,
//! compiled once per pipeline at construction time, premultiplied-alpha
//! blend state (`One`/`OneMinusSrcAlpha` on both channels) wherever a pass
//! draws onto an already-populated target.

use crate::geom::Matrix2D;
use crate::vertex::QuadVertex;
use wgpu::util::DeviceExt;

pub fn matrix2d_to_mat4(m: &Matrix2D) -> [[f32; 4]; 4] {
    [
        [m.a, m.b, 0.0, 0.0],
        [m.c, m.d, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [m.tx, m.ty, 0.0, 1.0],
    ]
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MvpUniform {
    pub mvp: [[f32; 4]; 4],
}

fn premultiplied_blend() -> wgpu::BlendState {
    wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: wgpu::BlendOperation::Add,
        },
    }
}

const MESH_VS: &str = r#"
struct Uniforms {
    mvp: mat4x4<f32>,
};
@group(0) @binding(0) var<uniform> u: Uniforms;

struct VsOut {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_mesh(@location(0) position: vec2<f32>, @location(1) uv: vec2<f32>) -> VsOut {
    var out: VsOut;
    out.position = u.mvp * vec4<f32>(position, 0.0, 1.0);
    out.uv = uv;
    return out;
}
"#;

const QUAD_BLIT_FS: &str = r#"
@group(1) @binding(0) var t_src: texture_2d<f32>;
@group(1) @binding(1) var s_src: sampler;

@fragment
fn fs_blit(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return textureSample(t_src, s_src, uv);
}
"#;

const COVERAGE_FS: &str = r#"
@fragment
fn fs_coverage() -> @location(0) f32 {
    return 1.0;
}
"#;

const FULLSCREEN_QUAD_VS: &str = r#"
struct QuadOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_fullscreen(@builtin(vertex_index) vi: u32) -> QuadOutput {
    let uv = vec2<f32>(f32((vi << 1u) & 2u), f32(vi & 2u));
    var out: QuadOutput;
    out.position = vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
    out.uv = vec2<f32>(uv.x, 1.0 - uv.y);
    return out;
}
"#;

const MASK_COMBINE_FS: &str = r#"
struct CombineParams {
    mode: u32,
    inverted: u32,
    opacity: f32,
    _pad: f32,
};
@group(0) @binding(0) var t_coverage: texture_2d<f32>;
@group(0) @binding(1) var t_accum_in: texture_2d<f32>;
@group(0) @binding(2) var s_samp: sampler;
@group(0) @binding(3) var<uniform> params: CombineParams;

@fragment
fn fs_combine(@location(0) uv: vec2<f32>) -> @location(0) f32 {
    var c = textureSample(t_coverage, s_samp, uv).r;
    if (params.inverted != 0u) {
        c = 1.0 - c;
    }
    c = c * params.opacity;
    let accum_in = textureSample(t_accum_in, s_samp, uv).r;
    // mode 0 = add, 1 = subtract, 2 = intersect
    if (params.mode == 0u) {
        return clamp(accum_in + c, 0.0, 1.0);
    } else if (params.mode == 1u) {
        return clamp(accum_in - c, 0.0, 1.0);
    } else {
        return accum_in * c;
    }
}
"#;

const MASK_COMPOSITE_FS: &str = r#"
@group(0) @binding(0) var t_content: texture_2d<f32>;
@group(0) @binding(1) var t_accum: texture_2d<f32>;
@group(0) @binding(2) var s_samp: sampler;

@fragment
fn fs_mask_composite(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    let content = textureSample(t_content, s_samp, uv);
    let a = textureSample(t_accum, s_samp, uv).r;
    return content * a;
}
"#;

const MATTE_COMPOSITE_FS: &str = r#"
struct MatteParams {
    mode: u32, // 0 alpha, 1 alphaInverted, 2 luma, 3 lumaInverted
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
};
@group(0) @binding(0) var t_consumer: texture_2d<f32>;
@group(0) @binding(1) var t_source: texture_2d<f32>;
@group(0) @binding(2) var s_samp: sampler;
@group(0) @binding(3) var<uniform> params: MatteParams;

@fragment
fn fs_matte_composite(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    let consumer = textureSample(t_consumer, s_samp, uv);
    let source = textureSample(t_source, s_samp, uv);
    var factor: f32;
    if (params.mode == 0u) {
        factor = source.a;
    } else if (params.mode == 1u) {
        factor = 1.0 - source.a;
    } else {
        let luma = dot(source.rgb, vec3<f32>(0.2126, 0.7152, 0.0722));
        if (params.mode == 2u) {
            factor = luma;
        } else {
            factor = 1.0 - luma;
        }
    }
    return consumer * factor;
}
"#;

fn create_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("animcore_linear_sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}

fn create_mvp_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("animcore_mvp_bgl"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    })
}

fn texture_sampler_bind_group_layout(
    device: &wgpu::Device,
    label: &str,
    texture_count: u32,
) -> wgpu::BindGroupLayout {
    let mut entries = Vec::new();
    for i in 0..texture_count {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: i,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
    }
    entries.push(wgpu::BindGroupLayoutEntry {
        binding: texture_count,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    });
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &entries,
    })
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Every compiled pipeline the renderer needs, built once against the
/// target's color format.
pub struct Pipelines {
    pub mvp_bgl: wgpu::BindGroupLayout,
    pub quad_blit_texture_bgl: wgpu::BindGroupLayout,
    pub quad_blit: wgpu::RenderPipeline,
    pub coverage: wgpu::RenderPipeline,
    pub mask_combine_bgl: wgpu::BindGroupLayout,
    pub mask_combine: wgpu::RenderPipeline,
    pub mask_composite_bgl: wgpu::BindGroupLayout,
    pub mask_composite: wgpu::RenderPipeline,
    pub matte_composite_bgl: wgpu::BindGroupLayout,
    pub matte_composite: wgpu::RenderPipeline,
    pub sampler: wgpu::Sampler,
}

impl Pipelines {
    pub fn new(device: &wgpu::Device, color_format: wgpu::TextureFormat) -> Self {
        let mvp_bgl = create_mvp_bind_group_layout(device);
        let quad_blit_texture_bgl =
            texture_sampler_bind_group_layout(device, "animcore_quad_blit_textures_bgl", 1);

        let mesh_vs_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("animcore_mesh_vs"),
            source: wgpu::ShaderSource::Wgsl(MESH_VS.into()),
        });

        let quad_blit_fs_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("animcore_quad_blit_fs"),
            source: wgpu::ShaderSource::Wgsl(format!("{MESH_VS}\n{QUAD_BLIT_FS}").into()),
        });

        let quad_blit_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("animcore_quad_blit_layout"),
            bind_group_layouts: &[&mvp_bgl, &quad_blit_texture_bgl],
            push_constant_ranges: &[],
        });

        let quad_blit = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("animcore_quad_blit_pipeline"),
            layout: Some(&quad_blit_layout),
            vertex: wgpu::VertexState {
                module: &quad_blit_fs_module,
                entry_point: "vs_mesh",
                buffers: &[QuadVertex::desc()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &quad_blit_fs_module,
                entry_point: "fs_blit",
                targets: &[Some(wgpu::ColorTargetState {
                    format: color_format,
                    blend: Some(premultiplied_blend()),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        let coverage_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("animcore_coverage_layout"),
            bind_group_layouts: &[&mvp_bgl],
            push_constant_ranges: &[],
        });
        let coverage_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("animcore_coverage_shader"),
            source: wgpu::ShaderSource::Wgsl(format!("{MESH_VS}\n{COVERAGE_FS}").into()),
        });
        let coverage = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("animcore_coverage_pipeline"),
            layout: Some(&coverage_layout),
            vertex: wgpu::VertexState {
                module: &coverage_module,
                entry_point: "vs_mesh",
                buffers: &[QuadVertex::desc()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &coverage_module,
                entry_point: "fs_coverage",
                targets: &[Some(wgpu::ColorTargetState {
                    format: wgpu::TextureFormat::R8Unorm,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        let mask_combine_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("animcore_mask_combine_bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                uniform_entry(3),
            ],
        });
        let mask_combine_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("animcore_mask_combine_shader"),
            source: wgpu::ShaderSource::Wgsl(format!("{FULLSCREEN_QUAD_VS}\n{MASK_COMBINE_FS}").into()),
        });
        let mask_combine_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("animcore_mask_combine_layout"),
            bind_group_layouts: &[&mask_combine_bgl],
            push_constant_ranges: &[],
        });
        let mask_combine = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("animcore_mask_combine_pipeline"),
            layout: Some(&mask_combine_layout),
            vertex: wgpu::VertexState {
                module: &mask_combine_module,
                entry_point: "vs_fullscreen",
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &mask_combine_module,
                entry_point: "fs_combine",
                targets: &[Some(wgpu::ColorTargetState {
                    format: wgpu::TextureFormat::R8Unorm,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        let mask_composite_bgl =
            texture_sampler_bind_group_layout(device, "animcore_mask_composite_bgl", 2);
        let mask_composite_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("animcore_mask_composite_shader"),
            source: wgpu::ShaderSource::Wgsl(
                format!("{FULLSCREEN_QUAD_VS}\n{MASK_COMPOSITE_FS}").into(),
            ),
        });
        let mask_composite_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("animcore_mask_composite_layout"),
                bind_group_layouts: &[&mask_composite_bgl],
                push_constant_ranges: &[],
            });
        let mask_composite = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("animcore_mask_composite_pipeline"),
            layout: Some(&mask_composite_layout),
            vertex: wgpu::VertexState {
                module: &mask_composite_module,
                entry_point: "vs_fullscreen",
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &mask_composite_module,
                entry_point: "fs_mask_composite",
                targets: &[Some(wgpu::ColorTargetState {
                    format: color_format,
                    blend: Some(premultiplied_blend()),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        let matte_composite_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("animcore_matte_composite_bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                uniform_entry(3),
            ],
        });
        let matte_composite_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("animcore_matte_composite_shader"),
            source: wgpu::ShaderSource::Wgsl(
                format!("{FULLSCREEN_QUAD_VS}\n{MATTE_COMPOSITE_FS}").into(),
            ),
        });
        let matte_composite_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("animcore_matte_composite_layout"),
                bind_group_layouts: &[&matte_composite_bgl],
                push_constant_ranges: &[],
            });
        let matte_composite = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("animcore_matte_composite_pipeline"),
            layout: Some(&matte_composite_layout),
            vertex: wgpu::VertexState {
                module: &matte_composite_module,
                entry_point: "vs_fullscreen",
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &matte_composite_module,
                entry_point: "fs_matte_composite",
                targets: &[Some(wgpu::ColorTargetState {
                    format: color_format,
                    blend: Some(premultiplied_blend()),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        let sampler = create_sampler(device);

        Self {
            mvp_bgl,
            quad_blit_texture_bgl,
            quad_blit,
            coverage,
            mask_combine_bgl,
            mask_combine,
            mask_composite_bgl,
            mask_composite,
            matte_composite_bgl,
            matte_composite,
            sampler,
        }
    }
}

pub fn create_mvp_buffer(device: &wgpu::Device, mvp: &Matrix2D) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("animcore_mvp_buffer"),
        contents: bytemuck::bytes_of(&MvpUniform {
            mvp: matrix2d_to_mat4(mvp),
        }),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    })
}
