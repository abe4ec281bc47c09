//! The one vertex layout shared by every mesh-based pass: a textured quad
//! position plus a UV, used for image/shape/stroke blits, mask coverage
//! triangles (UV unused), and mask inner-content quads.

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

impl QuadVertex {
    pub const fn new(position: [f32; 2], uv: [f32; 2]) -> Self {
        Self { position, uv }
    }

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

/// Builds the six vertices (two triangles) of an axis-aligned quad in NDC
/// space, given its four already-transformed corners (clockwise or
/// counter-clockwise, matching the source rect's corner order) and their
/// matching UVs.
pub fn quad_from_corners(corners_ndc: [[f32; 2]; 4], uvs: [[f32; 2]; 4]) -> [QuadVertex; 6] {
    [
        QuadVertex::new(corners_ndc[0], uvs[0]),
        QuadVertex::new(corners_ndc[1], uvs[1]),
        QuadVertex::new(corners_ndc[2], uvs[2]),
        QuadVertex::new(corners_ndc[2], uvs[2]),
        QuadVertex::new(corners_ndc[3], uvs[3]),
        QuadVertex::new(corners_ndc[0], uvs[0]),
    ]
}
