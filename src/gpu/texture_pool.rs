//! A pool of reusable GPU textures keyed by `(width, height, format)`.
//!
//! Grounded on the teacher's `effect.rs::OffscreenTexturePool`, generalized
//! from a single fixed color format to the three formats the mask/matte
//! engines actually need: BGRA8 render targets, R8 mask accumulators, and a
//! depth-stencil format reserved for future use.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolFormat {
    Bgra8,
    R8,
    DepthStencil,
}

impl PoolFormat {
    pub fn wgpu_format(self) -> wgpu::TextureFormat {
        match self {
            PoolFormat::Bgra8 => wgpu::TextureFormat::Bgra8Unorm,
            PoolFormat::R8 => wgpu::TextureFormat::R8Unorm,
            PoolFormat::DepthStencil => wgpu::TextureFormat::Depth24PlusStencil8,
        }
    }

    fn usage(self) -> wgpu::TextureUsages {
        match self {
            PoolFormat::Bgra8 | PoolFormat::R8 => {
                wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC
            }
            PoolFormat::DepthStencil => wgpu::TextureUsages::RENDER_ATTACHMENT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PoolKey {
    width: u32,
    height: u32,
    format: PoolFormat,
}

pub struct PooledTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
    pub format: PoolFormat,
}

/// Keeps a free list per `(width, height, format)`. `acquire` pops from the
/// matching free list or allocates; `release` pushes back.
#[derive(Default)]
pub struct TexturePool {
    free: HashMap<PoolKey, Vec<PooledTexture>>,
}

impl TexturePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(
        &mut self,
        device: &wgpu::Device,
        width: u32,
        height: u32,
        format: PoolFormat,
    ) -> PooledTexture {
        let key = PoolKey {
            width,
            height,
            format,
        };
        if let Some(list) = self.free.get_mut(&key) {
            if let Some(texture) = list.pop() {
                return texture;
            }
        }
        Self::allocate(device, width, height, format)
    }

    pub fn release(&mut self, texture: PooledTexture) {
        let key = PoolKey {
            width: texture.width,
            height: texture.height,
            format: texture.format,
        };
        self.free.entry(key).or_default().push(texture);
    }

    pub fn clear(&mut self) {
        self.free.clear();
    }

    fn allocate(device: &wgpu::Device, width: u32, height: u32, format: PoolFormat) -> PooledTexture {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("animcore_pooled_texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: format.wgpu_format(),
            usage: format.usage(),
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        PooledTexture {
            texture,
            view,
            width,
            height,
            format,
        }
    }
}

/// RAII handle that releases its texture back to the pool on drop, even on
/// an early-return error path (the "scoped acquisition" pattern).
pub struct ScopedTexture<'a> {
    pool: &'a mut TexturePool,
    texture: Option<PooledTexture>,
}

impl<'a> ScopedTexture<'a> {
    pub fn acquire(
        pool: &'a mut TexturePool,
        device: &wgpu::Device,
        width: u32,
        height: u32,
        format: PoolFormat,
    ) -> Self {
        let texture = pool.acquire(device, width, height, format);
        Self {
            pool,
            texture: Some(texture),
        }
    }

    pub fn get(&self) -> &PooledTexture {
        self.texture.as_ref().expect("texture taken before drop")
    }
}

impl Drop for ScopedTexture<'_> {
    fn drop(&mut self) {
        if let Some(texture) = self.texture.take() {
            self.pool.release(texture);
        }
    }
}
