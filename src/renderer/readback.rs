//! Headless device construction and CPU readback, used by integration tests
//! that check pixel output without a live swapchain.

use super::{RenderTarget, Renderer, RendererOptions, TextureProvider, COLOR_FORMAT};
use crate::command::Command;
use crate::error::RenderResult;
use ahash::AHashMap;

fn compute_padded_bytes_per_row(width: u32, bytes_per_pixel: u32) -> (u32, u32) {
    let unpadded = width * bytes_per_pixel;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padded = unpadded.div_ceil(align) * align;
    (unpadded, padded)
}

fn create_offscreen_color_texture(device: &wgpu::Device, size: (u32, u32)) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("animcore_offscreen_color"),
        size: wgpu::Extent3d {
            width: size.0.max(1),
            height: size.1.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: COLOR_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}

fn create_readback_buffer(device: &wgpu::Device, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("animcore_readback_buffer"),
        size,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    })
}

fn encode_copy_texture_to_buffer(
    encoder: &mut wgpu::CommandEncoder,
    texture: &wgpu::Texture,
    buffer: &wgpu::Buffer,
    width: u32,
    height: u32,
    padded_bytes_per_row: u32,
) {
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
}

fn copy_padded_readback_rows(
    data: &[u8],
    height: u32,
    unpadded_bytes_per_row: u32,
    padded_bytes_per_row: u32,
    output: &mut Vec<u8>,
) {
    let output_size = (unpadded_bytes_per_row * height) as usize;
    output.resize(output_size, 0);

    if padded_bytes_per_row == unpadded_bytes_per_row {
        output.copy_from_slice(data);
        return;
    }

    for row in 0..height {
        let padded_offset = (row * padded_bytes_per_row) as usize;
        let unpadded_offset = (row * unpadded_bytes_per_row) as usize;
        let row_data = &data[padded_offset..padded_offset + unpadded_bytes_per_row as usize];
        output[unpadded_offset..unpadded_offset + unpadded_bytes_per_row as usize]
            .copy_from_slice(row_data);
    }
}

fn map_readback_buffer_into(device: &wgpu::Device, buffer: &wgpu::Buffer, mapped_bytes: &mut Vec<u8>) {
    mapped_bytes.clear();

    let buffer_slice = buffer.slice(..);
    let (sender, receiver) = std::sync::mpsc::channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        if sender.send(result).is_err() {
            log::warn!("failed to send map_async result from callback");
        }
    });

    let _ = device.poll(wgpu::MaintainBase::Wait);

    let map_result = match receiver.recv() {
        Ok(result) => result,
        Err(error) => {
            log::warn!("failed to receive mapped buffer result: {}", error);
            return;
        }
    };

    if let Err(error) = map_result {
        log::warn!("failed to map readback buffer: {:?}", error);
        return;
    }

    let mapped_range = buffer_slice.get_mapped_range();
    mapped_bytes.extend_from_slice(&mapped_range);
    drop(mapped_range);
    buffer.unmap();
}

impl Renderer {
    /// Builds a `Renderer` against a GPU adapter with no attached surface,
    /// for tests and offline rendering. Returns `None` if no adapter can be
    /// found (e.g. no GPU and no software rasterizer on the host).
    pub async fn try_new_headless(options: RendererOptions) -> Option<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok()?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
                trace: Default::default(),
            })
            .await
            .ok()?;

        Some(Self::new(device, queue, options))
    }

    /// Like [`Self::try_new_headless`], but panics if no adapter is found.
    /// Intended for tests; hosts that need to handle a missing GPU
    /// gracefully should call [`Self::try_new_headless`] instead.
    pub async fn new_headless(options: RendererOptions) -> Self {
        Self::try_new_headless(options)
            .await
            .expect("failed to find a suitable GPU adapter for headless rendering")
    }

    /// Runs one frame into a freshly allocated offscreen texture sized
    /// `viewport_size` and reads it back as straight, non-premultiplied
    /// `Bgra8Unorm` bytes (`viewport_width * viewport_height * 4`).
    ///
    /// Not meant for the render loop itself, which should target a live
    /// swapchain view via `execute`; this exists for tests and batch
    /// rendering where there is no swapchain to read from.
    pub fn render_to_bgra8(
        &mut self,
        commands: &[Command],
        viewport_size: (u32, u32),
        animation_size: (f32, f32),
        textures: &dyn TextureProvider,
    ) -> RenderResult<Vec<u8>> {
        self.render_to_bgra8_with_asset_sizes(commands, viewport_size, animation_size, textures, None)
    }

    /// Like [`Self::render_to_bgra8`], but with per-call `DrawImage` size
    /// overrides (spec.md §6), for tests that need an asset drawn at a
    /// specific pixel size regardless of what `textures` reports.
    pub fn render_to_bgra8_with_asset_sizes(
        &mut self,
        commands: &[Command],
        viewport_size: (u32, u32),
        animation_size: (f32, f32),
        textures: &dyn TextureProvider,
        asset_size_overrides: Option<&AHashMap<String, (u32, u32)>>,
    ) -> RenderResult<Vec<u8>> {
        let (width, height) = (viewport_size.0.max(1), viewport_size.1.max(1));
        let texture = create_offscreen_color_texture(&self.device, (width, height));
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        self.begin_frame();
        let target = RenderTarget::new(&view, (width, height), animation_size);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("animcore_headless_render"),
            });
        self.execute_with_asset_sizes(commands, &target, textures, asset_size_overrides, &mut encoder)?;

        let (unpadded_bytes_per_row, padded_bytes_per_row) = compute_padded_bytes_per_row(width, 4);
        let readback_buffer =
            create_readback_buffer(&self.device, (padded_bytes_per_row as u64) * (height as u64));

        encode_copy_texture_to_buffer(
            &mut encoder,
            &texture,
            &readback_buffer,
            width,
            height,
            padded_bytes_per_row,
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let mut mapped_bytes = Vec::new();
        map_readback_buffer_into(&self.device, &readback_buffer, &mut mapped_bytes);

        let mut pixels = Vec::new();
        let required_len = (height as usize) * (padded_bytes_per_row as usize);
        if mapped_bytes.len() < required_len {
            pixels.resize((unpadded_bytes_per_row * height) as usize, 0);
            return Ok(pixels);
        }
        copy_padded_readback_rows(
            &mapped_bytes,
            height,
            unpadded_bytes_per_row,
            padded_bytes_per_row,
            &mut pixels,
        );
        Ok(pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_padded_readback_rows_handles_unpadded_data() {
        let data = vec![1, 2, 3, 4, 5, 6, 7, 8];
        let mut output = Vec::new();
        copy_padded_readback_rows(&data, 2, 4, 4, &mut output);
        assert_eq!(output, data);
    }

    #[test]
    fn copy_padded_readback_rows_strips_padding() {
        let data = vec![1, 2, 3, 4, 9, 9, 9, 9, 5, 6, 7, 8, 8, 8, 8, 8];
        let mut output = Vec::new();
        copy_padded_readback_rows(&data, 2, 4, 8, &mut output);
        assert_eq!(output, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn compute_padded_bytes_per_row_aligns_to_256() {
        let (unpadded, padded) = compute_padded_bytes_per_row(3, 4);
        assert_eq!(unpadded, 12);
        assert_eq!(padded, 256);
        let (unpadded, padded) = compute_padded_bytes_per_row(64, 4);
        assert_eq!(unpadded, 256);
        assert_eq!(padded, 256);
    }
}
