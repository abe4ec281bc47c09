//! Per-path GPU index buffer cache: a path's triangulation indices never
//! change across keyframes (fixed topology, see `crate::triangulate`), so
//! the index buffer is created once and reused for every frame until the
//! owning registry's generation changes.

use crate::command::PathId;
use ahash::AHashMap;
use wgpu::util::DeviceExt;

pub struct PathIndexBufferCache {
    buffers: AHashMap<PathId, wgpu::Buffer>,
    generation_id: u64,
}

impl PathIndexBufferCache {
    pub fn new() -> Self {
        Self {
            buffers: AHashMap::default(),
            generation_id: 0,
        }
    }

    /// Drops every cached buffer if `generation_id` no longer matches the
    /// registry's current generation.
    pub fn sync_generation(&mut self, generation_id: u64) {
        if self.generation_id != generation_id {
            self.buffers.clear();
            self.generation_id = generation_id;
        }
    }

    pub fn get_or_create(
        &mut self,
        device: &wgpu::Device,
        path_id: PathId,
        indices: &[u16],
    ) -> &wgpu::Buffer {
        self.buffers.entry(path_id).or_insert_with(|| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("animcore_path_index_buffer"),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            })
        })
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

impl Default for PathIndexBufferCache {
    fn default() -> Self {
        Self::new()
    }
}
