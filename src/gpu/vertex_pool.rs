//! Ring-buffered vertex upload pool: `maxFramesInFlight` growable GPU
//! buffers rotated one-per-frame so the host can bound outstanding GPU
//! reads with a frame-in-flight semaphore (see `crate::renderer`).

pub const DEFAULT_RING_DEPTH: usize = 3;
const ALIGNMENT: u64 = 16;

pub struct UploadSlice {
    pub offset: u64,
    pub length: u64,
}

struct RingSlot {
    buffer: wgpu::Buffer,
    capacity: u64,
    cursor: u64,
}

impl RingSlot {
    fn new(device: &wgpu::Device, initial_capacity: u64) -> Self {
        let capacity = initial_capacity.max(ALIGNMENT);
        Self {
            buffer: Self::allocate(device, capacity),
            capacity,
            cursor: 0,
        }
    }

    fn allocate(device: &wgpu::Device, capacity: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("animcore_vertex_upload_ring_slot"),
            size: capacity,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }
}

/// A ring of `ring_depth` shared buffers. Call `begin_frame` once per
/// frame before any `upload_floats` call.
pub struct VertexUploadPool {
    slots: Vec<RingSlot>,
    current: usize,
    frame_begun: bool,
}

impl VertexUploadPool {
    pub fn new(device: &wgpu::Device, ring_depth: usize, initial_capacity: u64) -> Self {
        let ring_depth = ring_depth.max(1);
        let slots = (0..ring_depth)
            .map(|_| RingSlot::new(device, initial_capacity))
            .collect();
        Self {
            slots,
            current: 0,
            frame_begun: false,
        }
    }

    pub fn begin_frame(&mut self) {
        self.current = (self.current + 1) % self.slots.len();
        self.slots[self.current].cursor = 0;
        self.frame_begun = true;
    }

    /// Aligns the write cursor to 16 bytes, growing the active buffer 2x
    /// if the upload would overflow, then copies `data` and returns the
    /// slice describing where it landed.
    pub fn upload_floats(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        data: &[f32],
    ) -> UploadSlice {
        debug_assert!(
            self.frame_begun,
            "upload_floats called before begin_frame"
        );

        let slot = &mut self.slots[self.current];
        let aligned_offset = align_up(slot.cursor, ALIGNMENT);
        let byte_len = (data.len() * std::mem::size_of::<f32>()) as u64;
        let required = aligned_offset + byte_len;

        if required > slot.capacity {
            let mut new_capacity = slot.capacity.max(ALIGNMENT);
            while new_capacity < required {
                new_capacity *= 2;
            }
            slot.buffer = RingSlot::allocate(device, new_capacity);
            slot.capacity = new_capacity;
        }

        queue.write_buffer(&slot.buffer, aligned_offset, bytemuck::cast_slice(data));
        slot.cursor = aligned_offset + byte_len;

        UploadSlice {
            offset: aligned_offset,
            length: byte_len,
        }
    }

    pub fn current_buffer(&self) -> &wgpu::Buffer {
        &self.slots[self.current].buffer
    }
}

fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) / alignment * alignment
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_next_multiple() {
        assert_eq!(align_up(0, 16), 0);
        assert_eq!(align_up(1, 16), 16);
        assert_eq!(align_up(16, 16), 16);
        assert_eq!(align_up(17, 16), 32);
    }
}
