//! GPU storage for the current point set and the per-frame uniforms.
//!
//! Vertex data may be replaced from any thread. The buffer, its capacity and the
//! point count live behind one lock, which a draw also holds from the moment it
//! binds the buffer until it submits. A replacement therefore lands entirely
//! before or entirely after any frame, and the count is never ahead of the data.

use crate::data::{FrameUniforms, VertexRecord};
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// Allocation and upload primitives the manager needs from a graphics API.
pub trait BufferBackend: Send + Sync {
    type Buffer: Send + Sync;

    fn create_vertex_buffer(&self, size: u64) -> Self::Buffer;
    fn create_uniform_buffer(&self, size: u64) -> Self::Buffer;
    /// Writes `bytes` at offset 0. Must be visible to the next submitted frame.
    fn write(&self, buffer: &Self::Buffer, bytes: &[u8]);
}

/// wgpu implementation. `Queue::write_buffer` stages the data and applies it
/// before the next `submit`.
pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
}

impl WgpuBackend {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self { device, queue }
    }
}

impl BufferBackend for WgpuBackend {
    type Buffer = wgpu::Buffer;

    fn create_vertex_buffer(&self, size: u64) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Scan Points"),
            size,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn create_uniform_buffer(&self, size: u64) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame UBO"),
            size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn write(&self, buffer: &wgpu::Buffer, bytes: &[u8]) {
        self.queue.write_buffer(buffer, 0, bytes);
    }
}

struct VertexSlot<T> {
    buffer: Option<T>,
    capacity: u64,
    count: u32,
}

pub struct FrameBufferManager<B: BufferBackend> {
    backend: B,
    vertices: Mutex<VertexSlot<B::Buffer>>,
    uniforms: B::Buffer,
    allocations: AtomicUsize,
}

impl<B: BufferBackend> FrameBufferManager<B> {
    pub fn new(backend: B) -> Self {
        let uniforms = backend.create_uniform_buffer(std::mem::size_of::<FrameUniforms>() as u64);
        Self {
            backend,
            vertices: Mutex::new(VertexSlot {
                buffer: None,
                capacity: 0,
                count: 0,
            }),
            uniforms,
            allocations: AtomicUsize::new(0),
        }
    }

    /// Replaces the point set. Reuses the current buffer when it is large enough,
    /// otherwise allocates one of exactly the needed size and drops the old one
    /// (the graphics API keeps it alive for frames already submitted).
    /// An empty slice only zeroes the count; storage is kept for the next set.
    pub fn replace_vertices(&self, records: &[VertexRecord]) {
        let records = &records[..records.len().min(u32::MAX as usize)];
        let bytes: &[u8] = bytemuck::cast_slice(records);
        let needed = bytes.len() as u64;

        let mut slot = self.vertices.lock();
        if needed == 0 {
            slot.count = 0;
            return;
        }

        if slot.capacity >= needed && slot.buffer.is_some() {
            if let Some(buffer) = slot.buffer.as_ref() {
                self.backend.write(buffer, bytes);
            }
        } else {
            let buffer = self.backend.create_vertex_buffer(needed);
            self.backend.write(&buffer, bytes);
            slot.buffer = Some(buffer);
            slot.capacity = needed;
            let n = self.allocations.fetch_add(1, Ordering::Relaxed) + 1;
            log::debug!("Vertex buffer reallocated: {} bytes (allocation #{})", needed, n);
        }
        // Published last: the count is what makes the new data drawable.
        slot.count = records.len() as u32;
    }

    /// Points made drawable by the last completed `replace_vertices`.
    pub fn current_point_count(&self) -> u32 {
        self.vertices.lock().count
    }

    /// Runs `f` with the current (buffer, point count) while replacements are
    /// held off. `None` when there is nothing to draw.
    pub fn with_current<R>(&self, f: impl FnOnce(Option<(&B::Buffer, u32)>) -> R) -> R {
        let slot = self.vertices.lock();
        let current = match (&slot.buffer, slot.count) {
            (Some(buffer), count) if count > 0 => Some((buffer, count)),
            _ => None,
        };
        f(current)
    }

    pub fn write_uniforms(&self, uniforms: &FrameUniforms) {
        self.backend.write(&self.uniforms, bytemuck::bytes_of(uniforms));
    }

    pub fn uniform_buffer(&self) -> &B::Buffer {
        &self.uniforms
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.vertices.lock().capacity
    }

    /// Number of vertex buffers allocated so far.
    pub fn allocation_count(&self) -> usize {
        self.allocations.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    /// Host-memory stand-in: writes are immediate, so any torn read would show.
    struct HostBackend;

    impl BufferBackend for HostBackend {
        type Buffer = Mutex<Vec<u8>>;

        fn create_vertex_buffer(&self, size: u64) -> Self::Buffer {
            Mutex::new(vec![0; size as usize])
        }

        fn create_uniform_buffer(&self, size: u64) -> Self::Buffer {
            Mutex::new(vec![0; size as usize])
        }

        fn write(&self, buffer: &Self::Buffer, bytes: &[u8]) {
            buffer.lock()[..bytes.len()].copy_from_slice(bytes);
        }
    }

    fn records(n: usize, tag: f32) -> Vec<VertexRecord> {
        (0..n)
            .map(|i| VertexRecord::new([i as f32, 0.0, 0.0], [tag; 3]))
            .collect()
    }

    fn read_back(buffer: &Mutex<Vec<u8>>, count: u32) -> Vec<VertexRecord> {
        let data = buffer.lock();
        (0..count as usize)
            .map(|i| {
                bytemuck::pod_read_unaligned(&data[i * VertexRecord::SIZE..(i + 1) * VertexRecord::SIZE])
            })
            .collect()
    }

    #[test]
    fn grows_only_when_capacity_is_short() {
        let fb = FrameBufferManager::new(HostBackend);
        assert_eq!(fb.current_point_count(), 0);
        assert_eq!(fb.allocation_count(), 0);

        fb.replace_vertices(&records(10, 1.0));
        assert_eq!(fb.allocation_count(), 1);
        assert_eq!(fb.capacity_bytes(), 10 * VertexRecord::SIZE as u64);

        fb.replace_vertices(&records(4, 2.0));
        fb.replace_vertices(&records(10, 3.0));
        assert_eq!(fb.allocation_count(), 1);

        fb.replace_vertices(&records(11, 4.0));
        assert_eq!(fb.allocation_count(), 2);
        assert_eq!(fb.capacity_bytes(), 11 * VertexRecord::SIZE as u64);
    }

    #[test]
    fn shrinking_never_reports_a_stale_count() {
        let fb = FrameBufferManager::new(HostBackend);
        fb.replace_vertices(&records(8, 1.0));
        fb.replace_vertices(&records(3, 2.0));
        assert_eq!(fb.current_point_count(), 3);

        fb.with_current(|current| {
            let (buffer, count) = current.unwrap();
            assert_eq!(count, 3);
            assert_eq!(read_back(buffer, count), records(3, 2.0));
        });
    }

    #[test]
    fn empty_input_clears_count_but_keeps_storage() {
        let fb = FrameBufferManager::new(HostBackend);
        fb.replace_vertices(&records(5, 1.0));
        fb.replace_vertices(&[]);
        assert_eq!(fb.current_point_count(), 0);
        assert_eq!(fb.capacity_bytes(), 5 * VertexRecord::SIZE as u64);
        assert!(fb.with_current(|current| current.is_none()));

        fb.replace_vertices(&records(5, 2.0));
        assert_eq!(fb.allocation_count(), 1);
    }

    #[test]
    fn uniforms_are_written_whole() {
        let fb = FrameBufferManager::new(HostBackend);
        let u = FrameUniforms::new(glam::Mat4::IDENTITY, [800.0, 600.0], 4.0);
        fb.write_uniforms(&u);
        let stored: FrameUniforms = bytemuck::pod_read_unaligned(&fb.uniform_buffer().lock());
        assert_eq!(stored, u);
    }

    #[test]
    fn concurrent_replacement_is_never_torn() {
        // Generation g has size(g) points all tagged g.
        fn size(g: u32) -> usize {
            [64, 16, 40, 1][g as usize % 4]
        }

        let fb = Arc::new(FrameBufferManager::new(HostBackend));
        let writer = {
            let fb = fb.clone();
            thread::spawn(move || {
                for g in 1..=400u32 {
                    fb.replace_vertices(&records(size(g), g as f32));
                }
            })
        };

        let mut frames = 0;
        while !writer.is_finished() || frames == 0 {
            fb.with_current(|current| {
                if let Some((buffer, count)) = current {
                    let recs = read_back(buffer, count);
                    let tag = recs[0].color[0];
                    assert!(recs.iter().all(|r| r.color == [tag; 3]), "torn frame");
                    assert_eq!(count as usize, size(tag as u32), "stale count");
                }
            });
            frames += 1;
        }
        writer.join().unwrap();
        assert_eq!(fb.current_point_count() as usize, size(400));
    }
}
