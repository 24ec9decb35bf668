//! Dynamic GPU buffer management with automatic resizing
//!
//! Provides buffers that grow automatically when data exceeds capacity,
//! using a 2x growth strategy to minimize reallocations. A grown buffer
//! reports the reallocation so consumers can rebuild their bind groups
//! before the next dispatch that reads it.

use wgpu::util::DeviceExt;

use super::context::GpuContext;

/// A GPU buffer that can grow dynamically
///
/// Uses a 2x growth strategy when capacity is exceeded.
/// Never shrinks (GPU buffers cannot be resized in place).
pub struct DynamicBuffer {
    buffer: wgpu::Buffer,
    capacity: usize, // Capacity in bytes
    len: usize,      // Current data length in bytes
    usage: wgpu::BufferUsages,
    label: String,
}

impl DynamicBuffer {
    /// Buffer with the given initial byte capacity.
    #[must_use]
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        initial_capacity: usize,
        usage: wgpu::BufferUsages,
    ) -> Self {
        let capacity = initial_capacity.max(64); // Minimum 64 bytes

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: capacity as u64,
            usage: usage | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            buffer,
            capacity,
            len: 0,
            usage,
            label: label.to_owned(),
        }
    }

    /// Buffer initialized from existing data.
    #[must_use]
    pub fn new_with_data<T: bytemuck::Pod>(
        device: &wgpu::Device,
        label: &str,
        data: &[T],
        usage: wgpu::BufferUsages,
    ) -> Self {
        let data_bytes: &[u8] = bytemuck::cast_slice(data);
        let capacity = data_bytes.len().max(64);

        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: data_bytes,
            usage: usage | wgpu::BufferUsages::COPY_DST,
        });

        Self {
            buffer,
            capacity,
            len: data_bytes.len(),
            usage,
            label: label.to_owned(),
        }
    }

    /// Grow the buffer to at least `bytes` capacity without writing data.
    ///
    /// Returns `true` if the buffer was reallocated (bind groups need
    /// recreation). Contents are discarded on reallocation.
    pub fn check_for_resize(&mut self, device: &wgpu::Device, bytes: usize) -> bool {
        if bytes <= self.capacity {
            return false;
        }
        // 2x growth, minimum 1KB
        let new_capacity = (bytes * 2).max(self.capacity + 1024);
        self.buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&self.label),
            size: new_capacity as u64,
            usage: self.usage | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.capacity = new_capacity;
        true
    }

    /// Write data to buffer, growing if necessary
    ///
    /// Returns `true` if buffer was reallocated (bind groups need recreation)
    pub fn write<T: bytemuck::Pod>(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        data: &[T],
    ) -> bool {
        let data_bytes: &[u8] = bytemuck::cast_slice(data);
        let needed = data_bytes.len();
        let reallocated = self.check_for_resize(device, needed);

        if needed > 0 {
            queue.write_buffer(&self.buffer, 0, data_bytes);
        }
        self.len = needed;

        reallocated
    }

    /// The underlying wgpu buffer.
    #[must_use]
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Current data length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when no data has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Typed wrapper for [`DynamicBuffer`] with cleaner API
///
/// Tracks item count rather than byte length.
pub struct TypedBuffer<T> {
    inner: DynamicBuffer,
    count: usize,
    _marker: std::marker::PhantomData<T>,
}

impl<T: bytemuck::Pod> TypedBuffer<T> {
    /// Default initial capacity: 1000 items.
    #[must_use]
    pub fn new(device: &wgpu::Device, label: &str, usage: wgpu::BufferUsages) -> Self {
        Self::with_capacity(device, label, 1000, usage)
    }

    /// Specified initial capacity (in items).
    #[must_use]
    pub fn with_capacity(
        device: &wgpu::Device,
        label: &str,
        capacity: usize,
        usage: wgpu::BufferUsages,
    ) -> Self {
        let initial_capacity = std::mem::size_of::<T>() * capacity;
        Self {
            inner: DynamicBuffer::new(device, label, initial_capacity, usage),
            count: 0,
            _marker: std::marker::PhantomData,
        }
    }

    /// Typed buffer initialized from existing data.
    #[must_use]
    pub fn new_with_data(
        device: &wgpu::Device,
        label: &str,
        data: &[T],
        usage: wgpu::BufferUsages,
    ) -> Self {
        Self {
            inner: DynamicBuffer::new_with_data(device, label, data, usage),
            count: data.len(),
            _marker: std::marker::PhantomData,
        }
    }

    /// Grow to hold at least `count` items without writing.
    ///
    /// Returns `true` if the buffer was reallocated (bind groups need
    /// recreation).
    pub fn check_for_resize(&mut self, device: &wgpu::Device, count: usize) -> bool {
        self.count = self.count.max(count);
        self.inner
            .check_for_resize(device, count * std::mem::size_of::<T>())
    }

    /// Write data to buffer, growing if necessary
    ///
    /// Returns `true` if buffer was reallocated (bind groups need recreation)
    pub fn write(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, data: &[T]) -> bool {
        self.count = data.len();
        self.inner.write(device, queue, data)
    }

    /// Read the whole buffer contents back to the CPU. Requires the buffer
    /// to have been created with `COPY_SRC` usage.
    #[must_use]
    pub fn download(&self, context: &GpuContext) -> Vec<T> {
        self.download_at(context, 0, self.count)
    }

    /// Read `count` items starting at `index` back to the CPU.
    #[must_use]
    pub fn download_at(&self, context: &GpuContext, index: usize, count: usize) -> Vec<T> {
        let item = std::mem::size_of::<T>();
        let end = (index + count).min(self.inner.capacity() / item);
        if index >= end {
            return Vec::new();
        }
        let bytes = context.read_buffer(
            self.inner.buffer(),
            (index * item) as u64,
            ((end - index) * item) as u64,
        );
        bytemuck::cast_slice(&bytes).to_vec()
    }

    /// The underlying wgpu buffer.
    #[must_use]
    pub fn buffer(&self) -> &wgpu::Buffer {
        self.inner.buffer()
    }

    /// Number of items last written or reserved.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// True when no items have been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Capacity in items.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity() / std::mem::size_of::<T>()
    }
}

/// A fixed-size uniform buffer holding a single Pod struct.
pub struct UniformBuffer<T> {
    buffer: wgpu::Buffer,
    _marker: std::marker::PhantomData<T>,
}

impl<T: bytemuck::Pod> UniformBuffer<T> {
    /// Create the buffer initialized with `value`.
    #[must_use]
    pub fn new(device: &wgpu::Device, label: &str, value: &T) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::bytes_of(value),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        Self {
            buffer,
            _marker: std::marker::PhantomData,
        }
    }

    /// Upload a new value.
    pub fn write(&self, queue: &wgpu::Queue, value: &T) {
        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(value));
    }

    /// The underlying wgpu buffer.
    #[must_use]
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}
