//! Thin facade over the wgpu runtime.
//!
//! Owns the device and queue, auto-resizing storage/uniform/vertex buffers
//! with CPU readback, 2D texture upload, and the shared bind-group and
//! pipeline boilerplate. Nothing in here knows about the windowing system;
//! the host passes a surface target or an externally created device.

mod context;
mod dynamic_buffer;
mod pipeline;
mod texture;

pub use context::{GpuContext, GpuContextError};
pub use dynamic_buffer::{DynamicBuffer, TypedBuffer, UniformBuffer};
pub use pipeline::{
    create_compute_pipeline, storage_buffer, storage_buffer_read_only,
    texture_2d, uniform_buffer,
};
pub use texture::GpuTexture;
