//! GPU mouse picking via an offscreen instance-id pass.
//!
//! The selection pipeline variants render the scene into an `R32Float`
//! attachment carrying the global instance id per pixel; the pixel under
//! the cursor is copied into a staging buffer and mapped asynchronously.
//! Empty pixels resolve to 0, the null instance.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{create_depth_texture, PICKING_FORMAT};

/// Offscreen pick attachment and its one-pixel readback.
pub struct PickingTarget {
    texture: wgpu::Texture,
    texture_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    /// Staging buffer for reading back pixel data; 256 bytes is the
    /// minimum copy row pitch, we only need 4.
    staging_buffer: wgpu::Buffer,
    width: u32,
    height: u32,
    readback_in_flight: bool,
    map_complete: Arc<AtomicBool>,
}

impl PickingTarget {
    /// Create the pick attachment at the given size.
    #[must_use]
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let (texture, texture_view) = Self::create_texture(device, width, height);
        let (_, depth_view) = create_depth_texture(device, width, height);
        let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Picking Staging Buffer"),
            size: 256,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        Self {
            texture,
            texture_view,
            depth_view,
            staging_buffer,
            width,
            height,
            readback_in_flight: false,
            map_complete: Arc::new(AtomicBool::new(false)),
        }
    }

    fn create_texture(
        device: &wgpu::Device,
        width: u32,
        height: u32,
    ) -> (wgpu::Texture, wgpu::TextureView) {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Picking Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: PICKING_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        (texture, view)
    }

    /// Resize the attachment to match the swapchain.
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        if width == self.width && height == self.height {
            return;
        }
        self.width = width;
        self.height = height;
        let (texture, texture_view) = Self::create_texture(device, width, height);
        self.texture = texture;
        self.texture_view = texture_view;
        let (_, depth_view) = create_depth_texture(device, width, height);
        self.depth_view = depth_view;
    }

    /// Begin the picking render pass, cleared to the null instance id.
    #[must_use]
    pub fn begin_pass<'e>(
        &self,
        encoder: &'e mut wgpu::CommandEncoder,
    ) -> wgpu::RenderPass<'e> {
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Picking Render Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.texture_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: 0.0,
                        g: 0.0,
                        b: 0.0,
                        a: 0.0,
                    }),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(
                wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                },
            ),
            ..Default::default()
        })
    }

    /// Copy the pixel under the cursor into the staging buffer. Call after
    /// the picking pass has ended, before submit.
    pub fn copy_pixel(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        x: u32,
        y: u32,
    ) {
        if x >= self.width || y >= self.height || self.readback_in_flight {
            return;
        }
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x, y, z: 0 },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.staging_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(256),
                    rows_per_image: Some(1),
                },
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Start the async readback (call after queue submit).
    pub fn start_readback(&mut self) {
        if self.readback_in_flight {
            return;
        }
        self.readback_in_flight = true;
        self.map_complete.store(false, Ordering::SeqCst);
        let map_complete = Arc::clone(&self.map_complete);
        let buffer_slice = self.staging_buffer.slice(..4);
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            if result.is_ok() {
                map_complete.store(true, Ordering::SeqCst);
            }
        });
    }

    /// Try to finish the readback without blocking. Returns the picked
    /// instance id once available; 0 means the null instance (background).
    pub fn complete_readback(&mut self, device: &wgpu::Device) -> Option<i32> {
        if !self.readback_in_flight {
            return None;
        }
        let _ = device.poll(wgpu::PollType::Poll);
        if !self.map_complete.load(Ordering::SeqCst) {
            return None;
        }
        let buffer_slice = self.staging_buffer.slice(..4);
        let data = buffer_slice.get_mapped_range();
        let id = f32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        drop(data);
        self.staging_buffer.unmap();
        self.readback_in_flight = false;
        Some(id.round() as i32)
    }

    /// Block until the in-flight readback finishes (edit-mode synchronous
    /// pick).
    pub fn complete_readback_blocking(&mut self, device: &wgpu::Device) -> Option<i32> {
        if !self.readback_in_flight {
            return None;
        }
        let _ = device.poll(wgpu::PollType::Wait);
        self.complete_readback(device)
    }
}
