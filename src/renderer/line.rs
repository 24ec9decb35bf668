//! Debug line rendering: octree boxes, AABBs, paths, IK markers.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use super::shaders;
use super::{depth_stencil_state, SceneBinding};
use crate::gpu::{DynamicBuffer, GpuContext};
use crate::math::Aabb;

/// A colored line vertex in world space.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct LineVertex {
    /// World-space position.
    pub position: [f32; 3],
    /// RGBA color.
    pub color: [f32; 4],
}

impl LineVertex {
    /// Vertex at `position` with `color`.
    #[must_use]
    pub fn new(position: Vec3, color: [f32; 4]) -> Self {
        Self {
            position: position.to_array(),
            color,
        }
    }
}

fn line_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x4,
    ];
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<LineVertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &ATTRIBUTES,
    }
}

/// Append the twelve edges of a box to a line list.
pub fn push_aabb_lines(out: &mut Vec<LineVertex>, aabb: &Aabb, color: [f32; 4]) {
    let (min, max) = (aabb.min, aabb.max);
    let corners = [
        Vec3::new(min.x, min.y, min.z),
        Vec3::new(max.x, min.y, min.z),
        Vec3::new(max.x, min.y, max.z),
        Vec3::new(min.x, min.y, max.z),
        Vec3::new(min.x, max.y, min.z),
        Vec3::new(max.x, max.y, min.z),
        Vec3::new(max.x, max.y, max.z),
        Vec3::new(min.x, max.y, max.z),
    ];
    const EDGES: [(usize, usize); 12] = [
        (0, 1),
        (1, 2),
        (2, 3),
        (3, 0),
        (4, 5),
        (5, 6),
        (6, 7),
        (7, 4),
        (0, 4),
        (1, 5),
        (2, 6),
        (3, 7),
    ];
    for (a, b) in EDGES {
        out.push(LineVertex::new(corners[a], color));
        out.push(LineVertex::new(corners[b], color));
    }
}

/// Line-list pipeline with a per-frame rewritten vertex buffer.
pub struct LineRenderer {
    pipeline: wgpu::RenderPipeline,
    vertex_buffer: DynamicBuffer,
    vertex_count: u32,
}

impl LineRenderer {
    /// Build the pipeline against the shared scene layout.
    #[must_use]
    pub fn new(
        device: &wgpu::Device,
        scene: &SceneBinding,
        surface_format: wgpu::TextureFormat,
    ) -> Self {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Line Shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::LINE.into()),
        });
        let layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Line Pipeline Layout"),
                bind_group_layouts: &[&scene.layout],
                push_constant_ranges: &[],
            });
        let pipeline =
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Line Pipeline"),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some("vs_main"),
                    buffers: &[line_vertex_layout()],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: surface_format,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::LineList,
                    ..Default::default()
                },
                depth_stencil: Some(depth_stencil_state()),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });
        Self {
            pipeline,
            vertex_buffer: DynamicBuffer::new(
                device,
                "Line Vertices",
                4096,
                wgpu::BufferUsages::VERTEX,
            ),
            vertex_count: 0,
        }
    }

    /// Upload this frame's line list.
    pub fn upload(&mut self, context: &GpuContext, vertices: &[LineVertex]) {
        self.vertex_count = vertices.len() as u32;
        let _ = self
            .vertex_buffer
            .write(&context.device, &context.queue, vertices);
    }

    /// Draw the uploaded lines.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>, scene: &SceneBinding) {
        if self.vertex_count == 0 {
            return;
        }
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &scene.bind_group, &[]);
        pass.set_vertex_buffer(0, self.vertex_buffer.buffer().slice(..));
        pass.draw(0..self.vertex_count, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aabb_lines_produce_twelve_edges() {
        let mut out = Vec::new();
        push_aabb_lines(
            &mut out,
            &Aabb::from_pos_size(Vec3::ZERO, Vec3::ONE),
            [1.0; 4],
        );
        assert_eq!(out.len(), 24);
    }
}
