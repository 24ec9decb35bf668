//! Level geometry and non-animated model pipelines.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use super::shaders;
use super::{depth_stencil_state, SceneBinding, PICKING_FORMAT};
use crate::gpu::{storage_buffer_read_only, GpuTexture};
use crate::level::Level;
use crate::model::TextureData;

/// Static geometry vertex.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct SceneryVertex {
    /// Model-space position.
    pub position: [f32; 3],
    /// Model-space normal.
    pub normal: [f32; 3],
    /// Texture coordinate.
    pub uv: [f32; 2],
}

fn scenery_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    const ATTRIBUTES: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x3,
        2 => Float32x2,
    ];
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<SceneryVertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &ATTRIBUTES,
    }
}

/// GPU buffers of one static mesh (level geometry or a prop mesh).
pub struct SceneryMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    texture_bind: wgpu::BindGroup,
}

impl SceneryMesh {
    /// Upload vertices and indices with an optional base color texture.
    #[must_use]
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        vertices: &[SceneryVertex],
        indices: &[u32],
        texture: Option<&TextureData>,
        renderer: &SceneryRenderer,
    ) -> Self {
        let vertex_buffer =
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label} Vertices")),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer =
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label} Indices")),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            });
        let gpu_texture = texture.map_or_else(
            || GpuTexture::placeholder(device, queue),
            |data| GpuTexture::from_data(device, queue, label, data),
        );
        let texture_bind = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{label} Texture Bind Group")),
            layout: &renderer.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&gpu_texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&gpu_texture.sampler),
                },
            ],
        });
        Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
            texture_bind,
        }
    }

    /// Upload a non-animated model mesh, dropping the skinning attributes.
    #[must_use]
    pub fn from_skinned_mesh(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        mesh: &crate::model::SkinnedMesh,
        renderer: &SceneryRenderer,
    ) -> Self {
        let vertices: Vec<SceneryVertex> = mesh
            .vertices
            .iter()
            .map(|v| SceneryVertex {
                position: v.position,
                normal: v.normal,
                uv: [v.uv_x, v.uv_y],
            })
            .collect();
        Self::new(
            device,
            queue,
            &mesh.name,
            &vertices,
            &mesh.indices,
            mesh.texture.as_ref(),
            renderer,
        )
    }

    /// Upload a whole level's meshes.
    #[must_use]
    pub fn from_level(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        level: &Level,
        renderer: &SceneryRenderer,
    ) -> Vec<Self> {
        level
            .meshes
            .iter()
            .map(|mesh| {
                let vertices: Vec<SceneryVertex> = mesh
                    .vertices
                    .iter()
                    .map(|v| SceneryVertex {
                        position: v.position.to_array(),
                        normal: v.normal.to_array(),
                        uv: v.uv.to_array(),
                    })
                    .collect();
                Self::new(
                    device,
                    queue,
                    &level.name,
                    &vertices,
                    &mesh.indices,
                    None,
                    renderer,
                )
            })
            .collect()
    }
}

/// Static geometry pipelines (color and picking).
pub struct SceneryRenderer {
    color: wgpu::RenderPipeline,
    picking: wgpu::RenderPipeline,
    frame_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
}

impl SceneryRenderer {
    /// Build the pipelines against the shared scene layout.
    #[must_use]
    pub fn new(
        device: &wgpu::Device,
        scene: &SceneBinding,
        surface_format: wgpu::TextureFormat,
    ) -> Self {
        let vertex = wgpu::ShaderStages::VERTEX;
        let frame_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Scenery Frame Bind Group Layout"),
                entries: &[
                    storage_buffer_read_only(0, vertex),
                    storage_buffer_read_only(1, vertex),
                ],
            });
        let texture_layout = super::create_texture_layout(device);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Scenery Shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::SCENERY.into()),
        });
        let layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Scenery Pipeline Layout"),
                bind_group_layouts: &[
                    &scene.layout,
                    &frame_layout,
                    &texture_layout,
                ],
                push_constant_ranges: &[],
            });

        let build = |label: &str, entry: &str, format: wgpu::TextureFormat| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some("vs_main"),
                    buffers: &[scenery_vertex_layout()],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: Some(entry),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: Some(wgpu::Face::Back),
                    ..Default::default()
                },
                depth_stencil: Some(depth_stencil_state()),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        };

        Self {
            color: build("Scenery Pipeline", "fs_main", surface_format),
            picking: build("Scenery Picking Pipeline", "fs_picking", PICKING_FORMAT),
            frame_layout,
            texture_layout,
        }
    }

    /// Bind group over the world-matrix and instance-flag buffers.
    #[must_use]
    pub fn create_frame_bind_group(
        &self,
        device: &wgpu::Device,
        world_matrices: &wgpu::Buffer,
        instance_flags: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scenery Frame Bind Group"),
            layout: &self.frame_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: world_matrices.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: instance_flags.as_entire_binding(),
                },
            ],
        })
    }

    /// Draw level meshes: mesh `j` uses world matrix `j`.
    pub fn draw_level(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        scene: &SceneBinding,
        frame_bind: &wgpu::BindGroup,
        meshes: &[SceneryMesh],
        picking: bool,
    ) {
        if meshes.is_empty() {
            return;
        }
        pass.set_pipeline(if picking { &self.picking } else { &self.color });
        pass.set_bind_group(0, &scene.bind_group, &[]);
        pass.set_bind_group(1, frame_bind, &[]);
        for (index, mesh) in meshes.iter().enumerate() {
            let instance = index as u32;
            pass.set_bind_group(2, &mesh.texture_bind, &[]);
            pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            pass.set_index_buffer(
                mesh.index_buffer.slice(..),
                wgpu::IndexFormat::Uint32,
            );
            pass.draw_indexed(0..mesh.index_count, 0, instance..instance + 1);
        }
    }

    /// Draw static meshes for `instance_count` instances.
    pub fn draw(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        scene: &SceneBinding,
        frame_bind: &wgpu::BindGroup,
        meshes: &[SceneryMesh],
        instance_count: u32,
        picking: bool,
    ) {
        if instance_count == 0 {
            return;
        }
        pass.set_pipeline(if picking { &self.picking } else { &self.color });
        pass.set_bind_group(0, &scene.bind_group, &[]);
        pass.set_bind_group(1, frame_bind, &[]);
        for mesh in meshes {
            pass.set_bind_group(2, &mesh.texture_bind, &[]);
            pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            pass.set_index_buffer(
                mesh.index_buffer.slice(..),
                wgpu::IndexFormat::Uint32,
            );
            pass.draw_indexed(0..mesh.index_count, 0, 0..instance_count);
        }
    }
}
