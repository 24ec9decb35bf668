//! Skinned model pipelines.
//!
//! Four variants: color and picking, each with or without morph targets.
//! The vertex stage consumes the animation pipeline's bone-matrix output
//! directly from its storage buffer.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use super::shaders;
use super::{depth_stencil_state, SceneBinding, PICKING_FORMAT};
use crate::gpu::{
    storage_buffer_read_only, uniform_buffer, GpuTexture, UniformBuffer,
};
use crate::model::{SkinnedMesh, SkinnedVertex};

/// Per-mesh constants. Mirrored by the WGSL `MeshParams` struct.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct MeshParams {
    bone_count: u32,
    vertex_count: u32,
    _pad: [u32; 2],
}

/// Vertex buffer layout of [`SkinnedVertex`].
fn skinned_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    const ATTRIBUTES: [wgpu::VertexAttribute; 6] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32,
        2 => Float32x3,
        3 => Float32,
        4 => Uint32x4,
        5 => Float32x4,
    ];
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<SkinnedVertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &ATTRIBUTES,
    }
}

/// GPU-side data of one skinned mesh.
pub struct MeshDrawData {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    texture_bind: wgpu::BindGroup,
    morph_bind: Option<wgpu::BindGroup>,
    params: UniformBuffer<MeshParams>,
}

impl MeshDrawData {
    /// Upload a mesh's vertices, indices, texture, and morph deltas.
    #[must_use]
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        mesh: &SkinnedMesh,
        bone_count: usize,
        renderer: &SkinnedModelRenderer,
    ) -> Self {
        let vertex_buffer =
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{} Vertices", mesh.name)),
                contents: bytemuck::cast_slice(&mesh.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer =
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{} Indices", mesh.name)),
                contents: bytemuck::cast_slice(&mesh.indices),
                usage: wgpu::BufferUsages::INDEX,
            });

        let texture = mesh.texture.as_ref().map_or_else(
            || GpuTexture::placeholder(device, queue),
            |data| GpuTexture::from_data(device, queue, &mesh.name, data),
        );
        let texture_bind = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{} Texture Bind Group", mesh.name)),
            layout: &renderer.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&texture.sampler),
                },
            ],
        });

        let morph_bind = if mesh.morph_targets.is_empty() {
            None
        } else {
            // Flatten [target][vertex] deltas into one storage buffer.
            let mut deltas =
                Vec::with_capacity(mesh.morph_targets.len() * mesh.vertices.len());
            for target in &mesh.morph_targets {
                deltas.extend(target.deltas.iter().map(|d| d.extend(0.0)));
            }
            let buffer =
                device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("{} Morph Deltas", mesh.name)),
                    contents: bytemuck::cast_slice(&deltas),
                    usage: wgpu::BufferUsages::STORAGE,
                });
            Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("{} Morph Bind Group", mesh.name)),
                layout: &renderer.morph_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            }))
        };

        let params = UniformBuffer::new(
            device,
            &format!("{} Mesh Params", mesh.name),
            &MeshParams {
                bone_count: bone_count as u32,
                vertex_count: mesh.vertices.len() as u32,
                _pad: [0; 2],
            },
        );

        Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
            texture_bind,
            morph_bind,
            params,
        }
    }

    /// True when the mesh carries morph targets.
    #[must_use]
    pub fn has_morph_targets(&self) -> bool {
        self.morph_bind.is_some()
    }
}

/// The skinned model pipelines and their layouts.
pub struct SkinnedModelRenderer {
    color: wgpu::RenderPipeline,
    color_morph: wgpu::RenderPipeline,
    picking: wgpu::RenderPipeline,
    picking_morph: wgpu::RenderPipeline,
    frame_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    morph_layout: wgpu::BindGroupLayout,
}

impl SkinnedModelRenderer {
    /// Build the pipelines against the shared scene layout and surface
    /// format.
    #[must_use]
    pub fn new(
        device: &wgpu::Device,
        scene: &SceneBinding,
        surface_format: wgpu::TextureFormat,
    ) -> Self {
        let vertex = wgpu::ShaderStages::VERTEX;
        let frame_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Skinning Frame Bind Group Layout"),
                entries: &[
                    storage_buffer_read_only(0, vertex),
                    storage_buffer_read_only(1, vertex),
                    storage_buffer_read_only(2, vertex),
                    uniform_buffer(3, vertex),
                ],
            });
        let texture_layout = super::create_texture_layout(device);
        let morph_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Morph Bind Group Layout"),
                entries: &[storage_buffer_read_only(0, vertex)],
            });

        let plain_source = shaders::skinning_source();
        let morph_source = shaders::skinning_morph_source();
        let plain_module =
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Skinning Shader"),
                source: wgpu::ShaderSource::Wgsl(plain_source.into()),
            });
        let morph_module =
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Skinning Morph Shader"),
                source: wgpu::ShaderSource::Wgsl(morph_source.into()),
            });

        let plain_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Skinning Pipeline Layout"),
                bind_group_layouts: &[
                    &scene.layout,
                    &frame_layout,
                    &texture_layout,
                ],
                push_constant_ranges: &[],
            });
        let morph_pipe_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Skinning Morph Pipeline Layout"),
                bind_group_layouts: &[
                    &scene.layout,
                    &frame_layout,
                    &texture_layout,
                    &morph_layout,
                ],
                push_constant_ranges: &[],
            });

        let build = |label: &str,
                     layout: &wgpu::PipelineLayout,
                     module: &wgpu::ShaderModule,
                     fragment_entry: &str,
                     format: wgpu::TextureFormat| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module,
                    entry_point: Some("vs_main"),
                    buffers: &[skinned_vertex_layout()],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module,
                    entry_point: Some(fragment_entry),
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
            color: build(
                "Skinning Pipeline",
                &plain_layout,
                &plain_module,
                "fs_main",
                surface_format,
            ),
            color_morph: build(
                "Skinning Morph Pipeline",
                &morph_pipe_layout,
                &morph_module,
                "fs_main",
                surface_format,
            ),
            picking: build(
                "Skinning Picking Pipeline",
                &plain_layout,
                &plain_module,
                "fs_picking",
                PICKING_FORMAT,
            ),
            picking_morph: build(
                "Skinning Morph Picking Pipeline",
                &morph_pipe_layout,
                &morph_module,
                "fs_picking",
                PICKING_FORMAT,
            ),
            frame_layout,
            texture_layout,
            morph_layout,
        }
    }

    /// Build the per-frame bind group of one model: the animation output
    /// buffers plus the instance-flag buffer, per mesh (the mesh parameter
    /// uniform differs).
    #[must_use]
    pub fn create_frame_bind_groups(
        &self,
        device: &wgpu::Device,
        bone_matrices: &wgpu::Buffer,
        world_matrices: &wgpu::Buffer,
        instance_flags: &wgpu::Buffer,
        meshes: &[MeshDrawData],
    ) -> Vec<wgpu::BindGroup> {
        meshes
            .iter()
            .map(|mesh| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Skinning Frame Bind Group"),
                    layout: &self.frame_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: bone_matrices.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: world_matrices.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: instance_flags.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: mesh.params.buffer().as_entire_binding(),
                        },
                    ],
                })
            })
            .collect()
    }

    /// Draw all meshes of one model for `instance_count` instances.
    pub fn draw(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        scene: &SceneBinding,
        frame_binds: &[wgpu::BindGroup],
        meshes: &[MeshDrawData],
        instance_count: u32,
        picking: bool,
    ) {
        if instance_count == 0 {
            return;
        }
        for (mesh, frame_bind) in meshes.iter().zip(frame_binds) {
            let pipeline = match (mesh.morph_bind.as_ref(), picking) {
                (Some(_), false) => &self.color_morph,
                (Some(_), true) => &self.picking_morph,
                (None, false) => &self.color,
                (None, true) => &self.picking,
            };
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &scene.bind_group, &[]);
            pass.set_bind_group(1, frame_bind, &[]);
            pass.set_bind_group(2, &mesh.texture_bind, &[]);
            if let Some(morph_bind) = mesh.morph_bind.as_ref() {
                pass.set_bind_group(3, morph_bind, &[]);
            }
            pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            pass.set_index_buffer(
                mesh.index_buffer.slice(..),
                wgpu::IndexFormat::Uint32,
            );
            pass.draw_indexed(0..mesh.index_count, 0, 0..instance_count);
        }
    }
}
