//! Draw pipelines: skinned models (with and without morph targets), level
//! and static-model geometry, debug lines, and the mouse-pick pass.

mod line;
mod picking;
mod scenery;
mod shaders;
mod skinning;

pub use line::{push_aabb_lines, LineRenderer, LineVertex};
pub use picking::PickingTarget;
pub use scenery::{SceneryMesh, SceneryRenderer, SceneryVertex};
pub use skinning::{MeshDrawData, SkinnedModelRenderer};

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use crate::gpu::{uniform_buffer, GpuContext, UniformBuffer};

/// Depth attachment format shared by all passes.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
/// Mouse-pick attachment format; the fragment writes the instance id as a
/// float, 0 meaning the null instance.
pub const PICKING_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;

/// Per-frame camera and lighting data. Mirrored by the WGSL `SceneUniform`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct SceneUniform {
    /// Combined view-projection matrix.
    pub view_proj: Mat4,
    /// World-space light direction (w unused).
    pub light_dir: Vec4,
}

impl Default for SceneUniform {
    fn default() -> Self {
        Self {
            view_proj: Mat4::IDENTITY,
            light_dir: Vec4::new(-0.4, -1.0, -0.3, 0.0).normalize(),
        }
    }
}

/// Per-instance render flags uploaded as one vec4 per drawn instance:
/// x = global instance id, y = selected flag, z = morph weight,
/// w = morph target index (-1 disables morphing).
pub type InstanceFlags = Vec4;

/// The scene uniform buffer and its bind group (group 0 of every
/// pipeline).
pub struct SceneBinding {
    /// The uniform buffer.
    pub uniform: UniformBuffer<SceneUniform>,
    /// Bind group layout shared by all pipelines.
    pub layout: wgpu::BindGroupLayout,
    /// The bind group.
    pub bind_group: wgpu::BindGroup,
}

impl SceneBinding {
    /// Create the uniform with default contents.
    #[must_use]
    pub fn new(device: &wgpu::Device) -> Self {
        let uniform =
            UniformBuffer::new(device, "Scene Uniform", &SceneUniform::default());
        let layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Scene Bind Group Layout"),
                entries: &[uniform_buffer(
                    0,
                    wgpu::ShaderStages::VERTEX_FRAGMENT,
                )],
            });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scene Bind Group"),
            layout: &layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform.buffer().as_entire_binding(),
            }],
        });
        Self {
            uniform,
            layout,
            bind_group,
        }
    }

    /// Upload this frame's view-projection and light.
    pub fn write(&self, context: &GpuContext, value: &SceneUniform) {
        self.uniform.write(&context.queue, value);
    }
}

/// Create the depth texture for a render target size.
#[must_use]
pub fn create_depth_texture(
    device: &wgpu::Device,
    width: u32,
    height: u32,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

/// Texture + sampler bind group layout (group 2 of the model pipelines).
#[must_use]
pub fn create_texture_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Texture Bind Group Layout"),
        entries: &[
            crate::gpu::texture_2d(0),
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}

fn depth_stencil_state() -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: true,
        depth_compare: wgpu::CompareFunction::Less,
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    }
}
