//! GPU animation evaluation.
//!
//! Three compute stages run over all instances of one model in parallel:
//! transform sampling (lookup table to blended TRS, optionally with
//! additive head-look), matrix composition (TRS chains to world bone
//! matrices), and bounding spheres (per-bone collision volumes). Each
//! stage runs in its own compute pass so the storage writes of one stage
//! are visible to the next.

mod pipeline;
pub mod sampler;
mod shaders;

pub use pipeline::{AnimationPipeline, ModelAnimBuffers};

use bytemuck::{Pod, Zeroable};

/// Per-instance input record of the transform sampling stage. Layout is
/// mirrored by the WGSL `PerInstanceAnimData` struct.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct PerInstanceAnimData {
    /// First blended clip.
    pub first_clip: u32,
    /// Second blended clip.
    pub second_clip: u32,
    /// Head-look left/right clip, `-1` when inactive.
    pub head_left_right_clip: i32,
    /// Head-look up/down clip, `-1` when inactive.
    pub head_up_down_clip: i32,
    /// Playhead of the first clip in seconds.
    pub first_playhead: f32,
    /// Playhead of the second clip in seconds.
    pub second_playhead: f32,
    /// Blend factor between the clips.
    pub blend_factor: f32,
    /// Absolute head-look left/right amount scaled to the clip duration.
    pub head_left_right_time: f32,
    /// Absolute head-look up/down amount scaled to the clip duration.
    pub head_up_down_time: f32,
    /// Padding to a 48-byte stride.
    pub _pad: [f32; 3],
}

/// Dispatch parameters shared by all three stages. Mirrored by the WGSL
/// `AnimParams` struct.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct AnimParams {
    /// Bones per instance of the dispatched model.
    pub bone_count: u32,
    /// Number of instances in the dispatch.
    pub instance_count: u32,
    /// Padding to a 16-byte uniform size.
    pub _pad: [u32; 2],
}

/// Workgroup height of all animation stages; dispatches cover
/// `ceil(instances / 32)` workgroups in y.
pub const WORKGROUP_INSTANCES: u32 = 32;
