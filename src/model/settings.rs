//! Per-model authored settings.

use glam::Vec4;
use serde::{Deserialize, Serialize};

/// Head-look directions mapped onto extra animation clips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeadMoveDirection {
    /// Look left.
    Left,
    /// Look right.
    Right,
    /// Look up.
    Up,
    /// Look down.
    Down,
}

impl HeadMoveDirection {
    /// All directions, in the order of the clip-map array.
    pub const ALL: [Self; 4] = [Self::Left, Self::Right, Self::Up, Self::Down];
}

/// One foot IK chain: bone ids from the effector (the foot) up to the
/// chain target (usually the hip).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FootIkChain {
    /// Bone ids effector-first, target-last.
    pub bones: Vec<usize>,
}

impl FootIkChain {
    /// The effector bone (first entry), if the chain is non-empty.
    #[must_use]
    pub fn effector(&self) -> Option<usize> {
        self.bones.first().copied()
    }

    /// The target bone (last entry), if the chain is non-empty.
    #[must_use]
    pub fn target(&self) -> Option<usize> {
        self.bones.last().copied()
    }
}

/// Authored per-model settings carried in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Clip id per [`HeadMoveDirection`], `-1` when unmapped.
    pub head_move_clips: [i32; 4],
    /// Foot IK chains, usually one per foot.
    pub foot_ik_chains: Vec<FootIkChain>,
    /// Per-bone bounding sphere adjustment: `xyz` center offset, `w`
    /// radius scale. A radius scale of zero disables the sphere.
    pub bounding_sphere_adjustments: Vec<Vec4>,
    /// Rotate instances -90 degrees around X (Z-up source assets).
    pub swap_yz: bool,
    /// Uniform scale applied to all instances of the model.
    pub scale: f32,
    /// Instances of this model may be picked as random navigation targets.
    pub is_nav_target: bool,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            head_move_clips: [-1; 4],
            foot_ik_chains: Vec::new(),
            bounding_sphere_adjustments: Vec::new(),
            swap_yz: false,
            scale: 1.0,
            is_nav_target: false,
        }
    }
}

impl ModelSettings {
    /// The mapped clip for a head-move direction, or `None`.
    #[must_use]
    pub fn head_move_clip(&self, direction: HeadMoveDirection) -> Option<usize> {
        let index = match direction {
            HeadMoveDirection::Left => 0,
            HeadMoveDirection::Right => 1,
            HeadMoveDirection::Up => 2,
            HeadMoveDirection::Down => 3,
        };
        usize::try_from(self.head_move_clips[index]).ok()
    }

    /// True when all four head-move directions are mapped.
    #[must_use]
    pub fn has_head_move_clips(&self) -> bool {
        self.head_move_clips.iter().all(|&clip| clip >= 0)
    }

    /// Default bounding-sphere adjustment: no offset, unit radius scale.
    pub const DEFAULT_SPHERE_ADJUSTMENT: Vec4 = Vec4::new(0.0, 0.0, 0.0, 1.0);

    /// Make sure an adjustment vector exists for every bone, padding with
    /// the default. Config migration from old file versions relies on this.
    pub fn ensure_sphere_adjustments(&mut self, bone_count: usize) {
        if self.bounding_sphere_adjustments.len() < bone_count {
            self.bounding_sphere_adjustments
                .resize(bone_count, Self::DEFAULT_SPHERE_ADJUSTMENT);
        }
    }
}
