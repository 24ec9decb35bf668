//! Skeleton data: bone list, parent table, offset matrices.

use glam::Mat4;

use crate::error::EngineError;

/// A single bone of a model skeleton.
#[derive(Debug, Clone)]
pub struct Bone {
    /// Bone name from the source asset.
    pub name: String,
    /// Parent index, `-1` for the root.
    pub parent: i32,
}

/// Topologically sorted bone hierarchy with inverse-bind matrices.
///
/// Invariants, checked by [`Skeleton::validate`]: bone 0 is the unique root
/// (`parent == -1`) and every other bone's parent index is strictly smaller
/// than its own index.
#[derive(Debug, Clone)]
pub struct Skeleton {
    /// Bones in topological order.
    pub bones: Vec<Bone>,
    /// Per-bone offset matrix (mesh space to bone space).
    pub offset_matrices: Vec<Mat4>,
    /// Per-bone inverse offset matrix (bone space to mesh space).
    pub inverse_offset_matrices: Vec<Mat4>,
}

impl Skeleton {
    /// Build a skeleton from bones and offset matrices, deriving the
    /// inverse-offset table.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AssetInvariant`] when the bone count and
    /// matrix count disagree or the hierarchy violates the ordering
    /// invariants.
    pub fn new(bones: Vec<Bone>, offset_matrices: Vec<Mat4>) -> Result<Self, EngineError> {
        if bones.len() != offset_matrices.len() {
            return Err(EngineError::AssetInvariant(format!(
                "bone count {} does not match offset matrix count {}",
                bones.len(),
                offset_matrices.len()
            )));
        }
        let inverse_offset_matrices = offset_matrices.iter().map(Mat4::inverse).collect();
        let skeleton = Self {
            bones,
            offset_matrices,
            inverse_offset_matrices,
        };
        skeleton.validate()?;
        Ok(skeleton)
    }

    /// Number of bones.
    #[must_use]
    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    /// Parent index table as uploaded to the GPU.
    #[must_use]
    pub fn parent_indices(&self) -> Vec<i32> {
        self.bones.iter().map(|b| b.parent).collect()
    }

    /// Check the hierarchy invariants.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AssetInvariant`] on an empty skeleton, a
    /// non-root first bone, a second root, or a parent index that is not
    /// strictly smaller than its child's index.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.bones.is_empty() {
            return Err(EngineError::AssetInvariant(
                "skeleton has no bones".to_owned(),
            ));
        }
        if self.bones[0].parent != -1 {
            return Err(EngineError::AssetInvariant(format!(
                "bone 0 '{}' must be the root, found parent {}",
                self.bones[0].name, self.bones[0].parent
            )));
        }
        for (index, bone) in self.bones.iter().enumerate().skip(1) {
            if bone.parent < 0 {
                return Err(EngineError::AssetInvariant(format!(
                    "bone {index} '{}' is a second root",
                    bone.name
                )));
            }
            if bone.parent as usize >= index {
                return Err(EngineError::AssetInvariant(format!(
                    "bone {index} '{}' has parent {} out of topological order",
                    bone.name, bone.parent
                )));
            }
        }
        Ok(())
    }
}
