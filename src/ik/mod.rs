//! Foot inverse kinematics.
//!
//! The GPU computes bone matrices; the engine reads them back, solves each
//! configured foot chain with FABRIK against the ground hit point, and
//! rotates the chain's local TRS rotations so the recomputed pose matches
//! the solved joint positions.

mod fabrik;

pub use fabrik::FabrikSolver;

use glam::{Mat4, Quat, Vec3};

/// Translation part of a world transform.
#[must_use]
pub fn extract_global_position(matrix: &Mat4) -> Vec3 {
    matrix.w_axis.truncate()
}

/// Rotation part of a world transform.
#[must_use]
pub fn extract_global_rotation(matrix: &Mat4) -> Quat {
    let (_, rotation, _) = matrix.to_scale_rotation_translation();
    rotation
}

/// World-space joint positions of an IK chain.
///
/// Each joint's world transform is `world * bone_matrix * inverse_offset`;
/// the inverse offset undoes the skinning offset baked into the bone
/// matrix, leaving the joint transform itself.
#[must_use]
pub fn chain_world_positions(
    world: &Mat4,
    bone_matrices: &[Mat4],
    inverse_offsets: &[Mat4],
    chain: &[usize],
) -> Vec<Vec3> {
    chain
        .iter()
        .filter_map(|&bone| {
            let (m, inv) = (bone_matrices.get(bone)?, inverse_offsets.get(bone)?);
            Some(extract_global_position(&(*world * *m * *inv)))
        })
        .collect()
}

/// Local rotation delta that turns the bone vector `current_dir` onto
/// `desired_dir`, expressed in the joint's local frame given its world
/// rotation.
#[must_use]
pub fn aligning_local_rotation(
    world_rotation: Quat,
    current_dir: Vec3,
    desired_dir: Vec3,
) -> Quat {
    let (Some(current), Some(desired)) =
        (current_dir.try_normalize(), desired_dir.try_normalize())
    else {
        return Quat::IDENTITY;
    };
    let delta = Quat::from_rotation_arc(current, desired);
    (world_rotation * delta * world_rotation.conjugate()).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_position_and_rotation() {
        let rotation = Quat::from_rotation_y(0.7);
        let m = Mat4::from_rotation_translation(rotation, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(extract_global_position(&m), Vec3::new(1.0, 2.0, 3.0));
        assert!(extract_global_rotation(&m).dot(rotation).abs() > 0.999_9);
    }

    #[test]
    fn chain_positions_apply_inverse_offsets() {
        let offset = Mat4::from_translation(Vec3::new(0.0, -1.0, 0.0));
        let bone = Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0)) * offset;
        let positions = chain_world_positions(
            &Mat4::IDENTITY,
            &[bone],
            &[offset.inverse()],
            &[0],
        );
        assert_eq!(positions, vec![Vec3::new(2.0, 0.0, 0.0)]);
    }

    #[test]
    fn aligning_rotation_turns_current_onto_desired() {
        let local = aligning_local_rotation(Quat::IDENTITY, Vec3::X, Vec3::Y);
        let turned = local * Vec3::X;
        assert!((turned - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn degenerate_directions_yield_identity() {
        let local = aligning_local_rotation(Quat::IDENTITY, Vec3::ZERO, Vec3::Y);
        assert_eq!(local, Quat::IDENTITY);
    }
}
