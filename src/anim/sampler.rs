//! CPU reference of the animation compute stages.
//!
//! Mirrors the WGSL stage math over the same lookup tables: used to build
//! test expectations, to verify determinism, and as the fallback pose
//! source where no device is available.

use glam::{Mat4, Quat, Vec3, Vec4};

use super::PerInstanceAnimData;
use crate::model::{AnimLookup, Skeleton, Trs};

/// Stage 1 reference: sample both clips, blend, then apply the additive
/// head-look rotations (after the blend, never before).
#[must_use]
pub fn sample_instance_trs(
    lookup: &AnimLookup,
    data: &PerInstanceAnimData,
    bone: usize,
) -> Trs {
    let a = lookup.sample(data.first_clip as usize, bone, data.first_playhead);
    let b = lookup.sample(data.second_clip as usize, bone, data.second_playhead);
    let mut blended = a.blend(&b, data.blend_factor);

    if let Ok(clip) = usize::try_from(data.head_left_right_clip) {
        let head = lookup.sample(clip, bone, data.head_left_right_time);
        blended.rotation = (blended.rotation * head.rotation).normalize();
    }
    if let Ok(clip) = usize::try_from(data.head_up_down_clip) {
        let head = lookup.sample(clip, bone, data.head_up_down_time);
        blended.rotation = (blended.rotation * head.rotation).normalize();
    }
    blended
}

/// Stage 2 reference: compose each bone's local TRS with its parent chain;
/// with `with_offsets` the skinning offset matrix is applied, without it
/// the result is the skeleton pose the sphere stage consumes.
#[must_use]
pub fn compose_bone_matrices(
    skeleton: &Skeleton,
    trs: &[Trs],
    with_offsets: bool,
) -> Vec<Mat4> {
    let bone_count = skeleton.bone_count();
    let mut chains: Vec<Mat4> = Vec::with_capacity(bone_count);
    for bone in 0..bone_count {
        let local = trs
            .get(bone)
            .copied()
            .unwrap_or(Trs::IDENTITY)
            .to_matrix();
        let parent = skeleton.bones[bone].parent;
        let chain = if parent < 0 {
            local
        } else {
            chains[parent as usize] * local
        };
        chains.push(chain);
    }
    if with_offsets {
        chains
            .iter()
            .zip(&skeleton.offset_matrices)
            .map(|(chain, offset)| *chain * *offset)
            .collect()
    } else {
        chains
    }
}

/// Stage 3 reference: one sphere per bone from the skeleton pose, the
/// instance world matrix, and the per-bone adjustment vector.
#[must_use]
pub fn compute_bounding_spheres(
    skeleton_matrices: &[Mat4],
    parents: &[i32],
    world: &Mat4,
    adjustments: &[Vec4],
) -> Vec<Vec4> {
    let position =
        |bone: usize| (*world * skeleton_matrices[bone]).w_axis.truncate();

    parents
        .iter()
        .enumerate()
        .map(|(bone, &parent)| {
            let node_pos = position(bone);
            let adjustment = adjustments
                .get(bone)
                .copied()
                .unwrap_or(Vec4::new(0.0, 0.0, 0.0, 1.0));
            let (center, radius) = if parent >= 0 {
                let parent_pos = position(parent as usize);
                (
                    (node_pos + parent_pos) * 0.5,
                    node_pos.distance(parent_pos) * adjustment.w,
                )
            } else {
                (node_pos, adjustment.w)
            };
            (center + adjustment.truncate()).extend(radius)
        })
        .collect()
}

/// True when two spheres (xyz center, w radius) with nonzero radii overlap,
/// by squared-distance comparison.
#[must_use]
pub fn spheres_intersect(a: Vec4, b: Vec4) -> bool {
    if a.w <= 0.0 || b.w <= 0.0 {
        return false;
    }
    let center_a = a.truncate();
    let center_b = b.truncate();
    let radii = a.w + b.w;
    center_a.distance_squared(center_b) <= radii * radii
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnimClip, Bone, BoneChannel, Keyframe};

    fn skeleton() -> Skeleton {
        Skeleton::new(
            vec![
                Bone {
                    name: "root".to_owned(),
                    parent: -1,
                },
                Bone {
                    name: "spine".to_owned(),
                    parent: 0,
                },
                Bone {
                    name: "head".to_owned(),
                    parent: 1,
                },
            ],
            vec![Mat4::IDENTITY; 3],
        )
        .unwrap()
    }

    fn translation_clip(offset: Vec3) -> AnimClip {
        AnimClip {
            name: "move".to_owned(),
            duration: 1.0,
            channels: vec![
                Some(BoneChannel {
                    translations: vec![
                        Keyframe {
                            time: 0.0,
                            value: offset,
                        },
                        Keyframe {
                            time: 1.0,
                            value: offset,
                        },
                    ],
                    ..BoneChannel::default()
                }),
                None,
                None,
            ],
        }
    }

    #[test]
    fn blend_between_clips_is_linear() {
        let skeleton = skeleton();
        let clips = [
            translation_clip(Vec3::ZERO),
            translation_clip(Vec3::new(4.0, 0.0, 0.0)),
        ];
        let lookup = AnimLookup::build(&skeleton, &clips);
        let data = PerInstanceAnimData {
            first_clip: 0,
            second_clip: 1,
            head_left_right_clip: -1,
            head_up_down_clip: -1,
            blend_factor: 0.25,
            ..PerInstanceAnimData::default()
        };
        let trs = sample_instance_trs(&lookup, &data, 0);
        assert!((trs.translation.x - 1.0).abs() < 1e-2);
    }

    #[test]
    fn sampling_is_bit_identical_between_runs() {
        let skeleton = skeleton();
        let clips = [translation_clip(Vec3::new(1.0, 2.0, 3.0))];
        let lookup = AnimLookup::build(&skeleton, &clips);
        let data = PerInstanceAnimData {
            first_clip: 0,
            second_clip: 0,
            head_left_right_clip: -1,
            head_up_down_clip: -1,
            first_playhead: 0.37,
            second_playhead: 0.61,
            blend_factor: 0.5,
            ..PerInstanceAnimData::default()
        };
        for bone in 0..3 {
            let x = sample_instance_trs(&lookup, &data, bone);
            let y = sample_instance_trs(&lookup, &data, bone);
            assert_eq!(x, y);
        }
    }

    #[test]
    fn head_move_applies_after_the_blend() {
        let skeleton = skeleton();
        let quarter_turn = AnimClip {
            name: "look".to_owned(),
            duration: 1.0,
            channels: vec![
                Some(BoneChannel {
                    rotations: vec![
                        Keyframe {
                            time: 0.0,
                            value: Quat::from_rotation_y(0.5),
                        },
                        Keyframe {
                            time: 1.0,
                            value: Quat::from_rotation_y(0.5),
                        },
                    ],
                    ..BoneChannel::default()
                }),
                None,
                None,
            ],
        };
        let clips = [translation_clip(Vec3::ZERO), quarter_turn];
        let lookup = AnimLookup::build(&skeleton, &clips);
        let data = PerInstanceAnimData {
            first_clip: 0,
            second_clip: 0,
            head_left_right_clip: 1,
            head_up_down_clip: -1,
            head_left_right_time: 0.5,
            ..PerInstanceAnimData::default()
        };
        let trs = sample_instance_trs(&lookup, &data, 0);
        // Blended rotation is identity, so the result is the head rotation.
        assert!(trs.rotation.dot(Quat::from_rotation_y(0.5)).abs() > 0.999);
    }

    #[test]
    fn composed_chain_accumulates_translations() {
        let skeleton = skeleton();
        let step = Trs {
            translation: Vec3::new(0.0, 1.0, 0.0),
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        };
        let matrices =
            compose_bone_matrices(&skeleton, &[step, step, step], false);
        assert_eq!(matrices[0].w_axis.truncate(), Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(matrices[1].w_axis.truncate(), Vec3::new(0.0, 2.0, 0.0));
        assert_eq!(matrices[2].w_axis.truncate(), Vec3::new(0.0, 3.0, 0.0));
    }

    #[test]
    fn offsets_are_applied_last() {
        let offset = Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0));
        let skeleton = Skeleton::new(
            vec![Bone {
                name: "root".to_owned(),
                parent: -1,
            }],
            vec![offset],
        )
        .unwrap();
        let trs = [Trs {
            translation: Vec3::new(0.0, 2.0, 0.0),
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }];
        let with = compose_bone_matrices(&skeleton, &trs, true);
        let without = compose_bone_matrices(&skeleton, &trs, false);
        assert_eq!(with[0], without[0] * offset);
    }

    #[test]
    fn sphere_radius_scale_zero_disables_sphere() {
        let matrices = [
            Mat4::IDENTITY,
            Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0)),
        ];
        let parents = [-1, 0];
        let adjustments = [
            Vec4::new(0.0, 0.0, 0.0, 1.0),
            Vec4::new(0.0, 0.0, 0.0, 0.0),
        ];
        let spheres = compute_bounding_spheres(
            &matrices,
            &parents,
            &Mat4::IDENTITY,
            &adjustments,
        );
        assert_eq!(spheres[1].w, 0.0);
        assert!(!spheres_intersect(spheres[0], spheres[1]));
    }

    #[test]
    fn child_sphere_sits_between_joints() {
        let matrices = [
            Mat4::IDENTITY,
            Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0)),
        ];
        let parents = [-1, 0];
        let adjustments = [Vec4::new(0.0, 0.0, 0.0, 1.0); 2];
        let world = Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0));
        let spheres =
            compute_bounding_spheres(&matrices, &parents, &world, &adjustments);
        assert_eq!(spheres[1].truncate(), Vec3::new(10.0, 1.0, 0.0));
        assert_eq!(spheres[1].w, 2.0);
    }

    #[test]
    fn sphere_intersection_is_squared_distance_based() {
        let a = Vec4::new(0.0, 0.0, 0.0, 0.5);
        let b = Vec4::new(0.9, 0.0, 0.0, 0.5);
        let c = Vec4::new(1.1, 0.0, 0.0, 0.5);
        assert!(spheres_intersect(a, b));
        assert!(!spheres_intersect(a, c));
    }
}
