//! Fixed-resolution animation lookup tables.
//!
//! The GPU transform stage never touches keyframes; it samples these tables
//! instead. Per (clip, bone) and per channel (translation, rotation, scale)
//! the table holds [`LOOKUP_TABLE_WIDTH`] vec4 rows: row 0 is a header whose
//! first element stores the inverse-time scale factor mapping a playhead in
//! seconds onto a row index, rows `1..` hold the sampled values. Empty
//! channels are stored as identity transforms so the shader needs no
//! special cases.
//!
//! The same sampling is implemented here on the CPU (`sample`) as the
//! reference for tests and as the base the IK write-back works against.

use glam::{Mat4, Quat, Vec3, Vec4};

use super::clip::AnimClip;
use super::skeleton::Skeleton;
use crate::math::Aabb;

/// Rows per channel per (clip, bone): one header row plus the samples.
pub const LOOKUP_TABLE_WIDTH: usize = 1024;
/// Number of value rows following the header.
pub const LOOKUP_SAMPLES: usize = LOOKUP_TABLE_WIDTH - 1;

/// Channels per bone in the table: translation, rotation, scale.
const CHANNELS: usize = 3;

/// A local bone transform triple.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trs {
    /// Local translation.
    pub translation: Vec3,
    /// Local rotation.
    pub rotation: Quat,
    /// Local scale.
    pub scale: Vec3,
}

impl Trs {
    /// The identity transform.
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// Compose the local matrix.
    #[must_use]
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// Blend two transforms: lerp for translation and scale, shortest-arc
    /// slerp for rotation.
    #[must_use]
    pub fn blend(&self, other: &Self, factor: f32) -> Self {
        let other_rot = if self.rotation.dot(other.rotation) < 0.0 {
            -other.rotation
        } else {
            other.rotation
        };
        Self {
            translation: self.translation.lerp(other.translation, factor),
            rotation: self.rotation.slerp(other_rot, factor).normalize(),
            scale: self.scale.lerp(other.scale, factor),
        }
    }
}

/// The packed lookup table for all clips and bones of one model, in the
/// exact vec4 layout uploaded to the GPU.
#[derive(Debug, Clone)]
pub struct AnimLookup {
    /// Bones per clip.
    pub bone_count: usize,
    /// Number of clips in the table.
    pub clip_count: usize,
    /// Longest clip duration in seconds; all clips share the table
    /// resolution over their own duration.
    pub max_clip_duration: f32,
    /// vec4 rows, `clip_count * bone_count * 3 * LOOKUP_TABLE_WIDTH` total.
    pub data: Vec<Vec4>,
}

impl AnimLookup {
    /// Sample every clip channel at [`LOOKUP_SAMPLES`] evenly spaced times
    /// and pack the rows. Sampling between keyframes is linear (slerp for
    /// rotations); consecutive rotation rows are hemisphere-aligned so the
    /// shader can interpolate row pairs without sign flips.
    #[must_use]
    pub fn build(skeleton: &Skeleton, clips: &[AnimClip]) -> Self {
        let bone_count = skeleton.bone_count();
        let clip_count = clips.len();
        let max_clip_duration = clips
            .iter()
            .map(|c| c.duration)
            .fold(0.0_f32, f32::max)
            .max(f32::EPSILON);
        let inv_time_factor = LOOKUP_SAMPLES as f32 / max_clip_duration;
        let step = max_clip_duration / LOOKUP_SAMPLES as f32;

        let mut data =
            vec![Vec4::ZERO; clip_count * bone_count * CHANNELS * LOOKUP_TABLE_WIDTH];

        for (clip_index, clip) in clips.iter().enumerate() {
            for bone in 0..bone_count {
                let base = channel_base(clip_index, bone, bone_count);
                let (t_base, r_base, s_base) = (
                    base,
                    base + LOOKUP_TABLE_WIDTH,
                    base + 2 * LOOKUP_TABLE_WIDTH,
                );

                data[t_base] = Vec4::new(inv_time_factor, 0.0, 0.0, 0.0);
                data[r_base] = Vec4::new(inv_time_factor, 0.0, 0.0, 0.0);
                data[s_base] = Vec4::new(inv_time_factor, 0.0, 0.0, 0.0);

                let mut prev_rot = Quat::IDENTITY;
                for sample in 0..LOOKUP_SAMPLES {
                    let time = sample as f32 * step;
                    let translation = clip.sample_translation(bone, time);
                    let mut rotation = clip.sample_rotation(bone, time);
                    let scale = clip.sample_scale(bone, time);

                    if sample > 0 && prev_rot.dot(rotation) < 0.0 {
                        rotation = -rotation;
                    }
                    prev_rot = rotation;

                    data[t_base + 1 + sample] = translation.extend(0.0);
                    data[r_base + 1 + sample] =
                        Vec4::new(rotation.x, rotation.y, rotation.z, rotation.w);
                    data[s_base + 1 + sample] = scale.extend(0.0);
                }
            }
        }

        Self {
            bone_count,
            clip_count,
            max_clip_duration,
            data,
        }
    }

    /// CPU reference of the shader's table sampling: linear interpolation
    /// between the two rows bracketing `time`, slerp for the rotation rows.
    #[must_use]
    pub fn sample(&self, clip: usize, bone: usize, time: f32) -> Trs {
        let base = channel_base(clip, bone, self.bone_count);
        let inv_time_factor = self.data[base].x;
        let scaled = (time * inv_time_factor).max(0.0);
        let row = (scaled as usize).min(LOOKUP_SAMPLES - 2);
        let frac = (scaled - row as f32).clamp(0.0, 1.0);

        let fetch = |channel: usize, row: usize| {
            self.data[base + channel * LOOKUP_TABLE_WIDTH + 1 + row]
        };

        let t0 = fetch(0, row).truncate();
        let t1 = fetch(0, row + 1).truncate();
        let r0 = quat_from_vec4(fetch(1, row));
        let r1 = quat_from_vec4(fetch(1, row + 1));
        let s0 = fetch(2, row).truncate();
        let s1 = fetch(2, row + 1).truncate();

        Trs {
            translation: t0.lerp(t1, frac),
            rotation: r0.slerp(r1, frac).normalize(),
            scale: s0.lerp(s1, frac),
        }
    }

    /// Total table size in bytes when uploaded.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<Vec4>()
    }
}

fn channel_base(clip: usize, bone: usize, bone_count: usize) -> usize {
    (clip * bone_count + bone) * CHANNELS * LOOKUP_TABLE_WIDTH
}

fn quat_from_vec4(v: Vec4) -> Quat {
    Quat::from_xyzw(v.x, v.y, v.z, v.w)
}

/// Per-clip skeleton bounding boxes at [`LOOKUP_SAMPLES`] phases.
///
/// Joint positions are the translations of the composed local-transform
/// chains (no offset matrices), matching what the bounding-sphere stage
/// sees.
#[must_use]
pub fn build_aabb_lookup(
    skeleton: &Skeleton,
    clips: &[AnimClip],
    max_clip_duration: f32,
) -> Vec<Vec<Aabb>> {
    let step = max_clip_duration.max(f32::EPSILON) / LOOKUP_SAMPLES as f32;
    clips
        .iter()
        .map(|clip| {
            (0..LOOKUP_SAMPLES)
                .map(|sample| {
                    let time = sample as f32 * step;
                    let joints = joint_positions(skeleton, clip, time);
                    Aabb::from_points(&joints)
                })
                .collect()
        })
        .collect()
}

/// Model-space joint positions of `clip` at `time`.
#[must_use]
pub fn joint_positions(skeleton: &Skeleton, clip: &AnimClip, time: f32) -> Vec<Vec3> {
    let bone_count = skeleton.bone_count();
    let mut matrices = Vec::with_capacity(bone_count);
    for bone in 0..bone_count {
        let local = Trs {
            translation: clip.sample_translation(bone, time),
            rotation: clip.sample_rotation(bone, time),
            scale: clip.sample_scale(bone, time),
        }
        .to_matrix();
        let parent = skeleton.bones[bone].parent;
        let world = if parent < 0 {
            local
        } else {
            matrices[parent as usize] * local
        };
        matrices.push(world);
    }
    matrices
        .iter()
        .map(|m: &Mat4| m.w_axis.truncate())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::clip::{BoneChannel, Keyframe};
    use crate::model::skeleton::Bone;

    fn test_skeleton() -> Skeleton {
        Skeleton::new(
            vec![
                Bone {
                    name: "root".to_owned(),
                    parent: -1,
                },
                Bone {
                    name: "limb".to_owned(),
                    parent: 0,
                },
            ],
            vec![Mat4::IDENTITY; 2],
        )
        .unwrap()
    }

    fn rising_clip() -> AnimClip {
        AnimClip {
            name: "rise".to_owned(),
            duration: 1.0,
            channels: vec![
                Some(BoneChannel {
                    translations: vec![
                        Keyframe {
                            time: 0.0,
                            value: Vec3::ZERO,
                        },
                        Keyframe {
                            time: 1.0,
                            value: Vec3::new(0.0, 2.0, 0.0),
                        },
                    ],
                    ..BoneChannel::default()
                }),
                None,
            ],
        }
    }

    #[test]
    fn sample_reproduces_clip_values() {
        let skeleton = test_skeleton();
        let lookup = AnimLookup::build(&skeleton, &[rising_clip()]);
        let trs = lookup.sample(0, 0, 0.5);
        assert!((trs.translation.y - 1.0).abs() < 1e-2);
        assert_eq!(trs.rotation, Quat::IDENTITY);
        assert_eq!(trs.scale, Vec3::ONE);
    }

    #[test]
    fn sampling_is_deterministic() {
        let skeleton = test_skeleton();
        let lookup_a = AnimLookup::build(&skeleton, &[rising_clip()]);
        let lookup_b = AnimLookup::build(&skeleton, &[rising_clip()]);
        assert_eq!(lookup_a.data, lookup_b.data);
        for step in 0..16 {
            let t = step as f32 / 16.0;
            assert_eq!(lookup_a.sample(0, 0, t), lookup_b.sample(0, 0, t));
        }
    }

    #[test]
    fn empty_channel_rows_are_identity() {
        let skeleton = test_skeleton();
        let lookup = AnimLookup::build(&skeleton, &[rising_clip()]);
        let trs = lookup.sample(0, 1, 0.3);
        assert_eq!(trs, Trs::IDENTITY);
    }

    #[test]
    fn header_row_stores_inverse_time_factor() {
        let skeleton = test_skeleton();
        let lookup = AnimLookup::build(&skeleton, &[rising_clip()]);
        assert!(
            (lookup.data[0].x - LOOKUP_SAMPLES as f32 / 1.0).abs() < 1e-3
        );
    }

    #[test]
    fn aabb_lookup_tracks_motion() {
        let skeleton = test_skeleton();
        let clips = [rising_clip()];
        let lookup = build_aabb_lookup(&skeleton, &clips, 1.0);
        assert_eq!(lookup.len(), 1);
        assert_eq!(lookup[0].len(), LOOKUP_SAMPLES);
        // Near the end of the clip the root sits around y = 2.
        let last = lookup[0][LOOKUP_SAMPLES - 1];
        assert!(last.max.y > 1.9);
        // At the start everything is at the origin.
        let first = lookup[0][0];
        assert!(first.max.y < 1e-5);
    }

    #[test]
    fn trs_blend_midpoint() {
        let a = Trs {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        };
        let b = Trs {
            translation: Vec3::new(2.0, 0.0, 0.0),
            rotation: Quat::from_rotation_y(1.0),
            scale: Vec3::splat(3.0),
        };
        let mid = a.blend(&b, 0.5);
        assert_eq!(mid.translation, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(mid.scale, Vec3::splat(2.0));
        assert!(mid.rotation.dot(Quat::from_rotation_y(0.5)).abs() > 0.999);
    }
}
