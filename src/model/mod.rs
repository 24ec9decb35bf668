//! Immutable per-model asset data.
//!
//! A [`Model`] is what the host's asset importer hands the engine: meshes
//! with skinning attributes, a validated skeleton, animation clips (already
//! resampled into GPU lookup tables), morph targets for facial expressions,
//! textures, and the authored [`ModelSettings`].

mod clip;
mod lookup;
mod settings;
mod skeleton;

pub use clip::{AnimClip, BoneChannel, Keyframe};
pub use lookup::{
    build_aabb_lookup, joint_positions, AnimLookup, Trs, LOOKUP_SAMPLES,
    LOOKUP_TABLE_WIDTH,
};
pub use settings::{FootIkChain, HeadMoveDirection, ModelSettings};
pub use skeleton::{Bone, Skeleton};

use bytemuck::{Pod, Zeroable};
use glam::{EulerRot, Mat4, Quat, Vec3};

use crate::error::EngineError;
use crate::math::Aabb;

/// A skinned mesh vertex in the exact layout uploaded to vertex buffers.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct SkinnedVertex {
    /// Model-space position.
    pub position: [f32; 3],
    /// Texture U coordinate.
    pub uv_x: f32,
    /// Model-space normal.
    pub normal: [f32; 3],
    /// Texture V coordinate.
    pub uv_y: f32,
    /// Indices of the four influencing bones.
    pub bone_ids: [u32; 4],
    /// Normalized weights of the four influencing bones.
    pub bone_weights: [f32; 4],
}

/// An additive per-vertex displacement used for facial expression.
#[derive(Debug, Clone)]
pub struct MorphTarget {
    /// Target name from the source asset.
    pub name: String,
    /// One delta per mesh vertex.
    pub deltas: Vec<Vec3>,
}

/// Decoded RGBA8 texture data; decoding is the host's concern.
#[derive(Debug, Clone)]
pub struct TextureData {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Tightly packed RGBA8 pixels, row-major.
    pub rgba: Vec<u8>,
}

/// One mesh of a model.
#[derive(Debug, Clone, Default)]
pub struct SkinnedMesh {
    /// Mesh name.
    pub name: String,
    /// Vertex list.
    pub vertices: Vec<SkinnedVertex>,
    /// Triangle indices.
    pub indices: Vec<u32>,
    /// Morph targets; all must match the mesh vertex count.
    pub morph_targets: Vec<MorphTarget>,
    /// Base color texture, if the asset carries one.
    pub texture: Option<TextureData>,
}

impl Default for SkinnedVertex {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            uv_x: 0.0,
            normal: [0.0, 1.0, 0.0],
            uv_y: 0.0,
            bone_ids: [0; 4],
            bone_weights: [1.0, 0.0, 0.0, 0.0],
        }
    }
}

/// The per-frame pose parameters a bounding-box lookup needs.
#[derive(Debug, Clone, Copy)]
pub struct InstancePose {
    /// World position.
    pub position: Vec3,
    /// World rotation in Euler degrees.
    pub rotation: Vec3,
    /// Uniform scale.
    pub scale: f32,
    /// First blended clip.
    pub clip_a: usize,
    /// Playhead of the first clip in seconds.
    pub time_a: f32,
    /// Second blended clip.
    pub clip_b: usize,
    /// Playhead of the second clip in seconds.
    pub time_b: f32,
    /// Blend factor between the clips.
    pub blend: f32,
}

/// Immutable model asset.
#[derive(Debug, Clone)]
pub struct Model {
    /// Model name, usually the source file stem.
    pub name: String,
    /// The model meshes.
    pub meshes: Vec<SkinnedMesh>,
    /// Skeleton; `None` for static props.
    pub skeleton: Option<Skeleton>,
    /// Animation clips (metadata; the GPU reads the lookup table).
    pub clips: Vec<AnimClip>,
    /// Longest clip duration in seconds.
    pub max_clip_duration: f32,
    /// Packed animation lookup table, present when the model animates.
    pub anim_lookup: Option<AnimLookup>,
    /// Per-clip skeleton AABBs at the lookup phases.
    pub aabb_lookup: Vec<Vec<Aabb>>,
    /// Authored settings.
    pub settings: ModelSettings,
    /// Rest bounding box over all mesh vertices.
    static_aabb: Aabb,
}

impl Model {
    /// Assemble a model, validating the skeleton, padding the
    /// bounding-sphere adjustments, and building the lookup tables when
    /// clips are present.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AssetInvariant`] on skeleton violations,
    /// clips without a skeleton, or morph targets whose vertex count does
    /// not match their mesh.
    pub fn new(
        name: String,
        meshes: Vec<SkinnedMesh>,
        skeleton: Option<Skeleton>,
        clips: Vec<AnimClip>,
        mut settings: ModelSettings,
    ) -> Result<Self, EngineError> {
        if let Some(skeleton) = skeleton.as_ref() {
            skeleton.validate()?;
            settings.ensure_sphere_adjustments(skeleton.bone_count());
        } else if !clips.is_empty() {
            return Err(EngineError::AssetInvariant(format!(
                "model '{name}' has {} clips but no skeleton",
                clips.len()
            )));
        }
        for mesh in &meshes {
            for target in &mesh.morph_targets {
                if target.deltas.len() != mesh.vertices.len() {
                    return Err(EngineError::AssetInvariant(format!(
                        "morph target '{}' has {} deltas for {} vertices",
                        target.name,
                        target.deltas.len(),
                        mesh.vertices.len()
                    )));
                }
            }
        }

        let max_clip_duration = clips
            .iter()
            .map(|c| c.duration)
            .fold(0.0_f32, f32::max);

        let (anim_lookup, aabb_lookup) = match skeleton.as_ref() {
            Some(skeleton) if !clips.is_empty() => (
                Some(AnimLookup::build(skeleton, &clips)),
                build_aabb_lookup(skeleton, &clips, max_clip_duration),
            ),
            _ => (None, Vec::new()),
        };

        let mut points = Vec::new();
        for mesh in &meshes {
            for v in &mesh.vertices {
                points.push(Vec3::from_array(v.position));
            }
        }
        let static_aabb = Aabb::from_points(&points);

        Ok(Self {
            name,
            meshes,
            skeleton,
            clips,
            max_clip_duration,
            anim_lookup,
            aabb_lookup,
            settings,
            static_aabb,
        })
    }

    /// True when the model carries animation clips.
    #[must_use]
    pub fn has_animations(&self) -> bool {
        self.anim_lookup.is_some()
    }

    /// True when any mesh carries morph targets.
    #[must_use]
    pub fn has_morph_targets(&self) -> bool {
        self.meshes.iter().any(|m| !m.morph_targets.is_empty())
    }

    /// Number of skeleton bones, zero for static props.
    #[must_use]
    pub fn bone_count(&self) -> usize {
        self.skeleton.as_ref().map_or(0, Skeleton::bone_count)
    }

    /// Number of animation clips.
    #[must_use]
    pub fn clip_count(&self) -> usize {
        self.clips.len()
    }

    /// World-space bounding box for an instance pose.
    ///
    /// Animated models interpolate the per-clip AABB lookup between the two
    /// active clips; static models use the rest box. The box is scaled,
    /// axis-swapped, rotated, and translated into the world.
    #[must_use]
    pub fn instance_aabb(&self, pose: &InstancePose) -> Aabb {
        let local = if self.aabb_lookup.is_empty() {
            self.static_aabb
        } else {
            let inv_time_factor =
                LOOKUP_SAMPLES as f32 / self.max_clip_duration.max(f32::EPSILON);
            let index_for = |time: f32| {
                ((time * inv_time_factor) as usize).min(LOOKUP_SAMPLES - 1)
            };
            let clip_a = pose.clip_a.min(self.aabb_lookup.len() - 1);
            let clip_b = pose.clip_b.min(self.aabb_lookup.len() - 1);
            let box_a = self.aabb_lookup[clip_a][index_for(pose.time_a)];
            let box_b = self.aabb_lookup[clip_b][index_for(pose.time_b)];
            Aabb {
                min: box_a.min.lerp(box_b.min, pose.blend),
                max: box_a.max.lerp(box_b.max, pose.blend),
            }
        };

        let scale = pose.scale * self.settings.scale;
        let rotation = Quat::from_euler(
            EulerRot::XYZ,
            pose.rotation.x.to_radians(),
            pose.rotation.y.to_radians(),
            pose.rotation.z.to_radians(),
        );
        let swap = if self.settings.swap_yz {
            Quat::from_rotation_x(-90.0_f32.to_radians())
        } else {
            Quat::IDENTITY
        };
        let transform = rotation * swap;

        // Rotate all eight corners and refit the box.
        let (min, max) = (local.min * scale, local.max * scale);
        let corners = [
            Vec3::new(min.x, min.y, min.z),
            Vec3::new(max.x, min.y, min.z),
            Vec3::new(min.x, max.y, min.z),
            Vec3::new(max.x, max.y, min.z),
            Vec3::new(min.x, min.y, max.z),
            Vec3::new(max.x, min.y, max.z),
            Vec3::new(min.x, max.y, max.z),
            Vec3::new(max.x, max.y, max.z),
        ];
        let mut world = Aabb::at_point(transform * corners[0] + pose.position);
        for corner in &corners[1..] {
            world.add_point(transform * *corner + pose.position);
        }
        world
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::clip::{BoneChannel, Keyframe};

    fn simple_skeleton() -> Skeleton {
        Skeleton::new(
            vec![
                Bone {
                    name: "root".to_owned(),
                    parent: -1,
                },
                Bone {
                    name: "head".to_owned(),
                    parent: 0,
                },
            ],
            vec![Mat4::IDENTITY; 2],
        )
        .unwrap()
    }

    fn jump_clip() -> AnimClip {
        AnimClip {
            name: "jump".to_owned(),
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
                            value: Vec3::new(0.0, 3.0, 0.0),
                        },
                    ],
                    ..BoneChannel::default()
                }),
                None,
            ],
        }
    }

    fn unit_quad_mesh() -> SkinnedMesh {
        let mut mesh = SkinnedMesh {
            name: "quad".to_owned(),
            ..SkinnedMesh::default()
        };
        for (x, y) in [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)] {
            mesh.vertices.push(SkinnedVertex {
                position: [x, y, 0.0],
                ..SkinnedVertex::default()
            });
        }
        mesh.indices = vec![0, 1, 2];
        mesh
    }

    #[test]
    fn animated_model_builds_lookups() {
        let model = Model::new(
            "walker".to_owned(),
            vec![unit_quad_mesh()],
            Some(simple_skeleton()),
            vec![jump_clip()],
            ModelSettings::default(),
        )
        .unwrap();
        assert!(model.has_animations());
        assert_eq!(model.aabb_lookup.len(), 1);
        assert_eq!(
            model.settings.bounding_sphere_adjustments.len(),
            model.bone_count()
        );
    }

    #[test]
    fn clips_without_skeleton_are_rejected() {
        let model = Model::new(
            "broken".to_owned(),
            vec![unit_quad_mesh()],
            None,
            vec![jump_clip()],
            ModelSettings::default(),
        );
        assert!(model.is_err());
    }

    #[test]
    fn morph_vertex_count_mismatch_is_rejected() {
        let mut mesh = unit_quad_mesh();
        mesh.morph_targets.push(MorphTarget {
            name: "angry".to_owned(),
            deltas: vec![Vec3::ZERO; 2],
        });
        let model = Model::new(
            "face".to_owned(),
            vec![mesh],
            None,
            Vec::new(),
            ModelSettings::default(),
        );
        assert!(model.is_err());
    }

    #[test]
    fn static_instance_aabb_translates_with_pose() {
        let model = Model::new(
            "prop".to_owned(),
            vec![unit_quad_mesh()],
            None,
            Vec::new(),
            ModelSettings::default(),
        )
        .unwrap();
        let pose = InstancePose {
            position: Vec3::new(10.0, 0.0, 0.0),
            rotation: Vec3::ZERO,
            scale: 1.0,
            clip_a: 0,
            time_a: 0.0,
            clip_b: 0,
            time_b: 0.0,
            blend: 0.0,
        };
        let aabb = model.instance_aabb(&pose);
        assert!((aabb.min.x - 10.0).abs() < 1e-5);
        assert!((aabb.max.x - 11.0).abs() < 1e-5);
    }

    #[test]
    fn animated_instance_aabb_follows_playhead() {
        let model = Model::new(
            "walker".to_owned(),
            vec![unit_quad_mesh()],
            Some(simple_skeleton()),
            vec![jump_clip()],
            ModelSettings::default(),
        )
        .unwrap();
        let mut pose = InstancePose {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: 1.0,
            clip_a: 0,
            time_a: 0.0,
            clip_b: 0,
            time_b: 0.0,
            blend: 0.0,
        };
        let rest = model.instance_aabb(&pose);
        pose.time_a = 0.99;
        let jumped = model.instance_aabb(&pose);
        assert!(jumped.max.y > rest.max.y + 2.0);
    }
}
