//! Mutable per-entity state.
//!
//! An [`Instance`] is a placed occurrence of a [`Model`] with its own
//! transform, animation playheads, movement and physics state, navigation
//! path, and behavior attachment. Instances live in the
//! [`InstanceRegistry`], which maintains the global and per-model index
//! invariants.

mod registry;

pub use registry::InstanceRegistry;

use std::sync::Arc;

use bitflags::bitflags;
use glam::{EulerRot, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::level::MeshTriangle;
use crate::math::Aabb;
use crate::model::{InstancePose, Model};

/// Gravitational acceleration in m/s^2.
pub const GRAVITY: f32 = 9.81;

/// Walk speed in m/s.
const WALK_SPEED: f32 = 2.0;
/// Run speed in m/s.
const RUN_SPEED: f32 = 5.0;
/// Forward acceleration in m/s^2.
const ACCELERATION: f32 = 6.0;
/// Turn rate for navigation steering in degrees/s.
const TURN_SPEED: f32 = 90.0;

/// Gross movement state of an instance, set by the behavior tree or host.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
pub enum MoveState {
    /// Standing still.
    #[default]
    Idle,
    /// Walking.
    Walk,
    /// Running.
    Run,
    /// Jumping.
    Jump,
    /// Hopping in place.
    Hop,
    /// Picking something up.
    Pick,
    /// Punching.
    Punch,
    /// Rolling.
    Roll,
    /// Kicking.
    Kick,
    /// Interacting with another instance.
    Interact,
    /// Waving.
    Wave,
}

bitflags! {
    /// Active movement directions; several can be held at once.
    /// Serde impls come from the bitflags `serde` feature.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct MoveDirection: u8 {
        /// Move forward.
        const FORWARD = 1;
        /// Move backward.
        const BACK = 1 << 1;
        /// Strafe left.
        const LEFT = 1 << 2;
        /// Strafe right.
        const RIGHT = 1 << 3;
    }
}

/// Facial expression selection driving the morph-target weight.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
pub enum FaceAnim {
    /// No expression; morph weight ignored.
    #[default]
    None,
    /// Angry expression.
    Angry,
    /// Worried expression.
    Worried,
    /// Surprised expression.
    Surprised,
    /// Happy expression.
    Happy,
}

impl FaceAnim {
    /// Morph-target index for the expression, `None` for no expression.
    #[must_use]
    pub fn morph_index(self) -> Option<u32> {
        match self {
            Self::None => None,
            Self::Angry => Some(0),
            Self::Worried => Some(1),
            Self::Surprised => Some(2),
            Self::Happy => Some(3),
        }
    }
}

/// A placed occurrence of a model.
#[derive(Debug, Clone)]
pub struct Instance {
    model: Arc<Model>,
    /// Index into the registry's global list; 0 is the null instance.
    pub index_position: i32,
    /// Index into the registry's per-model list.
    pub per_model_index: i32,

    /// World position.
    pub position: Vec3,
    /// World rotation in Euler degrees.
    pub rotation: Vec3,
    /// Uniform scale.
    pub scale: f32,

    /// First blended animation clip.
    pub first_clip: usize,
    /// Second blended animation clip.
    pub second_clip: usize,
    /// Playhead of the first clip in seconds.
    pub first_playhead: f32,
    /// Playhead of the second clip in seconds.
    pub second_playhead: f32,
    /// Blend factor between the two clips.
    pub blend_factor: f32,
    /// Animation replay speed factor.
    pub speed_factor: f32,

    /// Selected facial expression.
    pub face_anim: FaceAnim,
    /// Expression morph weight.
    pub face_anim_weight: f32,
    /// Head look left/right in `[-1, 1]`.
    pub head_left_right: f32,
    /// Head look up/down in `[-1, 1]`.
    pub head_up_down: f32,

    /// Current movement state.
    pub move_state: MoveState,
    /// State to enter once the current one-shot action finishes.
    pub next_move_state: MoveState,
    /// Held movement directions.
    pub move_direction: MoveDirection,
    /// Current forward speed in m/s.
    pub forward_speed: f32,

    /// True while standing on walkable ground.
    pub on_ground: bool,
    /// Accumulated downward speed while airborne.
    pub fall_speed: f32,
    /// Ground triangle under the instance, `-1` when airborne.
    pub ground_triangle: i32,
    /// Level triangles currently colliding with the expanded AABB.
    pub colliding_triangles: Vec<MeshTriangle>,
    /// Neighbor ids of the current ground triangle.
    pub neighbor_ground_triangles: Vec<u32>,

    /// Whether path following is active.
    pub nav_enabled: bool,
    /// Target instance id, `-1` for none.
    pub path_target_instance: i32,
    /// Ground triangle the current plan started from.
    pub path_start_tri: i32,
    /// Ground triangle the current plan targets.
    pub path_target_tri: i32,
    /// Planned triangle id sequence from start to target.
    pub path_to_target: Vec<u32>,

    /// Attached behavior graph name, empty for none.
    pub node_tree_name: String,

    /// Cached world bounding box, refreshed once per frame.
    pub bounding_box: Aabb,
}

impl Instance {
    /// New instance of `model` at the origin.
    #[must_use]
    pub fn new(model: Arc<Model>) -> Self {
        let bounding_box = Aabb::at_point(Vec3::ZERO);
        Self {
            model,
            index_position: 0,
            per_model_index: 0,
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: 1.0,
            first_clip: 0,
            second_clip: 0,
            first_playhead: 0.0,
            second_playhead: 0.0,
            blend_factor: 0.0,
            speed_factor: 1.0,
            face_anim: FaceAnim::None,
            face_anim_weight: 0.0,
            head_left_right: 0.0,
            head_up_down: 0.0,
            move_state: MoveState::Idle,
            next_move_state: MoveState::Idle,
            move_direction: MoveDirection::empty(),
            forward_speed: 0.0,
            on_ground: false,
            fall_speed: 0.0,
            ground_triangle: -1,
            colliding_triangles: Vec::new(),
            neighbor_ground_triangles: Vec::new(),
            nav_enabled: false,
            path_target_instance: -1,
            path_start_tri: -1,
            path_target_tri: -1,
            path_to_target: Vec::new(),
            node_tree_name: String::new(),
            bounding_box,
        }
    }

    /// The instance's model.
    #[must_use]
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// Current pose parameters for bounding-box lookup.
    #[must_use]
    pub fn pose(&self) -> InstancePose {
        InstancePose {
            position: self.position,
            rotation: self.rotation,
            scale: self.scale,
            clip_a: self.first_clip,
            time_a: self.first_playhead,
            clip_b: self.second_clip,
            time_b: self.second_playhead,
            blend: self.blend_factor,
        }
    }

    /// World transform matrix including the model's axis swap and scale.
    #[must_use]
    pub fn world_matrix(&self) -> Mat4 {
        let swap = if self.model.settings.swap_yz {
            Quat::from_rotation_x(-90.0_f32.to_radians())
        } else {
            Quat::IDENTITY
        };
        let rotation = Quat::from_euler(
            EulerRot::XYZ,
            self.rotation.x.to_radians(),
            self.rotation.y.to_radians(),
            self.rotation.z.to_radians(),
        );
        Mat4::from_scale_rotation_translation(
            Vec3::splat(self.scale * self.model.settings.scale),
            rotation * swap,
            self.position,
        )
    }

    /// Refresh the cached world bounding box.
    pub fn update_bounding_box(&mut self) {
        self.bounding_box = self.model.instance_aabb(&self.pose());
    }

    /// Advance both clip playheads, wrapping at the model's longest clip
    /// duration.
    pub fn update_animation(&mut self, delta: f32) {
        let max = self.model.max_clip_duration;
        if max <= 0.0 {
            return;
        }
        self.first_playhead =
            (self.first_playhead + delta * self.speed_factor).rem_euclid(max);
        self.second_playhead =
            (self.second_playhead + delta * self.speed_factor).rem_euclid(max);
    }

    /// Accelerate or decelerate toward the speed of the current move state.
    pub fn update_speed(&mut self, delta: f32) {
        let target = match self.move_state {
            MoveState::Walk => WALK_SPEED,
            MoveState::Run => RUN_SPEED,
            _ => 0.0,
        };
        let diff = target - self.forward_speed;
        let step = ACCELERATION * delta;
        if diff.abs() <= step {
            self.forward_speed = target;
        } else {
            self.forward_speed += step * diff.signum();
        }
    }

    /// Unit heading vector in the XZ plane derived from the yaw rotation.
    #[must_use]
    pub fn heading(&self) -> Vec3 {
        let yaw = self.rotation.y.to_radians();
        Vec3::new(yaw.sin(), 0.0, yaw.cos())
    }

    /// Move along the held directions at the current forward speed.
    pub fn update_position(&mut self, delta: f32) {
        if self.forward_speed <= 0.0 || self.move_direction.is_empty() {
            return;
        }
        let heading = self.heading();
        let side = Vec3::new(heading.z, 0.0, -heading.x);
        let mut dir = Vec3::ZERO;
        if self.move_direction.contains(MoveDirection::FORWARD) {
            dir += heading;
        }
        if self.move_direction.contains(MoveDirection::BACK) {
            dir -= heading;
        }
        if self.move_direction.contains(MoveDirection::LEFT) {
            dir += side;
        }
        if self.move_direction.contains(MoveDirection::RIGHT) {
            dir -= side;
        }
        self.position += dir.normalize_or_zero() * self.forward_speed * delta;
    }

    /// Free fall while airborne: `y` drops by `v*dt + g*dt^2/2`, matching
    /// the closed-form trajectory.
    pub fn apply_gravity(&mut self, delta: f32) {
        if self.on_ground {
            self.fall_speed = 0.0;
            return;
        }
        self.position.y -=
            self.fall_speed * delta + GRAVITY * delta * delta * 0.5;
        self.fall_speed += GRAVITY * delta;
    }

    /// Turn the yaw toward `target` at the navigation turn rate.
    pub fn rotate_to(&mut self, target: Vec3, delta: f32) {
        let to_target = target - self.position;
        if to_target.x * to_target.x + to_target.z * to_target.z < 1e-8 {
            return;
        }
        let desired = to_target.x.atan2(to_target.z).to_degrees();
        let diff = wrap_angle(desired - self.rotation.y);
        let step = TURN_SPEED * delta;
        if diff.abs() <= step {
            self.rotation.y = desired;
        } else {
            self.rotation.y = wrap_angle(self.rotation.y + step * diff.signum());
        }
    }

    /// Drop the current path and target and disable navigation.
    pub fn stop_navigation(&mut self) {
        self.nav_enabled = false;
        self.path_target_instance = -1;
        self.path_start_tri = -1;
        self.path_target_tri = -1;
        self.path_to_target.clear();
    }
}

/// Wrap an angle in degrees into `(-180, 180]`.
fn wrap_angle(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(360.0);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelSettings;

    fn static_model() -> Arc<Model> {
        Arc::new(
            Model::new(
                "prop".to_owned(),
                vec![crate::model::SkinnedMesh::default()],
                None,
                Vec::new(),
                ModelSettings::default(),
            )
            .unwrap(),
        )
    }

    #[test]
    fn gravity_matches_closed_form_trajectory() {
        let mut inst = Instance::new(static_model());
        inst.position.y = 100.0;
        inst.on_ground = false;
        let dt = 1.0 / 60.0;
        let mut t = 0.0;
        for _ in 0..60 {
            inst.apply_gravity(dt);
            t += dt;
        }
        let expected = 100.0 - GRAVITY * t * t * 0.5;
        assert!((inst.position.y - expected).abs() < 1e-3);
    }

    #[test]
    fn first_gravity_step_drops_half_g_dt_squared() {
        let mut inst = Instance::new(static_model());
        inst.position.y = 10.0;
        let dt = 0.1;
        inst.apply_gravity(dt);
        assert!((inst.position.y - (10.0 - GRAVITY * dt * dt * 0.5)).abs() < 1e-6);
    }

    #[test]
    fn on_ground_resets_fall_speed() {
        let mut inst = Instance::new(static_model());
        inst.apply_gravity(0.5);
        assert!(inst.fall_speed > 0.0);
        inst.on_ground = true;
        inst.apply_gravity(0.5);
        assert_eq!(inst.fall_speed, 0.0);
    }

    #[test]
    fn speed_ramps_to_walk_speed() {
        let mut inst = Instance::new(static_model());
        inst.move_state = MoveState::Walk;
        for _ in 0..120 {
            inst.update_speed(1.0 / 60.0);
        }
        assert_eq!(inst.forward_speed, WALK_SPEED);
        inst.move_state = MoveState::Idle;
        for _ in 0..120 {
            inst.update_speed(1.0 / 60.0);
        }
        assert_eq!(inst.forward_speed, 0.0);
    }

    #[test]
    fn forward_motion_follows_heading() {
        let mut inst = Instance::new(static_model());
        inst.forward_speed = 1.0;
        inst.move_direction = MoveDirection::FORWARD;
        inst.rotation.y = 90.0;
        inst.update_position(1.0);
        assert!((inst.position.x - 1.0).abs() < 1e-5);
        assert!(inst.position.z.abs() < 1e-5);
    }

    #[test]
    fn rotate_to_turns_at_bounded_rate() {
        let mut inst = Instance::new(static_model());
        inst.rotate_to(Vec3::new(10.0, 0.0, 0.0), 0.5);
        // Half a second at 90 deg/s.
        assert!((inst.rotation.y - 45.0).abs() < 1e-4);
        inst.rotate_to(Vec3::new(10.0, 0.0, 0.0), 10.0);
        assert!((inst.rotation.y - 90.0).abs() < 1e-4);
    }

    #[test]
    fn playheads_wrap_at_clip_duration() {
        use crate::model::{AnimClip, Bone, Skeleton};
        let skeleton = Skeleton::new(
            vec![Bone {
                name: "root".to_owned(),
                parent: -1,
            }],
            vec![Mat4::IDENTITY],
        )
        .unwrap();
        let clip = AnimClip {
            name: "idle".to_owned(),
            duration: 1.0,
            channels: vec![None],
        };
        let model = Arc::new(
            Model::new(
                "bot".to_owned(),
                vec![crate::model::SkinnedMesh::default()],
                Some(skeleton),
                vec![clip],
                ModelSettings::default(),
            )
            .unwrap(),
        );
        let mut inst = Instance::new(model);
        inst.first_playhead = 0.9;
        inst.update_animation(0.2);
        assert!((inst.first_playhead - 0.1).abs() < 1e-5);
    }

    #[test]
    fn stop_navigation_clears_path_state(){
        let mut inst = Instance::new(static_model());
        inst.nav_enabled = true;
        inst.path_target_instance = 3;
        inst.path_to_target = vec![1, 2, 3];
        inst.stop_navigation();
        assert!(!inst.nav_enabled);
        assert_eq!(inst.path_target_instance, -1);
        assert!(inst.path_to_target.is_empty());
    }
}
