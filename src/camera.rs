//! Cameras: projection, view, and instance following.

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::instance::InstanceRegistry;

/// Camera control mode.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
pub enum CameraKind {
    /// Host-controlled free camera.
    #[default]
    Free,
    /// Attached to a followed instance's head.
    FirstPerson,
    /// Orbiting behind a followed instance.
    ThirdPerson,
    /// Fixed position and orientation.
    Stationary,
}

/// A weak reference to a followed instance: the id is only honored while
/// the registry generation still matches, so deletions cannot dangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowTarget {
    /// Global instance id.
    pub instance_id: i32,
    /// Registry generation the id was captured in.
    pub generation: u64,
}

/// A configured camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Camera {
    /// Camera name shown in the host UI.
    pub name: String,
    /// Control mode.
    pub kind: CameraKind,
    /// World position.
    pub position: Vec3,
    /// Azimuth (yaw) in degrees.
    pub azimuth: f32,
    /// Elevation (pitch) in degrees.
    pub elevation: f32,
    /// Vertical field of view in degrees (perspective).
    pub fov_degrees: f32,
    /// Use an orthographic projection instead of perspective.
    pub orthographic: bool,
    /// Half-height of the orthographic view volume.
    pub ortho_scale: f32,
    /// Followed instance for first/third person modes.
    pub follow: Option<FollowTarget>,
    /// Camera distance behind the instance in third-person mode.
    pub follow_distance: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            name: "Camera".to_owned(),
            kind: CameraKind::Free,
            position: Vec3::new(0.0, 5.0, 10.0),
            azimuth: 0.0,
            elevation: -15.0,
            fov_degrees: 60.0,
            orthographic: false,
            ortho_scale: 10.0,
            follow: None,
            follow_distance: 5.0,
        }
    }
}

impl Camera {
    /// Unit view direction from azimuth and elevation.
    #[must_use]
    pub fn view_direction(&self) -> Vec3 {
        let azimuth = self.azimuth.to_radians();
        let elevation = self.elevation.to_radians();
        Vec3::new(
            azimuth.sin() * elevation.cos(),
            elevation.sin(),
            -azimuth.cos() * elevation.cos(),
        )
        .normalize()
    }

    /// Follow the target instance if the weak reference is still valid;
    /// stale references are cleared.
    pub fn update_follow(&mut self, registry: &InstanceRegistry) {
        let Some(target) = self.follow else { return };
        if target.generation != registry.generation() {
            log::debug!(
                "camera '{}': follow target invalidated by registry change",
                self.name
            );
            self.follow = None;
            return;
        }
        let Some(instance) = registry.get(target.instance_id) else {
            self.follow = None;
            return;
        };
        match self.kind {
            CameraKind::FirstPerson => {
                let head =
                    instance.position + Vec3::new(0.0, instance.bounding_box.size().y, 0.0);
                self.position = head;
                self.azimuth = instance.rotation.y;
            }
            CameraKind::ThirdPerson => {
                let back = -instance.heading() * self.follow_distance;
                self.position = instance.position
                    + back
                    + Vec3::new(0.0, self.follow_distance * 0.5, 0.0);
                self.azimuth = instance.rotation.y;
                self.elevation = -20.0;
            }
            _ => {}
        }
    }

    /// View matrix.
    #[must_use]
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.view_direction(), Vec3::Y)
    }

    /// Projection matrix for the given viewport aspect ratio.
    #[must_use]
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        if self.orthographic {
            let half_h = self.ortho_scale.max(0.01);
            let half_w = half_h * aspect.max(0.01);
            Mat4::orthographic_rh(-half_w, half_w, -half_h, half_h, 0.01, 1000.0)
        } else {
            Mat4::perspective_rh(
                self.fov_degrees.to_radians(),
                aspect.max(0.01),
                0.01,
                1000.0,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::{Model, ModelSettings, SkinnedMesh};

    fn registry_with_instance() -> (InstanceRegistry, i32) {
        let model = Arc::new(
            Model::new(
                "bot".to_owned(),
                vec![SkinnedMesh::default()],
                None,
                Vec::new(),
                ModelSettings::default(),
            )
            .unwrap(),
        );
        let mut registry = InstanceRegistry::new();
        let id = registry.add(&model, Vec3::new(3.0, 0.0, 4.0));
        (registry, id)
    }

    #[test]
    fn follow_tracks_instance_position() {
        let (registry, id) = registry_with_instance();
        let mut camera = Camera {
            kind: CameraKind::FirstPerson,
            follow: Some(FollowTarget {
                instance_id: id,
                generation: registry.generation(),
            }),
            ..Camera::default()
        };
        camera.update_follow(&registry);
        assert!((camera.position.x - 3.0).abs() < 1e-5);
        assert!((camera.position.z - 4.0).abs() < 1e-5);
    }

    #[test]
    fn stale_follow_reference_is_cleared() {
        let (mut registry, id) = registry_with_instance();
        let mut camera = Camera {
            kind: CameraKind::ThirdPerson,
            follow: Some(FollowTarget {
                instance_id: id,
                generation: registry.generation(),
            }),
            ..Camera::default()
        };
        // A structural change bumps the generation.
        assert!(registry.delete(id));
        camera.update_follow(&registry);
        assert!(camera.follow.is_none());
    }

    #[test]
    fn projection_switches_with_ortho_flag() {
        let mut camera = Camera::default();
        let perspective = camera.projection_matrix(16.0 / 9.0);
        camera.orthographic = true;
        let ortho = camera.projection_matrix(16.0 / 9.0);
        assert_ne!(perspective, ortho);
        // Orthographic projection has no perspective divide term.
        assert_eq!(ortho.w_axis.w, 1.0);
        assert_eq!(perspective.w_axis.w, 0.0);
    }

    #[test]
    fn view_direction_faces_minus_z_by_default_azimuth() {
        let camera = Camera {
            elevation: 0.0,
            ..Camera::default()
        };
        let dir = camera.view_direction();
        assert!((dir - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-5);
    }
}
