//! Per-instance collision with the level: candidate triangles, walkability
//! classification, gravity and ground snapping, wall detection.

use glam::Vec3;

use crate::instance::{Instance, GRAVITY};
use crate::math::Aabb;
use crate::spatial::TriangleOctree;

/// Tunables for ground and wall handling, loaded from the config file.
#[derive(Debug, Clone, Copy)]
pub struct LevelCollisionSettings {
    /// Steepest slope in degrees still counting as walkable ground.
    pub max_slope_angle_deg: f32,
    /// Tallest step an instance silently walks over.
    pub max_stair_height: f32,
    /// Downward extension of the collision AABB so the ground below the
    /// feet is part of the candidate query.
    pub foot_extension: f32,
    /// Whether instances fall and snap to the ground.
    pub gravity_enabled: bool,
}

impl Default for LevelCollisionSettings {
    fn default() -> Self {
        Self {
            max_slope_angle_deg: 45.0,
            max_stair_height: 1.0,
            foot_extension: 0.1,
            gravity_enabled: true,
        }
    }
}

impl LevelCollisionSettings {
    /// Cosine threshold of the walkable-slope test.
    #[must_use]
    pub fn min_walkable_dot(&self) -> f32 {
        self.max_slope_angle_deg.to_radians().cos()
    }
}

/// Query the level triangles around an instance, resolve gravity, and snap
/// the instance onto walkable ground.
///
/// The instance's cached bounding box must be current. Fills
/// `colliding_triangles`, sets `on_ground`, and integrates free fall.
pub fn update_ground_and_gravity(
    instance: &mut Instance,
    octree: &TriangleOctree,
    settings: &LevelCollisionSettings,
    delta: f32,
) {
    // Extend the box a bit below the feet so the ground is included.
    let extension = Vec3::new(0.0, settings.foot_extension, 0.0);
    let query_box = Aabb {
        min: instance.bounding_box.min - extension,
        max: instance.bounding_box.max,
    };
    instance.colliding_triangles = octree.query(&query_box);

    let mut on_ground = true;
    if settings.gravity_enabled {
        on_ground = false;
        let fall = Vec3::new(0.0, GRAVITY * delta, 0.0);
        let min_dot = settings.min_walkable_dot();
        for tri in &instance.colliding_triangles {
            if tri.normal.dot(Vec3::Y) < min_dot {
                continue;
            }
            // Cast upward from just below the predicted fall position; a
            // hit means the ground is close enough to stand on.
            if let Some(hit) = crate::math::ray_triangle_intersection(
                instance.position - fall,
                Vec3::Y,
                &tri.points,
            ) {
                instance.position = hit;
                on_ground = true;
            }
        }
    }
    instance.on_ground = on_ground;
    instance.apply_gravity(delta);
}

/// Classify the instance's candidate triangles, record the single ground
/// triangle under it, and report whether it presses against a wall.
///
/// Wall contact is only reported while the instance is on the ground, so
/// airborne instances do not fire spurious level-collision events.
#[must_use]
pub fn classify_and_find_ground(
    instance: &mut Instance,
    settings: &LevelCollisionSettings,
) -> bool {
    instance.ground_triangle = -1;
    let min_dot = settings.min_walkable_dot();
    let foot_y = instance.position.y;
    let height = instance.bounding_box.size().y.max(f32::EPSILON);
    let half_height = height * 0.5;
    let mut wall_contact = false;

    let triangles = std::mem::take(&mut instance.colliding_triangles);
    for tri in &triangles {
        let walkable = tri.normal.dot(Vec3::Y) >= min_dot;
        if walkable {
            // The triangle the instance stands on is the walkable one hit
            // by a ray cast down through the body.
            let hit = crate::math::ray_triangle_intersection(
                instance.position + Vec3::new(0.0, half_height, 0.0),
                Vec3::new(0.0, -height, 0.0),
                &tri.points,
            );
            if hit.is_some() {
                instance.ground_triangle = tri.index as i32;
            }
        }

        let tri_box = Aabb::from_points(&tri.points);
        let tri_height = tri_box.size().y;
        let stair_step = tri_height < settings.max_stair_height
            && tri_box.min.y > foot_y - settings.max_stair_height
            && tri_box.max.y < foot_y + settings.max_stair_height;
        let below_foot = tri_box.max.y < foot_y + settings.max_stair_height;

        if !(walkable || stair_step || below_foot) && instance.on_ground {
            wall_contact = true;
        }
    }
    instance.colliding_triangles = triangles;
    wall_contact
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::level::level_from_triangle_soup;
    use crate::model::{Model, ModelSettings, SkinnedMesh, SkinnedVertex};

    fn boxy_model() -> Arc<Model> {
        let mut mesh = SkinnedMesh::default();
        for p in [
            [-0.5, 0.0, -0.5],
            [0.5, 2.0, 0.5],
            [0.5, 0.0, -0.5],
        ] {
            mesh.vertices.push(SkinnedVertex {
                position: p,
                ..SkinnedVertex::default()
            });
        }
        mesh.indices = vec![0, 1, 2];
        Arc::new(
            Model::new(
                "bot".to_owned(),
                vec![mesh],
                None,
                Vec::new(),
                ModelSettings::default(),
            )
            .unwrap(),
        )
    }

    fn ground_tree() -> TriangleOctree {
        let level = level_from_triangle_soup(
            "ground",
            &[
                Vec3::new(-10.0, 0.0, -10.0),
                Vec3::new(-10.0, 0.0, 10.0),
                Vec3::new(10.0, 0.0, -10.0),
                Vec3::new(10.0, 0.0, -10.0),
                Vec3::new(-10.0, 0.0, 10.0),
                Vec3::new(10.0, 0.0, 10.0),
            ],
        );
        let mut tree = TriangleOctree::new(
            Aabb::from_pos_size(Vec3::splat(-16.0), Vec3::splat(32.0)),
            8,
            4,
        );
        for tri in level.triangles(0) {
            tree.add(tri);
        }
        tree
    }

    fn instance_at(position: Vec3) -> Instance {
        let mut instance = Instance::new(boxy_model());
        instance.position = position;
        instance.update_bounding_box();
        instance
    }

    #[test]
    fn instance_near_ground_snaps_and_lands() {
        let tree = ground_tree();
        let settings = LevelCollisionSettings::default();
        let mut instance = instance_at(Vec3::new(0.0, 0.05, 0.0));
        update_ground_and_gravity(&mut instance, &tree, &settings, 1.0 / 60.0);
        assert!(instance.on_ground);
        assert!(instance.position.y.abs() < 1e-4);
    }

    #[test]
    fn airborne_instance_falls() {
        let tree = ground_tree();
        let settings = LevelCollisionSettings::default();
        let mut instance = instance_at(Vec3::new(0.0, 5.0, 0.0));
        let y0 = instance.position.y;
        update_ground_and_gravity(&mut instance, &tree, &settings, 1.0 / 60.0);
        assert!(!instance.on_ground);
        assert!(instance.position.y < y0);
    }

    #[test]
    fn gravity_disabled_keeps_instances_grounded() {
        let tree = ground_tree();
        let settings = LevelCollisionSettings {
            gravity_enabled: false,
            ..LevelCollisionSettings::default()
        };
        let mut instance = instance_at(Vec3::new(0.0, 5.0, 0.0));
        update_ground_and_gravity(&mut instance, &tree, &settings, 1.0 / 60.0);
        assert!(instance.on_ground);
        assert_eq!(instance.position.y, 5.0);
    }

    #[test]
    fn ground_triangle_is_recorded() {
        let tree = ground_tree();
        let settings = LevelCollisionSettings::default();
        let mut instance = instance_at(Vec3::new(-5.0, 0.01, -5.0));
        update_ground_and_gravity(&mut instance, &tree, &settings, 1.0 / 60.0);
        instance.update_bounding_box();
        let wall = classify_and_find_ground(&mut instance, &settings);
        assert!(!wall);
        assert_eq!(instance.ground_triangle, 0);
    }

    #[test]
    fn wall_contact_only_reported_on_ground() {
        // Ground plus a vertical wall right next to the instance.
        let soup = vec![
            Vec3::new(-10.0, 0.0, -10.0),
            Vec3::new(-10.0, 0.0, 10.0),
            Vec3::new(10.0, 0.0, -10.0),
            // Wall facing -X at x = 0.4, tall enough to never pass the
            // stair test.
            Vec3::new(0.4, 0.0, -2.0),
            Vec3::new(0.4, 4.0, 0.0),
            Vec3::new(0.4, 0.0, 2.0),
        ];
        let level = level_from_triangle_soup("walled", &soup);
        let mut tree = TriangleOctree::new(
            Aabb::from_pos_size(Vec3::splat(-16.0), Vec3::splat(32.0)),
            8,
            4,
        );
        for tri in level.triangles(0) {
            tree.add(tri);
        }

        let settings = LevelCollisionSettings::default();
        let mut instance = instance_at(Vec3::new(0.0, 0.01, 0.0));
        update_ground_and_gravity(&mut instance, &tree, &settings, 1.0 / 60.0);
        instance.update_bounding_box();
        assert!(instance.on_ground);
        assert!(classify_and_find_ground(&mut instance, &settings));

        // The same wall contact while airborne stays silent.
        let mut floating = instance_at(Vec3::new(0.0, 6.0, 0.0));
        floating.on_ground = false;
        floating.colliding_triangles = tree.query(&floating.bounding_box);
        assert!(!classify_and_find_ground(&mut floating, &settings));
    }

    #[test]
    fn short_steps_are_stairs_not_walls() {
        // A small box edge (0.3 high) in front of the instance.
        let level = level_from_triangle_soup(
            "step",
            &[
                Vec3::new(0.4, 0.0, -1.0),
                Vec3::new(0.4, 0.3, 0.0),
                Vec3::new(0.4, 0.0, 1.0),
            ],
        );
        let mut tree = TriangleOctree::new(
            Aabb::from_pos_size(Vec3::splat(-8.0), Vec3::splat(16.0)),
            8,
            4,
        );
        for tri in level.triangles(0) {
            tree.add(tri);
        }
        let settings = LevelCollisionSettings::default();
        let mut instance = instance_at(Vec3::new(0.0, 0.0, 0.0));
        instance.on_ground = true;
        instance.colliding_triangles = tree.query(&instance.bounding_box);
        assert!(!instance.colliding_triangles.is_empty());
        assert!(!classify_and_find_ground(&mut instance, &settings));
    }
}
