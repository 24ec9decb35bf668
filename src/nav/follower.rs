//! Per-instance path following.

use glam::Vec3;

use super::PathFinder;
use crate::instance::Instance;

/// Advance one instance along its navigation path.
///
/// Replans when either endpoint changed its ground triangle since the last
/// plan (and both are valid); an unreachable target disables navigation and
/// clears it. The instance is steered toward the first waypoint past its
/// own start triangle; forward motion itself stays under behavior control.
///
/// `target_triangle` and `target_position` describe the target instance;
/// pass `-1` / any position when there is no valid target. Returns the
/// position currently steered toward, for debug drawing.
pub fn tick(
    finder: &PathFinder,
    instance: &mut Instance,
    target_triangle: i32,
    target_position: Vec3,
    delta: f32,
) -> Option<Vec3> {
    if !instance.nav_enabled || instance.path_target_instance < 0 {
        return None;
    }

    let start = instance.ground_triangle;
    let replan_needed = start > -1
        && target_triangle > -1
        && (start != instance.path_start_tri
            || target_triangle != instance.path_target_tri);

    if replan_needed {
        instance.path_start_tri = start;
        instance.path_target_tri = target_triangle;
        let path = finder.find_path(start as u32, target_triangle as u32);
        if path.is_empty() {
            log::debug!(
                "instance {}: target triangle {target_triangle} unreachable",
                instance.index_position
            );
            instance.stop_navigation();
            return None;
        }
        instance.path_to_target = path;
    }

    // Drop the endpoints; they are the triangles the two instances already
    // stand on.
    let mut waypoints = instance.path_to_target.clone();
    if waypoints.len() > 1 {
        let _ = waypoints.pop();
    }
    if !waypoints.is_empty() {
        let _ = waypoints.remove(0);
    }

    let steer_to = waypoints
        .first()
        .and_then(|&tri| finder.triangle_center(tri))
        .unwrap_or(target_position);
    instance.rotate_to(steer_to, delta);
    Some(steer_to)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::level::level_from_triangle_soup;
    use crate::math::Aabb;
    use crate::model::{Model, ModelSettings};
    use crate::spatial::TriangleOctree;

    fn strip_finder(cells: u32) -> PathFinder {
        let mut soup = Vec::new();
        for c in 0..cells {
            let x = c as f32;
            soup.extend([
                Vec3::new(x, 0.0, 0.0),
                Vec3::new(x, 0.0, 1.0),
                Vec3::new(x + 1.0, 0.0, 0.0),
                Vec3::new(x + 1.0, 0.0, 0.0),
                Vec3::new(x, 0.0, 1.0),
                Vec3::new(x + 1.0, 0.0, 1.0),
            ]);
        }
        let level = level_from_triangle_soup("strip", &soup);
        let mut tree = TriangleOctree::new(
            Aabb::from_pos_size(Vec3::splat(-1.0), Vec3::splat(cells as f32 + 2.0)),
            8,
            4,
        );
        for tri in level.triangles(0) {
            tree.add(tri);
        }
        let mut finder = PathFinder::new();
        finder.generate_ground_triangles(&tree, 45.0);
        finder
    }

    fn navigating_instance() -> Instance {
        let model = Arc::new(
            Model::new(
                "bot".to_owned(),
                vec![crate::model::SkinnedMesh::default()],
                None,
                Vec::new(),
                ModelSettings::default(),
            )
            .unwrap(),
        );
        let mut instance = Instance::new(model);
        instance.nav_enabled = true;
        instance.path_target_instance = 2;
        instance
    }

    #[test]
    fn plans_once_and_keeps_path_while_triangles_stable() {
        let finder = strip_finder(8);
        let mut instance = navigating_instance();
        instance.ground_triangle = 0;

        let _ = tick(&finder, &mut instance, 15, Vec3::new(8.0, 0.0, 0.5), 0.016);
        assert_eq!(instance.path_start_tri, 0);
        assert_eq!(instance.path_target_tri, 15);
        let planned = instance.path_to_target.clone();
        assert_eq!(planned.first(), Some(&0));
        assert_eq!(planned.last(), Some(&15));

        // No triangle changed: the path must stay as-is.
        let _ = tick(&finder, &mut instance, 15, Vec3::new(8.0, 0.0, 0.5), 0.016);
        assert_eq!(instance.path_to_target, planned);
    }

    #[test]
    fn replans_when_start_triangle_changes() {
        let finder = strip_finder(8);
        let mut instance = navigating_instance();
        instance.ground_triangle = 0;
        let _ = tick(&finder, &mut instance, 15, Vec3::new(8.0, 0.0, 0.5), 0.016);
        let first_plan = instance.path_to_target.clone();

        instance.ground_triangle = 4;
        let _ = tick(&finder, &mut instance, 15, Vec3::new(8.0, 0.0, 0.5), 0.016);
        assert_ne!(instance.path_to_target, first_plan);
        assert_eq!(instance.path_to_target.first(), Some(&4));
    }

    #[test]
    fn unreachable_target_disables_navigation() {
        let finder = strip_finder(4);
        let mut instance = navigating_instance();
        instance.ground_triangle = 0;
        // Triangle 99 is not in the graph.
        let _ = tick(&finder, &mut instance, 99, Vec3::ZERO, 0.016);
        assert!(!instance.nav_enabled);
        assert_eq!(instance.path_target_instance, -1);
    }

    #[test]
    fn steers_toward_first_inner_waypoint() {
        let finder = strip_finder(8);
        let mut instance = navigating_instance();
        instance.ground_triangle = 0;
        instance.position = Vec3::new(0.3, 0.0, 0.5);
        let steer = tick(&finder, &mut instance, 15, Vec3::new(8.0, 0.0, 0.5), 0.016);
        let steer = steer.unwrap();
        // The first inner waypoint lies ahead on the strip, not at the
        // target itself.
        assert!(steer.x > instance.position.x);
        assert!(steer.x < 8.0);
    }

    #[test]
    fn disabled_navigation_is_ignored() {
        let finder = strip_finder(4);
        let mut instance = navigating_instance();
        instance.nav_enabled = false;
        assert!(tick(&finder, &mut instance, 3, Vec3::ZERO, 0.016).is_none());
    }
}
