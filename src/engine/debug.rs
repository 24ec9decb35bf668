//! Debug visualization: line meshes for bounding boxes, octree cells,
//! colliding level triangles, navigation paths, IK plant points, and
//! interaction ranges.

use glam::Vec3;

use super::Engine;
use crate::renderer::{push_aabb_lines, LineVertex};

const COLOR_AABB: [f32; 4] = [1.0, 1.0, 0.0, 1.0];
const COLOR_OCTREE: [f32; 4] = [1.0, 1.0, 1.0, 0.5];
const COLOR_LEVEL_OCTREE: [f32; 4] = [0.3, 0.7, 1.0, 0.5];
const COLOR_COLLIDING_TRI: [f32; 4] = [1.0, 0.2, 0.2, 1.0];
const COLOR_PATH: [f32; 4] = [0.4, 1.0, 0.4, 1.0];
const COLOR_IK: [f32; 4] = [0.1, 0.6, 0.8, 1.0];
const COLOR_INTERACTION: [f32; 4] = [1.0, 0.6, 0.1, 1.0];

/// Which debug meshes to generate each frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct DebugDrawOptions {
    /// Instance bounding boxes.
    pub instance_aabbs: bool,
    /// Instance octree cells.
    pub instance_octree: bool,
    /// Level triangle octree cells.
    pub level_octree: bool,
    /// Triangles currently colliding with instances.
    pub colliding_triangles: bool,
    /// Per-instance navigation paths.
    pub instance_paths: bool,
    /// Foot IK plant points.
    pub ik_points: bool,
    /// Interaction range of the selected instance.
    pub interaction_range: bool,
}

impl Engine {
    /// Mutable access to the debug draw toggles.
    pub fn debug_options_mut(&mut self) -> &mut DebugDrawOptions {
        &mut self.debug_options
    }

    /// Build this frame's debug line list.
    pub(crate) fn build_debug_lines(&self) -> Vec<LineVertex> {
        let options = self.debug_options;
        let mut lines = Vec::new();

        if options.instance_aabbs {
            for instance in self.registry.iter() {
                push_aabb_lines(&mut lines, &instance.bounding_box, COLOR_AABB);
            }
        }
        if options.instance_octree {
            for aabb in self.instance_octree.tree_boxes() {
                push_aabb_lines(&mut lines, &aabb, COLOR_OCTREE);
            }
        }
        if options.level_octree {
            for aabb in self.triangle_octree.tree_boxes() {
                push_aabb_lines(&mut lines, &aabb, COLOR_LEVEL_OCTREE);
            }
        }
        if options.colliding_triangles {
            for instance in self.registry.iter() {
                for tri in &instance.colliding_triangles {
                    // Nudge the wireframe off the surface to avoid z-fighting.
                    let lift = tri.normal * 0.01;
                    for edge in [(0, 1), (1, 2), (2, 0)] {
                        lines.push(LineVertex::new(
                            tri.points[edge.0] + lift,
                            COLOR_COLLIDING_TRI,
                        ));
                        lines.push(LineVertex::new(
                            tri.points[edge.1] + lift,
                            COLOR_COLLIDING_TRI,
                        ));
                    }
                }
            }
        }
        if options.instance_paths {
            let lift = Vec3::new(0.0, 1.0, 0.0);
            for instance in self.registry.iter() {
                if !instance.nav_enabled || instance.path_to_target.is_empty() {
                    continue;
                }
                let mut previous = instance.position + lift;
                for &tri in &instance.path_to_target {
                    let Some(center) = self.path_finder.triangle_center(tri) else {
                        continue;
                    };
                    lines.push(LineVertex::new(previous, COLOR_PATH));
                    lines.push(LineVertex::new(center + lift, COLOR_PATH));
                    previous = center + lift;
                }
            }
        }
        if options.ik_points {
            for point in &self.ik_debug_points {
                for (a, b) in [
                    (Vec3::new(-0.5, 0.0, 0.0), Vec3::new(0.5, 0.0, 0.0)),
                    (Vec3::new(0.0, 0.0, -0.5), Vec3::new(0.0, 0.0, 0.5)),
                ] {
                    lines.push(LineVertex::new(*point + a, COLOR_IK));
                    lines.push(LineVertex::new(*point + b, COLOR_IK));
                }
            }
        }
        if options.interaction_range {
            if let Some(instance) = self.registry.get(self.selected_instance) {
                // A flat circle plus the facing cone edges.
                let range = self.config.interaction_range;
                let half_fov = self.config.interaction_fov_degrees.to_radians();
                let center = instance.position + Vec3::new(0.0, 0.05, 0.0);
                const SEGMENTS: usize = 32;
                for s in 0..SEGMENTS {
                    let a = s as f32 / SEGMENTS as f32 * std::f32::consts::TAU;
                    let b = (s + 1) as f32 / SEGMENTS as f32 * std::f32::consts::TAU;
                    lines.push(LineVertex::new(
                        center + Vec3::new(a.sin(), 0.0, a.cos()) * range,
                        COLOR_INTERACTION,
                    ));
                    lines.push(LineVertex::new(
                        center + Vec3::new(b.sin(), 0.0, b.cos()) * range,
                        COLOR_INTERACTION,
                    ));
                }
                let yaw = instance.rotation.y.to_radians();
                for angle in [yaw - half_fov, yaw + half_fov] {
                    lines.push(LineVertex::new(center, COLOR_INTERACTION));
                    lines.push(LineVertex::new(
                        center + Vec3::new(angle.sin(), 0.0, angle.cos()) * range,
                        COLOR_INTERACTION,
                    ));
                }
            }
        }

        lines
    }
}
