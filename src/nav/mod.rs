//! Navigation over the walkable level surface.
//!
//! [`PathFinder`] extracts a ground-triangle graph from the triangle octree
//! (slope-tested triangles, edge-sharing adjacency) and answers A* path
//! queries over it. [`follower`] drives per-instance path following.

pub mod follower;

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use glam::Vec3;
use rustc_hash::FxHashMap;

use crate::spatial::TriangleOctree;

/// Two triangle corners closer than this count as the same graph vertex.
const SHARED_POINT_TOLERANCE: f32 = 1e-3;

#[derive(Debug, Clone)]
struct GroundNode {
    center: Vec3,
    neighbors: Vec<u32>,
}

/// Walkable-surface graph and A* search over it.
#[derive(Debug, Default)]
pub struct PathFinder {
    nodes: FxHashMap<u32, GroundNode>,
}

impl PathFinder {
    /// Empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the ground graph from the level's triangle octree.
    ///
    /// A triangle is a node iff its normal passes the slope test; two nodes
    /// are adjacent iff they share an edge (two coincident corners within
    /// tolerance). Neighbor candidates come from an octree query with the
    /// triangle's own box, so construction stays near-linear.
    pub fn generate_ground_triangles(
        &mut self,
        octree: &TriangleOctree,
        max_slope_angle_deg: f32,
    ) {
        self.nodes.clear();
        let min_dot = max_slope_angle_deg.to_radians().cos();

        for tri in octree.iter() {
            if tri.normal.dot(Vec3::Y) >= min_dot {
                let _ = self.nodes.insert(
                    tri.index,
                    GroundNode {
                        center: tri.center(),
                        neighbors: Vec::new(),
                    },
                );
            }
        }

        let ids: Vec<u32> = self.nodes.keys().copied().collect();
        for id in ids {
            let Some(tri) = octree.triangle(id) else {
                continue;
            };
            let mut neighbors = Vec::new();
            for candidate in octree.query(&tri.aabb) {
                if candidate.index == id || !self.nodes.contains_key(&candidate.index) {
                    continue;
                }
                let shared = tri
                    .points
                    .iter()
                    .filter(|p| {
                        candidate.points.iter().any(|q| {
                            p.distance_squared(*q)
                                < SHARED_POINT_TOLERANCE * SHARED_POINT_TOLERANCE
                        })
                    })
                    .count();
                if shared >= 2 {
                    neighbors.push(candidate.index);
                }
            }
            neighbors.sort_unstable();
            if let Some(node) = self.nodes.get_mut(&id) {
                node.neighbors = neighbors;
            }
        }
        log::debug!(
            "ground graph: {} walkable triangles",
            self.nodes.len()
        );
    }

    /// Number of ground triangles in the graph.
    #[must_use]
    pub fn ground_triangle_count(&self) -> usize {
        self.nodes.len()
    }

    /// True when `triangle` is part of the walkable graph.
    #[must_use]
    pub fn is_ground_triangle(&self, triangle: u32) -> bool {
        self.nodes.contains_key(&triangle)
    }

    /// Neighbor ids of a ground triangle.
    #[must_use]
    pub fn neighbors(&self, triangle: u32) -> &[u32] {
        self.nodes
            .get(&triangle)
            .map_or(&[], |n| n.neighbors.as_slice())
    }

    /// Center of a ground triangle.
    #[must_use]
    pub fn triangle_center(&self, triangle: u32) -> Option<Vec3> {
        self.nodes.get(&triangle).map(|n| n.center)
    }

    /// A* from `start` to `goal` over the ground graph.
    ///
    /// Cost is accumulated center-to-center distance, the heuristic is the
    /// straight-line distance to the goal center, ties prefer the lower
    /// accumulated cost. Returns the triangle ids from start to goal
    /// inclusive, or an empty vector when unreachable.
    #[must_use]
    pub fn find_path(&self, start: u32, goal: u32) -> Vec<u32> {
        let (Some(start_node), Some(goal_node)) =
            (self.nodes.get(&start), self.nodes.get(&goal))
        else {
            return Vec::new();
        };
        if start == goal {
            return vec![start];
        }

        let mut open = BinaryHeap::new();
        let mut best_g: FxHashMap<u32, f32> = FxHashMap::default();
        let mut came_from: FxHashMap<u32, u32> = FxHashMap::default();

        let _ = best_g.insert(start, 0.0);
        open.push(OpenEntry {
            f: start_node.center.distance(goal_node.center),
            g: 0.0,
            triangle: start,
        });

        while let Some(entry) = open.pop() {
            if entry.triangle == goal {
                let mut path = vec![goal];
                let mut current = goal;
                while let Some(&prev) = came_from.get(&current) {
                    path.push(prev);
                    current = prev;
                }
                path.reverse();
                return path;
            }
            if best_g
                .get(&entry.triangle)
                .is_some_and(|&g| entry.g > g)
            {
                continue;
            }
            let Some(node) = self.nodes.get(&entry.triangle) else {
                continue;
            };
            for &neighbor in &node.neighbors {
                let Some(neighbor_node) = self.nodes.get(&neighbor) else {
                    continue;
                };
                let g = entry.g + node.center.distance(neighbor_node.center);
                if best_g.get(&neighbor).is_none_or(|&old| g < old) {
                    let _ = best_g.insert(neighbor, g);
                    let _ = came_from.insert(neighbor, entry.triangle);
                    open.push(OpenEntry {
                        f: g + neighbor_node.center.distance(goal_node.center),
                        g,
                        triangle: neighbor,
                    });
                }
            }
        }
        Vec::new()
    }
}

/// Open-list entry ordered for a min-heap on (f, then g).
struct OpenEntry {
    f: f32,
    g: f32,
    triangle: u32,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.f == other.f && self.g == other.g
    }
}
impl Eq for OpenEntry {}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert to pop the smallest f, breaking
        // ties toward the smaller g.
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.g.total_cmp(&self.g))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::level_from_triangle_soup;
    use crate::math::Aabb;

    /// Strip of quads along +X: triangles 2i and 2i+1 form cell i.
    fn strip_tree(cells: u32) -> TriangleOctree {
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
            Aabb::from_pos_size(Vec3::new(-1.0, -1.0, -1.0), Vec3::splat(cells as f32 + 2.0)),
            8,
            4,
        );
        for tri in level.triangles(0) {
            tree.add(tri);
        }
        tree
    }

    fn strip_finder(cells: u32) -> PathFinder {
        let tree = strip_tree(cells);
        let mut finder = PathFinder::new();
        finder.generate_ground_triangles(&tree, 45.0);
        finder
    }

    #[test]
    fn flat_strip_is_fully_walkable() {
        let finder = strip_finder(4);
        assert_eq!(finder.ground_triangle_count(), 8);
    }

    #[test]
    fn adjacent_cells_share_edges() {
        let finder = strip_finder(2);
        // Triangle 0 and 1 share the quad diagonal.
        assert!(finder.neighbors(0).contains(&1));
        // Triangle 1 borders cell 1's first triangle.
        assert!(finder.neighbors(1).contains(&2));
    }

    #[test]
    fn path_endpoints_and_adjacency_hold() {
        let finder = strip_finder(6);
        let path = finder.find_path(0, 11);
        assert_eq!(path.first(), Some(&0));
        assert_eq!(path.last(), Some(&11));
        for pair in path.windows(2) {
            assert!(
                finder.neighbors(pair[0]).contains(&pair[1]),
                "{} and {} are not adjacent",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn unreachable_goal_returns_empty() {
        // Two disconnected strips.
        let mut soup = Vec::new();
        for x_off in [0.0_f32, 10.0] {
            soup.extend([
                Vec3::new(x_off, 0.0, 0.0),
                Vec3::new(x_off, 0.0, 1.0),
                Vec3::new(x_off + 1.0, 0.0, 0.0),
            ]);
        }
        let level = level_from_triangle_soup("gap", &soup);
        let mut tree = TriangleOctree::new(
            Aabb::from_pos_size(Vec3::splat(-2.0), Vec3::splat(20.0)),
            8,
            4,
        );
        for tri in level.triangles(0) {
            tree.add(tri);
        }
        let mut finder = PathFinder::new();
        finder.generate_ground_triangles(&tree, 45.0);
        assert!(finder.find_path(0, 1).is_empty());
    }

    #[test]
    fn steep_triangles_are_not_ground() {
        let soup = [
            // Flat triangle.
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 0.0),
            // Vertical wall.
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(2.0, 1.0, 0.0),
            Vec3::new(2.0, 0.0, 1.0),
        ];
        let level = level_from_triangle_soup("mixed", &soup);
        let mut tree = TriangleOctree::new(
            Aabb::from_pos_size(Vec3::splat(-2.0), Vec3::splat(8.0)),
            8,
            4,
        );
        for tri in level.triangles(0) {
            tree.add(tri);
        }
        let mut finder = PathFinder::new();
        finder.generate_ground_triangles(&tree, 45.0);
        assert_eq!(finder.ground_triangle_count(), 1);
        assert!(finder.is_ground_triangle(0));
        assert!(!finder.is_ground_triangle(1));
    }

    #[test]
    fn l_corridor_path_stays_in_corridor() {
        // Two perpendicular strips joined at the corner cell.
        let mut soup = Vec::new();
        for c in 0..3 {
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
        for c in 1..3 {
            let z = c as f32;
            soup.extend([
                Vec3::new(2.0, 0.0, z),
                Vec3::new(2.0, 0.0, z + 1.0),
                Vec3::new(3.0, 0.0, z),
                Vec3::new(3.0, 0.0, z),
                Vec3::new(2.0, 0.0, z + 1.0),
                Vec3::new(3.0, 0.0, z + 1.0),
            ]);
        }
        let level = level_from_triangle_soup("corridor", &soup);
        let mut tree = TriangleOctree::new(
            Aabb::from_pos_size(Vec3::splat(-1.0), Vec3::splat(8.0)),
            8,
            4,
        );
        for tri in level.triangles(0) {
            tree.add(tri);
        }
        let mut finder = PathFinder::new();
        finder.generate_ground_triangles(&tree, 45.0);

        let path = finder.find_path(0, 9);
        assert!(!path.is_empty());
        // Every waypoint center stays within the corridor's footprint.
        for tri in &path {
            let center = finder.triangle_center(*tri).unwrap();
            let in_x_arm = (0.0..=3.0).contains(&center.x) && (0.0..=1.0).contains(&center.z);
            let in_z_arm = (2.0..=3.0).contains(&center.x) && (0.0..=3.0).contains(&center.z);
            assert!(in_x_arm || in_z_arm, "waypoint {center} left the corridor");
        }
    }
}
