//! Octree over the level's world-space triangles.

use rustc_hash::FxHashMap;

use crate::level::MeshTriangle;
use crate::math::Aabb;
use crate::spatial::Octree;

/// Spatial index over level triangles, rebuilt once per level change.
///
/// The inner octree indexes triangle ids; the triangle data itself lives in
/// a side table so queries can hand back full triangles.
pub struct TriangleOctree {
    tree: Octree<u32>,
    triangles: FxHashMap<u32, MeshTriangle>,
}

impl TriangleOctree {
    /// Empty tree covering `bounds`.
    #[must_use]
    pub fn new(bounds: Aabb, threshold: usize, max_depth: usize) -> Self {
        Self {
            tree: Octree::new(bounds, threshold, max_depth),
            triangles: FxHashMap::default(),
        }
    }

    /// Remove all triangles, keeping the region.
    pub fn clear(&mut self) {
        self.tree.clear();
        self.triangles.clear();
    }

    /// Insert a triangle under its unique index.
    pub fn add(&mut self, triangle: MeshTriangle) {
        self.tree.add(triangle.index, triangle.aabb);
        let _ = self.triangles.insert(triangle.index, triangle);
    }

    /// All triangles whose AABB intersects `query_box`.
    #[must_use]
    pub fn query(&self, query_box: &Aabb) -> Vec<MeshTriangle> {
        let mut hits: Vec<MeshTriangle> = self
            .tree
            .query(query_box)
            .into_iter()
            .filter_map(|index| self.triangles.get(&index).cloned())
            .collect();
        hits.sort_by_key(|t| t.index);
        hits
    }

    /// Look up a triangle by id.
    #[must_use]
    pub fn triangle(&self, index: u32) -> Option<&MeshTriangle> {
        self.triangles.get(&index)
    }

    /// Iterate over all stored triangles.
    pub fn iter(&self) -> impl Iterator<Item = &MeshTriangle> {
        self.triangles.values()
    }

    /// Number of stored triangles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    /// True when no triangles are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// The boxes of all octree nodes, for debug drawing.
    #[must_use]
    pub fn tree_boxes(&self) -> Vec<Aabb> {
        self.tree.tree_boxes()
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::level::level_from_triangle_soup;

    fn grid_level_tree() -> TriangleOctree {
        // 4x4 grid of quads in the XZ plane.
        let mut soup = Vec::new();
        for gx in 0..4 {
            for gz in 0..4 {
                let x = gx as f32 * 2.0;
                let z = gz as f32 * 2.0;
                soup.extend([
                    Vec3::new(x, 0.0, z),
                    Vec3::new(x, 0.0, z + 2.0),
                    Vec3::new(x + 2.0, 0.0, z),
                    Vec3::new(x + 2.0, 0.0, z),
                    Vec3::new(x, 0.0, z + 2.0),
                    Vec3::new(x + 2.0, 0.0, z + 2.0),
                ]);
            }
        }
        let level = level_from_triangle_soup("grid", &soup);
        let mut tree = TriangleOctree::new(
            Aabb::from_pos_size(Vec3::new(-1.0, -1.0, -1.0), Vec3::splat(10.0)),
            4,
            4,
        );
        for tri in level.triangles(0) {
            tree.add(tri);
        }
        tree
    }

    #[test]
    fn query_returns_only_overlapping_triangles() {
        let tree = grid_level_tree();
        assert_eq!(tree.len(), 32);

        let query = Aabb::from_pos_size(Vec3::new(0.1, -0.5, 0.1), Vec3::new(1.0, 1.0, 1.0));
        let hits = tree.query(&query);
        assert!(!hits.is_empty());
        for tri in &hits {
            assert!(tri.aabb.intersects(&query));
        }
        // The far corner quad must not appear.
        assert!(hits.iter().all(|t| t.points[0].x < 4.0));
    }

    #[test]
    fn triangle_lookup_by_id() {
        let tree = grid_level_tree();
        let tri = tree.triangle(5);
        assert!(tri.is_some_and(|t| t.index == 5));
        assert!(tree.triangle(999).is_none());
    }

    #[test]
    fn clear_empties_the_index() {
        let mut tree = grid_level_tree();
        tree.clear();
        assert!(tree.is_empty());
        assert!(tree
            .query(&Aabb::from_pos_size(Vec3::splat(-10.0), Vec3::splat(30.0)))
            .is_empty());
    }
}
