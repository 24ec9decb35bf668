//! Static level geometry.
//!
//! A level owns a list of meshes in model space plus a world transform.
//! Triangle extraction transforms every vertex into world space and
//! precomputes the per-triangle data (normal, edges, edge lengths, inflated
//! AABB) consumed by the triangle octree, the collision systems, and the
//! navigation graph.

use glam::{EulerRot, Mat4, Quat, Vec2, Vec3};

use crate::math::Aabb;

/// Epsilon used to inflate triangle AABBs so axis-parallel triangles do not
/// degenerate to zero-thickness boxes and fall out of octree cells.
const TRIANGLE_AABB_EPSILON: f32 = 1e-4;

/// A single vertex of a level mesh.
#[derive(Debug, Clone, Copy)]
pub struct LevelVertex {
    /// Model-space position.
    pub position: Vec3,
    /// Model-space normal.
    pub normal: Vec3,
    /// Texture coordinate.
    pub uv: Vec2,
}

/// An indexed triangle mesh of the level.
#[derive(Debug, Clone, Default)]
pub struct LevelMesh {
    /// Vertex list.
    pub vertices: Vec<LevelVertex>,
    /// Triangle list indices, three per triangle.
    pub indices: Vec<u32>,
}

/// A world-space level triangle with precomputed collision data.
#[derive(Debug, Clone)]
pub struct MeshTriangle {
    /// Unique triangle id across the whole level.
    pub index: u32,
    /// World-space corner points.
    pub points: [Vec3; 3],
    /// World-space unit normal.
    pub normal: Vec3,
    /// Edge vectors `p1-p0`, `p2-p1`, `p0-p2`.
    pub edges: [Vec3; 3],
    /// Lengths of the edge vectors.
    pub edge_lengths: [f32; 3],
    /// Epsilon-inflated bounding box.
    pub aabb: Aabb,
}

impl MeshTriangle {
    /// Build a triangle from world-space points, deriving normal, edges,
    /// and the inflated AABB.
    #[must_use]
    pub fn new(index: u32, points: [Vec3; 3]) -> Self {
        let edges = [
            points[1] - points[0],
            points[2] - points[1],
            points[0] - points[2],
        ];
        let normal = edges[0].cross(points[2] - points[0]).normalize_or_zero();
        let aabb = Aabb::from_points(&points).inflated(TRIANGLE_AABB_EPSILON);
        Self {
            index,
            points,
            normal,
            edges,
            edge_lengths: [
                edges[0].length(),
                edges[1].length(),
                edges[2].length(),
            ],
            aabb,
        }
    }

    /// Triangle centroid.
    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.points[0] + self.points[1] + self.points[2]) / 3.0
    }
}

/// A static level: meshes plus placement in the world.
#[derive(Debug, Clone, Default)]
pub struct Level {
    /// Display name, usually the source file stem.
    pub name: String,
    /// World position.
    pub position: Vec3,
    /// World rotation in Euler degrees.
    pub rotation: Vec3,
    /// Uniform scale.
    pub scale: f32,
    /// Rotate the model -90 degrees around X to map Z-up sources onto Y-up.
    pub swap_yz: bool,
    /// The level meshes in model space.
    pub meshes: Vec<LevelMesh>,
}

impl Level {
    /// The level's world transform matrix.
    #[must_use]
    pub fn world_matrix(&self) -> Mat4 {
        let scale = if self.scale > 0.0 { self.scale } else { 1.0 };
        let rotation = Quat::from_euler(
            EulerRot::XYZ,
            self.rotation.x.to_radians(),
            self.rotation.y.to_radians(),
            self.rotation.z.to_radians(),
        );
        let swap = if self.swap_yz {
            Quat::from_rotation_x(-90.0_f32.to_radians())
        } else {
            Quat::IDENTITY
        };
        Mat4::from_scale_rotation_translation(
            Vec3::splat(scale),
            rotation * swap,
            self.position,
        )
    }

    /// Extract all triangles in world space, numbering them from
    /// `first_index` upward. Degenerate (zero-normal) triangles are skipped.
    #[must_use]
    pub fn triangles(&self, first_index: u32) -> Vec<MeshTriangle> {
        let matrix = self.world_matrix();
        let mut triangles = Vec::new();
        let mut index = first_index;
        for mesh in &self.meshes {
            for tri in mesh.indices.chunks_exact(3) {
                let points = [
                    matrix.transform_point3(mesh.vertices[tri[0] as usize].position),
                    matrix.transform_point3(mesh.vertices[tri[1] as usize].position),
                    matrix.transform_point3(mesh.vertices[tri[2] as usize].position),
                ];
                let triangle = MeshTriangle::new(index, points);
                if triangle.normal == Vec3::ZERO {
                    continue;
                }
                triangles.push(triangle);
                index += 1;
            }
        }
        triangles
    }

    /// Bounding box of the whole level in world space.
    #[must_use]
    pub fn world_aabb(&self) -> Aabb {
        let matrix = self.world_matrix();
        let mut points = Vec::new();
        for mesh in &self.meshes {
            for v in &mesh.vertices {
                points.push(matrix.transform_point3(v.position));
            }
        }
        Aabb::from_points(&points)
    }
}

/// Build a single-mesh level from a flat triangle soup, three vertices per
/// triangle. Normals are taken from the triangle planes.
#[must_use]
pub fn level_from_triangle_soup(name: &str, points: &[Vec3]) -> Level {
    let mut mesh = LevelMesh::default();
    for tri in points.chunks_exact(3) {
        let normal = (tri[1] - tri[0])
            .cross(tri[2] - tri[0])
            .normalize_or_zero();
        let base = mesh.vertices.len() as u32;
        for p in tri {
            mesh.vertices.push(LevelVertex {
                position: *p,
                normal,
                uv: Vec2::ZERO,
            });
        }
        mesh.indices.extend([base, base + 1, base + 2]);
    }
    Level {
        name: name.to_owned(),
        scale: 1.0,
        meshes: vec![mesh],
        ..Level::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_quad() -> Level {
        level_from_triangle_soup(
            "quad",
            &[
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(0.0, 0.0, 1.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(0.0, 0.0, 1.0),
                Vec3::new(1.0, 0.0, 1.0),
            ],
        )
    }

    #[test]
    fn triangles_are_numbered_from_first_index() {
        let level = flat_quad();
        let tris = level.triangles(10);
        assert_eq!(tris.len(), 2);
        assert_eq!(tris[0].index, 10);
        assert_eq!(tris[1].index, 11);
    }

    #[test]
    fn flat_quad_normals_point_up() {
        let level = flat_quad();
        for tri in level.triangles(0) {
            assert!((tri.normal - Vec3::Y).length() < 1e-5);
        }
    }

    #[test]
    fn world_transform_moves_triangles() {
        let mut level = flat_quad();
        level.position = Vec3::new(0.0, 5.0, 0.0);
        let tris = level.triangles(0);
        for tri in &tris {
            for p in tri.points {
                assert!((p.y - 5.0).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn triangle_aabb_is_inflated() {
        let tri = MeshTriangle::new(
            0,
            [
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(0.0, 0.0, 1.0),
            ],
        );
        // Height is zero but the box must still have thickness.
        assert!(tri.aabb.size().y > 0.0);
    }

    #[test]
    fn edge_lengths_match_edges() {
        let tri = MeshTriangle::new(
            0,
            [
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(3.0, 0.0, 0.0),
                Vec3::new(3.0, 4.0, 0.0),
            ],
        );
        assert_eq!(tri.edge_lengths[0], 3.0);
        assert_eq!(tri.edge_lengths[1], 4.0);
        assert_eq!(tri.edge_lengths[2], 5.0);
    }
}
