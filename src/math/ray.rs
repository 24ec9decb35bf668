//! Ray/triangle intersection.

use glam::Vec3;

/// Intersect a ray with a triangle (Moeller-Trumbore).
///
/// `direction` does not need to be normalized; hits are only reported within
/// the segment `origin .. origin + direction`. Returns the world-space hit
/// point, or `None` when the ray misses, the triangle is edge-on, or the hit
/// lies behind the origin.
#[must_use]
pub fn ray_triangle_intersection(
    origin: Vec3,
    direction: Vec3,
    triangle: &[Vec3; 3],
) -> Option<Vec3> {
    const EPSILON: f32 = 1e-7;

    let edge1 = triangle[1] - triangle[0];
    let edge2 = triangle[2] - triangle[0];

    let p = direction.cross(edge2);
    let det = edge1.dot(p);
    if det.abs() < EPSILON {
        return None;
    }

    let inv_det = 1.0 / det;
    let to_origin = origin - triangle[0];
    let u = to_origin.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = to_origin.cross(edge1);
    let v = direction.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = edge2.dot(q) * inv_det;
    if !(0.0..=1.0).contains(&t) {
        return None;
    }

    Some(origin + direction * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ground_triangle() -> [Vec3; 3] {
        [
            Vec3::new(-10.0, 0.0, -10.0),
            Vec3::new(10.0, 0.0, -10.0),
            Vec3::new(0.0, 0.0, 10.0),
        ]
    }

    #[test]
    fn downward_ray_hits_ground() {
        let hit = ray_triangle_intersection(
            Vec3::new(0.0, 5.0, 0.0),
            Vec3::new(0.0, -10.0, 0.0),
            &ground_triangle(),
        );
        assert_eq!(hit, Some(Vec3::new(0.0, 0.0, 0.0)));
    }

    #[test]
    fn short_ray_stops_before_triangle() {
        let hit = ray_triangle_intersection(
            Vec3::new(0.0, 5.0, 0.0),
            Vec3::new(0.0, -1.0, 0.0),
            &ground_triangle(),
        );
        assert_eq!(hit, None);
    }

    #[test]
    fn miss_outside_triangle() {
        let hit = ray_triangle_intersection(
            Vec3::new(50.0, 5.0, 0.0),
            Vec3::new(0.0, -10.0, 0.0),
            &ground_triangle(),
        );
        assert_eq!(hit, None);
    }

    #[test]
    fn parallel_ray_misses() {
        let hit = ray_triangle_intersection(
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            &ground_triangle(),
        );
        assert_eq!(hit, None);
    }
}
