//! Axis-aligned bounding boxes.

use glam::Vec3;

/// An axis-aligned bounding box stored as min/max corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Smallest corner.
    pub min: Vec3,
    /// Largest corner.
    pub max: Vec3,
}

impl Aabb {
    /// A degenerate box collapsed onto a single point.
    #[must_use]
    pub fn at_point(point: Vec3) -> Self {
        Self {
            min: point,
            max: point,
        }
    }

    /// Box from an origin corner and an extent.
    #[must_use]
    pub fn from_pos_size(pos: Vec3, size: Vec3) -> Self {
        Self {
            min: pos,
            max: pos + size,
        }
    }

    /// Box tightly enclosing a point set. Returns a point-degenerate box at
    /// the origin for an empty slice.
    #[must_use]
    pub fn from_points(points: &[Vec3]) -> Self {
        let mut iter = points.iter();
        let Some(first) = iter.next() else {
            return Self::at_point(Vec3::ZERO);
        };
        let mut aabb = Self::at_point(*first);
        for p in iter {
            aabb.add_point(*p);
        }
        aabb
    }

    /// Grow the box to include `point`.
    pub fn add_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Grow the box to include another box.
    pub fn merge(&mut self, other: &Self) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Uniformly inflate all sides by `epsilon`. Guards against degenerate
    /// axis-parallel triangles dropping out of octree cells.
    #[must_use]
    pub fn inflated(&self, epsilon: f32) -> Self {
        Self {
            min: self.min - Vec3::splat(epsilon),
            max: self.max + Vec3::splat(epsilon),
        }
    }

    /// Box center.
    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Box extent.
    #[must_use]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// True if `point` lies inside or on the boundary.
    #[must_use]
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// True if `other` is fully inside this box.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        self.contains_point(other.min) && self.contains_point(other.max)
    }

    /// Overlap test, inclusive of touching faces.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_points_encloses_all() {
        let pts = [
            Vec3::new(1.0, -2.0, 3.0),
            Vec3::new(-1.0, 4.0, 0.5),
            Vec3::new(0.0, 0.0, 0.0),
        ];
        let aabb = Aabb::from_points(&pts);
        assert_eq!(aabb.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(aabb.max, Vec3::new(1.0, 4.0, 3.0));
        for p in pts {
            assert!(aabb.contains_point(p));
        }
    }

    #[test]
    fn intersects_is_inclusive_of_touching_faces() {
        let a = Aabb::from_pos_size(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::from_pos_size(Vec3::new(1.0, 0.0, 0.0), Vec3::ONE);
        let c = Aabb::from_pos_size(Vec3::new(1.01, 0.0, 0.0), Vec3::ONE);
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn inflated_grows_all_sides() {
        let aabb = Aabb::at_point(Vec3::ONE).inflated(0.25);
        assert_eq!(aabb.min, Vec3::splat(0.75));
        assert_eq!(aabb.max, Vec3::splat(1.25));
    }

    #[test]
    fn contains_full_box() {
        let outer = Aabb::from_pos_size(Vec3::ZERO, Vec3::splat(4.0));
        let inner = Aabb::from_pos_size(Vec3::ONE, Vec3::ONE);
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
    }
}
