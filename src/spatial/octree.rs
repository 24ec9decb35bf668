//! Generic loose octree over id/bounding-box pairs.
//!
//! The tree does not own the payloads it indexes; callers insert an id
//! together with its current bounding box. The instance tree is cleared and
//! refilled every frame, the triangle tree once per level change.

use std::hash::Hash;

use glam::Vec3;
use rustc_hash::FxHashSet;

use crate::math::Aabb;

/// 8-way spatial subdivision tree over an axis-aligned region.
///
/// A node splits into eight children once it holds `threshold` items and its
/// depth is below `max_depth`; items straddling child boundaries stay on the
/// parent node.
pub struct Octree<I> {
    root: Node<I>,
    threshold: usize,
    max_depth: usize,
}

struct Node<I> {
    bounds: Aabb,
    items: Vec<(I, Aabb)>,
    children: Option<Box<[Node<I>; 8]>>,
}

impl<I: Copy + Eq + Ord + Hash> Octree<I> {
    /// Empty tree covering `bounds`.
    #[must_use]
    pub fn new(bounds: Aabb, threshold: usize, max_depth: usize) -> Self {
        Self {
            root: Node {
                bounds,
                items: Vec::new(),
                children: None,
            },
            threshold: threshold.max(1),
            max_depth,
        }
    }

    /// Remove all items, keeping the region.
    pub fn clear(&mut self) {
        self.root.items.clear();
        self.root.children = None;
    }

    /// Insert an id with its bounding box. Items outside the tree region
    /// stay on the root node so they still participate in queries.
    pub fn add(&mut self, id: I, aabb: Aabb) {
        self.root
            .insert(id, aabb, 0, self.threshold, self.max_depth);
    }

    /// All ids whose bounding box intersects `query_box`, deduplicated.
    #[must_use]
    pub fn query(&self, query_box: &Aabb) -> FxHashSet<I> {
        let mut found = FxHashSet::default();
        self.root.query(query_box, &mut found);
        found
    }

    /// Every unordered pair of ids whose bounding boxes overlap. No
    /// self-pairs, each pair reported once with the smaller id first.
    #[must_use]
    pub fn find_all_intersections(&self) -> FxHashSet<(I, I)> {
        let mut pairs = FxHashSet::default();
        self.root.find_intersections(&mut pairs);
        pairs
    }

    /// The boxes of all nodes currently in the tree, for debug drawing.
    #[must_use]
    pub fn tree_boxes(&self) -> Vec<Aabb> {
        let mut boxes = Vec::new();
        self.root.collect_boxes(&mut boxes);
        boxes
    }
}

impl<I: Copy + Eq + Ord + Hash> Node<I> {
    fn child_bounds(&self, octant: usize) -> Aabb {
        let half = (self.bounds.max - self.bounds.min) * 0.5;
        let offset = Vec3::new(
            if octant & 1 == 0 { 0.0 } else { half.x },
            if octant & 2 == 0 { 0.0 } else { half.y },
            if octant & 4 == 0 { 0.0 } else { half.z },
        );
        Aabb::from_pos_size(self.bounds.min + offset, half)
    }

    /// Octant fully containing `aabb`, or `None` for straddlers and items
    /// leaking outside this node.
    fn octant_for(&self, aabb: &Aabb) -> Option<usize> {
        (0..8).find(|&octant| self.child_bounds(octant).contains(aabb))
    }

    fn insert(
        &mut self,
        id: I,
        aabb: Aabb,
        depth: usize,
        threshold: usize,
        max_depth: usize,
    ) {
        if self.children.is_some() {
            let octant = self.octant_for(&aabb);
            if let (Some(octant), Some(children)) = (octant, self.children.as_mut()) {
                children[octant].insert(id, aabb, depth + 1, threshold, max_depth);
            } else {
                self.items.push((id, aabb));
            }
            return;
        }

        self.items.push((id, aabb));

        if self.items.len() >= threshold && depth < max_depth {
            self.split(depth, threshold, max_depth);
        }
    }

    fn split(&mut self, depth: usize, threshold: usize, max_depth: usize) {
        let children: Box<[Node<I>; 8]> = Box::new(std::array::from_fn(|octant| Node {
            bounds: self.child_bounds(octant),
            items: Vec::new(),
            children: None,
        }));
        self.children = Some(children);

        let items = std::mem::take(&mut self.items);
        for (id, aabb) in items {
            self.insert(id, aabb, depth, threshold, max_depth);
        }
    }

    fn query(&self, query_box: &Aabb, found: &mut FxHashSet<I>) {
        // Items on this node may leak outside its bounds (root straddlers),
        // so they are always tested. Descendant items are contained in
        // their node's bounds, which allows pruning whole subtrees.
        for (id, aabb) in &self.items {
            if aabb.intersects(query_box) {
                let _ = found.insert(*id);
            }
        }
        if let Some(children) = self.children.as_ref() {
            for child in children.iter() {
                if child.bounds.intersects(query_box) {
                    child.query(query_box, found);
                }
            }
        }
    }

    fn find_intersections(&self, pairs: &mut FxHashSet<(I, I)>) {
        for (i, (id_a, box_a)) in self.items.iter().enumerate() {
            // Pairs among this node's own items.
            for (id_b, box_b) in &self.items[i + 1..] {
                if box_a.intersects(box_b) {
                    let _ = pairs.insert(ordered_pair(*id_a, *id_b));
                }
            }
            // This node's items against everything deeper in the tree.
            if let Some(children) = self.children.as_ref() {
                for child in children.iter() {
                    child.check_against_subtree(*id_a, box_a, pairs);
                }
            }
        }
        if let Some(children) = self.children.as_ref() {
            for child in children.iter() {
                child.find_intersections(pairs);
            }
        }
    }

    fn check_against_subtree(&self, id: I, aabb: &Aabb, pairs: &mut FxHashSet<(I, I)>) {
        if !self.bounds.intersects(aabb) {
            return;
        }
        for (other_id, other_box) in &self.items {
            if *other_id != id && aabb.intersects(other_box) {
                let _ = pairs.insert(ordered_pair(id, *other_id));
            }
        }
        if let Some(children) = self.children.as_ref() {
            for child in children.iter() {
                child.check_against_subtree(id, aabb, pairs);
            }
        }
    }

    fn collect_boxes(&self, boxes: &mut Vec<Aabb>) {
        boxes.push(self.bounds);
        if let Some(children) = self.children.as_ref() {
            for child in children.iter() {
                child.collect_boxes(boxes);
            }
        }
    }
}

fn ordered_pair<I: Ord>(a: I, b: I) -> (I, I) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> Aabb {
        Aabb::from_pos_size(Vec3::splat(-64.0), Vec3::splat(128.0))
    }

    fn unit_box_at(pos: Vec3) -> Aabb {
        Aabb::from_pos_size(pos, Vec3::ONE)
    }

    #[test]
    fn query_matches_linear_scan() {
        let mut tree = Octree::new(world(), 4, 5);
        let mut boxes = Vec::new();
        // Deterministic pseudo-random scatter.
        let mut seed = 0x1234_5678_u32;
        for id in 0..200_u32 {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let x = (seed >> 8 & 0x7f) as f32 - 64.0;
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let y = (seed >> 8 & 0x7f) as f32 - 64.0;
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let z = (seed >> 8 & 0x7f) as f32 - 64.0;
            let aabb = unit_box_at(Vec3::new(x, y, z));
            boxes.push((id, aabb));
            tree.add(id, aabb);
        }

        let query = Aabb::from_pos_size(Vec3::new(-20.0, -20.0, -20.0), Vec3::splat(40.0));
        let result = tree.query(&query);
        let expected: FxHashSet<u32> = boxes
            .iter()
            .filter(|(_, b)| b.intersects(&query))
            .map(|(id, _)| *id)
            .collect();
        assert_eq!(result, expected);
    }

    #[test]
    fn find_all_intersections_matches_all_pairs() {
        let mut tree = Octree::new(world(), 3, 4);
        let boxes = [
            (0_u32, unit_box_at(Vec3::new(0.0, 0.0, 0.0))),
            (1, unit_box_at(Vec3::new(0.5, 0.0, 0.0))),
            (2, unit_box_at(Vec3::new(10.0, 0.0, 0.0))),
            (3, unit_box_at(Vec3::new(10.5, 0.5, 0.0))),
            (4, unit_box_at(Vec3::new(-30.0, 0.0, 0.0))),
            (5, unit_box_at(Vec3::new(0.25, 0.5, 0.25))),
        ];
        for (id, aabb) in boxes {
            tree.add(id, aabb);
        }

        let mut expected = FxHashSet::default();
        for (i, (id_a, box_a)) in boxes.iter().enumerate() {
            for (id_b, box_b) in &boxes[i + 1..] {
                if box_a.intersects(box_b) {
                    let _ = expected.insert((*id_a, *id_b));
                }
            }
        }
        assert_eq!(tree.find_all_intersections(), expected);
    }

    #[test]
    fn no_self_pairs_and_no_duplicates() {
        let mut tree = Octree::new(world(), 2, 5);
        // Pile everything onto the same spot to force splits and straddlers.
        for id in 0..20_u32 {
            tree.add(id, unit_box_at(Vec3::new(0.0, 0.0, 0.0)));
        }
        let pairs = tree.find_all_intersections();
        assert_eq!(pairs.len(), 20 * 19 / 2);
        for (a, b) in &pairs {
            assert!(a < b);
        }
    }

    #[test]
    fn deep_and_shallow_items_pair_up() {
        let mut tree = Octree::new(world(), 1, 5);
        // A large straddler that stays near the root ...
        tree.add(0_u32, Aabb::from_pos_size(Vec3::splat(-10.0), Vec3::splat(20.0)));
        // ... and small boxes that sink into deep children.
        tree.add(1_u32, unit_box_at(Vec3::new(5.0, 5.0, 5.0)));
        tree.add(2_u32, unit_box_at(Vec3::new(-8.0, -8.0, -8.0)));
        tree.add(3_u32, unit_box_at(Vec3::new(50.0, 50.0, 50.0)));
        let pairs = tree.find_all_intersections();
        assert!(pairs.contains(&(0, 1)));
        assert!(pairs.contains(&(0, 2)));
        assert!(!pairs.contains(&(0, 3)));
    }

    #[test]
    fn out_of_bounds_items_still_found() {
        let mut tree = Octree::new(world(), 4, 3);
        tree.add(7_u32, unit_box_at(Vec3::splat(500.0)));
        let found = tree.query(&Aabb::from_pos_size(Vec3::splat(499.0), Vec3::splat(4.0)));
        assert!(found.contains(&7));
    }

    #[test]
    fn clear_empties_the_tree() {
        let mut tree = Octree::new(world(), 2, 5);
        for id in 0..10_u32 {
            tree.add(id, unit_box_at(Vec3::new(id as f32, 0.0, 0.0)));
        }
        tree.clear();
        assert!(tree.find_all_intersections().is_empty());
        assert!(tree.query(&world()).is_empty());
    }
}
