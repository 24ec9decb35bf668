//! Instance/instance collision resolution.
//!
//! Broad-phase pairs come from the instance octree. Pairs where either end
//! has no skeleton skip the narrow phase and count as collisions directly;
//! animated pairs are optionally filtered by per-bone bounding spheres.

use glam::Vec4;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::anim::sampler::spheres_intersect;
use crate::instance::InstanceRegistry;
use crate::math::Aabb;

/// Split broad-phase pairs into those needing the narrow phase (both ends
/// animated) and those kept as collisions immediately.
#[must_use]
pub fn split_static_pairs(
    pairs: &FxHashSet<(i32, i32)>,
    registry: &InstanceRegistry,
) -> (FxHashSet<(i32, i32)>, FxHashSet<(i32, i32)>) {
    let mut animated = FxHashSet::default();
    let mut static_pairs = FxHashSet::default();
    for &(a, b) in pairs {
        let both_animated = [a, b].iter().all(|&id| {
            registry
                .get(id)
                .is_some_and(|i| i.model().has_animations())
        });
        if both_animated {
            let _ = animated.insert((a, b));
        } else {
            let _ = static_pairs.insert((a, b));
        }
    }
    (animated, static_pairs)
}

/// Keep only the pairs whose per-bone bounding spheres actually touch.
///
/// `spheres` maps instance ids to their sphere lists (xyz center, w
/// radius); pairs with missing sphere data are dropped. The result is by
/// construction a subset of the broad-phase input.
#[must_use]
pub fn narrow_phase_filter(
    pairs: &FxHashSet<(i32, i32)>,
    spheres: &FxHashMap<i32, Vec<Vec4>>,
) -> FxHashSet<(i32, i32)> {
    pairs
        .iter()
        .filter(|(a, b)| {
            let (Some(sa), Some(sb)) = (spheres.get(a), spheres.get(b)) else {
                return false;
            };
            sa.iter()
                .any(|&x| sb.iter().any(|&y| spheres_intersect(x, y)))
        })
        .copied()
        .collect()
}

/// Instances whose cached bounding box pokes outside the world bounds.
#[must_use]
pub fn out_of_bounds_instances(
    registry: &InstanceRegistry,
    world_bounds: &Aabb,
) -> Vec<i32> {
    registry
        .iter()
        .filter(|instance| !world_bounds.contains(&instance.bounding_box))
        .map(|instance| instance.index_position)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use glam::{Mat4, Vec3};

    use super::*;
    use crate::model::{
        AnimClip, Bone, Model, ModelSettings, Skeleton, SkinnedMesh,
    };

    fn animated_model() -> Arc<Model> {
        let skeleton = Skeleton::new(
            vec![Bone {
                name: "root".to_owned(),
                parent: -1,
            }],
            vec![Mat4::IDENTITY],
        )
        .unwrap();
        let clip = AnimClip {
            name: "idle".to_owned(),
            duration: 1.0,
            channels: vec![None],
        };
        Arc::new(
            Model::new(
                "bot".to_owned(),
                vec![SkinnedMesh::default()],
                Some(skeleton),
                vec![clip],
                ModelSettings::default(),
            )
            .unwrap(),
        )
    }

    fn static_model() -> Arc<Model> {
        Arc::new(
            Model::new(
                "crate".to_owned(),
                vec![SkinnedMesh::default()],
                None,
                Vec::new(),
                ModelSettings::default(),
            )
            .unwrap(),
        )
    }

    #[test]
    fn static_pairs_bypass_narrow_phase() {
        let mut registry = InstanceRegistry::new();
        let bot = animated_model();
        let prop = static_model();
        let a = registry.add(&bot, Vec3::ZERO);
        let b = registry.add(&prop, Vec3::ZERO);
        let c = registry.add(&bot, Vec3::ZERO);

        let pairs: FxHashSet<(i32, i32)> = [(a, b), (a, c)].into_iter().collect();
        let (animated, statics) = split_static_pairs(&pairs, &registry);
        assert_eq!(statics.len(), 1);
        assert!(statics.contains(&(a, b)));
        assert_eq!(animated.len(), 1);
        assert!(animated.contains(&(a, c)));
    }

    #[test]
    fn narrow_phase_keeps_touching_spheres() {
        // Two instances 0.5 apart with radii summing to 1.0.
        let mut spheres = FxHashMap::default();
        let _ = spheres.insert(1, vec![Vec4::new(0.0, 0.0, 0.0, 0.5)]);
        let _ = spheres.insert(2, vec![Vec4::new(0.5, 0.0, 0.0, 0.5)]);
        let pairs: FxHashSet<(i32, i32)> = [(1, 2)].into_iter().collect();
        let kept = narrow_phase_filter(&pairs, &spheres);
        assert!(kept.contains(&(1, 2)));
    }

    #[test]
    fn narrow_phase_drops_distant_spheres() {
        // Same radii at distance 10: broad phase may pair them, narrow
        // phase must not.
        let mut spheres = FxHashMap::default();
        let _ = spheres.insert(1, vec![Vec4::new(0.0, 0.0, 0.0, 0.5)]);
        let _ = spheres.insert(2, vec![Vec4::new(10.0, 0.0, 0.0, 0.5)]);
        let pairs: FxHashSet<(i32, i32)> = [(1, 2)].into_iter().collect();
        assert!(narrow_phase_filter(&pairs, &spheres).is_empty());
    }

    #[test]
    fn narrow_phase_result_is_subset_of_broad_phase() {
        let mut spheres = FxHashMap::default();
        for id in 1..=4 {
            let _ = spheres.insert(
                id,
                vec![Vec4::new(id as f32 * 0.4, 0.0, 0.0, 0.3)],
            );
        }
        let pairs: FxHashSet<(i32, i32)> =
            [(1, 2), (1, 3), (2, 3), (3, 4)].into_iter().collect();
        let kept = narrow_phase_filter(&pairs, &spheres);
        assert!(kept.is_subset(&pairs));
    }

    #[test]
    fn border_test_flags_escaped_instances() {
        let mut registry = InstanceRegistry::new();
        let prop = static_model();
        let inside = registry.add(&prop, Vec3::ZERO);
        let outside = registry.add(&prop, Vec3::new(500.0, 0.0, 0.0));
        for instance in registry.iter_mut() {
            instance.update_bounding_box();
        }
        let bounds = Aabb::from_pos_size(Vec3::splat(-100.0), Vec3::splat(200.0));
        let escaped = out_of_bounds_instances(&registry, &bounds);
        assert!(!escaped.contains(&inside));
        assert!(escaped.contains(&outside));
    }
}
