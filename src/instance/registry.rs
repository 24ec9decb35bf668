//! Instance storage with the global/per-model index invariants.
//!
//! The registry keeps a dense global list whose index 0 is a permanent null
//! sentinel, so instance id 0 always means "no instance" (the mouse-pick
//! background, unset follow targets). After every structural change the
//! indices are reassigned so `global[i].index_position == i` and the
//! per-model view stays consistent with the global one.

use std::sync::Arc;

use glam::Vec3;
use rustc_hash::FxHashMap;

use super::Instance;
use crate::model::Model;

/// Owner of all instances.
pub struct InstanceRegistry {
    /// Dense global list; slot 0 is always `None`.
    instances: Vec<Option<Instance>>,
    /// Model name to ordered global ids.
    per_model: FxHashMap<String, Vec<i32>>,
    /// Bumped on every structural change; weak references (camera follow
    /// targets) pair an id with the generation they captured it in.
    generation: u64,
}

impl Default for InstanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceRegistry {
    /// Empty registry containing only the null sentinel.
    #[must_use]
    pub fn new() -> Self {
        Self {
            instances: vec![None],
            per_model: FxHashMap::default(),
            generation: 0,
        }
    }

    /// Structural-change generation; a stored `(id, generation)` pair is
    /// only valid while the generation still matches.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of non-null instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len() - 1
    }

    /// True when only the sentinel exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total slot count including the sentinel; valid ids are
    /// `1..slot_count`.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.instances.len()
    }

    /// Instance by global id; `None` for the sentinel or out-of-range ids.
    #[must_use]
    pub fn get(&self, id: i32) -> Option<&Instance> {
        usize::try_from(id)
            .ok()
            .and_then(|i| self.instances.get(i))
            .and_then(Option::as_ref)
    }

    /// Mutable instance by global id.
    pub fn get_mut(&mut self, id: i32) -> Option<&mut Instance> {
        usize::try_from(id)
            .ok()
            .and_then(|i| self.instances.get_mut(i))
            .and_then(Option::as_mut)
    }

    /// Iterate over all non-null instances.
    pub fn iter(&self) -> impl Iterator<Item = &Instance> {
        self.instances.iter().filter_map(Option::as_ref)
    }

    /// Iterate mutably over all non-null instances.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Instance> {
        self.instances.iter_mut().filter_map(Option::as_mut)
    }

    /// Global ids of all non-null instances.
    #[must_use]
    pub fn ids(&self) -> Vec<i32> {
        self.iter().map(|i| i.index_position).collect()
    }

    /// Ordered global ids of one model's instances.
    #[must_use]
    pub fn model_ids(&self, model_name: &str) -> &[i32] {
        self.per_model
            .get(model_name)
            .map_or(&[], Vec::as_slice)
    }

    /// Names of models that currently have instances, sorted.
    #[must_use]
    pub fn model_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .per_model
            .iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Add a new instance of `model` at `position`, returning its id.
    pub fn add(&mut self, model: &Arc<Model>, position: Vec3) -> i32 {
        let mut instance = Instance::new(Arc::clone(model));
        instance.position = position;
        self.insert(instance)
    }

    /// Clone an existing instance, including its transform and animation
    /// state. Returns `None` for an unknown source id.
    pub fn clone_instance(&mut self, id: i32) -> Option<i32> {
        let source = self.get(id)?.clone();
        Some(self.insert(source))
    }

    /// Clone an instance `count` times, scattering the copies around the
    /// source on the XZ plane.
    pub fn clone_instance_many(&mut self, id: i32, count: usize) -> Vec<i32> {
        let Some(source) = self.get(id).cloned() else {
            return Vec::new();
        };
        let mut ids = Vec::with_capacity(count);
        for n in 0..count {
            let mut copy = source.clone();
            // Deterministic ring placement; hosts reposition as needed.
            let angle = n as f32 * 0.618_034 * std::f32::consts::TAU;
            let radius = 1.0 + n as f32 * 0.25;
            copy.position += Vec3::new(angle.cos(), 0.0, angle.sin()) * radius;
            ids.push(self.insert(copy));
        }
        ids
    }

    /// Delete an instance. Returns `false` for unknown ids or the sentinel.
    pub fn delete(&mut self, id: i32) -> bool {
        let Ok(index) = usize::try_from(id) else {
            return false;
        };
        if index == 0 || index >= self.instances.len() {
            return false;
        }
        let _ = self.instances.remove(index);
        self.reindex();
        true
    }

    /// Delete every instance, keeping the sentinel.
    pub fn remove_all(&mut self) {
        self.instances.truncate(1);
        self.per_model.clear();
        self.generation += 1;
    }

    fn insert(&mut self, instance: Instance) -> i32 {
        self.instances.push(Some(instance));
        self.reindex();
        self.instances.len() as i32 - 1
    }

    /// Reassign global and per-model index positions after a structural
    /// change.
    fn reindex(&mut self) {
        self.generation += 1;
        self.per_model.clear();
        for slot in 1..self.instances.len() {
            let global = slot as i32;
            if let Some(instance) = self.instances[slot].as_mut() {
                instance.index_position = global;
                let ids = self
                    .per_model
                    .entry(instance.model().name.clone())
                    .or_default();
                instance.per_model_index = ids.len() as i32;
                ids.push(global);
            }
        }
    }

    /// Check the index invariants; used by tests and debug assertions.
    #[must_use]
    pub fn check_integrity(&self) -> bool {
        if !self.instances.is_empty() && self.instances[0].is_some() {
            return false;
        }
        for (slot, entry) in self.instances.iter().enumerate() {
            let Some(instance) = entry else { continue };
            if instance.index_position != slot as i32 {
                return false;
            }
            let ids = self.model_ids(&instance.model().name);
            let per_model = instance.per_model_index;
            if usize::try_from(per_model)
                .ok()
                .and_then(|i| ids.get(i))
                .copied()
                != Some(instance.index_position)
            {
                return false;
            }
        }
        let per_model_total: usize = self.per_model.values().map(Vec::len).sum();
        per_model_total == self.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelSettings;

    fn model(name: &str) -> Arc<Model> {
        Arc::new(
            Model::new(
                name.to_owned(),
                vec![crate::model::SkinnedMesh::default()],
                None,
                Vec::new(),
                ModelSettings::default(),
            )
            .unwrap(),
        )
    }

    #[test]
    fn sentinel_occupies_slot_zero() {
        let registry = InstanceRegistry::new();
        assert_eq!(registry.slot_count(), 1);
        assert!(registry.get(0).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn add_assigns_sequential_ids() {
        let mut registry = InstanceRegistry::new();
        let bot = model("bot");
        let a = registry.add(&bot, Vec3::ZERO);
        let b = registry.add(&bot, Vec3::ONE);
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert!(registry.check_integrity());
    }

    #[test]
    fn delete_reassigns_indices() {
        let mut registry = InstanceRegistry::new();
        let bot = model("bot");
        let prop = model("prop");
        let _a = registry.add(&bot, Vec3::ZERO);
        let b = registry.add(&prop, Vec3::ONE);
        let _c = registry.add(&bot, Vec3::ONE * 2.0);
        assert!(registry.delete(b));
        assert_eq!(registry.len(), 2);
        assert!(registry.check_integrity());
        // The instance formerly at id 3 moved down to id 2.
        assert_eq!(registry.get(2).map(|i| i.model().name.as_str()), Some("bot"));
        assert_eq!(registry.model_ids("prop"), &[0i32; 0]);
    }

    #[test]
    fn per_model_view_matches_global_view() {
        let mut registry = InstanceRegistry::new();
        let bot = model("bot");
        let prop = model("prop");
        for n in 0..5 {
            let _ = registry.add(if n % 2 == 0 { &bot } else { &prop }, Vec3::ZERO);
        }
        for name in ["bot", "prop"] {
            for (per_model, &global) in registry.model_ids(name).iter().enumerate() {
                let instance = registry.get(global).unwrap();
                assert_eq!(instance.per_model_index, per_model as i32);
                assert_eq!(instance.model().name, name);
            }
        }
        assert!(registry.check_integrity());
    }

    #[test]
    fn clone_copies_state() {
        let mut registry = InstanceRegistry::new();
        let bot = model("bot");
        let a = registry.add(&bot, Vec3::new(1.0, 2.0, 3.0));
        registry.get_mut(a).unwrap().blend_factor = 0.5;
        let b = registry.clone_instance(a).unwrap();
        let cloned = registry.get(b).unwrap();
        assert_eq!(cloned.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(cloned.blend_factor, 0.5);
        assert!(registry.check_integrity());
    }

    #[test]
    fn clone_many_scatters_copies() {
        let mut registry = InstanceRegistry::new();
        let bot = model("bot");
        let a = registry.add(&bot, Vec3::ZERO);
        let ids = registry.clone_instance_many(a, 10);
        assert_eq!(ids.len(), 10);
        assert_eq!(registry.len(), 11);
        assert!(registry.check_integrity());
    }

    #[test]
    fn remove_all_keeps_sentinel() {
        let mut registry = InstanceRegistry::new();
        let bot = model("bot");
        let _ = registry.add(&bot, Vec3::ZERO);
        registry.remove_all();
        assert_eq!(registry.slot_count(), 1);
        assert!(registry.model_ids("bot").is_empty());
        assert!(registry.check_integrity());
    }

    #[test]
    fn deleting_sentinel_is_refused() {
        let mut registry = InstanceRegistry::new();
        assert!(!registry.delete(0));
        assert!(!registry.delete(-1));
        assert!(!registry.delete(99));
    }
}
