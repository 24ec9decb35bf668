//! Host-facing command surface: model/instance/camera/behavior lifecycle,
//! config load and save, and the simulation toggles.

use std::path::Path;
use std::sync::Arc;

use glam::Vec3;
use rand::Rng;

use super::{Engine, ModelGpu};
use crate::anim::ModelAnimBuffers;
use crate::behavior::{BehaviorGraph, NodeEvent};
use crate::camera::Camera;
use crate::config::{
    BehaviorConfig, CollisionCheckMode, Config, InstanceConfig, LevelConfig,
    ModelConfig,
};
use crate::error::EngineError;
use crate::gpu::TypedBuffer;
use crate::instance::Instance;
use crate::level::Level;
use crate::model::Model;
use crate::renderer::{MeshDrawData, SceneryMesh};
use crate::spatial::{
    TriangleOctree, DEFAULT_OCTREE_MAX_DEPTH, DEFAULT_OCTREE_THRESHOLD,
};

impl Engine {
    // ---- models ---------------------------------------------------------

    /// Register a model and create its GPU resources.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AssetInvariant`] when a model of the same
    /// name already exists.
    pub fn add_model(&mut self, model: Model) -> Result<(), EngineError> {
        if self.models.contains_key(&model.name) {
            return Err(EngineError::AssetInvariant(format!(
                "model '{}' already registered",
                model.name
            )));
        }
        let device = &self.context.device;
        let queue = &self.context.queue;
        let storage = wgpu::BufferUsages::STORAGE;

        let anim = ModelAnimBuffers::new(device, &model);
        let (meshes, scenery_meshes) = if model.has_animations() {
            let meshes = model
                .meshes
                .iter()
                .map(|mesh| {
                    MeshDrawData::new(
                        device,
                        queue,
                        mesh,
                        model.bone_count(),
                        &self.skinned_renderer,
                    )
                })
                .collect();
            (meshes, Vec::new())
        } else {
            let scenery = model
                .meshes
                .iter()
                .map(|mesh| {
                    SceneryMesh::from_skinned_mesh(
                        device,
                        queue,
                        mesh,
                        &self.scenery_renderer,
                    )
                })
                .collect();
            (Vec::new(), scenery)
        };

        let gpu = ModelGpu {
            anim,
            meshes,
            scenery_meshes,
            flags: TypedBuffer::new(
                device,
                &format!("{} Instance Flags", model.name),
                storage,
            ),
            static_world: TypedBuffer::new(
                device,
                &format!("{} Static World", model.name),
                storage,
            ),
            frame_binds: Vec::new(),
            scenery_bind: None,
        };

        log::info!(
            "model '{}': {} meshes, {} bones, {} clips",
            model.name,
            model.meshes.len(),
            model.bone_count(),
            model.clip_count()
        );
        let _ = self.model_gpu.insert(model.name.clone(), gpu);
        let _ = self.models.insert(model.name.clone(), Arc::new(model));
        self.set_dirty();
        Ok(())
    }

    /// Look up a registered model.
    #[must_use]
    pub fn model(&self, name: &str) -> Option<&Arc<Model>> {
        self.models.get(name)
    }

    /// Registered model names, sorted.
    #[must_use]
    pub fn model_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.keys().cloned().collect();
        names.sort();
        names
    }

    /// Remove a model and every instance of it.
    pub fn delete_model(&mut self, name: &str) {
        let ids: Vec<i32> = self.registry.model_ids(name).to_vec();
        // Highest ids first so each deletion only shifts ids we have
        // already handled.
        for id in ids.into_iter().rev() {
            let _ = self.delete_instance(id);
        }
        let _ = self.models.remove(name);
        let _ = self.model_gpu.remove(name);
        self.selected_instance = 0;
        self.set_dirty();
    }

    // ---- instances ------------------------------------------------------

    /// Place a new instance of a model. Returns its global id, or `None`
    /// for unknown models.
    pub fn add_instance(&mut self, model_name: &str, position: Vec3) -> Option<i32> {
        let model = self.models.get(model_name)?;
        let id = self.registry.add(model, position);
        if let Some(instance) = self.registry.get_mut(id) {
            instance.update_bounding_box();
        }
        self.set_dirty();
        Some(id)
    }

    /// Clone an instance with its full state.
    pub fn clone_instance(&mut self, id: i32) -> Option<i32> {
        let new_id = self.registry.clone_instance(id)?;
        // The clone inherits the source's behavior graph.
        if let Some(name) = self.behavior.attached(id).map(str::to_owned) {
            let _ = self.behavior.attach(new_id, &name);
        }
        self.set_dirty();
        Some(new_id)
    }

    /// Clone an instance several times, scattering the copies.
    pub fn clone_instance_many(&mut self, id: i32, count: usize) -> Vec<i32> {
        let behavior = self.behavior.attached(id).map(str::to_owned);
        let ids = self.registry.clone_instance_many(id, count);
        if let Some(name) = behavior {
            for &new_id in &ids {
                let _ = self.behavior.attach(new_id, &name);
            }
        }
        if !ids.is_empty() {
            self.set_dirty();
        }
        ids
    }

    /// Delete an instance, compacting ids and re-keying everything that
    /// referenced the shifted ones.
    pub fn delete_instance(&mut self, id: i32) -> bool {
        let deleted = self.registry.delete(id);
        if deleted {
            self.behavior.handle_instance_removed(id);
            for instance in self.registry.iter_mut() {
                if instance.path_target_instance == id {
                    instance.stop_navigation();
                } else if instance.path_target_instance > id {
                    instance.path_target_instance -= 1;
                }
            }
            if self.selected_instance == id {
                self.selected_instance = 0;
            } else if self.selected_instance > id {
                self.selected_instance -= 1;
            }
            self.set_dirty();
        }
        deleted
    }

    /// Delete all instances.
    pub fn remove_all_instances(&mut self) {
        self.registry.remove_all();
        self.behavior.retain_instances(|_| false);
        self.selected_instance = 0;
        self.set_dirty();
    }

    /// The currently selected instance id (0 = none).
    #[must_use]
    pub fn selected_instance(&self) -> i32 {
        self.selected_instance
    }

    /// Select an instance programmatically.
    pub fn select_instance(&mut self, id: i32) {
        self.selected_instance = if self.registry.get(id).is_some() { id } else { 0 };
    }

    // ---- levels ---------------------------------------------------------

    /// Add a level and regenerate the triangle octree, the ground graph,
    /// and the level draw buffers.
    pub fn add_level(&mut self, level: Level) {
        self.levels.push(level);
        self.regenerate_level_data();
        self.set_dirty();
    }

    /// Remove all levels.
    pub fn clear_levels(&mut self) {
        self.levels.clear();
        self.regenerate_level_data();
        self.set_dirty();
    }

    /// Rebuild the triangle octree and navigation graph from the current
    /// levels; called after level edits and world-bound changes.
    pub fn regenerate_level_data(&mut self) {
        self.triangle_octree = TriangleOctree::new(
            self.config.world_bounds(),
            DEFAULT_OCTREE_THRESHOLD,
            DEFAULT_OCTREE_MAX_DEPTH,
        );
        let mut next_index = 0;
        for level in &self.levels {
            let triangles = level.triangles(next_index);
            log::info!(
                "level '{}': {} collision triangles",
                level.name,
                triangles.len()
            );
            for tri in triangles {
                next_index = next_index.max(tri.index + 1);
                self.triangle_octree.add(tri);
            }
        }
        self.path_finder.generate_ground_triangles(
            &self.triangle_octree,
            self.config.max_slope_angle,
        );

        let device = &self.context.device;
        let queue = &self.context.queue;
        self.level_meshes = self
            .levels
            .iter()
            .flat_map(|level| {
                SceneryMesh::from_level(device, queue, level, &self.scenery_renderer)
            })
            .collect();
        let world_matrices: Vec<glam::Mat4> = self
            .levels
            .iter()
            .flat_map(|level| {
                std::iter::repeat_n(level.world_matrix(), level.meshes.len())
            })
            .collect();
        let flags = vec![glam::Vec4::new(0.0, 0.0, 0.0, -1.0); world_matrices.len().max(1)];
        let _ = self.level_world.write(device, queue, &world_matrices);
        let _ = self.level_flags.write(device, queue, &flags);
        self.level_bind = Some(self.scenery_renderer.create_frame_bind_group(
            device,
            self.level_world.buffer(),
            self.level_flags.buffer(),
        ));
    }

    // ---- behaviors ------------------------------------------------------

    /// Register a behavior graph.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::GraphIntegrity`] when validation fails.
    pub fn add_behavior(
        &mut self,
        name: &str,
        graph: BehaviorGraph,
    ) -> Result<(), EngineError> {
        self.behavior.add_behavior(name, graph)?;
        self.set_dirty();
        Ok(())
    }

    /// Delete a behavior, detaching it everywhere.
    pub fn delete_behavior(&mut self, name: &str) {
        self.behavior.remove_behavior(name);
        for instance in self.registry.iter_mut() {
            if instance.node_tree_name == name {
                instance.node_tree_name.clear();
            }
        }
        self.set_dirty();
    }

    /// Attach a behavior to one instance.
    pub fn set_instance_behavior(&mut self, id: i32, name: &str) -> bool {
        if !self.behavior.attach(id, name) {
            return false;
        }
        if let Some(instance) = self.registry.get_mut(id) {
            instance.node_tree_name = name.to_owned();
        }
        self.set_dirty();
        true
    }

    /// Attach a behavior to every instance of a model.
    pub fn add_model_behavior(&mut self, model_name: &str, behavior_name: &str) {
        let ids: Vec<i32> = self.registry.model_ids(model_name).to_vec();
        for id in ids {
            let _ = self.set_instance_behavior(id, behavior_name);
        }
    }

    /// Inject a node event from the host (UI button, script).
    pub fn post_node_event(&mut self, instance_id: i32, event: NodeEvent) {
        self.behavior.post_event(instance_id, event);
    }

    // ---- cameras --------------------------------------------------------

    /// Add a camera and select it.
    pub fn add_camera(&mut self, camera: Camera) {
        self.config.cameras.push(camera);
        self.config.selected_camera = self.config.cameras.len() - 1;
        self.set_dirty();
    }

    /// Mutable access to the selected camera.
    pub fn active_camera_mut(&mut self) -> Option<&mut Camera> {
        self.dirty = true;
        self.config.cameras.get_mut(self.config.selected_camera)
    }

    /// Select a camera by index.
    pub fn select_camera(&mut self, index: usize) {
        if index < self.config.cameras.len() {
            self.config.selected_camera = index;
        }
    }

    // ---- toggles --------------------------------------------------------

    /// Set the instance collision checking mode.
    pub fn set_collision_mode(&mut self, mode: CollisionCheckMode) {
        self.config.collision_checks = mode;
        self.set_dirty();
    }

    /// Enable or disable instance interaction.
    pub fn set_interaction_enabled(&mut self, enabled: bool) {
        self.config.interaction_enabled = enabled;
        self.set_dirty();
    }

    /// Enable or disable foot IK.
    pub fn set_ik_enabled(&mut self, enabled: bool) {
        self.config.ik_enabled = enabled;
        self.set_dirty();
    }

    /// Set the FABRIK iteration budget.
    pub fn set_ik_iterations(&mut self, iterations: usize) {
        self.config.ik_iterations = iterations.max(1);
        self.fabrik.set_iterations(self.config.ik_iterations);
        self.set_dirty();
    }

    /// Enable or disable navigation.
    pub fn set_navigation_enabled(&mut self, enabled: bool) {
        self.config.navigation_enabled = enabled;
        self.set_dirty();
    }

    /// Enable or disable gravity.
    pub fn set_gravity_enabled(&mut self, enabled: bool) {
        self.config.gravity_enabled = enabled;
        self.set_dirty();
    }

    /// Enable navigation of `instance` toward `target`.
    pub fn set_nav_target(&mut self, instance: i32, target: i32) {
        if self.registry.get(target).is_none() {
            return;
        }
        if let Some(inst) = self.registry.get_mut(instance) {
            inst.nav_enabled = true;
            inst.path_target_instance = target;
            inst.path_start_tri = -1;
            inst.path_target_tri = -1;
        }
    }

    /// Pick a random navigation target among instances of nav-target
    /// models, excluding `instance` itself.
    pub(crate) fn assign_random_nav_target(&mut self, instance: i32) {
        let candidates: Vec<i32> = self
            .registry
            .iter()
            .filter(|i| {
                i.index_position != instance && i.model().settings.is_nav_target
            })
            .map(|i| i.index_position)
            .collect();
        if candidates.is_empty() {
            return;
        }
        let pick = candidates[self.rng.random_range(0..candidates.len())];
        self.set_nav_target(instance, pick);
    }

    // ---- mouse pick -----------------------------------------------------

    /// Request a mouse pick at pixel coordinates; resolved after the next
    /// rendered frame (synchronously in edit mode).
    pub fn request_mouse_pick(&mut self, x: u32, y: u32) {
        self.pending_pick = Some((x, y));
    }

    // ---- config ---------------------------------------------------------

    /// Capture the current world into a config.
    #[must_use]
    pub fn snapshot_config(&self) -> Config {
        let mut config = self.config.clone();
        config.levels = self
            .levels
            .iter()
            .map(|level| LevelConfig {
                name: level.name.clone(),
                file_path: String::new(),
                position: level.position,
                rotation: level.rotation,
                scale: level.scale,
                swap_yz: level.swap_yz,
            })
            .collect();
        config.models = self
            .model_names()
            .into_iter()
            .filter_map(|name| {
                self.models.get(&name).map(|model| ModelConfig {
                    name: name.clone(),
                    file_path: String::new(),
                    settings: model.settings.clone(),
                })
            })
            .collect();
        config.behaviors = self
            .behavior
            .behavior_names()
            .into_iter()
            .filter_map(|name| {
                self.behavior.template(&name).map(|graph| BehaviorConfig {
                    name: name.clone(),
                    graph: graph.clone(),
                })
            })
            .collect();
        config.instances = self
            .registry
            .iter()
            .map(|instance| InstanceConfig {
                model_name: instance.model().name.clone(),
                position: instance.position,
                rotation: instance.rotation,
                scale: instance.scale,
                first_clip: instance.first_clip,
                second_clip: instance.second_clip,
                blend_factor: instance.blend_factor,
                speed_factor: instance.speed_factor,
                node_tree_name: instance.node_tree_name.clone(),
            })
            .collect();
        config.selected_instance = self.selected_instance;
        config
    }

    /// Save the current world to a config file.
    ///
    /// # Errors
    ///
    /// Propagates file and serialization errors; the engine state is
    /// untouched either way.
    pub fn save_config(&mut self, path: &Path) -> Result<(), EngineError> {
        self.snapshot_config().save(path)?;
        self.clear_dirty();
        Ok(())
    }

    /// Apply a loaded config. Models referenced by instances must already
    /// be registered (the host imports model files); unknown references
    /// are skipped with a log entry.
    pub fn apply_config(&mut self, config: Config) {
        self.registry.remove_all();
        self.behavior.retain_instances(|_| false);

        for behavior in &config.behaviors {
            if let Err(e) = self.behavior.add_behavior(&behavior.name, behavior.graph.clone())
            {
                log::warn!("behavior '{}' rejected: {e}", behavior.name);
            }
        }

        for entry in &config.instances {
            let Some(model) = self.models.get(&entry.model_name) else {
                log::warn!(
                    "instance references unknown model '{}', skipped",
                    entry.model_name
                );
                continue;
            };
            let mut instance = Instance::new(Arc::clone(model));
            instance.position = entry.position;
            instance.rotation = entry.rotation;
            instance.scale = entry.scale;
            instance.first_clip = entry.first_clip;
            instance.second_clip = entry.second_clip;
            instance.blend_factor = entry.blend_factor;
            instance.speed_factor = entry.speed_factor;
            instance.node_tree_name = entry.node_tree_name.clone();
            instance.update_bounding_box();
            let id = self.registry.add(model, entry.position);
            if let Some(slot) = self.registry.get_mut(id) {
                let index = slot.index_position;
                let per_model = slot.per_model_index;
                *slot = instance;
                slot.index_position = index;
                slot.per_model_index = per_model;
            }
            if !entry.node_tree_name.is_empty() {
                let _ = self.behavior.attach(id, &entry.node_tree_name);
            }
        }

        self.selected_instance = config.selected_instance;
        self.fabrik.set_iterations(config.ik_iterations.max(1));
        self.config = config;
        self.regenerate_level_data();
        self.clear_dirty();
    }

    /// Load and apply a config file, keeping the previous state on any
    /// error.
    ///
    /// # Errors
    ///
    /// Returns the load error; the engine keeps its previous-known-good
    /// state.
    pub fn load_config(&mut self, path: &Path) -> Result<(), EngineError> {
        let config = Config::load(path).map_err(|e| {
            log::error!("config load failed, keeping current state: {e}");
            e
        })?;
        self.apply_config(config);
        Ok(())
    }
}
