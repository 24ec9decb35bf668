//! Per-frame orchestration: simulation update, compute dispatch, IK, and
//! rendering.

use glam::{Mat4, Vec3, Vec4};
use rustc_hash::{FxHashMap, FxHashSet};

use super::Engine;
use crate::anim::PerInstanceAnimData;
use crate::behavior::{InstanceUpdate, NodeEvent};
use crate::collision::{
    classify_and_find_ground, narrow_phase_filter, out_of_bounds_instances,
    split_static_pairs, update_ground_and_gravity, LevelCollisionSettings,
};
use crate::config::CollisionCheckMode;
use crate::ik::{
    aligning_local_rotation, chain_world_positions, extract_global_position,
    extract_global_rotation,
};
use crate::instance::FaceAnim;
use crate::nav::follower;
use crate::renderer::SceneUniform;
use crate::spatial::{
    Octree, DEFAULT_OCTREE_MAX_DEPTH, DEFAULT_OCTREE_THRESHOLD,
};

impl Engine {
    fn level_settings(&self) -> LevelCollisionSettings {
        LevelCollisionSettings {
            max_slope_angle_deg: self.config.max_slope_angle,
            max_stair_height: self.config.max_stair_height,
            gravity_enabled: self.config.gravity_enabled,
            ..LevelCollisionSettings::default()
        }
    }

    /// Advance the simulation by `delta` seconds: instance integration,
    /// level coupling, animation compute, IK, collision resolution,
    /// navigation, and the behavior tick.
    pub fn update(&mut self, delta: f32) {
        // Resolve last frame's mouse pick, if one is still in flight.
        if let Some(id) = self.picking.complete_readback(&self.context.device) {
            self.select_instance(id);
        }

        // Camera follow (weak reference, validated per frame).
        let selected_camera = self.config.selected_camera;
        if let Some(camera) = self.config.cameras.get_mut(selected_camera) {
            camera.update_follow(&self.registry);
        }

        self.integrate_instances(delta);
        self.upload_and_dispatch_animation();
        if self.config.ik_enabled {
            self.run_foot_ik();
        }
        self.resolve_instance_collisions();
        self.emit_border_events();
        self.tick_navigation(delta);
        self.tick_behaviors(delta);
    }

    /// Steps 6 of the frame: per-instance integration, ground and gravity,
    /// wall events, neighbor triangles, octree insertion.
    fn integrate_instances(&mut self, delta: f32) {
        let settings = self.level_settings();
        self.instance_octree = Octree::new(
            self.config.world_bounds(),
            DEFAULT_OCTREE_THRESHOLD,
            DEFAULT_OCTREE_MAX_DEPTH,
        );

        let ids = self.registry.ids();
        let mut wall_hits = Vec::new();
        for id in ids {
            let Some(instance) = self.registry.get_mut(id) else {
                continue;
            };
            instance.update_animation(delta);
            instance.update_bounding_box();

            update_ground_and_gravity(
                instance,
                &self.triangle_octree,
                &settings,
                delta,
            );
            instance.update_speed(delta);
            instance.update_position(delta);
            instance.update_bounding_box();

            if classify_and_find_ground(instance, &settings) {
                wall_hits.push(id);
            }

            instance.neighbor_ground_triangles = if instance.ground_triangle > -1 {
                self.path_finder
                    .neighbors(instance.ground_triangle as u32)
                    .to_vec()
            } else {
                Vec::new()
            };

            self.instance_octree.add(id, instance.bounding_box);
        }

        for id in wall_hits {
            self.behavior
                .post_event(id, NodeEvent::InstanceToLevelCollision);
        }
    }

    /// Pack one instance's animation record, mapping the signed head-look
    /// values onto the direction clips.
    fn pack_anim_data(instance: &crate::instance::Instance) -> PerInstanceAnimData {
        let model = instance.model();
        let settings = &model.settings;
        let max_duration = model.max_clip_duration;

        let (mut lr_clip, mut lr_time) = (-1, 0.0);
        if settings.has_head_move_clips() {
            let direction = if instance.head_left_right < 0.0 {
                crate::model::HeadMoveDirection::Left
            } else {
                crate::model::HeadMoveDirection::Right
            };
            if let Some(clip) = settings.head_move_clip(direction) {
                lr_clip = clip as i32;
                lr_time = instance.head_left_right.abs() * max_duration;
            }
        }
        let (mut ud_clip, mut ud_time) = (-1, 0.0);
        if settings.has_head_move_clips() {
            let direction = if instance.head_up_down < 0.0 {
                crate::model::HeadMoveDirection::Down
            } else {
                crate::model::HeadMoveDirection::Up
            };
            if let Some(clip) = settings.head_move_clip(direction) {
                ud_clip = clip as i32;
                ud_time = instance.head_up_down.abs() * max_duration;
            }
        }

        PerInstanceAnimData {
            first_clip: instance.first_clip as u32,
            second_clip: instance.second_clip as u32,
            head_left_right_clip: lr_clip,
            head_up_down_clip: ud_clip,
            first_playhead: instance.first_playhead,
            second_playhead: instance.second_playhead,
            blend_factor: instance.blend_factor,
            head_left_right_time: lr_time,
            head_up_down_time: ud_time,
            _pad: [0.0; 3],
        }
    }

    fn instance_flags(&self, instance: &crate::instance::Instance) -> Vec4 {
        let selected = if instance.index_position == self.selected_instance {
            1.0
        } else {
            0.0
        };
        let (weight, target) = match instance.face_anim {
            FaceAnim::None => (0.0, -1.0),
            anim => (
                instance.face_anim_weight,
                anim.morph_index().map_or(-1.0, |i| i as f32),
            ),
        };
        Vec4::new(instance.index_position as f32, selected, weight, target)
    }

    /// Steps 3-4: pack per-instance data, upload, dispatch transform and
    /// matrix stages for every animated model, and refresh static-model
    /// buffers.
    fn upload_and_dispatch_animation(&mut self) {
        let names = self.registry.model_names();
        let mut encoder = self.context.create_encoder();

        for name in names {
            let ids: Vec<i32> = self.registry.model_ids(&name).to_vec();
            if ids.is_empty() {
                continue;
            }
            let instances: Vec<&crate::instance::Instance> =
                ids.iter().filter_map(|&id| self.registry.get(id)).collect();
            let world: Vec<Mat4> =
                instances.iter().map(|i| i.world_matrix()).collect();
            let flags: Vec<Vec4> =
                instances.iter().map(|i| self.instance_flags(i)).collect();
            let animated = instances
                .first()
                .is_some_and(|i| i.model().has_animations());
            let head_move = instances
                .first()
                .is_some_and(|i| i.model().settings.has_head_move_clips());
            let anim_data: Vec<PerInstanceAnimData> = if animated {
                instances.iter().map(|i| Self::pack_anim_data(i)).collect()
            } else {
                Vec::new()
            };
            drop(instances);

            let Some(gpu) = self.model_gpu.get_mut(&name) else {
                continue;
            };
            let device = &self.context.device;
            let queue = &self.context.queue;
            let mut resized = gpu.flags.write(device, queue, &flags);

            if let Some(anim) = gpu.anim.as_mut() {
                resized |= anim.upload_frame(
                    &self.context,
                    &self.anim_pipeline,
                    &anim_data,
                    &world,
                );
                if resized || gpu.frame_binds.is_empty() {
                    gpu.frame_binds = self.skinned_renderer.create_frame_bind_groups(
                        device,
                        anim.bone_matrix_buffer(),
                        anim.world_matrix_buffer(),
                        gpu.flags.buffer(),
                        &gpu.meshes,
                    );
                }
                self.anim_pipeline
                    .dispatch_transform(&mut encoder, anim, head_move);
                self.anim_pipeline.dispatch_matrix(&mut encoder, anim, false);
            } else {
                resized |= gpu.static_world.write(device, queue, &world);
                if resized || gpu.scenery_bind.is_none() {
                    gpu.scenery_bind =
                        Some(self.scenery_renderer.create_frame_bind_group(
                            device,
                            gpu.static_world.buffer(),
                            gpu.flags.buffer(),
                        ));
                }
            }
        }

        self.context.submit(encoder);
    }

    /// Step 5: foot IK. Downloads the composed bone matrices, solves each
    /// configured chain with FABRIK against the ground under the foot, and
    /// folds the corrected rotations back into the TRS buffer, re-running
    /// the matrix stage after each chain joint like the reference solver.
    fn run_foot_ik(&mut self) {
        self.ik_debug_points.clear();
        let names = self.registry.model_names();
        for name in names {
            let Some(model) = self.models.get(&name).cloned() else {
                continue;
            };
            let Some(skeleton) = model.skeleton.as_ref() else {
                continue;
            };
            if model.settings.foot_ik_chains.is_empty() {
                continue;
            }
            let ids: Vec<i32> = self.registry.model_ids(&name).to_vec();
            if ids.is_empty() {
                continue;
            }
            let Some(gpu) = self.model_gpu.get_mut(&name) else {
                continue;
            };
            let Some(anim) = gpu.anim.as_mut() else {
                continue;
            };

            let bone_count = skeleton.bone_count();
            let inv_offsets = &skeleton.inverse_offset_matrices;
            let mut bone_matrices = anim.download_bone_matrices(&self.context);
            let mut trs = anim.download_trs(&self.context);
            if bone_matrices.len() < ids.len() * bone_count
                || trs.len() < ids.len() * bone_count * 3
            {
                continue;
            }
            let worlds: Vec<Mat4> = ids
                .iter()
                .filter_map(|&id| self.registry.get(id))
                .map(|i| i.world_matrix())
                .collect();

            for chain in &model.settings.foot_ik_chains {
                let chain_len = chain.bones.len();
                if chain_len < 2 {
                    continue;
                }
                let Some(effector) = chain.effector() else {
                    continue;
                };

                // Solve every instance's chain against its ground hit.
                let mut solved: Vec<Vec<Vec3>> = Vec::with_capacity(ids.len());
                for (slot, &id) in ids.iter().enumerate() {
                    let Some(instance) = self.registry.get(id) else {
                        solved.push(Vec::new());
                        continue;
                    };
                    let world = worlds[slot];
                    let base = slot * bone_count;
                    let foot_pos = extract_global_position(
                        &(world * bone_matrices[base + effector] * inv_offsets[effector]),
                    );
                    let foot_above_ground =
                        (instance.position.y - foot_pos.y).abs();
                    let height = instance.bounding_box.size().y.max(f32::EPSILON);

                    // Ray down through the foot to find the plant point.
                    let mut hit_point = foot_pos;
                    for tri in &instance.colliding_triangles {
                        if let Some(hit) = crate::math::ray_triangle_intersection(
                            foot_pos + Vec3::new(0.0, height * 0.5, 0.0),
                            Vec3::new(0.0, -height, 0.0),
                            &tri.points,
                        ) {
                            hit_point =
                                hit + Vec3::new(0.0, foot_above_ground, 0.0);
                        }
                    }
                    self.ik_debug_points.push(hit_point);

                    let positions = chain_world_positions(
                        &world,
                        &bone_matrices[base..base + bone_count],
                        inv_offsets,
                        &chain.bones,
                    );
                    solved.push(self.fabrik.solve(&positions, hit_point));
                }

                // Rotate the original bones onto the solved positions,
                // starting at the chain target and re-running the matrix
                // stage after every joint.
                for index in (1..chain_len).rev() {
                    for (slot, _) in ids.iter().enumerate() {
                        if solved[slot].len() != chain_len {
                            continue;
                        }
                        let world = worlds[slot];
                        let base = slot * bone_count;
                        let node = chain.bones[index];
                        let next = chain.bones[index - 1];

                        let joint = world
                            * bone_matrices[base + node]
                            * inv_offsets[node];
                        let position = extract_global_position(&joint);
                        let next_position = extract_global_position(
                            &(world * bone_matrices[base + next] * inv_offsets[next]),
                        );
                        let to_next = next_position - position;
                        let to_desired =
                            solved[slot][index - 1] - solved[slot][index];
                        let local = aligning_local_rotation(
                            extract_global_rotation(&joint),
                            to_next,
                            to_desired,
                        );

                        let rot_index = (base + node) * 3 + 1;
                        let current = glam::Quat::from_xyzw(
                            trs[rot_index].x,
                            trs[rot_index].y,
                            trs[rot_index].z,
                            trs[rot_index].w,
                        );
                        let updated = (current * local).normalize();
                        trs[rot_index] =
                            Vec4::new(updated.x, updated.y, updated.z, updated.w);
                    }

                    anim.upload_trs(&self.context, &trs);
                    let mut encoder = self.context.create_encoder();
                    self.anim_pipeline.dispatch_matrix(&mut encoder, anim, false);
                    self.context.submit(encoder);
                    bone_matrices = anim.download_bone_matrices(&self.context);
                }
            }
        }
    }

    /// Step 7: broad phase, optional narrow phase, collision events, and
    /// navigation-target arrival.
    fn resolve_instance_collisions(&mut self) {
        if self.config.collision_checks == CollisionCheckMode::None {
            self.last_collisions.clear();
            return;
        }
        let pairs = self.instance_octree.find_all_intersections();
        let (animated, static_pairs) = split_static_pairs(&pairs, &self.registry);

        let mut collisions =
            if self.config.collision_checks == CollisionCheckMode::BoundingSpheres {
                let spheres = self.compute_bounding_spheres(&animated);
                narrow_phase_filter(&animated, &spheres)
            } else {
                animated
            };
        collisions.extend(static_pairs);

        for &(a, b) in &collisions {
            self.behavior
                .post_event(a, NodeEvent::InstanceToInstanceCollision);
            self.behavior
                .post_event(b, NodeEvent::InstanceToInstanceCollision);

            // Arriving at the navigation target ends the journey.
            for (walker, other) in [(a, b), (b, a)] {
                let reached = self
                    .registry
                    .get(walker)
                    .is_some_and(|i| i.nav_enabled && i.path_target_instance == other);
                if reached {
                    if let Some(instance) = self.registry.get_mut(walker) {
                        instance.stop_navigation();
                    }
                    self.behavior.post_event(walker, NodeEvent::NavTargetReached);
                }
            }
        }
        self.last_collisions = collisions;
    }

    /// Dispatch the bounding-sphere stage for every model involved in a
    /// broad-phase pair and read the spheres back per instance.
    fn compute_bounding_spheres(
        &mut self,
        pairs: &FxHashSet<(i32, i32)>,
    ) -> FxHashMap<i32, Vec<Vec4>> {
        let mut involved: FxHashMap<String, FxHashSet<i32>> = FxHashMap::default();
        for &(a, b) in pairs {
            for id in [a, b] {
                if let Some(instance) = self.registry.get(id) {
                    let _ = involved
                        .entry(instance.model().name.clone())
                        .or_default()
                        .insert(id);
                }
            }
        }

        let mut spheres_by_instance = FxHashMap::default();
        for (name, ids) in involved {
            let Some(gpu) = self.model_gpu.get(&name) else {
                continue;
            };
            let Some(anim) = gpu.anim.as_ref() else {
                continue;
            };
            // The sphere stage reads the skeleton-pose matrix buffer, so
            // the skinning matrices of this frame stay untouched.
            let mut encoder = self.context.create_encoder();
            self.anim_pipeline.dispatch_matrix(&mut encoder, anim, true);
            self.anim_pipeline.dispatch_spheres(&mut encoder, anim);
            self.context.submit(encoder);
            let all = anim.download_spheres(&self.context);

            let bone_count = anim.bone_count();
            for id in ids {
                let Some(instance) = self.registry.get(id) else {
                    continue;
                };
                let slot = instance.per_model_index as usize;
                let start = slot * bone_count;
                if all.len() >= start + bone_count {
                    let _ = spheres_by_instance
                        .insert(id, all[start..start + bone_count].to_vec());
                }
            }
        }
        spheres_by_instance
    }

    /// Step 8: world-border events.
    fn emit_border_events(&mut self) {
        let bounds = self.config.world_bounds();
        for id in out_of_bounds_instances(&self.registry, &bounds) {
            self.behavior
                .post_event(id, NodeEvent::InstanceToEdgeCollision);
        }
    }

    /// Step 9: per-instance path following.
    fn tick_navigation(&mut self, delta: f32) {
        if !self.config.navigation_enabled {
            return;
        }
        let ids = self.registry.ids();
        for id in ids {
            let Some(instance) = self.registry.get(id) else { continue };
            if !instance.nav_enabled || instance.path_target_instance < 0 {
                continue;
            }
            let target_id = instance.path_target_instance;
            let target = self.registry.get(target_id);
            let (target_tri, target_pos) = match target {
                Some(t) => (t.ground_triangle, t.position),
                None => {
                    if let Some(instance) = self.registry.get_mut(id) {
                        instance.stop_navigation();
                    }
                    continue;
                }
            };
            if let Some(instance) = self.registry.get_mut(id) {
                let _ = follower::tick(
                    &self.path_finder,
                    instance,
                    target_tri,
                    target_pos,
                    delta,
                );
            }
        }
    }

    /// Step 10: behavior tick and action routing back into instance state.
    fn tick_behaviors(&mut self, delta: f32) {
        let registry = &self.registry;
        self.behavior
            .retain_instances(|id| registry.get(id).is_some());
        let actions = self.behavior.tick(delta);
        for action in actions {
            if matches!(action.update, InstanceUpdate::RandomNavTarget) {
                self.assign_random_nav_target(action.instance_id);
                continue;
            }
            let Some(instance) = self.registry.get_mut(action.instance_id) else {
                continue;
            };
            match action.update {
                InstanceUpdate::MoveState(state) => {
                    instance.move_state = state;
                }
                InstanceUpdate::MoveDirection(direction) => {
                    instance.move_direction = direction;
                }
                InstanceUpdate::Rotation { degrees, relative } => {
                    if relative {
                        instance.rotation += degrees;
                    } else {
                        instance.rotation = degrees;
                    }
                }
                InstanceUpdate::Position(position) => {
                    instance.position = position;
                }
                InstanceUpdate::Speed(speed) => {
                    instance.forward_speed = speed.max(0.0);
                }
                InstanceUpdate::FaceAnim { anim, weight } => {
                    instance.face_anim = anim;
                    instance.face_anim_weight = weight.clamp(0.0, 1.0);
                }
                InstanceUpdate::HeadAnim {
                    left_right,
                    up_down,
                } => {
                    instance.head_left_right = left_right.clamp(-1.0, 1.0);
                    instance.head_up_down = up_down.clamp(-1.0, 1.0);
                }
                InstanceUpdate::RandomNavTarget => {}
            }
        }
    }

    /// Steps 11-13: draw the level, the instances, and the debug lines
    /// into `view`, then run the mouse-pick pass if one is pending.
    pub fn render(&mut self, view: &wgpu::TextureView) {
        // Scene uniform from the active camera.
        let aspect =
            self.context.config.width as f32 / self.context.config.height.max(1) as f32;
        if let Some(camera) = self.active_camera() {
            let uniform = SceneUniform {
                view_proj: camera.projection_matrix(aspect) * camera.view_matrix(),
                ..SceneUniform::default()
            };
            self.scene_binding.write(&self.context, &uniform);
        }

        let lines = self.build_debug_lines();
        self.line_renderer.upload(&self.context, &lines);

        let mut encoder = self.context.create_encoder();
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Main Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.25,
                            g: 0.25,
                            b: 0.25,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(
                    wgpu::RenderPassDepthStencilAttachment {
                        view: self.depth_view(),
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(1.0),
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    },
                ),
                ..Default::default()
            });

            self.draw_world(&mut pass, false);
            self.line_renderer.draw(&mut pass, &self.scene_binding);
        }

        // Mouse pick: re-render instance ids offscreen and read the pixel
        // under the cursor.
        let picked = self.pending_pick.take();
        if let Some((x, y)) = picked {
            {
                let mut pass = self.picking.begin_pass(&mut encoder);
                self.draw_world(&mut pass, true);
            }
            self.picking.copy_pixel(&mut encoder, x, y);
        }

        self.context.submit(encoder);

        if picked.is_some() {
            self.picking.start_readback();
            if self.edit_mode {
                // Synchronous pick in edit mode only; never on the view-mode
                // hot path.
                if let Some(id) =
                    self.picking.complete_readback_blocking(&self.context.device)
                {
                    self.select_instance(id);
                }
            }
        }
    }

    fn draw_world(&self, pass: &mut wgpu::RenderPass<'_>, picking: bool) {
        if let Some(level_bind) = self.level_bind.as_ref() {
            self.scenery_renderer.draw_level(
                pass,
                &self.scene_binding,
                level_bind,
                &self.level_meshes,
                picking,
            );
        }

        for name in self.registry.model_names() {
            let count = self.registry.model_ids(&name).len() as u32;
            let Some(gpu) = self.model_gpu.get(&name) else {
                continue;
            };
            if gpu.anim.is_some() {
                self.skinned_renderer.draw(
                    pass,
                    &self.scene_binding,
                    &gpu.frame_binds,
                    &gpu.meshes,
                    count,
                    picking,
                );
            } else if let Some(bind) = gpu.scenery_bind.as_ref() {
                self.scenery_renderer.draw(
                    pass,
                    &self.scene_binding,
                    bind,
                    &gpu.scenery_meshes,
                    count,
                    picking,
                );
            }
        }
    }

    /// Run one full frame against the swapchain.
    ///
    /// # Errors
    ///
    /// Returns [`wgpu::SurfaceError`] when the swapchain is out of date;
    /// the caller rebuilds it and skips the frame.
    pub fn frame(&mut self, delta: f32) -> Result<(), wgpu::SurfaceError> {
        self.update(delta);
        let frame = self.context.get_next_frame()?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.render(&view);
        frame.present();
        Ok(())
    }
}
