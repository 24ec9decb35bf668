//! The per-frame orchestrator.
//!
//! [`Engine`] owns the whole simulation: models, instances, levels and
//! their spatial indices, the behavior engine, the GPU pipelines, and the
//! debug visualization. The host drives it with [`Engine::update`] and
//! [`Engine::render`] (or [`Engine::frame`] against the swapchain) and
//! talks to it through the command surface in [`commands`].

mod commands;
mod debug;
mod frame;
mod interaction;

pub use debug::DebugDrawOptions;

use rand::rngs::SmallRng;
use rand::SeedableRng;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::anim::{AnimationPipeline, ModelAnimBuffers};
use crate::behavior::BehaviorEngine;
use crate::camera::Camera;
use crate::config::Config;
use crate::gpu::{GpuContext, TypedBuffer};
use crate::ik::FabrikSolver;
use crate::instance::InstanceRegistry;
use crate::level::Level;
use crate::nav::PathFinder;
use crate::renderer::{
    InstanceFlags, LineRenderer, MeshDrawData, PickingTarget, SceneBinding,
    SceneryMesh, SceneryRenderer, SkinnedModelRenderer,
};
use crate::spatial::{
    Octree, TriangleOctree, DEFAULT_OCTREE_MAX_DEPTH, DEFAULT_OCTREE_THRESHOLD,
};

use glam::Mat4;

/// GPU-side state of one registered model.
struct ModelGpu {
    /// Animation buffers; `None` for static props.
    anim: Option<ModelAnimBuffers>,
    /// Skinned draw data (animated models).
    meshes: Vec<MeshDrawData>,
    /// Static draw data (non-animated models).
    scenery_meshes: Vec<SceneryMesh>,
    /// Per-instance render flags (id, selected, morph weight, morph target).
    flags: TypedBuffer<InstanceFlags>,
    /// World matrices for static draws; animated draws read the animation
    /// pipeline's world-matrix buffer.
    static_world: TypedBuffer<Mat4>,
    /// Skinning bind groups, one per mesh; rebuilt after buffer resizes.
    frame_binds: Vec<wgpu::BindGroup>,
    /// Scenery bind group for static draws.
    scenery_bind: Option<wgpu::BindGroup>,
}

/// The engine.
pub struct Engine {
    pub(crate) context: GpuContext,

    // Simulation state.
    pub(crate) config: Config,
    pub(crate) models: FxHashMap<String, std::sync::Arc<crate::model::Model>>,
    pub(crate) registry: InstanceRegistry,
    pub(crate) levels: Vec<Level>,
    pub(crate) triangle_octree: TriangleOctree,
    pub(crate) instance_octree: Octree<i32>,
    pub(crate) path_finder: PathFinder,
    pub(crate) behavior: BehaviorEngine,
    pub(crate) fabrik: FabrikSolver,
    pub(crate) rng: SmallRng,

    // GPU state.
    pub(crate) anim_pipeline: AnimationPipeline,
    model_gpu: FxHashMap<String, ModelGpu>,
    pub(crate) scene_binding: SceneBinding,
    pub(crate) skinned_renderer: SkinnedModelRenderer,
    pub(crate) scenery_renderer: SceneryRenderer,
    pub(crate) line_renderer: LineRenderer,
    pub(crate) picking: PickingTarget,
    pub(crate) level_meshes: Vec<SceneryMesh>,
    pub(crate) level_world: TypedBuffer<Mat4>,
    pub(crate) level_flags: TypedBuffer<InstanceFlags>,
    pub(crate) level_bind: Option<wgpu::BindGroup>,
    depth_view: wgpu::TextureView,

    // Frame state.
    pub(crate) selected_instance: i32,
    pub(crate) pending_pick: Option<(u32, u32)>,
    pub(crate) last_collisions: FxHashSet<(i32, i32)>,
    pub(crate) ik_debug_points: Vec<glam::Vec3>,
    pub(crate) debug_options: DebugDrawOptions,
    pub(crate) edit_mode: bool,
    dirty: bool,
    exit_requested: bool,
}

impl Engine {
    /// Build an engine over a GPU context with an empty world and default
    /// config.
    #[must_use]
    pub fn new(context: GpuContext) -> Self {
        let device = &context.device;
        let config = Config::default();

        let scene_binding = SceneBinding::new(device);
        let surface_format = context.format();
        let skinned_renderer =
            SkinnedModelRenderer::new(device, &scene_binding, surface_format);
        let scenery_renderer =
            SceneryRenderer::new(device, &scene_binding, surface_format);
        let line_renderer =
            LineRenderer::new(device, &scene_binding, surface_format);
        let picking =
            PickingTarget::new(device, context.config.width, context.config.height);
        let (_, depth_view) = crate::renderer::create_depth_texture(
            device,
            context.config.width,
            context.config.height,
        );

        let world_bounds = config.world_bounds();
        let storage = wgpu::BufferUsages::STORAGE;

        Self {
            anim_pipeline: AnimationPipeline::new(device),
            scene_binding,
            skinned_renderer,
            scenery_renderer,
            line_renderer,
            picking,
            level_meshes: Vec::new(),
            level_world: TypedBuffer::with_capacity(device, "Level World", 4, storage),
            level_flags: TypedBuffer::with_capacity(device, "Level Flags", 4, storage),
            level_bind: None,
            depth_view,

            models: FxHashMap::default(),
            registry: InstanceRegistry::new(),
            levels: Vec::new(),
            triangle_octree: TriangleOctree::new(
                world_bounds,
                DEFAULT_OCTREE_THRESHOLD,
                DEFAULT_OCTREE_MAX_DEPTH,
            ),
            instance_octree: Octree::new(
                world_bounds,
                DEFAULT_OCTREE_THRESHOLD,
                DEFAULT_OCTREE_MAX_DEPTH,
            ),
            path_finder: PathFinder::new(),
            behavior: BehaviorEngine::new(),
            fabrik: FabrikSolver::new(),
            rng: SmallRng::seed_from_u64(0x6e61_7654),
            model_gpu: FxHashMap::default(),

            selected_instance: 0,
            pending_pick: None,
            last_collisions: FxHashSet::default(),
            ik_debug_points: Vec::new(),
            debug_options: DebugDrawOptions::default(),
            edit_mode: false,
            dirty: false,
            exit_requested: false,

            config,
            context,
        }
    }

    /// The current configuration (flags, bounds, selections).
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The instance registry.
    #[must_use]
    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    /// The selected camera, if any camera is configured.
    #[must_use]
    pub fn active_camera(&self) -> Option<&Camera> {
        self.config.cameras.get(self.config.selected_camera)
    }

    /// Handle a window resize: swapchain, depth, and pick attachments.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.context.resize(width, height);
        self.picking.resize(&self.context.device, width, height);
        let (_, depth_view) =
            crate::renderer::create_depth_texture(&self.context.device, width, height);
        self.depth_view = depth_view;
    }

    /// Mark the engine state as diverged from the last loaded config.
    pub(crate) fn set_dirty(&mut self) {
        self.dirty = true;
    }

    /// True when unsaved changes exist; the host reflects this in the
    /// window title.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Reset the dirty flag after a save or load.
    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Ask the main loop to exit; the host polls [`Engine::exit_requested`].
    pub fn request_exit(&mut self) {
        self.exit_requested = true;
    }

    /// True once an exit has been requested.
    #[must_use]
    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    /// Final teardown hook; GPU resources drop with the engine.
    pub fn do_exit(&mut self) {
        self.context.wait_idle();
    }

    /// Switch between edit mode (synchronous picking) and view mode.
    pub fn set_edit_mode(&mut self, edit: bool) {
        self.edit_mode = edit;
    }

    pub(crate) fn depth_view(&self) -> &wgpu::TextureView {
        &self.depth_view
    }
}
