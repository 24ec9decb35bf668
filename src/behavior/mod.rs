//! Per-instance behavior graphs.
//!
//! A behavior is a directed graph of typed nodes cloned per attached
//! instance. External systems post [`NodeEvent`]s; the engine consumes them
//! on the next tick and walks the graphs, emitting [`NodeAction`]s that the
//! frame orchestrator routes back into instance state.

mod engine;
mod graph;

pub use engine::BehaviorEngine;
pub use graph::{BehaviorGraph, GraphLink, GraphNode, NodeKind};

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::instance::{FaceAnim, MoveDirection, MoveState};

/// Events observed by behavior graphs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
pub enum NodeEvent {
    /// No event.
    #[default]
    None,
    /// Another instance's bounding volume touched this instance.
    InstanceToInstanceCollision,
    /// The instance left the configured world bounds.
    InstanceToEdgeCollision,
    /// Another instance interacted with this instance.
    Interaction,
    /// The instance ran into non-walkable level geometry.
    InstanceToLevelCollision,
    /// The navigation target was reached.
    NavTargetReached,
}

/// A state mutation a behavior node requests for its instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InstanceUpdate {
    /// Set the movement state.
    MoveState(MoveState),
    /// Set the held movement directions.
    MoveDirection(MoveDirection),
    /// Set or add to the world rotation in Euler degrees.
    Rotation {
        /// Rotation value in degrees.
        degrees: Vec3,
        /// Add to the current rotation instead of replacing it.
        relative: bool,
    },
    /// Teleport to a world position.
    Position(Vec3),
    /// Override the forward speed.
    Speed(f32),
    /// Select a facial expression with a morph weight.
    FaceAnim {
        /// Expression to select.
        anim: FaceAnim,
        /// Morph weight in `[0, 1]`.
        weight: f32,
    },
    /// Set the head-look offsets.
    HeadAnim {
        /// Left/right look in `[-1, 1]`.
        left_right: f32,
        /// Up/down look in `[-1, 1]`.
        up_down: f32,
    },
    /// Pick a random navigation target among nav-target models and enable
    /// navigation; resolved by the orchestrator, which owns the registry.
    RandomNavTarget,
}

/// One routed output of a behavior tick.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeAction {
    /// The instance whose graph fired.
    pub instance_id: i32,
    /// The node that produced the update.
    pub node_id: u32,
    /// The requested state change.
    pub update: InstanceUpdate,
}
