//! Behavior graph structure, validation, and import/export.

use serde::{Deserialize, Serialize};

use super::{InstanceUpdate, NodeEvent};
use crate::error::EngineError;
use crate::instance::{FaceAnim, MoveDirection, MoveState};

/// Node payloads. Control nodes route activation; leaf nodes emit
/// [`InstanceUpdate`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Entry point, fired once when the graph is attached.
    Root,
    /// Fires when the matching event arrives for the instance.
    Event {
        /// Event to listen for.
        event: NodeEvent,
    },
    /// Activates its outputs in pin order.
    Sequence,
    /// Activates one random output.
    Selector,
    /// Suspends for a fixed time before activating its outputs.
    Wait {
        /// Suspension time in seconds.
        seconds: f32,
    },
    /// Suspends for a uniformly random time before activating its outputs.
    RandomWait {
        /// Minimum suspension in seconds.
        min_seconds: f32,
        /// Maximum suspension in seconds.
        max_seconds: f32,
    },
    /// Sets the movement state.
    MoveStateAction {
        /// State to set.
        state: MoveState,
    },
    /// Sets the held movement directions.
    MoveDirectionAction {
        /// Direction bits to set.
        direction: MoveDirection,
    },
    /// Sets or offsets the yaw rotation.
    RotationAction {
        /// Yaw in degrees.
        yaw_degrees: f32,
        /// Add instead of replace.
        relative: bool,
    },
    /// Overrides the forward speed.
    SpeedAction {
        /// Speed in m/s.
        speed: f32,
    },
    /// Selects a facial expression.
    FaceAnimAction {
        /// Expression.
        anim: FaceAnim,
        /// Morph weight.
        weight: f32,
    },
    /// Sets the head-look offsets.
    HeadAnimAction {
        /// Left/right look in `[-1, 1]`.
        left_right: f32,
        /// Up/down look in `[-1, 1]`.
        up_down: f32,
    },
    /// Picks a random navigation target.
    RandomNavigation,
}

impl NodeKind {
    /// The update a leaf node emits, `None` for control nodes.
    #[must_use]
    pub fn update(&self) -> Option<InstanceUpdate> {
        match *self {
            Self::MoveStateAction { state } => {
                Some(InstanceUpdate::MoveState(state))
            }
            Self::MoveDirectionAction { direction } => {
                Some(InstanceUpdate::MoveDirection(direction))
            }
            Self::RotationAction {
                yaw_degrees,
                relative,
            } => Some(InstanceUpdate::Rotation {
                degrees: glam::Vec3::new(0.0, yaw_degrees, 0.0),
                relative,
            }),
            Self::SpeedAction { speed } => Some(InstanceUpdate::Speed(speed)),
            Self::FaceAnimAction { anim, weight } => {
                Some(InstanceUpdate::FaceAnim { anim, weight })
            }
            Self::HeadAnimAction {
                left_right,
                up_down,
            } => Some(InstanceUpdate::HeadAnim {
                left_right,
                up_down,
            }),
            Self::RandomNavigation => Some(InstanceUpdate::RandomNavTarget),
            _ => None,
        }
    }
}

/// A node with its editor-assigned id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Unique node id within the graph.
    pub id: u32,
    /// Node payload.
    pub kind: NodeKind,
}

/// A directed link between an output pin and an input pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphLink {
    /// Source node id.
    pub from_node: u32,
    /// Source output pin, used to order sequence outputs.
    pub from_pin: u32,
    /// Destination node id.
    pub to_node: u32,
    /// Destination input pin.
    pub to_pin: u32,
}

/// A validated behavior graph template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehaviorGraph {
    /// Graph nodes.
    pub nodes: Vec<GraphNode>,
    /// Directed links.
    pub links: Vec<GraphLink>,
}

impl BehaviorGraph {
    /// Check graph integrity: node ids unique, every link's endpoints
    /// present.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::GraphIntegrity`] naming the offending node or
    /// link; callers drop the behavior and log.
    pub fn validate(&self) -> Result<(), EngineError> {
        let mut seen = rustc_hash::FxHashSet::default();
        for node in &self.nodes {
            if !seen.insert(node.id) {
                return Err(EngineError::GraphIntegrity(format!(
                    "duplicate node id {}",
                    node.id
                )));
            }
        }
        for link in &self.links {
            for endpoint in [link.from_node, link.to_node] {
                if !seen.contains(&endpoint) {
                    return Err(EngineError::GraphIntegrity(format!(
                        "link {} -> {} references unknown node {endpoint}",
                        link.from_node, link.to_node
                    )));
                }
            }
        }
        Ok(())
    }

    /// Node lookup by id.
    #[must_use]
    pub fn node(&self, id: u32) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Ordered successor node ids of `node`, sorted by output pin.
    #[must_use]
    pub fn successors(&self, node: u32) -> Vec<u32> {
        let mut outs: Vec<(u32, u32)> = self
            .links
            .iter()
            .filter(|l| l.from_node == node)
            .map(|l| (l.from_pin, l.to_node))
            .collect();
        outs.sort_unstable();
        outs.into_iter().map(|(_, to)| to).collect()
    }

    /// Serialize the graph for the host's node editor.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ConfigParse`] on serialization failure.
    pub fn export_data(&self) -> Result<String, EngineError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::ConfigParse(e.to_string()))
    }

    /// Deserialize and validate a graph exported by [`Self::export_data`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ConfigParse`] on malformed JSON and
    /// [`EngineError::GraphIntegrity`] when the graph fails validation.
    pub fn import_data(data: &str) -> Result<Self, EngineError> {
        let graph: Self = serde_json::from_str(data)
            .map_err(|e| EngineError::ConfigParse(e.to_string()))?;
        graph.validate()?;
        Ok(graph)
    }
}
