//! The behavior interpreter.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

use rustc_hash::FxHashMap;

use super::graph::{BehaviorGraph, NodeKind};
use super::{NodeAction, NodeEvent};
use crate::error::EngineError;

/// Nodes one instance may fire within a single tick; cyclic graphs without
/// a wait node are cut off here.
const FIRE_BUDGET: usize = 256;

/// Per-instance execution state: a graph clone plus suspension timers, so
/// tick state is isolated between instances sharing a template.
struct InstanceBehavior {
    behavior_name: String,
    graph: BehaviorGraph,
    started: bool,
    /// Remaining seconds per suspended wait node.
    waits: FxHashMap<u32, f32>,
}

/// Registry of behavior templates and per-instance execution state, plus
/// the event queue feeding them.
pub struct BehaviorEngine {
    templates: FxHashMap<String, BehaviorGraph>,
    states: FxHashMap<i32, InstanceBehavior>,
    event_queue: Vec<(i32, NodeEvent)>,
    rng: SmallRng,
}

impl Default for BehaviorEngine {
    fn default() -> Self {
        Self::with_seed(0x7452_6f6e_67)
    }
}

impl BehaviorEngine {
    /// Engine with the default random seed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine with a fixed seed for the selector and random-wait nodes.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            templates: FxHashMap::default(),
            states: FxHashMap::default(),
            event_queue: Vec::new(),
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Register (or replace) a behavior template.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::GraphIntegrity`] when validation fails; the
    /// template is not stored.
    pub fn add_behavior(
        &mut self,
        name: &str,
        graph: BehaviorGraph,
    ) -> Result<(), EngineError> {
        graph.validate()?;
        let _ = self.templates.insert(name.to_owned(), graph);
        Ok(())
    }

    /// Remove a template and detach it from every instance.
    pub fn remove_behavior(&mut self, name: &str) {
        let _ = self.templates.remove(name);
        self.states.retain(|_, s| s.behavior_name != name);
    }

    /// Registered template names, sorted.
    #[must_use]
    pub fn behavior_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.templates.keys().cloned().collect();
        names.sort();
        names
    }

    /// Look up a registered template.
    #[must_use]
    pub fn template(&self, name: &str) -> Option<&BehaviorGraph> {
        self.templates.get(name)
    }

    /// Attach a behavior to an instance, cloning the template. Returns
    /// `false` for unknown template names.
    pub fn attach(&mut self, instance_id: i32, name: &str) -> bool {
        let Some(template) = self.templates.get(name) else {
            log::warn!("behavior '{name}' not registered");
            return false;
        };
        let _ = self.states.insert(
            instance_id,
            InstanceBehavior {
                behavior_name: name.to_owned(),
                graph: template.clone(),
                started: false,
                waits: FxHashMap::default(),
            },
        );
        true
    }

    /// Detach whatever behavior an instance carries.
    pub fn detach(&mut self, instance_id: i32) {
        let _ = self.states.remove(&instance_id);
    }

    /// Name of the behavior attached to an instance.
    #[must_use]
    pub fn attached(&self, instance_id: i32) -> Option<&str> {
        self.states
            .get(&instance_id)
            .map(|s| s.behavior_name.as_str())
    }

    /// Queue an event for consumption on the next tick.
    pub fn post_event(&mut self, instance_id: i32, event: NodeEvent) {
        if event != NodeEvent::None {
            self.event_queue.push((instance_id, event));
        }
    }

    /// Drop execution state of instances that no longer exist. Ticking a
    /// behavior attached to a deleted instance is a state violation; the
    /// entry is silently removed.
    pub fn retain_instances(&mut self, exists: impl Fn(i32) -> bool) {
        self.states.retain(|&id, _| exists(id));
    }

    /// Re-key state after an instance deletion compacted the registry:
    /// the removed id's state is dropped and every id above it shifts
    /// down by one, keeping wait timers attached to the right instances.
    pub fn handle_instance_removed(&mut self, removed_id: i32) {
        let _ = self.states.remove(&removed_id);
        let mut shifted: Vec<i32> = self
            .states
            .keys()
            .copied()
            .filter(|&id| id > removed_id)
            .collect();
        shifted.sort_unstable();
        for id in shifted {
            if let Some(state) = self.states.remove(&id) {
                let _ = self.states.insert(id - 1, state);
            }
        }
        self.event_queue.retain_mut(|(id, _)| {
            if *id == removed_id {
                return false;
            }
            if *id > removed_id {
                *id -= 1;
            }
            true
        });
    }

    /// Advance all attached graphs by `delta` seconds, consuming queued
    /// events. Returns the emitted actions in a deterministic order.
    pub fn tick(&mut self, delta: f32) -> Vec<NodeAction> {
        let events = std::mem::take(&mut self.event_queue);
        let mut actions = Vec::new();

        let mut ids: Vec<i32> = self.states.keys().copied().collect();
        ids.sort_unstable();

        for id in ids {
            let Some(state) = self.states.get_mut(&id) else {
                continue;
            };
            let mut to_fire: VecDeque<u32> = VecDeque::new();

            if !state.started {
                state.started = true;
                to_fire.extend(
                    state
                        .graph
                        .nodes
                        .iter()
                        .filter(|n| matches!(n.kind, NodeKind::Root))
                        .map(|n| n.id),
                );
            }

            for &(target, event) in &events {
                if target != id {
                    continue;
                }
                to_fire.extend(state.graph.nodes.iter().filter_map(|n| {
                    matches!(&n.kind, NodeKind::Event { event: e } if *e == event)
                        .then_some(n.id)
                }));
            }

            // Advance suspension timers; expired waits activate their
            // successors this tick.
            let mut expired = Vec::new();
            for (&node, remaining) in &mut state.waits {
                *remaining -= delta;
                if *remaining <= 0.0 {
                    expired.push(node);
                }
            }
            for node in expired {
                let _ = state.waits.remove(&node);
                to_fire.extend(state.graph.successors(node));
            }

            let mut fired = 0_usize;
            while let Some(node_id) = to_fire.pop_front() {
                fired += 1;
                if fired > FIRE_BUDGET {
                    log::warn!(
                        "behavior '{}' on instance {id} exceeded the per-tick \
                         node budget",
                        state.behavior_name
                    );
                    break;
                }
                let Some(node) = state.graph.node(node_id) else {
                    continue;
                };
                match &node.kind {
                    NodeKind::Wait { seconds } => {
                        let _ = state.waits.insert(node_id, *seconds);
                    }
                    NodeKind::RandomWait {
                        min_seconds,
                        max_seconds,
                    } => {
                        let (lo, hi) = (
                            min_seconds.min(*max_seconds),
                            max_seconds.max(*min_seconds),
                        );
                        let seconds = if hi > lo {
                            self.rng.random_range(lo..=hi)
                        } else {
                            lo
                        };
                        let _ = state.waits.insert(node_id, seconds);
                    }
                    NodeKind::Selector => {
                        let successors = state.graph.successors(node_id);
                        if !successors.is_empty() {
                            let pick =
                                self.rng.random_range(0..successors.len());
                            to_fire.push_back(successors[pick]);
                        }
                    }
                    kind => {
                        if let Some(update) = kind.update() {
                            actions.push(NodeAction {
                                instance_id: id,
                                node_id,
                                update,
                            });
                        }
                        to_fire.extend(state.graph.successors(node_id));
                    }
                }
            }
        }

        actions
    }
}
