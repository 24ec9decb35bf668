//! Instance interaction: range and facing-cone candidate selection.

use glam::Vec3;

use super::Engine;
use crate::behavior::NodeEvent;
use crate::math::Aabb;

impl Engine {
    /// Find the interaction candidate of `instance_id`: the nearest other
    /// instance within the interaction range that lies inside the facing
    /// cone.
    #[must_use]
    pub fn interaction_candidate(&self, instance_id: i32) -> Option<i32> {
        if !self.config.interaction_enabled {
            return None;
        }
        let instance = self.registry.get(instance_id)?;
        let range = self.config.interaction_range;
        let half_fov = self.config.interaction_fov_degrees.to_radians();
        let heading = instance.heading();

        let query_box = Aabb {
            min: instance.position - Vec3::splat(range),
            max: instance.position + Vec3::splat(range),
        };
        let mut best: Option<(f32, i32)> = None;
        for id in self.instance_octree.query(&query_box) {
            if id == instance_id {
                continue;
            }
            let Some(other) = self.registry.get(id) else {
                continue;
            };
            let mut to_other = other.position - instance.position;
            to_other.y = 0.0;
            let distance = to_other.length();
            if distance > range || distance < f32::EPSILON {
                continue;
            }
            let angle = heading.angle_between(to_other / distance);
            if angle > half_fov {
                continue;
            }
            if best.is_none_or(|(d, _)| distance < d) {
                best = Some((distance, id));
            }
        }
        best.map(|(_, id)| id)
    }

    /// Trigger an interaction from `instance_id`: the chosen candidate
    /// receives an `Interaction` event on the next behavior tick.
    pub fn interact(&mut self, instance_id: i32) {
        if let Some(target) = self.interaction_candidate(instance_id) {
            log::debug!("instance {instance_id} interacts with {target}");
            self.behavior.post_event(target, NodeEvent::Interaction);
        }
    }
}
