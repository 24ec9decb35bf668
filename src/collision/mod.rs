//! Collision detection: instance/level coupling (ground, gravity, walls)
//! and instance/instance resolution (octree broad phase plus optional
//! bounding-sphere narrow phase).

mod level;
mod resolver;

pub use level::{
    classify_and_find_ground, update_ground_and_gravity, LevelCollisionSettings,
};
pub use resolver::{
    narrow_phase_filter, out_of_bounds_instances, split_static_pairs,
};
