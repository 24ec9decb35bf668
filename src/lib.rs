// -- Lint policy ---------------------------------------------------------
// This is the single source of truth for crate-wide lints.

// Broad lint groups
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Documentation
#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
// No panicking in library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
// No debug/print artifacts
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
// Import hygiene
#![deny(clippy::wildcard_imports)]
// Cast hygiene
#![deny(trivial_casts)]
#![deny(trivial_numeric_casts)]
// GPU / graphics allowances - casts are intentional and safe
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::float_cmp)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::module_name_repetitions)]

//! GPU-accelerated instanced 3D character animation and simulation engine.
//!
//! Throng draws thousands of skinned, morph-animated character instances in
//! a static level, evaluates their skeletal animation on the GPU as a
//! multi-stage compute pipeline, resolves instance/instance and
//! instance/level collisions through octrees and per-bone bounding spheres,
//! plants feet with FABRIK inverse kinematics, plans paths over the walkable
//! level surface, and drives per-instance behavior graphs.
//!
//! # Key entry points
//!
//! - [`engine::Engine`] - the per-frame orchestrator
//! - [`model::Model`] - immutable per-model asset data
//! - [`instance::InstanceRegistry`] - mutable per-entity state
//! - [`config::Config`] - serialized engine state (levels, models,
//!   instances, cameras, behaviors)
//!
//! # Architecture
//!
//! Each frame the engine packs per-instance animation data, dispatches the
//! transform-sampling and matrix-composition compute stages, optionally
//! reads bone matrices back for foot IK, rebuilds the instance octree,
//! resolves collisions and gravity against the level's triangle octree,
//! ticks navigation and behavior graphs, and finally draws the level,
//! the skinned instances, and the debug line geometry.
//!
//! Windowing, input capture, the UI layer, and asset file parsing are host
//! concerns; the engine consumes abstract [`model::Model`] objects and
//! records commands through the [`gpu`] facade.

pub mod anim;
pub mod behavior;
pub mod camera;
pub mod collision;
pub mod config;
pub mod engine;
pub mod error;
pub mod gpu;
pub mod ik;
pub mod instance;
pub mod level;
pub mod math;
pub mod model;
pub mod nav;
pub mod renderer;
pub mod spatial;
