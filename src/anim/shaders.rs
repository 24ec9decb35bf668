//! Embedded WGSL sources for the animation compute stages.
//!
//! Stage variants are assembled by concatenating the shared sampling code
//! with a `main` entry point.

const TRANSFORM_COMMON: &str = include_str!("shaders/transform_common.wgsl");
const TRANSFORM_MAIN: &str = include_str!("shaders/transform_main.wgsl");
const TRANSFORM_HEADMOVE_MAIN: &str =
    include_str!("shaders/transform_headmove_main.wgsl");

pub(super) const MATRIX_MULT: &str = include_str!("shaders/matrix_mult.wgsl");
pub(super) const BOUNDING_SPHERES: &str =
    include_str!("shaders/bounding_spheres.wgsl");

/// Transform sampling without head-look.
pub(super) fn transform_source() -> String {
    format!("{TRANSFORM_COMMON}\n{TRANSFORM_MAIN}")
}

/// Transform sampling with additive head-look rotations.
pub(super) fn transform_headmove_source() -> String {
    format!("{TRANSFORM_COMMON}\n{TRANSFORM_HEADMOVE_MAIN}")
}
