//! Embedded WGSL sources for the draw pipelines.

const SKINNING: &str = include_str!("shaders/skinning.wgsl");
const MORPH_ON: &str = include_str!("shaders/morph_on.wgsl");
const MORPH_OFF: &str = include_str!("shaders/morph_off.wgsl");

pub(super) const SCENERY: &str = include_str!("shaders/scenery.wgsl");
pub(super) const LINE: &str = include_str!("shaders/line.wgsl");

/// Skinning shader without morph targets.
pub(super) fn skinning_source() -> String {
    format!("{SKINNING}\n{MORPH_OFF}")
}

/// Skinning shader with the morph-target delta buffer.
pub(super) fn skinning_morph_source() -> String {
    format!("{SKINNING}\n{MORPH_ON}")
}
