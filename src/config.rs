//! Serialized engine state: levels, models, behaviors, instances, cameras,
//! and the simulation flags.
//!
//! Configs are versioned; loading migrates older file versions before any
//! state is applied. Files are stored as pretty-printed TOML; the host's
//! own config format sits on top of these serde types.

use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::behavior::BehaviorGraph;
use crate::camera::Camera;
use crate::error::EngineError;
use crate::math::Aabb;
use crate::model::ModelSettings;

/// Version written by this engine.
pub const CURRENT_FILE_VERSION: &str = "5.0";

/// Instance/instance collision checking mode.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
pub enum CollisionCheckMode {
    /// No collision checks.
    None,
    /// Broad phase only (octree bounding boxes).
    #[default]
    BoundingBoxes,
    /// Broad phase plus the per-bone bounding-sphere narrow phase.
    BoundingSpheres,
}

/// A level entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    /// Display name.
    pub name: String,
    /// Source file path, resolved by the host's importer.
    pub file_path: String,
    /// World position.
    pub position: Vec3,
    /// World rotation in Euler degrees.
    pub rotation: Vec3,
    /// Uniform scale.
    pub scale: f32,
    /// Z-up source asset flag.
    pub swap_yz: bool,
}

/// A model entry with its authored settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model name; instances reference it.
    pub name: String,
    /// Source file path, resolved by the host's importer.
    pub file_path: String,
    /// Authored per-model settings.
    pub settings: ModelSettings,
}

/// A named behavior graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Behavior name; instances reference it.
    pub name: String,
    /// The node graph.
    pub graph: BehaviorGraph,
}

/// A placed instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// Name of the instanced model.
    pub model_name: String,
    /// World position.
    pub position: Vec3,
    /// World rotation in Euler degrees.
    pub rotation: Vec3,
    /// Uniform scale.
    pub scale: f32,
    /// First animation clip.
    pub first_clip: usize,
    /// Second animation clip.
    pub second_clip: usize,
    /// Blend factor between the clips.
    pub blend_factor: f32,
    /// Animation replay speed factor.
    pub speed_factor: f32,
    /// Attached behavior name, empty for none.
    pub node_tree_name: String,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            model_name: String::new(),
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: 1.0,
            first_clip: 0,
            second_clip: 0,
            blend_factor: 0.0,
            speed_factor: 1.0,
            node_tree_name: String::new(),
        }
    }
}

/// The whole engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// File format version; see [`Config::migrate`].
    pub version: String,
    /// Selected instance id.
    pub selected_instance: i32,
    /// Selected camera index.
    pub selected_camera: usize,
    /// Collision checking mode.
    pub collision_checks: CollisionCheckMode,
    /// Instance interaction enabled.
    pub interaction_enabled: bool,
    /// Interaction candidate range in meters.
    pub interaction_range: f32,
    /// Interaction cone half-angle in degrees.
    pub interaction_fov_degrees: f32,
    /// Foot IK enabled.
    pub ik_enabled: bool,
    /// FABRIK iteration count.
    pub ik_iterations: usize,
    /// Navigation enabled.
    pub navigation_enabled: bool,
    /// Gravity enabled.
    pub gravity_enabled: bool,
    /// World bounds minimum corner.
    pub world_min: Vec3,
    /// World bounds maximum corner.
    pub world_max: Vec3,
    /// Steepest walkable slope in degrees.
    pub max_slope_angle: f32,
    /// Tallest silently climbable step.
    pub max_stair_height: f32,
    /// Level entries.
    pub levels: Vec<LevelConfig>,
    /// Model entries.
    pub models: Vec<ModelConfig>,
    /// Behavior graphs.
    pub behaviors: Vec<BehaviorConfig>,
    /// Placed instances.
    pub instances: Vec<InstanceConfig>,
    /// Configured cameras.
    pub cameras: Vec<Camera>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CURRENT_FILE_VERSION.to_owned(),
            levels: Vec::new(),
            models: Vec::new(),
            behaviors: Vec::new(),
            instances: Vec::new(),
            cameras: vec![Camera::default()],
            selected_instance: 0,
            selected_camera: 0,
            collision_checks: CollisionCheckMode::default(),
            interaction_enabled: false,
            interaction_range: 5.0,
            interaction_fov_degrees: 45.0,
            ik_enabled: false,
            ik_iterations: 10,
            navigation_enabled: false,
            gravity_enabled: true,
            world_min: Vec3::new(-100.0, -25.0, -100.0),
            world_max: Vec3::new(100.0, 50.0, 100.0),
            max_slope_angle: 45.0,
            max_stair_height: 1.0,
        }
    }
}

impl Config {
    /// World bounds as a box.
    #[must_use]
    pub fn world_bounds(&self) -> Aabb {
        Aabb {
            min: self.world_min,
            max: self.world_max,
        }
    }

    /// Bring an older file version up to [`CURRENT_FILE_VERSION`].
    ///
    /// Version "3.0" predates bounding-sphere adjustments entirely: every
    /// model's vector is reset so the loader injects the `(0,0,0,1)`
    /// default per bone. Version "4.0" may carry authored vectors; only
    /// models without one pick up the defaults (the loader pads empty
    /// vectors).
    pub fn migrate(&mut self) {
        match self.version.as_str() {
            "3.0" => {
                for model in &mut self.models {
                    model.settings.bounding_sphere_adjustments.clear();
                }
            }
            "4.0" | CURRENT_FILE_VERSION => {}
            other => {
                log::warn!("unknown config version '{other}', loading as-is");
            }
        }
        self.version = CURRENT_FILE_VERSION.to_owned();
    }

    /// Load a config from a TOML file and migrate it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::FileIo`] or [`EngineError::ConfigParse`];
    /// callers keep their previous state on failure.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path).map_err(EngineError::FileIo)?;
        let mut config: Self = toml::from_str(&content)
            .map_err(|e| EngineError::ConfigParse(e.to_string()))?;
        config.migrate();
        Ok(config)
    }

    /// Save the config as pretty-printed TOML.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::FileIo`] or [`EngineError::ConfigParse`].
    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| EngineError::ConfigParse(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(EngineError::FileIo)?;
        }
        std::fs::write(path, content).map_err(EngineError::FileIo)
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec4;

    use super::*;

    #[test]
    fn default_round_trips_through_toml() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml_str = r#"
version = "5.0"
max_stair_height = 0.25

[[instances]]
model_name = "bot"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.max_stair_height, 0.25);
        assert_eq!(config.max_slope_angle, 45.0);
        assert_eq!(config.instances.len(), 1);
        assert_eq!(config.instances[0].speed_factor, 1.0);
    }

    #[test]
    fn version_3_resets_sphere_adjustments() {
        let mut config = Config {
            version: "3.0".to_owned(),
            models: vec![ModelConfig {
                name: "bot".to_owned(),
                settings: ModelSettings {
                    bounding_sphere_adjustments: vec![Vec4::new(1.0, 2.0, 3.0, 4.0)],
                    ..ModelSettings::default()
                },
                ..ModelConfig::default()
            }],
            ..Config::default()
        };
        config.migrate();
        assert_eq!(config.version, CURRENT_FILE_VERSION);
        assert!(config.models[0]
            .settings
            .bounding_sphere_adjustments
            .is_empty());
    }

    #[test]
    fn version_4_keeps_authored_adjustments() {
        let authored = vec![Vec4::new(0.1, 0.0, 0.0, 2.0)];
        let mut config = Config {
            version: "4.0".to_owned(),
            models: vec![ModelConfig {
                name: "bot".to_owned(),
                settings: ModelSettings {
                    bounding_sphere_adjustments: authored.clone(),
                    ..ModelSettings::default()
                },
                ..ModelConfig::default()
            }],
            ..Config::default()
        };
        config.migrate();
        assert_eq!(
            config.models[0].settings.bounding_sphere_adjustments,
            authored
        );
    }

    #[test]
    fn save_and_load_round_trip(){
        let dir = std::env::temp_dir().join("throng-config-test");
        let path = dir.join("engine.toml");
        let mut config = Config::default();
        config.instances.push(InstanceConfig {
            model_name: "bot".to_owned(),
            position: Vec3::new(1.0, 0.0, -2.0),
            ..InstanceConfig::default()
        });
        config.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(config, loaded);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
