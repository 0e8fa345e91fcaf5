//! Engine configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file (or no file
//! at all) yields the reference configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::catalog::Mode;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid config value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub constraints: ConstraintConfig,
    pub geometry: GeometryConfig,
    pub kinematics: KinematicsConfig,
    pub modes: ModeFactors,
    pub validation: ValidationLimits,
    pub batch: BatchConfig,
}

/// Thresholds for the constraint detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintConfig {
    /// depth/width (or depth/diameter) above which a feature is a deep pocket
    pub deep_ratio_threshold: f64,
    /// wall thickness in mm below which a wall is thin
    pub thin_wall_mm: f64,
    /// length/diameter (or bbox longest/shortest) above which a part is slender
    pub high_aspect_ratio: f64,
    pub high_aspect_penalty: f64,
    /// Share of the roughing penalty applied to finishing in the volume model
    pub finishing_weight: f64,
}

impl Default for ConstraintConfig {
    fn default() -> Self {
        Self {
            deep_ratio_threshold: 3.0,
            thin_wall_mm: 3.0,
            high_aspect_ratio: 8.0,
            high_aspect_penalty: 1.25,
            finishing_weight: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    /// Relative difference between dx and dy still treated as round stock
    pub roundness_tolerance: f64,
    /// Round stock also needs dz to exceed the cross section by this factor
    pub axis_dominance: f64,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            roundness_tolerance: 0.02,
            axis_dominance: 1.0,
        }
    }
}

/// Constants of the feature kinematic model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KinematicsConfig {
    pub thread_passes: u32,
    pub tapping_passes: u32,
    /// Drilling depth default as a multiple of the hole diameter
    pub drill_depth_factor: f64,
    pub default_milling_depth_mm: f64,
    pub default_face_depth_mm: f64,
    pub default_groove_depth_mm: f64,
    /// Radial stepover as a fraction of the end mill diameter
    pub stepover_ratio: f64,
    pub groove_insert_mm: f64,
    pub face_mill_diameter_mm: f64,
    pub contour_tool_mm: f64,
    pub min_end_mill_mm: f64,
    pub max_end_mill_mm: f64,
    /// Constant handling time per simple feature, seconds
    pub simple_feature_seconds: BTreeMap<String, f64>,
}

impl Default for KinematicsConfig {
    fn default() -> Self {
        let simple_feature_seconds = [
            ("chamfer", 15.0),
            ("radius", 20.0),
            ("edge_break", 10.0),
            ("deburr", 30.0),
            ("marking", 45.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            thread_passes: 5,
            tapping_passes: 2,
            drill_depth_factor: 2.0,
            default_milling_depth_mm: 5.0,
            default_face_depth_mm: 1.0,
            default_groove_depth_mm: 2.0,
            stepover_ratio: 0.5,
            groove_insert_mm: 3.0,
            face_mill_diameter_mm: 50.0,
            contour_tool_mm: 10.0,
            min_end_mill_mm: 3.0,
            max_end_mill_mm: 20.0,
            simple_feature_seconds,
        }
    }
}

/// Volume-model rate factors per machining mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeFactors {
    pub conservative: f64,
    pub mid: f64,
    pub aggressive: f64,
}

impl Default for ModeFactors {
    fn default() -> Self {
        Self {
            conservative: 0.85,
            mid: 1.0,
            aggressive: 1.15,
        }
    }
}

impl ModeFactors {
    pub fn factor(&self, mode: Mode) -> f64 {
        match mode {
            Mode::Conservative => self.conservative,
            Mode::Mid => self.mid,
            Mode::Aggressive => self.aggressive,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationLimits {
    pub max_dimension_mm: f64,
    pub max_features: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_dimension_mm: 10_000.0,
            max_features: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub verify_runs: usize,
    pub verify_samples: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            verify_runs: 3,
            verify_samples: 5,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Reject values that would break the multiplier floor or divide by zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.constraints;
        positive("constraints.deep_ratio_threshold", c.deep_ratio_threshold)?;
        positive("constraints.thin_wall_mm", c.thin_wall_mm)?;
        positive("constraints.high_aspect_ratio", c.high_aspect_ratio)?;
        if !(c.high_aspect_penalty >= 1.0) {
            return Err(invalid(
                "constraints.high_aspect_penalty",
                format!("{} is below 1.0", c.high_aspect_penalty),
            ));
        }
        if !(0.0..=1.0).contains(&c.finishing_weight) {
            return Err(invalid(
                "constraints.finishing_weight",
                format!("{} is outside 0..=1", c.finishing_weight),
            ));
        }

        if !(0.0..1.0).contains(&self.geometry.roundness_tolerance) {
            return Err(invalid(
                "geometry.roundness_tolerance",
                format!("{} is outside 0..1", self.geometry.roundness_tolerance),
            ));
        }
        positive("geometry.axis_dominance", self.geometry.axis_dominance)?;

        let k = &self.kinematics;
        if k.thread_passes == 0 || k.tapping_passes == 0 {
            return Err(invalid("kinematics.thread_passes", "pass counts must be at least 1".to_string()));
        }
        positive("kinematics.drill_depth_factor", k.drill_depth_factor)?;
        positive("kinematics.default_milling_depth_mm", k.default_milling_depth_mm)?;
        positive("kinematics.default_face_depth_mm", k.default_face_depth_mm)?;
        positive("kinematics.default_groove_depth_mm", k.default_groove_depth_mm)?;
        positive("kinematics.stepover_ratio", k.stepover_ratio)?;
        positive("kinematics.groove_insert_mm", k.groove_insert_mm)?;
        positive("kinematics.face_mill_diameter_mm", k.face_mill_diameter_mm)?;
        positive("kinematics.contour_tool_mm", k.contour_tool_mm)?;
        positive("kinematics.min_end_mill_mm", k.min_end_mill_mm)?;
        if k.max_end_mill_mm < k.min_end_mill_mm {
            return Err(invalid(
                "kinematics.max_end_mill_mm",
                format!("{} is below min_end_mill_mm {}", k.max_end_mill_mm, k.min_end_mill_mm),
            ));
        }
        for (name, seconds) in &k.simple_feature_seconds {
            if !seconds.is_finite() || *seconds < 0.0 {
                return Err(invalid(
                    "kinematics.simple_feature_seconds",
                    format!("{} has invalid time {}", name, seconds),
                ));
            }
        }

        positive("modes.conservative", self.modes.conservative)?;
        positive("modes.mid", self.modes.mid)?;
        positive("modes.aggressive", self.modes.aggressive)?;
        positive("validation.max_dimension_mm", self.validation.max_dimension_mm)?;

        if self.batch.verify_runs == 0 {
            return Err(invalid("batch.verify_runs", "must be at least 1".to_string()));
        }

        Ok(())
    }
}

fn positive(key: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(key, format!("{} must be a positive number", value)))
    }
}

fn invalid(key: &'static str, message: String) -> ConfigError {
    ConfigError::Invalid { key, message }
}
