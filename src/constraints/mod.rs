//! Constraint detector
//!
//! Geometric ratios that make a cut slower become multiplicative penalties.
//! Every multiplier is at least 1.0, so constraints can only lengthen a time.

use serde::{Deserialize, Serialize};

use crate::catalog::MaterialProfile;
use crate::config::ConstraintConfig;
use crate::features::{Family, Feature, FeatureKind};
use crate::geometry::GeometrySnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    DeepPocket,
    ThinWall,
    HighAspectRatio,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    #[serde(rename = "type")]
    pub kind: ConstraintKind,
    pub multiplier: f64,
    /// Measured value that crossed the threshold: a ratio, or a wall
    /// thickness in mm for thin walls
    pub triggering_ratio: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_index: Option<usize>,
}

impl Constraint {
    fn new(kind: ConstraintKind, multiplier: f64, triggering_ratio: f64) -> Self {
        Self {
            kind,
            multiplier: multiplier.max(1.0),
            triggering_ratio,
            feature_index: None,
        }
    }

    fn on_feature(mut self, index: usize) -> Self {
        self.feature_index = Some(index);
        self
    }
}

/// Product of all multipliers, never below 1.0
pub fn combined_multiplier(constraints: &[Constraint]) -> f64 {
    let mut factors: Vec<f64> = constraints.iter().map(|c| c.multiplier.max(1.0)).collect();
    factors.sort_by(f64::total_cmp);
    factors.iter().product::<f64>().max(1.0)
}

/// Scaled-down penalty for finishing passes
pub fn light_multiplier(multiplier: f64, weight: f64) -> f64 {
    (1.0 + (multiplier - 1.0) * weight).max(1.0)
}

/// Depth over the governing cross dimension, when the kind has one
fn depth_ratio(feature: &Feature) -> Option<f64> {
    let dims = &feature.dims;
    match feature.kind {
        FeatureKind::Pocket | FeatureKind::Slot | FeatureKind::Keyway | FeatureKind::Step => {
            Some(dims.depth? / dims.width?)
        }
        kind if kind.is_internal() => Some(dims.depth.or(dims.length)? / dims.diameter?),
        _ => None,
    }
}

/// Constraints for each feature, aligned with `features`.
///
/// `features` pairs each feature with its index in the request so that
/// constraints can point back at it.
pub fn detect_features(
    features: &[(usize, &Feature)],
    profile: &MaterialProfile,
    cfg: &ConstraintConfig,
) -> Vec<Vec<Constraint>> {
    let outer_diameters: Vec<f64> = features
        .iter()
        .filter(|(_, f)| f.kind.is_external_diameter())
        .filter_map(|(_, f)| f.dims.diameter)
        .collect();

    features
        .iter()
        .map(|&(index, feature)| {
            let mut found = Vec::new();

            if let Some(ratio) = depth_ratio(feature) {
                if ratio > cfg.deep_ratio_threshold {
                    found.push(
                        Constraint::new(ConstraintKind::DeepPocket, profile.deep_pocket_penalty, ratio)
                            .on_feature(index),
                    );
                }
            }

            if let Some(wall) = wall_thickness(feature, &outer_diameters) {
                if wall < cfg.thin_wall_mm {
                    found.push(
                        Constraint::new(ConstraintKind::ThinWall, profile.thin_wall_penalty, wall)
                            .on_feature(index),
                    );
                }
            }

            if feature.kind.family() == Family::Turning && !feature.kind.is_internal() {
                if let (Some(length), Some(dia)) = (feature.dims.length, feature.dims.diameter) {
                    let ratio = length / dia;
                    if ratio > cfg.high_aspect_ratio {
                        found.push(
                            Constraint::new(ConstraintKind::HighAspectRatio, cfg.high_aspect_penalty, ratio)
                                .on_feature(index),
                        );
                    }
                }
            }

            found
        })
        .collect()
}

/// Explicit `wall=` value, else the radial wall to the nearest enclosing
/// outer diameter
fn wall_thickness(feature: &Feature, outer_diameters: &[f64]) -> Option<f64> {
    if let Some(wall) = feature.dims.wall {
        return Some(wall);
    }
    if !feature.kind.is_internal() {
        return None;
    }
    let inner = feature.dims.diameter?;
    outer_diameters
        .iter()
        .copied()
        .filter(|outer| *outer > inner)
        .min_by(f64::total_cmp)
        .map(|outer| (outer - inner) / 2.0)
}

/// Part-level constraints for the volume model
pub fn detect_geometry(
    snapshot: &GeometrySnapshot,
    profile: &MaterialProfile,
    cfg: &ConstraintConfig,
) -> Vec<Constraint> {
    let mut found = Vec::new();

    // A plate of thickness t has V/A close to t/2
    let implied_wall_mm = 2.0 * snapshot.part_volume() / snapshot.surface_area() * 10.0;
    if implied_wall_mm < cfg.thin_wall_mm {
        found.push(Constraint::new(
            ConstraintKind::ThinWall,
            profile.thin_wall_penalty,
            implied_wall_mm,
        ));
    }

    let bbox = snapshot.bounding_box();
    let aspect = bbox.longest() / bbox.shortest();
    if aspect > cfg.high_aspect_ratio {
        found.push(Constraint::new(
            ConstraintKind::HighAspectRatio,
            cfg.high_aspect_penalty,
            aspect,
        ));
    }

    found
}
