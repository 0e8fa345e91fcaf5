//! Estimator: validates a request, picks a time model and assembles the result
//!
//! An estimation is a pure function of the request, the catalog and the
//! configuration. Both shared inputs are immutable `Arc`s, so one estimator
//! can be used from any number of threads.

pub mod kinematic;
pub mod result;
pub mod volume;

use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;

use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::geometry;
use crate::request::{EstimateRequest, ModelKind};
use crate::validator::{ValidationError, Validator};
use crate::warning::{Warning, WarningKind};

use kinematic::FeatureModel;
pub use result::{Breakdown, Confidence, EstimationResult, FeatureTime};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EstimateError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("unknown material '{0}'")]
    UnknownMaterial(String),

    #[error("none of the {attempted} features could be timed")]
    NoFeaturesCalculable {
        attempted: usize,
        warnings: Vec<Warning>,
    },
}

impl EstimateError {
    /// Stable machine-readable code for the boundary
    pub fn code(&self) -> &'static str {
        match self {
            EstimateError::Validation(_) => "validation_error",
            EstimateError::UnknownMaterial(_) => "unknown_material",
            EstimateError::NoFeaturesCalculable { .. } => "no_features_calculable",
        }
    }
}

/// Order-independent sum: values are sorted first, then added with
/// Neumaier compensation, so any permutation gives the same bits
pub fn stable_sum<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    let mut sorted: Vec<f64> = values.into_iter().collect();
    sorted.sort_by(f64::total_cmp);

    let mut sum = 0.0_f64;
    let mut compensation = 0.0_f64;
    for value in sorted {
        let t = sum + value;
        if sum.abs() >= value.abs() {
            compensation += (sum - t) + value;
        } else {
            compensation += (value - t) + sum;
        }
        sum = t;
    }
    sum + compensation
}

#[derive(Clone)]
pub struct Estimator {
    catalog: Arc<Catalog>,
    config: Arc<EngineConfig>,
    config_fingerprint: String,
}

impl Estimator {
    pub fn new(catalog: Arc<Catalog>, config: Arc<EngineConfig>) -> Self {
        let bytes = serde_json::to_vec(config.as_ref()).unwrap_or_default();
        let config_fingerprint = hex::encode(Sha256::digest(&bytes));
        Self {
            catalog,
            config,
            config_fingerprint,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn config(&self) -> &Arc<EngineConfig> {
        &self.config
    }

    /// Same configuration, another catalog snapshot
    pub fn with_catalog(&self, catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            config: Arc::clone(&self.config),
            config_fingerprint: self.config_fingerprint.clone(),
        }
    }

    pub fn input_hash(&self, req: &EstimateRequest) -> String {
        let mut hasher = Sha256::new();
        hasher.update(req.fingerprint().as_bytes());
        hasher.update(self.catalog.fingerprint().as_bytes());
        hasher.update(self.config_fingerprint.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn estimate(&self, req: &EstimateRequest) -> Result<EstimationResult, EstimateError> {
        Validator::new(&self.config.validation).validate_request(req)?;

        let profile = self
            .catalog
            .material_profile(&req.material_code)
            .ok_or_else(|| EstimateError::UnknownMaterial(req.material_code.clone()))?;

        let model = req.selected_model();
        let setup = profile.base_setup_time;

        let (breakdown, per_feature_times, constraints_applied, warnings, confidence) = match model {
            ModelKind::Volume => {
                let input = req.geometry.as_ref().ok_or_else(|| ValidationError::Request {
                    message: "volume model requested without geometry".to_string(),
                })?;
                let snapshot = geometry::normalize(input, &self.config.geometry)?;
                let outcome = volume::estimate_volume(&snapshot, profile, req.mode, &self.config);

                let mut warnings = Vec::new();
                if input.stock_volume.is_none() {
                    warnings.push(Warning::new(
                        WarningKind::Geometry,
                        format!(
                            "stock volume not given, derived from the {:?} envelope",
                            snapshot.stock_model()
                        ),
                    ));
                }

                let confidence = Confidence::for_volume(!warnings.is_empty());
                let breakdown = Breakdown {
                    roughing: outcome.roughing,
                    finishing: outcome.finishing,
                    setup,
                };
                (breakdown, Vec::new(), outcome.constraints, warnings, confidence)
            }
            ModelKind::Feature => {
                let inputs = req.features.as_deref().unwrap_or_default();
                let feature_model = FeatureModel {
                    catalog: &self.catalog,
                    profile,
                    mode: req.mode,
                    kinematics: &self.config.kinematics,
                    constraints: &self.config.constraints,
                };
                let outcome = feature_model.run(inputs);

                if outcome.attempted > 0 && outcome.feature_times.is_empty() {
                    return Err(EstimateError::NoFeaturesCalculable {
                        attempted: outcome.attempted,
                        warnings: outcome.warnings,
                    });
                }

                let confidence =
                    Confidence::for_features(outcome.attempted, outcome.skipped, outcome.approximated);
                let breakdown = Breakdown {
                    roughing: stable_sum(outcome.roughing_seconds) / 60.0,
                    finishing: stable_sum(outcome.finishing_seconds) / 60.0,
                    setup,
                };
                (
                    breakdown,
                    outcome.feature_times,
                    outcome.constraints,
                    outcome.warnings,
                    confidence,
                )
            }
        };

        let total_time_minutes = breakdown.roughing + breakdown.finishing + breakdown.setup;

        log::debug!(
            "{}: {} model, {:.2} min ({} warnings, {} confidence)",
            req.part_id,
            model,
            total_time_minutes,
            warnings.len(),
            confidence
        );

        Ok(EstimationResult {
            part_id: req.part_id.clone(),
            model,
            total_time_minutes,
            breakdown,
            per_feature_times,
            constraints_applied,
            warnings,
            confidence,
            material_code: profile.code.clone(),
            mode: req.mode,
            input_hash: self.input_hash(req),
        })
    }
}

impl Default for Estimator {
    fn default() -> Self {
        Self::new(Arc::new(Catalog::builtin()), Arc::new(EngineConfig::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Mode;
    use crate::constraints::ConstraintKind;
    use crate::features::FeatureInput;
    use crate::geometry::{BoundingBox, GeometryInput};
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    fn mixed_features() -> Vec<FeatureInput> {
        vec![
            FeatureInput::new("outer_diameter", "ø30, L=100"),
            FeatureInput::new("face", "ø30"),
            FeatureInput::new("through_hole", "ø8x20").with_count(4),
            FeatureInput::new("pocket", "80×22×3.4mm"),
            FeatureInput::new("slot", "40x10x5"),
            FeatureInput::new("thread_external", "M10x1.5x20"),
            FeatureInput::new("groove", "ø28 x 3 x 1.5"),
            FeatureInput::new("chamfer", "1x45°").with_count(2),
            FeatureInput::new("deburr", ""),
        ]
    }

    fn cube_geometry() -> GeometryInput {
        GeometryInput {
            volume: 800.0,
            surface_area: 600.0,
            bbox: Some(BoundingBox::new(100.0, 100.0, 100.0)),
            stock_volume: Some(1000.0),
            shape: None,
        }
    }

    #[test]
    fn test_turning_scenario() {
        let req = EstimateRequest::features(
            "shaft",
            "aluminum",
            vec![FeatureInput::new("outer_diameter", "ø30, L=100")],
        );
        let result = Estimator::default().estimate(&req).unwrap();

        let rpm = 200.0 * 1000.0 / (std::f64::consts::PI * 30.0);
        let minutes = 100.0 / (rpm * 0.25);
        assert_relative_eq!(minutes, 0.1885, epsilon = 1e-4);
        assert_relative_eq!(result.breakdown.roughing, minutes, epsilon = 1e-12);
        assert_relative_eq!(result.total_time_minutes, minutes + 30.0, epsilon = 1e-12);
        assert_eq!(result.confidence, Confidence::High);
        assert_eq!(result.model, ModelKind::Feature);
    }

    #[test]
    fn test_volume_scenario() {
        let req = EstimateRequest::volume("block", "aluminum", cube_geometry());
        let result = Estimator::default().estimate(&req).unwrap();
        assert_eq!(result.breakdown.roughing, 4.0);
        assert_eq!(result.model, ModelKind::Volume);
        assert_eq!(result.confidence, Confidence::Medium);
        assert!(result.per_feature_times.is_empty());
    }

    #[test]
    fn test_deep_pocket_scenario() {
        let estimator = Estimator::default();
        let req = EstimateRequest::features("p", "aluminum", vec![FeatureInput::new("pocket", "40×15×60")]);
        let result = estimator.estimate(&req).unwrap();

        assert_eq!(result.constraints_applied.len(), 1);
        assert_eq!(result.constraints_applied[0].kind, ConstraintKind::DeepPocket);
        assert_eq!(result.constraints_applied[0].multiplier, 1.8);

        let catalog = estimator.catalog();
        let feature = crate::features::parse_feature(
            0,
            &FeatureInput::new("pocket", "40×15×60"),
            &estimator.config().kinematics,
        )
        .unwrap()
        .feature;
        let (op, name) = feature.kind.operation().unwrap();
        let condition = catalog.resolve("aluminum", op, name, Mode::Mid).unwrap().condition;
        let base = kinematic::feature_kinematics(&feature, condition, &estimator.config().kinematics)
            .unwrap()
            .minutes
            * 60.0;

        assert_relative_eq!(result.per_feature_times[0].time_seconds, base * 1.8, epsilon = 1e-9);
    }

    #[test]
    fn test_empty_features_is_setup_only() {
        let req = EstimateRequest::features("empty", "aluminum", vec![]);
        let result = Estimator::default().estimate(&req).unwrap();
        assert_eq!(result.total_time_minutes, 30.0);
        assert_eq!(result.confidence, Confidence::Low);
    }

    #[test]
    fn test_all_features_unusable() {
        let req = EstimateRequest::features(
            "bad",
            "aluminum",
            vec![FeatureInput::new("laser_etch", "logo"), FeatureInput::new("pocket", "see drawing")],
        );
        let err = Estimator::default().estimate(&req).unwrap_err();
        assert_eq!(err.code(), "no_features_calculable");
        match err {
            EstimateError::NoFeaturesCalculable { attempted, warnings } => {
                assert_eq!(attempted, 2);
                assert_eq!(warnings.len(), 2);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_unknown_material() {
        let req = EstimateRequest::features("x", "unobtanium", vec![]);
        assert_eq!(
            Estimator::default().estimate(&req),
            Err(EstimateError::UnknownMaterial("unobtanium".to_string()))
        );
    }

    #[test]
    fn test_material_alias_reports_canonical_code() {
        let req = EstimateRequest::features("x", "AL6061", vec![]);
        let result = Estimator::default().estimate(&req).unwrap();
        assert_eq!(result.material_code, "aluminum");
    }

    #[test]
    fn test_negative_removal_is_fatal() {
        let mut geometry = cube_geometry();
        geometry.stock_volume = Some(700.0);
        let req = EstimateRequest::volume("x", "aluminum", geometry);
        assert!(matches!(
            Estimator::default().estimate(&req),
            Err(EstimateError::Validation(ValidationError::NegativeRemoval { .. }))
        ));
    }

    #[test]
    fn test_repeated_runs_are_identical() {
        let estimator = Estimator::default();
        let req = EstimateRequest::features("det", "steel", mixed_features());
        let first = serde_json::to_vec(&estimator.estimate(&req).unwrap()).unwrap();
        for _ in 0..100 {
            let again = serde_json::to_vec(&estimator.estimate(&req).unwrap()).unwrap();
            assert_eq!(again, first);
        }
    }

    #[test]
    fn test_feature_order_does_not_change_total() {
        let estimator = Estimator::default();
        let features = mixed_features();
        let baseline = estimator
            .estimate(&EstimateRequest::features("o", "steel", features.clone()))
            .unwrap()
            .total_time_minutes;

        let mut reversed = features.clone();
        reversed.reverse();
        let mut rotated = features;
        rotated.rotate_left(3);

        for permutation in [reversed, rotated] {
            let total = estimator
                .estimate(&EstimateRequest::features("o", "steel", permutation))
                .unwrap()
                .total_time_minutes;
            assert_relative_eq!(total, baseline, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_adding_features_never_reduces_time() {
        let estimator = Estimator::default();
        let mut features = Vec::new();
        let mut previous = estimator
            .estimate(&EstimateRequest::features("m", "titanium", features.clone()))
            .unwrap()
            .total_time_minutes;

        for feature in mixed_features() {
            features.push(feature);
            let total = estimator
                .estimate(&EstimateRequest::features("m", "titanium", features.clone()))
                .unwrap()
                .total_time_minutes;
            assert!(total >= previous, "{} < {}", total, previous);
            previous = total;
        }
    }

    #[test]
    fn test_more_removal_never_reduces_time() {
        let estimator = Estimator::default();
        let mut previous = 0.0;
        for stock in [800.0, 900.0, 1000.0, 1500.0] {
            let mut geometry = cube_geometry();
            geometry.stock_volume = Some(stock);
            let total = estimator
                .estimate(&EstimateRequest::volume("m", "c45", geometry))
                .unwrap()
                .total_time_minutes;
            assert!(total >= previous);
            previous = total;
        }
    }

    #[test]
    fn test_input_hash_depends_on_catalog() {
        let estimator = Estimator::default();
        let req = EstimateRequest::features("h", "aluminum", vec![]);
        let other = estimator.with_catalog(Arc::new(
            Catalog::from_document(crate::catalog::CatalogDocument {
                materials: Catalog::builtin().materials().cloned().collect(),
                conditions: Vec::new(),
            })
            .unwrap(),
        ));
        assert_eq!(estimator.input_hash(&req), estimator.input_hash(&req));
        assert_ne!(estimator.input_hash(&req), other.input_hash(&req));
    }

    #[test]
    fn test_stable_sum_is_permutation_invariant() {
        let values = [0.1, 1e16, 0.2, -1e16, 0.3, 1.0 / 3.0];
        let forward = stable_sum(values);
        let mut reversed = values;
        reversed.reverse();
        assert_eq!(stable_sum(reversed).to_bits(), forward.to_bits());
        assert_eq!(stable_sum(Vec::new()), 0.0);
    }
}
