//! Feature kinematic model
//!
//! Each feature is timed from spindle speed and feed:
//! `rpm = Vc·1000 / (π·D)`, `feed = rpm·f`, `time = travel / feed · passes`.

use std::f64::consts::PI;

use crate::catalog::{Catalog, CuttingCondition, MaterialProfile, Mode, OperationName};
use crate::config::{ConstraintConfig, KinematicsConfig};
use crate::constraints::{self, combined_multiplier, Constraint};
use crate::features::{parse_feature, Family, Feature, FeatureInput, FeatureKind, ParsedFeature};
use crate::warning::{Warning, WarningKind};

use super::result::FeatureTime;

/// Cutting kinematics of one piece of one feature
#[derive(Debug, Clone, PartialEq)]
pub struct Kinematics {
    pub minutes: f64,
    pub rpm: f64,
    /// Feed rate, mm/min
    pub feed: f64,
    pub passes: u32,
    /// Tool travel per pass, mm
    pub travel: f64,
}

pub fn spindle_rpm(vc: f64, diameter: f64) -> f64 {
    vc * 1000.0 / (PI * diameter)
}

fn depth_passes(depth: Option<f64>, ap: f64) -> u32 {
    match depth {
        Some(depth) if ap > 0.0 => (depth / ap).ceil().max(1.0) as u32,
        _ => 1,
    }
}

fn need(value: Option<f64>, what: &str) -> Result<f64, String> {
    value.ok_or_else(|| format!("{} missing", what))
}

fn feed_per_rev(condition: &CuttingCondition) -> Result<f64, String> {
    if condition.f > 0.0 && condition.f.is_finite() {
        Ok(condition.f)
    } else {
        Err(format!("feed per revolution {} is not usable", condition.f))
    }
}

/// Minutes for one piece of `feature` under `condition`
pub fn feature_kinematics(
    feature: &Feature,
    condition: &CuttingCondition,
    cfg: &KinematicsConfig,
) -> Result<Kinematics, String> {
    let dims = &feature.dims;

    let (rpm, feed, travel, passes) = match feature.kind.family() {
        Family::Turning | Family::Facing => {
            let dia = need(dims.diameter, "diameter")?;
            let rpm = spindle_rpm(condition.vc, dia);
            let feed = rpm * feed_per_rev(condition)?;
            let length = need(dims.length, "length")?;
            (rpm, feed, length, depth_passes(dims.depth, condition.ap))
        }
        Family::Grooving => {
            let dia = need(dims.diameter, "diameter")?;
            let rpm = spindle_rpm(condition.vc, dia);
            let feed = rpm * feed_per_rev(condition)?;
            let width = need(dims.width, "width")?;
            let plunges = (width / cfg.groove_insert_mm).ceil().max(1.0) as u32;
            (rpm, feed, need(dims.depth, "depth")?, plunges)
        }
        Family::Drilling => {
            let dia = need(dims.diameter, "diameter")?;
            let rpm = spindle_rpm(condition.vc, dia);
            let feed = rpm * feed_per_rev(condition)?;
            (rpm, feed, need(dims.depth, "depth")?, 1)
        }
        Family::Milling => {
            let (tool, path) = milling_path(feature, cfg)?;
            let rpm = spindle_rpm(condition.vc, tool);
            let feed = match (condition.feed_per_tooth, condition.tooth_count) {
                (Some(fz), Some(z)) => rpm * fz * f64::from(z),
                _ => rpm * feed_per_rev(condition)?,
            };
            (rpm, feed, path, depth_passes(dims.depth, condition.ap))
        }
        Family::Threading => {
            let dia = need(dims.diameter, "diameter")?;
            let rpm = spindle_rpm(condition.vc, dia);
            let feed = rpm * need(dims.pitch, "pitch")?;
            let passes = match feature.kind {
                FeatureKind::TappedHole => cfg.tapping_passes,
                _ => cfg.thread_passes,
            };
            (rpm, feed, need(dims.length, "length")?, passes)
        }
        Family::Simple => return Err(format!("{} is not a cutting feature", feature.kind)),
    };

    if !(feed.is_finite() && feed > 0.0) {
        return Err(format!("feed rate {} mm/min is not usable", feed));
    }

    Ok(Kinematics {
        minutes: travel / feed * f64::from(passes),
        rpm,
        feed,
        passes,
        travel,
    })
}

/// (tool diameter, path length per depth pass) for a milled feature
fn milling_path(feature: &Feature, cfg: &KinematicsConfig) -> Result<(f64, f64), String> {
    let dims = &feature.dims;
    let length = need(dims.length, "length")?;

    match feature.kind {
        FeatureKind::Slot | FeatureKind::Keyway => {
            // Slot width is cut by a tool of the same diameter
            Ok((need(dims.width, "width")?, length))
        }
        FeatureKind::Pocket | FeatureKind::Step => {
            let width = need(dims.width, "width")?;
            let narrow = length.min(width);
            let tool = (narrow * 0.5)
                .clamp(cfg.min_end_mill_mm, cfg.max_end_mill_mm)
                .min(narrow);
            Ok((tool, length * width / (tool * cfg.stepover_ratio)))
        }
        FeatureKind::FaceMill => {
            let width = need(dims.width, "width")?;
            let tool = cfg.face_mill_diameter_mm;
            let rows = (width / (0.75 * tool)).ceil().max(1.0);
            Ok((tool, (length + tool) * rows))
        }
        FeatureKind::Contour => {
            let path = match dims.width {
                Some(width) => 2.0 * (length + width),
                None => length,
            };
            Ok((cfg.contour_tool_mm, path))
        }
        kind => Err(format!("{} is not a milled feature", kind)),
    }
}

/// Everything the feature model produced for one request
#[derive(Debug, Default)]
pub struct FeatureOutcome {
    pub feature_times: Vec<FeatureTime>,
    pub roughing_seconds: Vec<f64>,
    pub finishing_seconds: Vec<f64>,
    pub constraints: Vec<Constraint>,
    pub warnings: Vec<Warning>,
    pub attempted: usize,
    pub skipped: usize,
    /// A default dimension, table pitch or fallback condition was used
    pub approximated: bool,
}

pub struct FeatureModel<'a> {
    pub catalog: &'a Catalog,
    pub profile: &'a MaterialProfile,
    pub mode: Mode,
    pub kinematics: &'a KinematicsConfig,
    pub constraints: &'a ConstraintConfig,
}

impl FeatureModel<'_> {
    pub fn run(&self, inputs: &[FeatureInput]) -> FeatureOutcome {
        let mut outcome = FeatureOutcome {
            attempted: inputs.len(),
            ..Default::default()
        };

        let mut parsed: Vec<ParsedFeature> = Vec::with_capacity(inputs.len());
        for (index, input) in inputs.iter().enumerate() {
            match parse_feature(index, input, self.kinematics) {
                Ok(feature) => parsed.push(feature),
                Err(warning) => self.skip(&mut outcome, warning),
            }
        }

        let pairs: Vec<(usize, &Feature)> = parsed.iter().map(|p| (p.index, &p.feature)).collect();
        let detected = constraints::detect_features(&pairs, self.profile, self.constraints);

        for (feature, found) in parsed.iter().zip(detected) {
            match self.time_feature(feature, &found) {
                Ok((time, operation_name, approximated)) => {
                    if !feature.warnings.is_empty() || approximated {
                        outcome.approximated = true;
                    }
                    outcome.warnings.extend(feature.warnings.iter().cloned());
                    match operation_name {
                        OperationName::Roughing => outcome.roughing_seconds.push(time.time_seconds),
                        OperationName::Finishing => outcome.finishing_seconds.push(time.time_seconds),
                    }
                    outcome.constraints.extend(found);
                    outcome.feature_times.push(time);
                }
                Err(warning) => self.skip(&mut outcome, warning),
            }
        }

        outcome.warnings.sort_by_key(|w| w.feature_index);
        outcome
    }

    fn skip(&self, outcome: &mut FeatureOutcome, warning: Warning) {
        log::warn!("skipping feature: {}", warning);
        outcome.skipped += 1;
        outcome.warnings.push(warning);
    }

    /// Time one parsed feature; the bucket is the kind's own operation name
    fn time_feature(
        &self,
        parsed: &ParsedFeature,
        found: &[Constraint],
    ) -> Result<(FeatureTime, OperationName, bool), Warning> {
        let feature = &parsed.feature;
        let index = parsed.index;
        let multiplier = combined_multiplier(found);

        let (minutes, bucket, description, approximated) = match feature.kind.operation() {
            None => {
                let seconds = self
                    .kinematics
                    .simple_feature_seconds
                    .get(feature.kind.name())
                    .copied()
                    .ok_or_else(|| {
                        Warning::new(
                            WarningKind::UnusableCondition,
                            format!("no handling time configured for {}", feature.kind),
                        )
                        .for_feature(index)
                    })?;
                (
                    seconds / 60.0,
                    OperationName::Finishing,
                    format!("constant time {} s per piece", seconds),
                    false,
                )
            }
            Some((operation_type, operation_name)) => {
                let resolved = self
                    .catalog
                    .resolve(&self.profile.group, operation_type, operation_name, self.mode)
                    .map_err(|e| {
                        Warning::new(WarningKind::ConditionNotFound, e.to_string()).for_feature(index)
                    })?;

                let k = feature_kinematics(feature, resolved.condition, self.kinematics).map_err(|msg| {
                    Warning::new(
                        WarningKind::UnusableCondition,
                        format!("{} '{}': {}", feature.kind, feature.raw_detail, msg),
                    )
                    .for_feature(index)
                })?;

                let mut description = format!(
                    "{} {}: n={:.0} rpm, vf={:.1} mm/min, {:.1} mm × {} pass{}",
                    operation_type,
                    resolved.operation_name,
                    k.rpm,
                    k.feed,
                    k.travel,
                    k.passes,
                    if k.passes == 1 { "" } else { "es" }
                );
                if resolved.fallback {
                    description.push_str(&format!(" ({} condition as fallback)", resolved.operation_name));
                }
                if feature.pitch_from_table {
                    description.push_str(" (ISO coarse pitch)");
                }

                (
                    k.minutes,
                    operation_name,
                    description,
                    resolved.fallback || feature.pitch_from_table,
                )
            }
        };

        let time_seconds = minutes * 60.0 * f64::from(feature.count) * multiplier;
        log::debug!(
            "feature #{} {} '{}': {:.3} s (×{} ×{})",
            index,
            feature.kind,
            feature.raw_detail,
            time_seconds,
            feature.count,
            multiplier
        );

        Ok((
            FeatureTime {
                index,
                feature_type: feature.kind,
                detail: feature.raw_detail.clone(),
                count: feature.count,
                time_seconds,
                multiplier,
                method_description: description,
            },
            bucket,
            approximated,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use approx::assert_relative_eq;

    fn parsed(kind: &str, detail: &str) -> Feature {
        parse_feature(0, &FeatureInput::new(kind, detail), &KinematicsConfig::default())
            .unwrap()
            .feature
    }

    fn condition(catalog: &Catalog, feature: &Feature) -> CuttingCondition {
        let (op, name) = feature.kind.operation().unwrap();
        catalog
            .resolve("aluminum", op, name, Mode::Mid)
            .unwrap()
            .condition
            .clone()
    }

    #[test]
    fn test_outer_diameter_turning() {
        let catalog = Catalog::builtin();
        let feature = parsed("outer_diameter", "ø30, L=100");
        let k = feature_kinematics(&feature, &condition(&catalog, &feature), &KinematicsConfig::default())
            .unwrap();

        assert_relative_eq!(k.rpm, 2122.0659, epsilon = 1e-3);
        assert_relative_eq!(k.feed, 530.5165, epsilon = 1e-3);
        assert_relative_eq!(k.minutes, 0.18850, epsilon = 1e-5);
        assert_eq!(k.passes, 1);
    }

    #[test]
    fn test_drilling() {
        let condition = CuttingCondition {
            vc: 100.0,
            f: 0.15,
            ap: 0.0,
            feed_per_tooth: None,
            tooth_count: None,
        };
        let feature = parsed("blind_hole", "ø10 x 30");
        let k = feature_kinematics(&feature, &condition, &KinematicsConfig::default()).unwrap();
        let rpm = 100.0 * 1000.0 / (PI * 10.0);
        assert_relative_eq!(k.minutes, 30.0 / (rpm * 0.15));
    }

    #[test]
    fn test_threading_uses_pitch_and_passes() {
        let condition = CuttingCondition {
            vc: 60.0,
            f: 0.0,
            ap: 0.1,
            feed_per_tooth: None,
            tooth_count: None,
        };
        let feature = parsed("thread_external", "M10x1.5x20");
        let k = feature_kinematics(&feature, &condition, &KinematicsConfig::default()).unwrap();
        let rpm = 60.0 * 1000.0 / (PI * 10.0);
        assert_eq!(k.passes, 5);
        assert_relative_eq!(k.minutes, 20.0 / (rpm * 1.5) * 5.0);

        let tapped = parsed("tapped_hole", "M10x1.5x20");
        let k = feature_kinematics(&tapped, &condition, &KinematicsConfig::default()).unwrap();
        assert_eq!(k.passes, 2);
    }

    #[test]
    fn test_pocket_milling() {
        let catalog = Catalog::builtin();
        let feature = parsed("pocket", "40×15×60");
        let k = feature_kinematics(&feature, &condition(&catalog, &feature), &KinematicsConfig::default())
            .unwrap();

        // 7.5 mm end mill, 3.75 mm stepover, 15 passes of 4 mm
        assert_relative_eq!(k.travel, 160.0);
        assert_eq!(k.passes, 15);
        let rpm = 250.0 * 1000.0 / (PI * 7.5);
        assert_relative_eq!(k.feed, rpm * 0.08 * 3.0);
    }

    #[test]
    fn test_zero_feed_is_unusable() {
        let condition = CuttingCondition {
            vc: 200.0,
            f: 0.0,
            ap: 1.0,
            feed_per_tooth: None,
            tooth_count: None,
        };
        let feature = parsed("outer_diameter", "ø30, L=100");
        assert!(feature_kinematics(&feature, &condition, &KinematicsConfig::default()).is_err());
    }

    #[test]
    fn test_turning_depth_passes() {
        let catalog = Catalog::builtin();
        let shallow = parsed("outer_diameter", "ø30 L=100 depth=3");
        let deep = parsed("outer_diameter", "ø30 L=100 depth=7");
        let cfg = KinematicsConfig::default();
        let a = feature_kinematics(&shallow, &condition(&catalog, &shallow), &cfg).unwrap();
        let b = feature_kinematics(&deep, &condition(&catalog, &deep), &cfg).unwrap();
        assert_eq!(a.passes, 1);
        assert_eq!(b.passes, 3);
        assert_relative_eq!(b.minutes, a.minutes * 3.0);
    }

    fn run(inputs: &[FeatureInput]) -> FeatureOutcome {
        let catalog = Catalog::builtin();
        let config = EngineConfig::default();
        let model = FeatureModel {
            catalog: &catalog,
            profile: catalog.material_profile("aluminum").unwrap(),
            mode: Mode::Mid,
            kinematics: &config.kinematics,
            constraints: &config.constraints,
        };
        model.run(inputs)
    }

    #[test]
    fn test_partial_failure_is_tolerated() {
        let outcome = run(&[
            FeatureInput::new("outer_diameter", "ø30, L=100"),
            FeatureInput::new("laser_etch", "logo"),
            FeatureInput::new("through_hole", "ø8x20"),
        ]);
        assert_eq!(outcome.attempted, 3);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.feature_times.len(), 2);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].kind, WarningKind::UnknownFeatureType);
        assert_eq!(outcome.warnings[0].feature_index, Some(1));
    }

    #[test]
    fn test_count_scales_time() {
        let one = run(&[FeatureInput::new("through_hole", "ø8x20")]);
        let four = run(&[FeatureInput::new("through_hole", "ø8x20").with_count(4)]);
        assert_relative_eq!(
            four.feature_times[0].time_seconds,
            one.feature_times[0].time_seconds * 4.0
        );
    }

    #[test]
    fn test_simple_features_go_to_finishing() {
        let outcome = run(&[FeatureInput::new("deburr", ""), FeatureInput::new("chamfer", "1x45°")]);
        assert!(outcome.roughing_seconds.is_empty());
        assert_eq!(outcome.finishing_seconds, vec![30.0, 15.0]);
    }

    fn seconds_for(kind: &str, detail: String) -> f64 {
        let outcome = run(&[FeatureInput::new(kind, detail)]);
        assert_eq!(outcome.skipped, 0);
        outcome.feature_times[0].time_seconds
    }

    fn assert_non_decreasing(kind: &str, times: &[f64]) {
        for pair in times.windows(2) {
            assert!(pair[1] >= pair[0], "{} time fell from {} to {}", kind, pair[0], pair[1]);
        }
        assert!(times[times.len() - 1] > times[0], "{} time never grew", kind);
    }

    #[test]
    fn test_growing_a_dimension_never_reduces_time() {
        let turned: Vec<f64> = (1..=20)
            .map(|i| seconds_for("outer_diameter", format!("ø30 L={}", i * 10)))
            .collect();
        assert_non_decreasing("outer_diameter", &turned);

        let drilled: Vec<f64> = (1..=30)
            .map(|i| seconds_for("blind_hole", format!("ø8 depth={}", i * 2)))
            .collect();
        assert_non_decreasing("blind_hole", &drilled);

        // Crosses the deep pocket ratio at depth 45
        let pocket: Vec<f64> = (1..=80)
            .map(|depth| seconds_for("pocket", format!("40x15x{}", depth)))
            .collect();
        assert_non_decreasing("pocket", &pocket);
        let constrained = run(&[FeatureInput::new("pocket", "40x15x80")]);
        assert_eq!(constrained.feature_times[0].multiplier, 1.8);

        let threaded: Vec<f64> = (1..=12)
            .map(|i| seconds_for("thread_external", format!("M10x1.5x{}", i * 5)))
            .collect();
        assert_non_decreasing("thread_external", &threaded);
    }

    #[test]
    fn test_titanium_ream_uses_fallback() {
        let catalog = Catalog::builtin();
        let config = EngineConfig::default();
        let outcome = FeatureModel {
            catalog: &catalog,
            profile: catalog.material_profile("titanium").unwrap(),
            mode: Mode::Mid,
            kinematics: &config.kinematics,
            constraints: &config.constraints,
        }
        .run(&[FeatureInput::new("ream", "ø10H7 x 20")]);

        assert_eq!(outcome.skipped, 0);
        assert!(outcome.approximated);
        assert!(outcome.feature_times[0].method_description.contains("fallback"));
        // Reaming is finishing work even when timed with the roughing condition
        assert_eq!(outcome.finishing_seconds.len(), 1);
    }
}
