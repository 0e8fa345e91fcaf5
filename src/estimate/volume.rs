//! Volume model
//!
//! ```text
//! roughing  = material_to_remove / MRR_roughing × constraint multiplier
//! finishing = surface_area / finishing_rate × light multiplier
//! ```

use crate::catalog::{MaterialProfile, Mode};
use crate::config::EngineConfig;
use crate::constraints::{combined_multiplier, detect_geometry, light_multiplier, Constraint};
use crate::geometry::GeometrySnapshot;

#[derive(Debug, Clone, PartialEq)]
pub struct VolumeOutcome {
    pub roughing: f64,
    pub finishing: f64,
    pub constraints: Vec<Constraint>,
}

pub fn estimate_volume(
    snapshot: &GeometrySnapshot,
    profile: &MaterialProfile,
    mode: Mode,
    config: &EngineConfig,
) -> VolumeOutcome {
    let factor = config.modes.factor(mode);
    let roughing_rate = profile.mrr_roughing * factor;
    let finishing_rate = profile.mrr_finishing * factor;

    let constraints = detect_geometry(snapshot, profile, &config.constraints);
    let multiplier = combined_multiplier(&constraints);
    let light = light_multiplier(multiplier, config.constraints.finishing_weight);

    let roughing = snapshot.material_to_remove() / roughing_rate * multiplier;
    let finishing = snapshot.surface_area() / finishing_rate * light;

    log::debug!(
        "volume model: {} cm³ at {} cm³/min ×{}, {} cm² at {} cm²/min ×{}",
        snapshot.material_to_remove(),
        roughing_rate,
        multiplier,
        snapshot.surface_area(),
        finishing_rate,
        light
    );

    VolumeOutcome {
        roughing,
        finishing,
        constraints,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::geometry::{BoundingBox, StockModel};
    use approx::assert_relative_eq;

    fn cube_snapshot() -> GeometrySnapshot {
        GeometrySnapshot::new(
            800.0,
            1000.0,
            600.0,
            BoundingBox::new(100.0, 100.0, 100.0),
            StockModel::BoundingBox,
        )
        .unwrap()
    }

    #[test]
    fn test_roughing_is_exact() {
        let catalog = Catalog::builtin();
        let profile = catalog.material_profile("aluminum").unwrap();
        let outcome = estimate_volume(&cube_snapshot(), profile, Mode::Mid, &EngineConfig::default());
        assert_eq!(outcome.roughing, 4.0);
        assert_eq!(outcome.finishing, 6.0);
        assert!(outcome.constraints.is_empty());
    }

    #[test]
    fn test_aggressive_is_faster() {
        let catalog = Catalog::builtin();
        let profile = catalog.material_profile("steel").unwrap();
        let config = EngineConfig::default();
        let mid = estimate_volume(&cube_snapshot(), profile, Mode::Mid, &config);
        let fast = estimate_volume(&cube_snapshot(), profile, Mode::Aggressive, &config);
        let slow = estimate_volume(&cube_snapshot(), profile, Mode::Conservative, &config);
        assert!(fast.roughing < mid.roughing && mid.roughing < slow.roughing);
    }

    #[test]
    fn test_slender_part_penalized() {
        let catalog = Catalog::builtin();
        let profile = catalog.material_profile("aluminum").unwrap();
        let snapshot = GeometrySnapshot::new(
            60.0,
            80.0,
            90.0,
            BoundingBox::new(20.0, 20.0, 200.0),
            StockModel::BoundingBox,
        )
        .unwrap();
        let outcome = estimate_volume(&snapshot, profile, Mode::Mid, &EngineConfig::default());
        assert_eq!(outcome.constraints.len(), 1);
        assert_relative_eq!(outcome.roughing, 20.0 / 50.0 * 1.25);
        assert_relative_eq!(outcome.finishing, 90.0 / 100.0 * 1.125);
    }
}
