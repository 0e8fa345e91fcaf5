//! Built-in reference catalog - metric carbide tooling values
//!
//! Conditions are given for `mid` mode. Conservative and aggressive modes are
//! derived by scaling cutting speed and feed.

use super::*;

/// (cutting speed factor, feed factor) per derived mode
const MODE_SCALING: [(Mode, f64, f64); 2] = [
    (Mode::Conservative, 0.85, 0.9),
    (Mode::Aggressive, 1.15, 1.1),
];

struct Row {
    operation_type: OperationType,
    operation_name: OperationName,
    vc: f64,
    f: f64,
    ap: f64,
    feed_per_tooth: Option<f64>,
    tooth_count: Option<u32>,
}

const fn row(
    operation_type: OperationType,
    operation_name: OperationName,
    vc: f64,
    f: f64,
    ap: f64,
) -> Row {
    Row {
        operation_type,
        operation_name,
        vc,
        f,
        ap,
        feed_per_tooth: None,
        tooth_count: None,
    }
}

const fn mill(operation_name: OperationName, vc: f64, ap: f64, fz: f64, z: u32) -> Row {
    Row {
        operation_type: OperationType::Milling,
        operation_name,
        vc,
        f: 0.0,
        ap,
        feed_per_tooth: Some(fz),
        tooth_count: Some(z),
    }
}

use OperationName::{Finishing, Roughing};
use OperationType::{Drilling, Threading, Turning};

const ALUMINUM: &[Row] = &[
    row(Turning, Roughing, 200.0, 0.25, 3.0),
    row(Turning, Finishing, 300.0, 0.10, 0.5),
    row(Drilling, Roughing, 100.0, 0.15, 0.0),
    row(Drilling, Finishing, 40.0, 0.30, 0.2),
    mill(Roughing, 250.0, 4.0, 0.08, 3),
    mill(Finishing, 350.0, 0.5, 0.05, 3),
    row(Threading, Roughing, 60.0, 0.0, 0.1),
];

const STEEL: &[Row] = &[
    row(Turning, Roughing, 150.0, 0.25, 2.5),
    row(Turning, Finishing, 220.0, 0.10, 0.5),
    row(Drilling, Roughing, 70.0, 0.12, 0.0),
    row(Drilling, Finishing, 10.0, 0.25, 0.15),
    mill(Roughing, 150.0, 3.0, 0.075, 4),
    mill(Finishing, 200.0, 0.5, 0.05, 4),
    row(Threading, Roughing, 50.0, 0.0, 0.1),
];

const STAINLESS: &[Row] = &[
    row(Turning, Roughing, 120.0, 0.20, 2.0),
    row(Turning, Finishing, 160.0, 0.08, 0.4),
    row(Drilling, Roughing, 50.0, 0.08, 0.0),
    row(Drilling, Finishing, 8.0, 0.20, 0.1),
    mill(Roughing, 100.0, 2.0, 0.05, 4),
    mill(Finishing, 140.0, 0.3, 0.04, 4),
    row(Threading, Roughing, 40.0, 0.0, 0.08),
];

// No reaming entry: reaming resolves through the drilling fallback.
const TITANIUM: &[Row] = &[
    row(Turning, Roughing, 50.0, 0.15, 1.5),
    row(Turning, Finishing, 70.0, 0.08, 0.3),
    row(Drilling, Roughing, 25.0, 0.06, 0.0),
    mill(Roughing, 45.0, 1.5, 0.04, 4),
    mill(Finishing, 60.0, 0.3, 0.03, 4),
    row(Threading, Roughing, 20.0, 0.0, 0.05),
];

const BRASS: &[Row] = &[
    row(Turning, Roughing, 250.0, 0.25, 3.0),
    row(Turning, Finishing, 350.0, 0.10, 0.5),
    row(Drilling, Roughing, 120.0, 0.18, 0.0),
    row(Drilling, Finishing, 50.0, 0.30, 0.2),
    mill(Roughing, 300.0, 4.0, 0.10, 3),
    mill(Finishing, 400.0, 0.5, 0.06, 3),
    row(Threading, Roughing, 80.0, 0.0, 0.12),
];

const CAST_IRON: &[Row] = &[
    row(Turning, Roughing, 120.0, 0.30, 3.0),
    row(Turning, Finishing, 180.0, 0.12, 0.5),
    row(Drilling, Roughing, 70.0, 0.20, 0.0),
    mill(Roughing, 130.0, 3.0, 0.10, 4),
    mill(Finishing, 180.0, 0.5, 0.06, 4),
    row(Threading, Roughing, 40.0, 0.0, 0.1),
];

const PLASTIC: &[Row] = &[
    row(Turning, Roughing, 300.0, 0.30, 3.0),
    row(Turning, Finishing, 400.0, 0.12, 0.5),
    row(Drilling, Roughing, 120.0, 0.20, 0.0),
    mill(Roughing, 400.0, 4.0, 0.15, 2),
    mill(Finishing, 500.0, 0.5, 0.10, 2),
    row(Threading, Roughing, 100.0, 0.0, 0.15),
];

const GROUPS: [(&str, &[Row]); 7] = [
    ("aluminum", ALUMINUM),
    ("steel", STEEL),
    ("stainless", STAINLESS),
    ("titanium", TITANIUM),
    ("brass", BRASS),
    ("cast_iron", CAST_IRON),
    ("plastic", PLASTIC),
];

/// Build the complete built-in catalog document
pub fn builtin_document() -> CatalogDocument {
    CatalogDocument {
        materials: load_material_profiles(),
        conditions: load_cutting_conditions(),
    }
}

pub fn load_material_profiles() -> Vec<MaterialProfile> {
    let mut db = Vec::new();

    // NON-FERROUS
    // ===========

    db.push(MaterialProfile {
        code: "aluminum".to_string(),
        group: "aluminum".to_string(),
        name: "Aluminum 6061-T6".to_string(),
        aliases: vec!["al6061".to_string(), "6061".to_string(), "en_aw_6061".to_string()],
        density: 2.70,
        mrr_roughing: 50.0,
        mrr_finishing: 100.0,
        cutting_speed_roughing: 200.0,
        deep_pocket_penalty: 1.8,
        thin_wall_penalty: 1.5,
        base_setup_time: 30.0,
    });

    db.push(MaterialProfile {
        code: "al7075".to_string(),
        group: "aluminum".to_string(),
        name: "Aluminum 7075-T6".to_string(),
        aliases: vec!["7075".to_string(), "en_aw_7075".to_string()],
        density: 2.81,
        mrr_roughing: 45.0,
        mrr_finishing: 90.0,
        cutting_speed_roughing: 180.0,
        deep_pocket_penalty: 1.8,
        thin_wall_penalty: 1.5,
        base_setup_time: 30.0,
    });

    db.push(MaterialProfile {
        code: "brass".to_string(),
        group: "brass".to_string(),
        name: "Free machining brass CuZn39Pb3".to_string(),
        aliases: vec!["cuzn39pb3".to_string(), "c360".to_string()],
        density: 8.47,
        mrr_roughing: 60.0,
        mrr_finishing: 120.0,
        cutting_speed_roughing: 250.0,
        deep_pocket_penalty: 1.6,
        thin_wall_penalty: 1.4,
        base_setup_time: 30.0,
    });

    // STEELS
    // ======

    db.push(MaterialProfile {
        code: "steel".to_string(),
        group: "steel".to_string(),
        name: "Structural steel S235".to_string(),
        aliases: vec!["s235".to_string(), "1018".to_string(), "mild_steel".to_string()],
        density: 7.85,
        mrr_roughing: 20.0,
        mrr_finishing: 60.0,
        cutting_speed_roughing: 150.0,
        deep_pocket_penalty: 2.0,
        thin_wall_penalty: 1.6,
        base_setup_time: 45.0,
    });

    db.push(MaterialProfile {
        code: "c45".to_string(),
        group: "steel".to_string(),
        name: "Medium carbon steel C45".to_string(),
        aliases: vec!["1045".to_string(), "ck45".to_string()],
        density: 7.85,
        mrr_roughing: 16.0,
        mrr_finishing: 50.0,
        cutting_speed_roughing: 130.0,
        deep_pocket_penalty: 2.0,
        thin_wall_penalty: 1.6,
        base_setup_time: 45.0,
    });

    db.push(MaterialProfile {
        code: "stainless".to_string(),
        group: "stainless".to_string(),
        name: "Austenitic stainless 1.4301".to_string(),
        aliases: vec!["304".to_string(), "1.4301".to_string(), "316l".to_string()],
        density: 7.90,
        mrr_roughing: 10.0,
        mrr_finishing: 40.0,
        cutting_speed_roughing: 120.0,
        deep_pocket_penalty: 2.2,
        thin_wall_penalty: 1.8,
        base_setup_time: 50.0,
    });

    db.push(MaterialProfile {
        code: "cast_iron".to_string(),
        group: "cast_iron".to_string(),
        name: "Grey cast iron EN-GJL-250".to_string(),
        aliases: vec!["gg25".to_string(), "en_gjl_250".to_string()],
        density: 7.20,
        mrr_roughing: 25.0,
        mrr_finishing: 70.0,
        cutting_speed_roughing: 120.0,
        deep_pocket_penalty: 1.9,
        thin_wall_penalty: 1.7,
        base_setup_time: 40.0,
    });

    // TITANIUM
    // ========

    db.push(MaterialProfile {
        code: "titanium".to_string(),
        group: "titanium".to_string(),
        name: "Titanium Ti-6Al-4V".to_string(),
        aliases: vec!["ti6al4v".to_string(), "grade5".to_string()],
        density: 4.43,
        mrr_roughing: 5.0,
        mrr_finishing: 25.0,
        cutting_speed_roughing: 50.0,
        deep_pocket_penalty: 2.5,
        thin_wall_penalty: 2.0,
        base_setup_time: 60.0,
    });

    // PLASTICS
    // ========

    db.push(MaterialProfile {
        code: "pom".to_string(),
        group: "plastic".to_string(),
        name: "Acetal POM-C".to_string(),
        aliases: vec!["delrin".to_string(), "acetal".to_string()],
        density: 1.41,
        mrr_roughing: 80.0,
        mrr_finishing: 150.0,
        cutting_speed_roughing: 300.0,
        deep_pocket_penalty: 1.5,
        thin_wall_penalty: 1.3,
        base_setup_time: 20.0,
    });

    db
}

pub fn load_cutting_conditions() -> Vec<ConditionEntry> {
    let mut entries = Vec::new();

    for (group, rows) in GROUPS {
        for row in rows {
            // Milling feed per revolution follows from the tooth data.
            let f = match (row.feed_per_tooth, row.tooth_count) {
                (Some(fz), Some(z)) => fz * z as f64,
                _ => row.f,
            };
            let condition = CuttingCondition {
                vc: row.vc,
                f,
                ap: row.ap,
                feed_per_tooth: row.feed_per_tooth,
                tooth_count: row.tooth_count,
            };
            entries.push(entry(group, row, Mode::Mid, condition.clone()));

            for (mode, vc_factor, f_factor) in MODE_SCALING {
                let scaled = CuttingCondition {
                    vc: condition.vc * vc_factor,
                    f: condition.f * f_factor,
                    feed_per_tooth: condition.feed_per_tooth.map(|fz| fz * f_factor),
                    ..condition.clone()
                };
                entries.push(entry(group, row, mode, scaled));
            }
        }
    }

    entries
}

fn entry(group: &str, row: &Row, mode: Mode, condition: CuttingCondition) -> ConditionEntry {
    ConditionEntry {
        key: ConditionKey {
            material_group: group.to_string(),
            operation_type: row.operation_type,
            operation_name: row.operation_name,
            mode,
        },
        condition,
    }
}
