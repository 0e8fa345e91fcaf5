//! ISO 261 metric coarse thread pitches

/// (nominal diameter mm, coarse pitch mm)
pub const ISO_COARSE_PITCH: [(f64, f64); 31] = [
    (1.0, 0.25),
    (1.2, 0.25),
    (1.4, 0.3),
    (1.6, 0.35),
    (2.0, 0.4),
    (2.5, 0.45),
    (3.0, 0.5),
    (4.0, 0.7),
    (5.0, 0.8),
    (6.0, 1.0),
    (8.0, 1.25),
    (10.0, 1.5),
    (12.0, 1.75),
    (14.0, 2.0),
    (16.0, 2.0),
    (18.0, 2.5),
    (20.0, 2.5),
    (22.0, 2.5),
    (24.0, 3.0),
    (27.0, 3.0),
    (30.0, 3.5),
    (33.0, 3.5),
    (36.0, 4.0),
    (39.0, 4.0),
    (42.0, 4.5),
    (45.0, 4.5),
    (48.0, 5.0),
    (52.0, 5.0),
    (56.0, 5.5),
    (60.0, 5.5),
    (64.0, 6.0),
];

/// Coarse pitch for an exact table nominal diameter. Sizes outside the table
/// return `None`; nothing is interpolated.
pub fn coarse_pitch(nominal_diameter: f64) -> Option<f64> {
    ISO_COARSE_PITCH
        .iter()
        .find(|(d, _)| (d - nominal_diameter).abs() < 1e-9)
        .map(|&(_, pitch)| pitch)
}
