//! Manufacturing features and the detail parser
//!
//! A feature arrives as a type name, a count and a free-text detail such as
//! `"ø30, L=100"`. [`parse_feature`] turns it into a [`Feature`] with typed
//! dimensions, filling gaps with documented defaults.

pub mod extractors;
pub mod threads;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::catalog::{OperationName, OperationType};
use crate::config::KinematicsConfig;
use crate::warning::{Warning, WarningKind};

pub use extractors::{Detail, Dimensions, Field};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    // Turning
    OuterDiameter,
    InnerDiameter,
    Face,
    Taper,
    ProfileTurn,
    Groove,
    PartOff,
    // Drilling
    ThroughHole,
    BlindHole,
    CenterDrill,
    Counterbore,
    Countersink,
    Ream,
    // Milling
    Pocket,
    Slot,
    FaceMill,
    Contour,
    Keyway,
    Step,
    // Threading
    ThreadExternal,
    ThreadInternal,
    TappedHole,
    // Constant time
    Chamfer,
    Radius,
    EdgeBreak,
    Deburr,
    Marking,
}

/// How a feature kind is timed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Turning,
    Facing,
    Grooving,
    Drilling,
    Milling,
    Threading,
    Simple,
}

impl FeatureKind {
    pub const ALL: [FeatureKind; 27] = [
        FeatureKind::OuterDiameter,
        FeatureKind::InnerDiameter,
        FeatureKind::Face,
        FeatureKind::Taper,
        FeatureKind::ProfileTurn,
        FeatureKind::Groove,
        FeatureKind::PartOff,
        FeatureKind::ThroughHole,
        FeatureKind::BlindHole,
        FeatureKind::CenterDrill,
        FeatureKind::Counterbore,
        FeatureKind::Countersink,
        FeatureKind::Ream,
        FeatureKind::Pocket,
        FeatureKind::Slot,
        FeatureKind::FaceMill,
        FeatureKind::Contour,
        FeatureKind::Keyway,
        FeatureKind::Step,
        FeatureKind::ThreadExternal,
        FeatureKind::ThreadInternal,
        FeatureKind::TappedHole,
        FeatureKind::Chamfer,
        FeatureKind::Radius,
        FeatureKind::EdgeBreak,
        FeatureKind::Deburr,
        FeatureKind::Marking,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FeatureKind::OuterDiameter => "outer_diameter",
            FeatureKind::InnerDiameter => "inner_diameter",
            FeatureKind::Face => "face",
            FeatureKind::Taper => "taper",
            FeatureKind::ProfileTurn => "profile_turn",
            FeatureKind::Groove => "groove",
            FeatureKind::PartOff => "part_off",
            FeatureKind::ThroughHole => "through_hole",
            FeatureKind::BlindHole => "blind_hole",
            FeatureKind::CenterDrill => "center_drill",
            FeatureKind::Counterbore => "counterbore",
            FeatureKind::Countersink => "countersink",
            FeatureKind::Ream => "ream",
            FeatureKind::Pocket => "pocket",
            FeatureKind::Slot => "slot",
            FeatureKind::FaceMill => "face_mill",
            FeatureKind::Contour => "contour",
            FeatureKind::Keyway => "keyway",
            FeatureKind::Step => "step",
            FeatureKind::ThreadExternal => "thread_external",
            FeatureKind::ThreadInternal => "thread_internal",
            FeatureKind::TappedHole => "tapped_hole",
            FeatureKind::Chamfer => "chamfer",
            FeatureKind::Radius => "radius",
            FeatureKind::EdgeBreak => "edge_break",
            FeatureKind::Deburr => "deburr",
            FeatureKind::Marking => "marking",
        }
    }

    pub fn family(self) -> Family {
        use FeatureKind::*;
        match self {
            OuterDiameter | InnerDiameter | Taper | ProfileTurn => Family::Turning,
            Face | PartOff => Family::Facing,
            Groove => Family::Grooving,
            ThroughHole | BlindHole | CenterDrill | Counterbore | Countersink | Ream => {
                Family::Drilling
            }
            Pocket | Slot | FaceMill | Contour | Keyway | Step => Family::Milling,
            ThreadExternal | ThreadInternal | TappedHole => Family::Threading,
            Chamfer | Radius | EdgeBreak | Deburr | Marking => Family::Simple,
        }
    }

    /// Catalog operation used to time this kind; `None` for constant-time kinds
    pub fn operation(self) -> Option<(OperationType, OperationName)> {
        use FeatureKind::*;
        let op = match self {
            OuterDiameter | InnerDiameter | Face | Groove | PartOff => {
                (OperationType::Turning, OperationName::Roughing)
            }
            Taper | ProfileTurn => (OperationType::Turning, OperationName::Finishing),
            ThroughHole | BlindHole | CenterDrill | Counterbore | Countersink => {
                (OperationType::Drilling, OperationName::Roughing)
            }
            Ream => (OperationType::Drilling, OperationName::Finishing),
            Pocket | Slot | Keyway | Step => (OperationType::Milling, OperationName::Roughing),
            FaceMill | Contour => (OperationType::Milling, OperationName::Finishing),
            ThreadExternal | ThreadInternal | TappedHole => {
                (OperationType::Threading, OperationName::Roughing)
            }
            Chamfer | Radius | EdgeBreak | Deburr | Marking => return None,
        };
        Some(op)
    }

    /// Meaning of bare `a×b×c` values for this kind
    pub fn positional_layout(self) -> &'static [Field] {
        match self.family() {
            Family::Turning | Family::Threading => &[Field::Diameter, Field::Length],
            Family::Facing => &[Field::Diameter, Field::Depth],
            Family::Grooving => &[Field::Diameter, Field::Width, Field::Depth],
            Family::Drilling => &[Field::Diameter, Field::Depth],
            Family::Milling => &[Field::Length, Field::Width, Field::Depth],
            Family::Simple => &[Field::Length],
        }
    }

    /// Material removed from inside the part (bores, holes, internal threads)
    pub fn is_internal(self) -> bool {
        use FeatureKind::*;
        matches!(
            self,
            InnerDiameter
                | ThroughHole
                | BlindHole
                | Counterbore
                | Ream
                | ThreadInternal
                | TappedHole
        )
    }

    pub fn is_external_diameter(self) -> bool {
        matches!(self, FeatureKind::OuterDiameter | FeatureKind::ThreadExternal)
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFeatureKind(pub String);

impl fmt::Display for UnknownFeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown feature type '{}'", self.0)
    }
}

impl std::error::Error for UnknownFeatureKind {}

impl FromStr for FeatureKind {
    type Err = UnknownFeatureKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();

        let kind = match key.as_str() {
            "outer_diameter" | "od" | "outside_diameter" | "external_diameter" | "turning" => {
                FeatureKind::OuterDiameter
            }
            "inner_diameter" | "id" | "bore" | "boring" => FeatureKind::InnerDiameter,
            "face" | "facing" => FeatureKind::Face,
            "taper" | "cone" => FeatureKind::Taper,
            "profile_turn" | "turned_profile" | "contour_turn" => FeatureKind::ProfileTurn,
            "groove" | "recess" | "undercut" => FeatureKind::Groove,
            "part_off" | "parting" | "cut_off" => FeatureKind::PartOff,
            "through_hole" | "hole" | "drill" | "drilled_hole" => FeatureKind::ThroughHole,
            "blind_hole" => FeatureKind::BlindHole,
            "center_drill" | "centre_drill" | "center_hole" => FeatureKind::CenterDrill,
            "counterbore" => FeatureKind::Counterbore,
            "countersink" => FeatureKind::Countersink,
            "ream" | "reamed_hole" => FeatureKind::Ream,
            "pocket" => FeatureKind::Pocket,
            "slot" => FeatureKind::Slot,
            "face_mill" | "flat" | "planar_face" => FeatureKind::FaceMill,
            "contour" | "profile" | "outline" => FeatureKind::Contour,
            "keyway" | "key_slot" => FeatureKind::Keyway,
            "step" | "shoulder" => FeatureKind::Step,
            "thread_external" | "external_thread" | "thread" => FeatureKind::ThreadExternal,
            "thread_internal" | "internal_thread" => FeatureKind::ThreadInternal,
            "tapped_hole" | "tap" | "tapping" => FeatureKind::TappedHole,
            "chamfer" => FeatureKind::Chamfer,
            "radius" | "fillet" | "round" => FeatureKind::Radius,
            "edge_break" => FeatureKind::EdgeBreak,
            "deburr" | "deburring" => FeatureKind::Deburr,
            "marking" | "engraving" | "engrave" => FeatureKind::Marking,
            _ => return Err(UnknownFeatureKind(s.to_string())),
        };
        Ok(kind)
    }
}

/// A feature as supplied by the recognition step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureInput {
    #[serde(rename = "type")]
    pub feature_type: String,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default)]
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

fn default_count() -> u32 {
    1
}

impl FeatureInput {
    pub fn new(feature_type: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            feature_type: feature_type.into(),
            count: 1,
            detail: detail.into(),
            location: None,
        }
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }
}

/// A feature with typed, completed dimensions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub kind: FeatureKind,
    pub count: u32,
    pub raw_detail: String,
    pub dims: Dimensions,
    /// Pitch came from the ISO coarse table rather than the detail
    #[serde(default)]
    pub pitch_from_table: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFeature {
    pub index: usize,
    pub feature: Feature,
    /// Defaults applied while completing the dimensions
    pub warnings: Vec<Warning>,
}

/// Parse one feature. An `Err` means the feature cannot be timed and carries
/// the warning explaining why.
pub fn parse_feature(
    index: usize,
    input: &FeatureInput,
    cfg: &KinematicsConfig,
) -> Result<ParsedFeature, Warning> {
    let kind: FeatureKind = input
        .feature_type
        .parse()
        .map_err(|e: UnknownFeatureKind| {
            Warning::new(WarningKind::UnknownFeatureType, e.to_string()).for_feature(index)
        })?;

    if input.count == 0 {
        return Err(Warning::new(
            WarningKind::InvalidCount,
            format!("{} has count 0", kind),
        )
        .for_feature(index));
    }

    let detail = Detail::new(&input.detail, kind);
    let found = extractors::extract(&detail);
    let ignored = extractors::unused_text(&detail, &found);

    let mut defaults = Vec::new();
    let completed = complete(kind, found, cfg, &mut defaults).map_err(|message| {
        Warning::new(
            WarningKind::UnparseableDetail,
            format!("{} '{}': {}", kind, input.detail, message),
        )
        .for_feature(index)
        .with_span(0..input.detail.len())
    })?;

    let warnings = defaults
        .into_iter()
        .map(|message| {
            Warning::new(WarningKind::DefaultApplied, format!("{}: {}", kind, message))
                .for_feature(index)
        })
        .chain(ignored.into_iter().map(|(message, span)| {
            Warning::new(WarningKind::IgnoredText, format!("{}: {}", kind, message))
                .for_feature(index)
                .with_span(span)
        }))
        .collect();

    Ok(ParsedFeature {
        index,
        feature: Feature {
            kind,
            count: input.count,
            raw_detail: input.detail.clone(),
            dims: completed.dims,
            pitch_from_table: completed.pitch_from_table,
            location: input.location.clone(),
        },
        warnings,
    })
}

struct Completed {
    dims: Dimensions,
    pitch_from_table: bool,
}

fn require(value: Option<f64>, field: Field) -> Result<f64, String> {
    value.ok_or_else(|| format!("no {} found", field.name()))
}

/// Fill required dimensions the detail left out
fn complete(
    kind: FeatureKind,
    mut d: Dimensions,
    cfg: &KinematicsConfig,
    defaults: &mut Vec<String>,
) -> Result<Completed, String> {
    let mut pitch_from_table = false;

    match kind.family() {
        Family::Turning => {
            let dia = require(d.diameter, Field::Diameter)?;
            if d.length.is_none() {
                d.length = Some(dia);
                defaults.push(format!("length missing, assumed {} mm (= diameter)", dia));
            }
        }
        Family::Facing => {
            let dia = require(d.diameter, Field::Diameter)?;
            // Radial travel from the outside to the centre
            if d.length.is_none() {
                d.length = Some(dia / 2.0);
                defaults.push(format!(
                    "length missing, assumed {} mm (= radius, face to centre)",
                    dia / 2.0
                ));
            }
        }
        Family::Grooving => {
            require(d.diameter, Field::Diameter)?;
            if d.width.is_none() {
                d.width = Some(cfg.groove_insert_mm);
                defaults.push(format!(
                    "width missing, assumed one insert width {} mm",
                    cfg.groove_insert_mm
                ));
            }
            if d.depth.is_none() {
                d.depth = Some(cfg.default_groove_depth_mm);
                defaults.push(format!(
                    "depth missing, assumed {} mm",
                    cfg.default_groove_depth_mm
                ));
            }
        }
        Family::Drilling => {
            let dia = require(d.diameter, Field::Diameter)?;
            if d.depth.is_none() {
                if let Some(length) = d.length {
                    d.depth = Some(length);
                } else {
                    let depth = dia * cfg.drill_depth_factor;
                    d.depth = Some(depth);
                    defaults.push(format!(
                        "depth missing, assumed {} mm ({}× diameter)",
                        depth, cfg.drill_depth_factor
                    ));
                }
            }
        }
        Family::Milling => {
            let default_depth = match kind {
                FeatureKind::FaceMill => cfg.default_face_depth_mm,
                _ => cfg.default_milling_depth_mm,
            };
            match (d.length, d.width) {
                (None, None) => return Err("no length or width found".to_string()),
                (Some(length), None) if kind != FeatureKind::Contour => {
                    d.width = Some(length);
                    defaults.push(format!("width missing, assumed {} mm (= length)", length));
                }
                (None, Some(width)) => {
                    d.length = Some(width);
                    defaults.push(format!("length missing, assumed {} mm (= width)", width));
                }
                _ => {}
            }
            if d.depth.is_none() {
                d.depth = Some(default_depth);
                defaults.push(format!("depth missing, assumed {} mm", default_depth));
            }
        }
        Family::Threading => {
            let dia = require(d.diameter, Field::Diameter)?;
            if d.pitch.is_none() {
                let pitch = threads::coarse_pitch(dia).ok_or_else(|| {
                    format!("no pitch given and M{} has no ISO coarse pitch", dia)
                })?;
                d.pitch = Some(pitch);
                pitch_from_table = true;
            }
            if d.length.is_none() {
                if let Some(depth) = d.depth {
                    d.length = Some(depth);
                } else {
                    d.length = Some(dia);
                    defaults.push(format!("thread length missing, assumed {} mm (= diameter)", dia));
                }
            }
        }
        Family::Simple => {}
    }

    for (field, value) in d.values() {
        if !value.is_finite() || value <= 0.0 {
            return Err(format!("{} must be positive, got {}", field.name(), value));
        }
    }
    if let (Some(pitch), Some(dia)) = (d.pitch, d.diameter) {
        if pitch >= dia {
            return Err(format!("pitch {} is not smaller than diameter {}", pitch, dia));
        }
    }

    Ok(Completed {
        dims: d,
        pitch_from_table,
    })
}
