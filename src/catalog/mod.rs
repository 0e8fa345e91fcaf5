//! Material and cutting-condition catalog
//!
//! Read-only reference data: material profiles for the volume model and
//! cutting conditions for the feature model, keyed by
//! (material group, operation type, operation name, mode).
//!
//! A catalog is built once, validated, and then shared behind an `Arc`.
//! Nothing in the estimation path mutates it; a refresh builds a new catalog.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

pub mod materials;

/// Machining mode, selects which set of cutting conditions applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Conservative,
    #[default]
    Mid,
    Aggressive,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Conservative => write!(f, "conservative"),
            Mode::Mid => write!(f, "mid"),
            Mode::Aggressive => write!(f, "aggressive"),
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conservative" | "low" => Ok(Mode::Conservative),
            "mid" | "medium" | "standard" => Ok(Mode::Mid),
            "aggressive" | "high" => Ok(Mode::Aggressive),
            other => Err(format!("unknown mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Turning,
    Drilling,
    Milling,
    Threading,
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationType::Turning => write!(f, "turning"),
            OperationType::Drilling => write!(f, "drilling"),
            OperationType::Milling => write!(f, "milling"),
            OperationType::Threading => write!(f, "threading"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationName {
    Roughing,
    Finishing,
}

impl OperationName {
    /// The operation tried when this one has no catalog entry
    pub fn complement(self) -> Self {
        match self {
            OperationName::Roughing => OperationName::Finishing,
            OperationName::Finishing => OperationName::Roughing,
        }
    }
}

impl std::fmt::Display for OperationName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationName::Roughing => write!(f, "roughing"),
            OperationName::Finishing => write!(f, "finishing"),
        }
    }
}

/// Material reference data used by both time models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialProfile {
    pub code: String,
    /// Cutting-condition group this material is machined with
    pub group: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub density: f64,               // g/cm³
    pub mrr_roughing: f64,          // cm³/min
    pub mrr_finishing: f64,         // cm²/min of finished surface
    pub cutting_speed_roughing: f64, // m/min, reference Vc
    pub deep_pocket_penalty: f64,
    pub thin_wall_penalty: f64,
    pub base_setup_time: f64, // minutes
}

/// Cutting parameters for one catalog key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CuttingCondition {
    /// Cutting speed, m/min
    pub vc: f64,
    /// Feed per revolution, mm/rev
    pub f: f64,
    /// Depth of cut, mm
    pub ap: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_per_tooth: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooth_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConditionKey {
    pub material_group: String,
    pub operation_type: OperationType,
    pub operation_name: OperationName,
    pub mode: Mode,
}

/// One row of the on-disk catalog format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionEntry {
    #[serde(flatten)]
    pub key: ConditionKey,
    #[serde(flatten)]
    pub condition: CuttingCondition,
}

/// Serializable catalog, the JSON interchange format
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogDocument {
    pub materials: Vec<MaterialProfile>,
    pub conditions: Vec<ConditionEntry>,
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid catalog json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid material {code}: {message}")]
    InvalidMaterial { code: String, message: String },

    #[error("invalid cutting condition {key}: {message}")]
    InvalidCondition { key: String, message: String },

    #[error("duplicate catalog entry: {0}")]
    Duplicate(String),
}

/// A cutting-condition miss after the complementary-operation fallback
#[derive(Error, Debug, Clone, PartialEq)]
#[error("no cutting condition for {material_group}/{operation_type}/{operation_name} in {mode} mode")]
pub struct ConditionNotFound {
    pub material_group: String,
    pub operation_type: OperationType,
    pub operation_name: OperationName,
    pub mode: Mode,
}

/// A successful lookup, recording whether the fallback was used
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolved<'a> {
    pub condition: &'a CuttingCondition,
    pub operation_name: OperationName,
    pub fallback: bool,
}

/// Immutable catalog snapshot
#[derive(Debug, Clone)]
pub struct Catalog {
    materials: BTreeMap<String, MaterialProfile>,
    aliases: BTreeMap<String, String>,
    conditions: BTreeMap<ConditionKey, CuttingCondition>,
    fingerprint: String,
}

impl Catalog {
    /// The built-in reference catalog
    pub fn builtin() -> Self {
        // The built-in tables are covered by tests; a failure here is a code bug.
        Self::from_document(materials::builtin_document())
            .expect("built-in catalog must validate")
    }

    pub fn from_json(source: &str) -> Result<Self, CatalogError> {
        let document: CatalogDocument = serde_json::from_str(source)?;
        Self::from_document(document)
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let source = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&source)
    }

    pub fn from_document(document: CatalogDocument) -> Result<Self, CatalogError> {
        let mut materials = BTreeMap::new();
        let mut aliases = BTreeMap::new();

        for mut profile in document.materials {
            profile.code = normalize_key(&profile.code);
            profile.group = normalize_key(&profile.group);
            validate_profile(&profile)?;

            for alias in &profile.aliases {
                let alias = normalize_key(alias);
                if alias != profile.code
                    && aliases.insert(alias.clone(), profile.code.clone()).is_some()
                {
                    return Err(CatalogError::Duplicate(format!("material alias {}", alias)));
                }
            }
            let code = profile.code.clone();
            if materials.insert(code.clone(), profile).is_some() {
                return Err(CatalogError::Duplicate(format!("material {}", code)));
            }
        }

        if let Some(alias) = aliases.keys().find(|alias| materials.contains_key(*alias)) {
            return Err(CatalogError::Duplicate(format!(
                "alias {} shadows a material code",
                alias
            )));
        }

        let mut conditions = BTreeMap::new();
        for entry in document.conditions {
            let mut key = entry.key;
            key.material_group = normalize_key(&key.material_group);
            validate_condition(&key, &entry.condition)?;

            let label = describe_key(&key);
            if conditions.insert(key, entry.condition).is_some() {
                return Err(CatalogError::Duplicate(format!("condition {}", label)));
            }
        }

        let mut catalog = Self {
            materials,
            aliases,
            conditions,
            fingerprint: String::new(),
        };
        catalog.fingerprint = catalog.compute_fingerprint();

        log::debug!(
            "catalog loaded: {} materials, {} conditions, fingerprint {}",
            catalog.materials.len(),
            catalog.conditions.len(),
            &catalog.fingerprint[..12]
        );

        Ok(catalog)
    }

    /// Canonical document, sorted by key
    pub fn to_document(&self) -> CatalogDocument {
        CatalogDocument {
            materials: self.materials.values().cloned().collect(),
            conditions: self
                .conditions
                .iter()
                .map(|(key, condition)| ConditionEntry {
                    key: key.clone(),
                    condition: condition.clone(),
                })
                .collect(),
        }
    }

    /// SHA-256 of the canonical document, hex encoded
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn compute_fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        // Serializing plain structs of strings and floats cannot fail.
        let bytes = serde_json::to_vec(&self.to_document()).unwrap_or_default();
        hasher.update(&bytes);
        hex::encode(hasher.finalize())
    }

    /// Look up a material by code or alias, case-insensitively
    pub fn material_profile(&self, code: &str) -> Option<&MaterialProfile> {
        let key = normalize_key(code);
        self.materials.get(&key).or_else(|| {
            self.aliases
                .get(&key)
                .and_then(|canonical| self.materials.get(canonical))
        })
    }

    /// Resolve cutting parameters: exact key first, then the complementary
    /// operation name of the same operation type.
    pub fn resolve(
        &self,
        material_group: &str,
        operation_type: OperationType,
        operation_name: OperationName,
        mode: Mode,
    ) -> Result<Resolved<'_>, ConditionNotFound> {
        let mut key = ConditionKey {
            material_group: normalize_key(material_group),
            operation_type,
            operation_name,
            mode,
        };

        if let Some(condition) = self.conditions.get(&key) {
            return Ok(Resolved {
                condition,
                operation_name,
                fallback: false,
            });
        }

        key.operation_name = operation_name.complement();
        if let Some(condition) = self.conditions.get(&key) {
            return Ok(Resolved {
                condition,
                operation_name: key.operation_name,
                fallback: true,
            });
        }

        Err(ConditionNotFound {
            material_group: key.material_group,
            operation_type,
            operation_name,
            mode,
        })
    }

    /// List all material codes
    pub fn list_materials(&self) -> Vec<&String> {
        self.materials.keys().collect()
    }

    pub fn materials(&self) -> impl Iterator<Item = &MaterialProfile> {
        self.materials.values()
    }

    pub fn condition_count(&self) -> usize {
        self.conditions.len()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_lowercase().replace([' ', '-'], "_")
}

fn describe_key(key: &ConditionKey) -> String {
    format!(
        "{}/{}/{}/{}",
        key.material_group, key.operation_type, key.operation_name, key.mode
    )
}

fn validate_profile(profile: &MaterialProfile) -> Result<(), CatalogError> {
    let fail = |message: String| CatalogError::InvalidMaterial {
        code: profile.code.clone(),
        message,
    };

    if profile.code.is_empty() {
        return Err(fail("empty material code".to_string()));
    }
    if profile.group.is_empty() {
        return Err(fail("empty material group".to_string()));
    }

    let rates = [
        ("density", profile.density),
        ("mrr_roughing", profile.mrr_roughing),
        ("mrr_finishing", profile.mrr_finishing),
        ("cutting_speed_roughing", profile.cutting_speed_roughing),
    ];
    for (name, value) in rates {
        if !value.is_finite() || value <= 0.0 {
            return Err(fail(format!("{} must be positive, got {}", name, value)));
        }
    }

    // Penalties only ever slow an estimate down.
    for (name, value) in [
        ("deep_pocket_penalty", profile.deep_pocket_penalty),
        ("thin_wall_penalty", profile.thin_wall_penalty),
    ] {
        if !value.is_finite() || value < 1.0 {
            return Err(fail(format!("{} must be at least 1.0, got {}", name, value)));
        }
    }

    if !profile.base_setup_time.is_finite() || profile.base_setup_time < 0.0 {
        return Err(fail(format!(
            "base_setup_time must not be negative, got {}",
            profile.base_setup_time
        )));
    }

    Ok(())
}

fn validate_condition(key: &ConditionKey, condition: &CuttingCondition) -> Result<(), CatalogError> {
    let fail = |message: String| CatalogError::InvalidCondition {
        key: describe_key(key),
        message,
    };

    if key.material_group.is_empty() {
        return Err(fail("empty material group".to_string()));
    }
    if !condition.vc.is_finite() || condition.vc <= 0.0 {
        return Err(fail(format!("vc must be positive, got {}", condition.vc)));
    }
    if !condition.f.is_finite() || condition.f < 0.0 {
        return Err(fail(format!("f must not be negative, got {}", condition.f)));
    }
    if !condition.ap.is_finite() || condition.ap < 0.0 {
        return Err(fail(format!("ap must not be negative, got {}", condition.ap)));
    }
    if let Some(fz) = condition.feed_per_tooth {
        if !fz.is_finite() || fz <= 0.0 {
            return Err(fail(format!("feed_per_tooth must be positive, got {}", fz)));
        }
    }
    if condition.tooth_count == Some(0) {
        return Err(fail("tooth_count must be at least 1".to_string()));
    }

    Ok(())
}
