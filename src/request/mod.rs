//! Estimation request as received at the boundary

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::catalog::Mode;
use crate::features::FeatureInput;
use crate::geometry::GeometryInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Volume,
    Feature,
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelKind::Volume => write!(f, "volume"),
            ModelKind::Feature => write!(f, "feature"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateRequest {
    pub part_id: String,
    pub material_code: String,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<GeometryInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<FeatureInput>>,
}

impl EstimateRequest {
    pub fn volume(part_id: &str, material_code: &str, geometry: GeometryInput) -> Self {
        Self {
            part_id: part_id.to_string(),
            material_code: material_code.to_string(),
            mode: Mode::default(),
            model: None,
            geometry: Some(geometry),
            features: None,
        }
    }

    pub fn features(part_id: &str, material_code: &str, features: Vec<FeatureInput>) -> Self {
        Self {
            part_id: part_id.to_string(),
            material_code: material_code.to_string(),
            mode: Mode::default(),
            model: None,
            geometry: None,
            features: Some(features),
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Explicit model, else the feature model whenever features were sent
    pub fn selected_model(&self) -> ModelKind {
        match (self.model, &self.features) {
            (Some(model), _) => model,
            (None, Some(_)) => ModelKind::Feature,
            (None, None) => ModelKind::Volume,
        }
    }

    /// SHA-256 of the canonical request JSON
    pub fn fingerprint(&self) -> String {
        // Struct fields serialize in declaration order, so the bytes are stable
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}
