use thiserror::Error;

use crate::config::ValidationLimits;
use crate::request::{EstimateRequest, ModelKind};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{field} is not a finite number")]
    NonFinite { field: &'static str },

    #[error("invalid {field}: {value} (must be positive)")]
    NonPositive { field: &'static str, value: f64 },

    #[error("{field} out of range: {value} (max: {max})")]
    OutOfRange {
        field: &'static str,
        value: f64,
        max: f64,
    },

    #[error("stock volume {stock} cm³ is smaller than part volume {part} cm³")]
    NegativeRemoval { stock: f64, part: f64 },

    #[error("geometry error: {message}")]
    Geometry { message: String },

    #[error("invalid request: {message}")]
    Request { message: String },
}

/// Finite and strictly positive
pub fn positive(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFinite { field });
    }
    if value <= 0.0 {
        return Err(ValidationError::NonPositive { field, value });
    }
    Ok(value)
}

pub struct Validator {
    max_dimension: f64,
    max_features: usize,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(&ValidationLimits::default())
    }
}

impl Validator {
    pub fn new(limits: &ValidationLimits) -> Self {
        Self {
            max_dimension: limits.max_dimension_mm,
            max_features: limits.max_features,
        }
    }

    /// Contract checks that make a request fatal before any estimation work
    pub fn validate_request(&self, req: &EstimateRequest) -> Result<(), ValidationError> {
        if req.part_id.trim().is_empty() {
            return Err(request_error("part_id is empty"));
        }
        if req.material_code.trim().is_empty() {
            return Err(request_error("material_code is empty"));
        }

        match (req.model, &req.geometry, &req.features) {
            (Some(ModelKind::Volume), None, _) => {
                return Err(request_error("volume model requested without geometry"));
            }
            (Some(ModelKind::Feature), _, None) => {
                return Err(request_error("feature model requested without features"));
            }
            (None, None, None) => {
                return Err(request_error("request carries neither geometry nor features"));
            }
            _ => {}
        }

        if let Some(geometry) = &req.geometry {
            positive("geometry.volume", geometry.volume)?;
            positive("geometry.surface_area", geometry.surface_area)?;
            if let Some(stock) = geometry.stock_volume {
                positive("geometry.stock_volume", stock)?;
            }
            if let Some(bbox) = &geometry.bbox {
                self.validate_length("geometry.bbox.dx", bbox.dx)?;
                self.validate_length("geometry.bbox.dy", bbox.dy)?;
                self.validate_length("geometry.bbox.dz", bbox.dz)?;
            }
            if let Some(shape) = &geometry.shape {
                for (field, value) in shape.dimensions() {
                    self.validate_length(field, value)?;
                }
            }
        }

        if let Some(features) = &req.features {
            if features.len() > self.max_features {
                return Err(ValidationError::OutOfRange {
                    field: "features",
                    value: features.len() as f64,
                    max: self.max_features as f64,
                });
            }
        }

        Ok(())
    }

    fn validate_length(&self, field: &'static str, value: f64) -> Result<(), ValidationError> {
        positive(field, value)?;
        if value > self.max_dimension {
            return Err(ValidationError::OutOfRange {
                field,
                value,
                max: self.max_dimension,
            });
        }
        Ok(())
    }
}

fn request_error(message: &str) -> ValidationError {
    ValidationError::Request {
        message: message.to_string(),
    }
}
