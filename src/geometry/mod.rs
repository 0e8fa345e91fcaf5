//! Geometry normalizer
//!
//! Raw solid measurements become an immutable [`GeometrySnapshot`]. Volumes
//! and areas are in cm³ / cm², lengths in mm.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::config::GeometryConfig;
use crate::validator::{positive, ValidationError};

const MM3_PER_CM3: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
}

impl BoundingBox {
    pub fn new(dx: f64, dy: f64, dz: f64) -> Self {
        Self { dx, dy, dz }
    }

    pub fn volume_cm3(&self) -> f64 {
        self.dx * self.dy * self.dz / MM3_PER_CM3
    }

    /// Stock cylinder around the box: radius = max(dx, dy) / 2, height = dz
    pub fn cylinder_volume_cm3(&self) -> f64 {
        let r = self.dx.max(self.dy) / 2.0;
        PI * r * r * self.dz / MM3_PER_CM3
    }

    pub fn longest(&self) -> f64 {
        self.dx.max(self.dy).max(self.dz)
    }

    pub fn shortest(&self) -> f64 {
        self.dx.min(self.dy).min(self.dz)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockModel {
    BoundingBox,
    Cylinder,
}

/// Explicit shape classification from the recognition step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShapeInput {
    Cylinder { diameter: f64, length: f64 },
    Block { dx: f64, dy: f64, dz: f64 },
}

impl ShapeInput {
    pub fn bounding_box(&self) -> BoundingBox {
        match *self {
            ShapeInput::Cylinder { diameter, length } => BoundingBox::new(diameter, diameter, length),
            ShapeInput::Block { dx, dy, dz } => BoundingBox::new(dx, dy, dz),
        }
    }

    pub fn stock_model(&self) -> StockModel {
        match self {
            ShapeInput::Cylinder { .. } => StockModel::Cylinder,
            ShapeInput::Block { .. } => StockModel::BoundingBox,
        }
    }

    pub fn dimensions(&self) -> Vec<(&'static str, f64)> {
        match *self {
            ShapeInput::Cylinder { diameter, length } => vec![
                ("geometry.shape.diameter", diameter),
                ("geometry.shape.length", length),
            ],
            ShapeInput::Block { dx, dy, dz } => vec![
                ("geometry.shape.dx", dx),
                ("geometry.shape.dy", dy),
                ("geometry.shape.dz", dz),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryInput {
    /// Part volume, cm³
    pub volume: f64,
    /// Part surface area, cm²
    pub surface_area: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock_volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<ShapeInput>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeometrySnapshot {
    part_volume: f64,
    stock_volume: f64,
    material_to_remove: f64,
    surface_area: f64,
    bounding_box: BoundingBox,
    stock_model: StockModel,
}

impl GeometrySnapshot {
    pub fn new(
        part_volume: f64,
        stock_volume: f64,
        surface_area: f64,
        bounding_box: BoundingBox,
        stock_model: StockModel,
    ) -> Result<Self, ValidationError> {
        positive("part_volume", part_volume)?;
        positive("stock_volume", stock_volume)?;
        positive("surface_area", surface_area)?;
        positive("bounding_box.dx", bounding_box.dx)?;
        positive("bounding_box.dy", bounding_box.dy)?;
        positive("bounding_box.dz", bounding_box.dz)?;

        let material_to_remove = stock_volume - part_volume;
        if material_to_remove < 0.0 {
            return Err(ValidationError::NegativeRemoval {
                stock: stock_volume,
                part: part_volume,
            });
        }

        Ok(Self {
            part_volume,
            stock_volume,
            material_to_remove,
            surface_area,
            bounding_box,
            stock_model,
        })
    }

    pub fn part_volume(&self) -> f64 {
        self.part_volume
    }

    pub fn stock_volume(&self) -> f64 {
        self.stock_volume
    }

    pub fn material_to_remove(&self) -> f64 {
        self.material_to_remove
    }

    pub fn surface_area(&self) -> f64 {
        self.surface_area
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.bounding_box
    }

    pub fn stock_model(&self) -> StockModel {
        self.stock_model
    }
}

/// Round bar when the cross section is square within tolerance, the z axis
/// dominates it, and the bar can hold the part; a block otherwise
pub fn choose_stock_model(bbox: &BoundingBox, part_volume: f64, cfg: &GeometryConfig) -> StockModel {
    let widest = bbox.dx.max(bbox.dy);
    let roundish = (bbox.dx - bbox.dy).abs() / widest <= cfg.roundness_tolerance;
    let single_axis = bbox.dz > widest * cfg.axis_dominance;
    if roundish && single_axis && part_volume <= bbox.cylinder_volume_cm3() {
        StockModel::Cylinder
    } else {
        StockModel::BoundingBox
    }
}

pub fn normalize(input: &GeometryInput, cfg: &GeometryConfig) -> Result<GeometrySnapshot, ValidationError> {
    let (bbox, model) = match (&input.shape, &input.bbox) {
        (Some(shape), bbox) => (bbox.unwrap_or_else(|| shape.bounding_box()), shape.stock_model()),
        (None, Some(bbox)) => (
            *bbox,
            choose_stock_model(bbox, input.volume, cfg),
        ),
        (None, None) => {
            return Err(ValidationError::Geometry {
                message: "either bbox or shape is required".to_string(),
            })
        }
    };

    let stock_volume = match input.stock_volume {
        Some(stock) => stock,
        None => match model {
            StockModel::Cylinder => bbox.cylinder_volume_cm3(),
            StockModel::BoundingBox => bbox.volume_cm3(),
        },
    };

    log::debug!(
        "normalized geometry: {:?} stock {} cm³, part {} cm³",
        model,
        stock_volume,
        input.volume
    );

    GeometrySnapshot::new(input.volume, stock_volume, input.surface_area, bbox, model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn input(bbox: BoundingBox, volume: f64) -> GeometryInput {
        GeometryInput {
            volume,
            surface_area: 100.0,
            bbox: Some(bbox),
            stock_volume: None,
            shape: None,
        }
    }

    #[test]
    fn test_explicit_stock_volume() {
        let mut g = input(BoundingBox::new(100.0, 100.0, 100.0), 800.0);
        g.stock_volume = Some(1000.0);
        g.surface_area = 600.0;
        let snap = normalize(&g, &GeometryConfig::default()).unwrap();
        assert_eq!(snap.material_to_remove(), 200.0);
        assert_eq!(snap.surface_area(), 600.0);
    }

    #[test]
    fn test_square_section_becomes_cylinder() {
        let bbox = BoundingBox::new(40.0, 40.0, 100.0);
        let snap = normalize(&input(bbox, 50.0), &GeometryConfig::default()).unwrap();
        assert_eq!(snap.stock_model(), StockModel::Cylinder);
        assert_relative_eq!(snap.stock_volume(), PI * 20.0 * 20.0 * 100.0 / 1000.0);
    }

    #[test]
    fn test_flat_section_is_block() {
        let bbox = BoundingBox::new(100.0, 40.0, 20.0);
        let snap = normalize(&input(bbox, 50.0), &GeometryConfig::default()).unwrap();
        assert_eq!(snap.stock_model(), StockModel::BoundingBox);
        assert_relative_eq!(snap.stock_volume(), 80.0);
    }

    #[test]
    fn test_part_that_fills_box_corners_is_block() {
        // Cylinder of 40×40×100 holds ~125.7 cm³, the box 160 cm³
        let bbox = BoundingBox::new(40.0, 40.0, 100.0);
        let snap = normalize(&input(bbox, 150.0), &GeometryConfig::default()).unwrap();
        assert_eq!(snap.stock_model(), StockModel::BoundingBox);
    }

    #[test]
    fn test_cube_without_dominant_axis_is_block() {
        let bbox = BoundingBox::new(100.0, 100.0, 100.0);
        let snap = normalize(&input(bbox, 300.0), &GeometryConfig::default()).unwrap();
        assert_eq!(snap.stock_model(), StockModel::BoundingBox);
        assert_relative_eq!(snap.stock_volume(), 1000.0);

        // A short square disc is not bar stock either
        let disc = BoundingBox::new(80.0, 80.0, 20.0);
        assert_eq!(
            choose_stock_model(&disc, 10.0, &GeometryConfig::default()),
            StockModel::BoundingBox
        );
    }

    #[test]
    fn test_axis_dominance_is_configurable() {
        let cfg = GeometryConfig {
            axis_dominance: 3.0,
            ..GeometryConfig::default()
        };
        let bbox = BoundingBox::new(40.0, 40.0, 100.0);
        assert_eq!(choose_stock_model(&bbox, 50.0, &cfg), StockModel::BoundingBox);
        assert_eq!(
            choose_stock_model(&bbox, 50.0, &GeometryConfig::default()),
            StockModel::Cylinder
        );
    }

    #[test]
    fn test_explicit_shape() {
        let g = GeometryInput {
            volume: 10.0,
            surface_area: 30.0,
            bbox: None,
            stock_volume: None,
            shape: Some(ShapeInput::Cylinder {
                diameter: 20.0,
                length: 50.0,
            }),
        };
        let snap = normalize(&g, &GeometryConfig::default()).unwrap();
        assert_eq!(snap.stock_model(), StockModel::Cylinder);
        assert_eq!(snap.bounding_box(), BoundingBox::new(20.0, 20.0, 50.0));
    }

    #[test]
    fn test_negative_removal_is_fatal() {
        let mut g = input(BoundingBox::new(10.0, 10.0, 10.0), 2.0);
        g.stock_volume = Some(1.0);
        assert_eq!(
            normalize(&g, &GeometryConfig::default()),
            Err(ValidationError::NegativeRemoval { stock: 1.0, part: 2.0 })
        );
    }

    #[test]
    fn test_missing_envelope() {
        let mut g = input(BoundingBox::new(10.0, 10.0, 10.0), 2.0);
        g.bbox = None;
        assert!(matches!(
            normalize(&g, &GeometryConfig::default()),
            Err(ValidationError::Geometry { .. })
        ));
    }

    #[test]
    fn test_shape_deserializes_with_kind_tag() {
        let shape: ShapeInput =
            serde_json::from_str(r#"{"kind": "block", "dx": 1.0, "dy": 2.0, "dz": 3.0}"#).unwrap();
        assert_eq!(shape, ShapeInput::Block { dx: 1.0, dy: 2.0, dz: 3.0 });
    }
}
