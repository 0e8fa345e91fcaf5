//! cuttime - deterministic machining-time estimation
//!
//! Turns either bulk part geometry (volume, surface area, bounding box) or a
//! list of recognized manufacturing features into a machining-time estimate.
//! Every estimate is a pure function of the request, the material catalog and
//! the engine configuration: identical inputs always produce identical numbers.
//!
//! The pipeline, leaves first:
//! - [`geometry`] normalizes raw measurements into a [`geometry::GeometrySnapshot`]
//! - [`features`] parses free-text feature details into typed dimensions
//! - [`catalog`] resolves cutting conditions with a roughing/finishing fallback
//! - [`constraints`] derives multiplicative penalties from geometric ratios
//! - [`estimate`] runs the volume or the feature kinematic model
//! - [`batch`] fans out many estimations and verifies determinism
//! - [`export`] writes structured and tabular results

pub mod batch;
pub mod catalog;
pub mod config;
pub mod constraints;
pub mod diagnostics;
pub mod estimate;
pub mod export;
pub mod features;
pub mod geometry;
pub mod lexer;
pub mod request;
pub mod validator;
pub mod warning;

#[cfg(feature = "serve")]
pub mod serve;

pub use batch::{BatchError, BatchOrchestrator, BatchRequest, BatchResponse, CancelToken};
pub use catalog::{Catalog, CatalogError, Mode, OperationName, OperationType};
pub use config::EngineConfig;
pub use estimate::{Confidence, EstimateError, EstimationResult, Estimator};
pub use request::{EstimateRequest, ModelKind};
pub use warning::{Warning, WarningKind};
