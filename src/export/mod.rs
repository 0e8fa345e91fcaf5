//! Batch exports: a JSON document, CSV tables and a consistency log
//!
//! The JSON and CSV forms carry full-precision values. Only the log rounds.

pub mod tabular;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::batch::{BatchResponse, BatchSummary, ConsistencyEntry, PartFailure};
use crate::estimate::EstimationResult;

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid export json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("malformed table at line {line}: {message}")]
    Table { line: usize, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub generated_at: DateTime<Utc>,
    pub engine_version: String,
    pub catalog_fingerprint: String,
    pub summary: BatchSummary,
    pub results: Vec<EstimationResult>,
    #[serde(default)]
    pub failures: Vec<PartFailure>,
    #[serde(default)]
    pub cancelled: Vec<String>,
    #[serde(default)]
    pub consistency_log: Vec<ConsistencyEntry>,
}

impl ExportDocument {
    /// `generated_at` is supplied by the caller; nothing here reads the clock
    pub fn new(response: &BatchResponse, catalog_fingerprint: &str, generated_at: DateTime<Utc>) -> Self {
        Self {
            generated_at,
            engine_version: ENGINE_VERSION.to_string(),
            catalog_fingerprint: catalog_fingerprint.to_string(),
            summary: response.summary.clone(),
            results: response.results.clone(),
            failures: response.failures.clone(),
            cancelled: response.cancelled.clone(),
            consistency_log: response.consistency_log.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(source: &str) -> Result<Self, ExportError> {
        Ok(serde_json::from_str(source)?)
    }

    fn as_response(&self) -> BatchResponse {
        BatchResponse {
            results: self.results.clone(),
            failures: self.failures.clone(),
            cancelled: self.cancelled.clone(),
            consistency_log: self.consistency_log.clone(),
            summary: self.summary.clone(),
        }
    }

    /// Write `results.json`, `results.csv`, `features.csv` and
    /// `consistency.log` into `dir`, creating it if needed
    pub fn write_bundle(&self, dir: &Path) -> Result<Vec<PathBuf>, ExportError> {
        fs::create_dir_all(dir).map_err(|source| io_error(dir, source))?;

        let header = format!(
            "cuttime {} consistency log\ngenerated {}\ncatalog {}",
            self.engine_version,
            self.generated_at.to_rfc3339(),
            self.catalog_fingerprint
        );

        let files = [
            ("results.json", self.to_json()?),
            ("results.csv", tabular::results_table(&self.results)?),
            ("features.csv", tabular::features_table(&self.results)?),
            ("consistency.log", tabular::consistency_log(&self.as_response(), &header)),
        ];

        let mut written = Vec::with_capacity(files.len());
        for (name, contents) in files {
            let path = dir.join(name);
            fs::write(&path, contents).map_err(|source| io_error(&path, source))?;
            log::info!("wrote {}", path.display());
            written.push(path);
        }
        Ok(written)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> ExportError {
    ExportError::Io {
        path: path.display().to_string(),
        source,
    }
}
