//! Flattened CSV tables and the human-readable consistency log
//!
//! Rows are written and read with the `csv` crate. Floats use the shortest
//! representation that parses back to the same `f64`.

use serde::{Deserialize, Serialize};

use crate::batch::{BatchResponse, BatchSummary};
use crate::estimate::EstimationResult;
use crate::features::FeatureKind;

use super::ExportError;

pub const RESULTS_HEADER: [&str; 12] = [
    "part_id",
    "model",
    "material_code",
    "mode",
    "total_time_minutes",
    "roughing_minutes",
    "finishing_minutes",
    "setup_minutes",
    "confidence",
    "constraints",
    "warnings",
    "input_hash",
];

pub const FEATURES_HEADER: [&str; 8] = [
    "part_id",
    "index",
    "type",
    "detail",
    "count",
    "time_seconds",
    "multiplier",
    "method_description",
];

/// A row of `results.csv`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub part_id: String,
    pub model: String,
    pub material_code: String,
    pub mode: String,
    pub total_time_minutes: f64,
    pub roughing_minutes: f64,
    pub finishing_minutes: f64,
    pub setup_minutes: f64,
    pub confidence: String,
    /// `DeepPocketx1.8;ThinWallx1.5`
    pub constraints: String,
    /// Number of warnings; the messages live in the JSON export
    pub warnings: usize,
    pub input_hash: String,
}

impl From<&EstimationResult> for ResultRow {
    fn from(r: &EstimationResult) -> Self {
        let constraints: Vec<String> = r
            .constraints_applied
            .iter()
            .map(|c| format!("{:?}x{}", c.kind, c.multiplier))
            .collect();
        Self {
            part_id: r.part_id.clone(),
            model: r.model.to_string(),
            material_code: r.material_code.clone(),
            mode: r.mode.to_string(),
            total_time_minutes: r.total_time_minutes,
            roughing_minutes: r.breakdown.roughing,
            finishing_minutes: r.breakdown.finishing,
            setup_minutes: r.breakdown.setup,
            confidence: r.confidence.to_string(),
            constraints: constraints.join(";"),
            warnings: r.warnings.len(),
            input_hash: r.input_hash.clone(),
        }
    }
}

/// A row of `features.csv`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub part_id: String,
    pub index: usize,
    #[serde(rename = "type")]
    pub feature_type: FeatureKind,
    pub detail: String,
    pub count: u32,
    pub time_seconds: f64,
    pub multiplier: f64,
    pub method_description: String,
}

impl FeatureRow {
    fn rows(results: &[EstimationResult]) -> Vec<FeatureRow> {
        results
            .iter()
            .flat_map(|r| {
                r.per_feature_times.iter().map(move |f| FeatureRow {
                    part_id: r.part_id.clone(),
                    index: f.index,
                    feature_type: f.feature_type,
                    detail: f.detail.clone(),
                    count: f.count,
                    time_seconds: f.time_seconds,
                    multiplier: f.multiplier,
                    method_description: f.method_description.clone(),
                })
            })
            .collect()
    }
}

/// The header is written explicitly so that an empty table still has one
fn write_table<R: Serialize>(header: &[&str], rows: impl IntoIterator<Item = R>) -> Result<String, ExportError> {
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    wtr.write_record(header)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    let bytes = wtr.into_inner().map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn read_table<R: serde::de::DeserializeOwned>(header: &[&str], text: &str) -> Result<Vec<R>, ExportError> {
    let mut rdr = csv::Reader::from_reader(text.as_bytes());

    if rdr.headers()?.iter().ne(header.iter().copied()) {
        return Err(ExportError::Table {
            line: 1,
            message: format!("expected header {}", header.join(",")),
        });
    }

    rdr.deserialize()
        .enumerate()
        .map(|(i, row)| {
            row.map_err(|e| ExportError::Table {
                line: e.position().map_or(i + 2, |p| p.line() as usize),
                message: e.to_string(),
            })
        })
        .collect()
}

/// One row per estimated part
pub fn results_table(results: &[EstimationResult]) -> Result<String, ExportError> {
    write_table(&RESULTS_HEADER, results.iter().map(ResultRow::from))
}

/// One row per timed feature across all parts
pub fn features_table(results: &[EstimationResult]) -> Result<String, ExportError> {
    write_table(&FEATURES_HEADER, FeatureRow::rows(results))
}

pub fn parse_results_table(text: &str) -> Result<Vec<ResultRow>, ExportError> {
    read_table(&RESULTS_HEADER, text)
}

pub fn parse_features_table(text: &str) -> Result<Vec<FeatureRow>, ExportError> {
    read_table(&FEATURES_HEADER, text)
}

fn summary_line(summary: &BatchSummary) -> String {
    format!(
        "{} parts, avg {:.2} min, min {:.2} min, max {:.2} min, {} constrained",
        summary.count, summary.avg_time, summary.min_time, summary.max_time, summary.constrained_count
    )
}

/// Human-readable log; minutes rounded to two decimals
pub fn consistency_log(response: &BatchResponse, header_line: &str) -> String {
    let mut out = String::new();
    out.push_str(header_line);
    out.push('\n');
    out.push('\n');

    if response.consistency_log.is_empty() {
        out.push_str("determinism verification not requested\n");
    }
    for entry in &response.consistency_log {
        out.push_str(&format!("{}\n", entry));
    }

    for failure in &response.failures {
        out.push_str(&format!("FAILED {} ({}): {}\n", failure.part_id, failure.code, failure.error));
    }
    if !response.cancelled.is_empty() {
        out.push_str(&format!("cancelled: {}\n", response.cancelled.join(", ")));
    }

    out.push('\n');
    out.push_str(&summary_line(&response.summary));
    out.push('\n');
    out
}
