//! Batch orchestrator and determinism verifier
//!
//! Parts are estimated in parallel with rayon. Every part only reads the
//! shared `Arc` catalog and config, so the output of a part does not depend on
//! how the batch was scheduled. In verification mode a sample of parts is
//! re-estimated and the serialized results must match byte for byte.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::estimate::{stable_sum, EstimationResult, Estimator};
use crate::request::EstimateRequest;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BatchError {
    #[error(
        "determinism violation for part {part_id}: run {run} produced {actual_hash}, expected {expected_hash}"
    )]
    DeterminismViolation {
        part_id: String,
        run: usize,
        expected_hash: String,
        actual_hash: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub parts: Vec<EstimateRequest>,
    #[serde(default)]
    pub verify_determinism: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_samples: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_runs: Option<usize>,
}

impl BatchRequest {
    pub fn new(parts: Vec<EstimateRequest>) -> Self {
        Self {
            parts,
            verify_determinism: false,
            verify_samples: None,
            verify_runs: None,
        }
    }
}

/// A part whose estimation failed fatally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartFailure {
    pub part_id: String,
    pub code: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyEntry {
    pub part_id: String,
    /// Total minutes of the original run followed by every re-run
    pub runs: Vec<f64>,
    pub consistent: bool,
}

impl fmt::Display for ConsistencyEntry {
    /// Minutes rounded to two decimals, e.g. `P-01  4 runs  [30.19, ...]  consistent`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let runs: Vec<String> = self.runs.iter().map(|t| format!("{:.2}", t)).collect();
        write!(
            f,
            "{:<16} {} runs  [{}]  {}",
            self.part_id,
            self.runs.len(),
            runs.join(", "),
            if self.consistent { "consistent" } else { "MISMATCH" }
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub count: usize,
    pub avg_time: f64,
    pub min_time: f64,
    pub max_time: f64,
    pub constrained_count: usize,
}

impl BatchSummary {
    pub fn from_results(results: &[EstimationResult]) -> Self {
        if results.is_empty() {
            return Self::default();
        }
        let totals: Vec<f64> = results.iter().map(|r| r.total_time_minutes).collect();
        let min_time = totals.iter().copied().min_by(f64::total_cmp).unwrap_or(0.0);
        let max_time = totals.iter().copied().max_by(f64::total_cmp).unwrap_or(0.0);

        Self {
            count: results.len(),
            avg_time: stable_sum(totals) / results.len() as f64,
            min_time,
            max_time,
            constrained_count: results.iter().filter(|r| r.is_constrained()).count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub results: Vec<EstimationResult>,
    pub failures: Vec<PartFailure>,
    /// Parts never dispatched because the batch was cancelled
    pub cancelled: Vec<String>,
    pub consistency_log: Vec<ConsistencyEntry>,
    pub summary: BatchSummary,
}

/// Shared flag that stops a batch from dispatching further parts
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

enum PartOutcome {
    Done(usize, EstimationResult),
    Failed(PartFailure),
    Cancelled(String),
}

/// Called with the part id whenever a part finishes, successfully or not
pub type ProgressFn = Arc<dyn Fn(&str) + Send + Sync>;

pub struct BatchOrchestrator {
    estimator: Estimator,
    cancel: CancelToken,
    progress: Option<ProgressFn>,
    default_runs: usize,
    default_samples: usize,
}

impl BatchOrchestrator {
    pub fn new(estimator: Estimator) -> Self {
        let batch = &estimator.config().batch;
        let (default_runs, default_samples) = (batch.verify_runs, batch.verify_samples);
        Self {
            estimator,
            cancel: CancelToken::new(),
            progress: None,
            default_runs,
            default_samples,
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn with_progress(mut self, progress: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    pub fn run(&self, req: &BatchRequest) -> Result<BatchResponse, BatchError> {
        let outcomes: Vec<PartOutcome> = req
            .parts
            .par_iter()
            .enumerate()
            .map(|(index, part)| {
                // In-flight parts finish; only new dispatches observe the flag
                if self.cancel.is_cancelled() {
                    return PartOutcome::Cancelled(part.part_id.clone());
                }
                let outcome = match self.estimator.estimate(part) {
                    Ok(result) => PartOutcome::Done(index, result),
                    Err(e) => {
                        log::warn!("part {} failed: {}", part.part_id, e);
                        PartOutcome::Failed(PartFailure {
                            part_id: part.part_id.clone(),
                            code: e.code().to_string(),
                            error: e.to_string(),
                        })
                    }
                };
                if let Some(progress) = &self.progress {
                    progress(&part.part_id);
                }
                outcome
            })
            .collect();

        let mut done = Vec::new();
        let mut failures = Vec::new();
        let mut cancelled = Vec::new();
        for outcome in outcomes {
            match outcome {
                PartOutcome::Done(index, result) => done.push((index, result)),
                PartOutcome::Failed(failure) => failures.push(failure),
                PartOutcome::Cancelled(part_id) => cancelled.push(part_id),
            }
        }

        let consistency_log = if req.verify_determinism {
            let runs = req.verify_runs.unwrap_or(self.default_runs).max(1);
            let samples = req.verify_samples.unwrap_or(self.default_samples);
            self.verify(&req.parts, &done, samples, runs)?
        } else {
            Vec::new()
        };

        let results: Vec<EstimationResult> = done.into_iter().map(|(_, result)| result).collect();
        let summary = BatchSummary::from_results(&results);

        log::info!(
            "batch: {} estimated, {} failed, {} cancelled, avg {:.2} min",
            results.len(),
            failures.len(),
            cancelled.len(),
            summary.avg_time
        );

        Ok(BatchResponse {
            results,
            failures,
            cancelled,
            consistency_log,
            summary,
        })
    }

    /// Re-estimate evenly spaced samples `runs` times each
    fn verify(
        &self,
        parts: &[EstimateRequest],
        done: &[(usize, EstimationResult)],
        samples: usize,
        runs: usize,
    ) -> Result<Vec<ConsistencyEntry>, BatchError> {
        sample_indices(done.len(), samples)
            .into_iter()
            .map(|i| {
                let (part_index, original) = &done[i];
                let part = &parts[*part_index];
                let expected = serde_json::to_vec(original).unwrap_or_default();

                let reruns: Vec<(f64, Vec<u8>)> = (0..runs)
                    .into_par_iter()
                    .map(|_| match self.estimator.estimate(part) {
                        Ok(result) => (
                            result.total_time_minutes,
                            serde_json::to_vec(&result).unwrap_or_default(),
                        ),
                        Err(e) => (f64::NAN, e.to_string().into_bytes()),
                    })
                    .collect();

                let bytes: Vec<Vec<u8>> = reruns.iter().map(|(_, b)| b.clone()).collect();
                let check = compare_runs(&part.part_id, &expected, &bytes);

                let mut totals = vec![original.total_time_minutes];
                totals.extend(reruns.iter().map(|(total, _)| *total));
                let entry = ConsistencyEntry {
                    part_id: part.part_id.clone(),
                    runs: totals,
                    consistent: check.is_ok(),
                };

                if let Err(violation) = check {
                    log::error!("{}", entry);
                    return Err(violation);
                }
                log::debug!("part {} reproduced {} times", part.part_id, runs);
                Ok(entry)
            })
            .collect()
    }
}

/// `k` evenly spaced indices out of `n`
pub fn sample_indices(n: usize, k: usize) -> Vec<usize> {
    if k >= n {
        return (0..n).collect();
    }
    (0..k).map(|i| i * n / k).collect()
}

fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Every re-run must serialize to exactly the original bytes
pub fn compare_runs(part_id: &str, expected: &[u8], reruns: &[Vec<u8>]) -> Result<(), BatchError> {
    for (i, actual) in reruns.iter().enumerate() {
        if actual.as_slice() != expected {
            return Err(BatchError::DeterminismViolation {
                part_id: part_id.to_string(),
                run: i + 1,
                expected_hash: digest(expected),
                actual_hash: digest(actual),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureInput;
    use crate::geometry::{BoundingBox, GeometryInput};
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    fn parts() -> Vec<EstimateRequest> {
        let mut parts: Vec<EstimateRequest> = (0..12)
            .map(|i| {
                EstimateRequest::features(
                    &format!("P-{:02}", i),
                    if i % 2 == 0 { "aluminum" } else { "steel" },
                    vec![
                        FeatureInput::new("outer_diameter", format!("ø{}, L=100", 20 + i)),
                        FeatureInput::new("through_hole", "ø8x20"),
                    ],
                )
            })
            .collect();
        parts.push(EstimateRequest::volume(
            "V-1",
            "aluminum",
            GeometryInput {
                volume: 800.0,
                surface_area: 600.0,
                bbox: Some(BoundingBox::new(100.0, 100.0, 100.0)),
                stock_volume: Some(1000.0),
                shape: None,
            },
        ));
        parts
    }

    #[test]
    fn test_results_keep_request_order() {
        let response = BatchOrchestrator::new(Estimator::default())
            .run(&BatchRequest::new(parts()))
            .unwrap();
        let ids: Vec<_> = response.results.iter().map(|r| r.part_id.as_str()).collect();
        assert_eq!(ids.len(), 13);
        assert_eq!(ids[0], "P-00");
        assert_eq!(ids[12], "V-1");
        assert!(response.failures.is_empty());
        assert!(response.consistency_log.is_empty());
    }

    #[test]
    fn test_batch_matches_single_estimates() {
        let estimator = Estimator::default();
        let response = BatchOrchestrator::new(estimator.clone())
            .run(&BatchRequest::new(parts()))
            .unwrap();
        for (part, result) in parts().iter().zip(&response.results) {
            assert_eq!(&estimator.estimate(part).unwrap(), result);
        }
    }

    #[test]
    fn test_failures_are_collected() {
        let mut parts = parts();
        parts.push(EstimateRequest::features("X-1", "unobtanium", vec![]));
        let response = BatchOrchestrator::new(Estimator::default())
            .run(&BatchRequest::new(parts))
            .unwrap();
        assert_eq!(response.results.len(), 13);
        assert_eq!(response.failures.len(), 1);
        assert_eq!(response.failures[0].code, "unknown_material");
    }

    #[test]
    fn test_verification_log() {
        let mut req = BatchRequest::new(parts());
        req.verify_determinism = true;
        req.verify_samples = Some(4);
        req.verify_runs = Some(3);

        let response = BatchOrchestrator::new(Estimator::default()).run(&req).unwrap();
        assert_eq!(response.consistency_log.len(), 4);
        for entry in &response.consistency_log {
            assert!(entry.consistent);
            assert_eq!(entry.runs.len(), 4);
            assert!(entry.runs.iter().all(|t| *t == entry.runs[0]));
        }
    }

    #[test]
    fn test_cancelled_batch_dispatches_nothing() {
        let orchestrator = BatchOrchestrator::new(Estimator::default());
        orchestrator.cancel_token().cancel();
        let response = orchestrator.run(&BatchRequest::new(parts())).unwrap();
        assert!(response.results.is_empty());
        assert_eq!(response.cancelled.len(), 13);
        assert_eq!(response.summary, BatchSummary::default());
    }

    #[test]
    fn test_cancel_mid_batch_lets_running_part_finish() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let orchestrator = BatchOrchestrator::new(Estimator::default())
            .with_cancel_token(cancel)
            .with_progress(move |_| trigger.cancel());

        // One worker: the first part finishes, every later one sees the flag
        let pool = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();
        let response = pool
            .install(|| orchestrator.run(&BatchRequest::new(parts())))
            .unwrap();

        assert_eq!(response.results.len(), 1);
        assert_eq!(response.cancelled.len(), 12);
        assert!(!response.cancelled.contains(&response.results[0].part_id));
        assert_eq!(response.summary.count, 1);
    }

    #[test]
    fn test_progress_sees_every_part() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let response = BatchOrchestrator::new(Estimator::default())
            .with_progress(move |id| sink.lock().unwrap().push(id.to_string()))
            .run(&BatchRequest::new(parts()))
            .unwrap();

        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        let mut expected: Vec<String> = response.results.iter().map(|r| r.part_id.clone()).collect();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_consistency_entry_display() {
        let entry = ConsistencyEntry {
            part_id: "P-1".to_string(),
            runs: vec![30.1885, 30.1885, 31.0],
            consistent: false,
        };
        assert_eq!(
            entry.to_string(),
            "P-1              3 runs  [30.19, 30.19, 31.00]  MISMATCH"
        );
        let entry = ConsistencyEntry {
            consistent: true,
            ..entry
        };
        assert!(entry.to_string().ends_with("  consistent"));
    }

    #[test]
    fn test_summary() {
        let response = BatchOrchestrator::new(Estimator::default())
            .run(&BatchRequest::new(parts()))
            .unwrap();
        let totals: Vec<f64> = response.results.iter().map(|r| r.total_time_minutes).collect();
        let summary = &response.summary;
        assert_eq!(summary.count, 13);
        assert_relative_eq!(summary.avg_time, totals.iter().sum::<f64>() / 13.0, epsilon = 1e-9);
        assert!(summary.min_time <= summary.avg_time && summary.avg_time <= summary.max_time);
    }

    #[test]
    fn test_sample_indices() {
        assert_eq!(sample_indices(10, 5), vec![0, 2, 4, 6, 8]);
        assert_eq!(sample_indices(3, 5), vec![0, 1, 2]);
        assert_eq!(sample_indices(0, 5), Vec::<usize>::new());
    }

    #[test]
    fn test_mismatch_is_a_violation() {
        let expected = b"{\"total\":1.0}".to_vec();
        let reruns = vec![expected.clone(), b"{\"total\":1.1}".to_vec()];
        match compare_runs("P-1", &expected, &reruns) {
            Err(BatchError::DeterminismViolation { part_id, run, .. }) => {
                assert_eq!(part_id, "P-1");
                assert_eq!(run, 2);
            }
            other => panic!("expected violation, got {:?}", other),
        }
        assert!(compare_runs("P-1", &expected, &[expected.clone()]).is_ok());
    }
}
