//! HTTP boundary
//!
//! `GET /health`, `GET /materials`, `POST /estimate`, `POST /batch`. When the
//! catalog comes from a file, the file is watched and a new catalog snapshot
//! is swapped in on change. Each request clones the estimator at its start, so
//! a reload never affects an estimation already running.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use warp::http::StatusCode;
use warp::Filter;

use crate::batch::{BatchError, BatchOrchestrator, BatchRequest};
use crate::catalog::{Catalog, MaterialProfile};
use crate::estimate::{EstimateError, Estimator};
use crate::request::EstimateRequest;
use crate::warning::Warning;

pub type SharedEstimator = Arc<RwLock<Estimator>>;

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<Warning>,
}

impl From<&EstimateError> for ErrorBody {
    fn from(e: &EstimateError) -> Self {
        let warnings = match e {
            EstimateError::NoFeaturesCalculable { warnings, .. } => warnings.clone(),
            _ => Vec::new(),
        };
        Self {
            code: e.code(),
            error: e.to_string(),
            warnings,
        }
    }
}

#[derive(Debug, Serialize)]
struct Health<'a> {
    status: &'a str,
    version: &'a str,
    catalog_fingerprint: String,
}

fn with_state(
    state: SharedEstimator,
) -> impl Filter<Extract = (SharedEstimator,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

pub fn routes(
    state: SharedEstimator,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(health);

    let materials = warp::path("materials")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(materials);

    let estimate = warp::path("estimate")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(estimate);

    let batch = warp::path("batch")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state))
        .and_then(batch);

    health
        .or(materials)
        .or(estimate)
        .or(batch)
        .with(warp::log("cuttime::serve"))
}

async fn health(state: SharedEstimator) -> Result<impl warp::Reply, Infallible> {
    let estimator = state.read().await.clone();
    Ok(warp::reply::json(&Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        catalog_fingerprint: estimator.catalog().fingerprint().to_string(),
    }))
}

async fn materials(state: SharedEstimator) -> Result<impl warp::Reply, Infallible> {
    let estimator = state.read().await.clone();
    let profiles: Vec<&MaterialProfile> = estimator.catalog().materials().collect();
    Ok(warp::reply::json(&profiles))
}

async fn estimate(req: EstimateRequest, state: SharedEstimator) -> Result<impl warp::Reply, Infallible> {
    // Snapshot taken here; a catalog swap after this point is not observed
    let estimator = state.read().await.clone();

    let reply = match tokio::task::spawn_blocking(move || estimator.estimate(&req)).await {
        Ok(Ok(result)) => warp::reply::with_status(warp::reply::json(&result), StatusCode::OK),
        Ok(Err(e)) => warp::reply::with_status(
            warp::reply::json(&ErrorBody::from(&e)),
            StatusCode::UNPROCESSABLE_ENTITY,
        ),
        Err(e) => internal_error(e.to_string()),
    };
    Ok(reply)
}

async fn batch(req: BatchRequest, state: SharedEstimator) -> Result<impl warp::Reply, Infallible> {
    let estimator = state.read().await.clone();

    let outcome = tokio::task::spawn_blocking(move || BatchOrchestrator::new(estimator).run(&req)).await;
    let reply = match outcome {
        Ok(Ok(response)) => warp::reply::with_status(warp::reply::json(&response), StatusCode::OK),
        Ok(Err(e @ BatchError::DeterminismViolation { .. })) => {
            log::error!("{}", e);
            warp::reply::with_status(
                warp::reply::json(&ErrorBody {
                    code: "determinism_violation",
                    error: e.to_string(),
                    warnings: Vec::new(),
                }),
                StatusCode::INTERNAL_SERVER_ERROR,
            )
        }
        Err(e) => internal_error(e.to_string()),
    };
    Ok(reply)
}

fn internal_error(message: String) -> warp::reply::WithStatus<warp::reply::Json> {
    log::error!("request failed: {}", message);
    warp::reply::with_status(
        warp::reply::json(&ErrorBody {
            code: "internal_error",
            error: message,
            warnings: Vec::new(),
        }),
        StatusCode::INTERNAL_SERVER_ERROR,
    )
}

/// Reload the catalog whenever `path` changes. A catalog that fails to load
/// is reported and the previous snapshot stays active.
fn watch_catalog(path: PathBuf, state: SharedEstimator) {
    tokio::spawn(async move {
        let (watcher_tx, mut watcher_rx) = tokio::sync::mpsc::channel(10);

        let watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                let _ = watcher_tx.blocking_send(res);
            },
            Config::default(),
        );
        let mut watcher = match watcher {
            Ok(watcher) => watcher,
            Err(e) => {
                log::error!("catalog watcher unavailable: {}", e);
                return;
            }
        };
        if let Err(e) = watcher.watch(&path, RecursiveMode::NonRecursive) {
            log::error!("cannot watch {}: {}", path.display(), e);
            return;
        }

        while let Some(res) = watcher_rx.recv().await {
            match res {
                Ok(_event) => {
                    // Debounce
                    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
                    while watcher_rx.try_recv().is_ok() {}

                    match Catalog::from_file(&path) {
                        Ok(catalog) => {
                            let mut current = state.write().await;
                            let fingerprint = catalog.fingerprint().to_string();
                            *current = current.with_catalog(Arc::new(catalog));
                            log::info!("catalog reloaded, fingerprint {}", &fingerprint[..12]);
                        }
                        Err(e) => log::warn!("catalog reload rejected, keeping previous: {}", e),
                    }
                }
                Err(e) => log::warn!("watch error: {:?}", e),
            }
        }
    });
}

pub async fn run(addr: SocketAddr, estimator: Estimator, catalog_path: Option<PathBuf>) {
    let state: SharedEstimator = Arc::new(RwLock::new(estimator));

    if let Some(path) = catalog_path {
        log::info!("watching catalog {}", path.display());
        watch_catalog(path, state.clone());
    }

    log::info!("cuttime listening on http://{}", addr);
    warp::serve(routes(state)).run(addr).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureInput;
    use crate::EstimationResult;

    fn state() -> SharedEstimator {
        Arc::new(RwLock::new(Estimator::default()))
    }

    #[tokio::test]
    async fn test_health() {
        let res = warp::test::request()
            .method("GET")
            .path("/health")
            .reply(&routes(state()))
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_estimate_round_trip() {
        let req = EstimateRequest::features(
            "P-1",
            "aluminum",
            vec![FeatureInput::new("outer_diameter", "ø30, L=100")],
        );
        let res = warp::test::request()
            .method("POST")
            .path("/estimate")
            .json(&req)
            .reply(&routes(state()))
            .await;
        assert_eq!(res.status(), StatusCode::OK);

        let result: EstimationResult = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(result, Estimator::default().estimate(&req).unwrap());
    }

    #[tokio::test]
    async fn test_unknown_material_is_unprocessable() {
        let req = EstimateRequest::features("P-1", "unobtanium", vec![]);
        let res = warp::test::request()
            .method("POST")
            .path("/estimate")
            .json(&req)
            .reply(&routes(state()))
            .await;
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["code"], "unknown_material");
    }

    #[tokio::test]
    async fn test_swapped_catalog_is_seen_by_new_requests() {
        let state = state();
        let before = state.read().await.catalog().fingerprint().to_string();

        let reduced = Catalog::from_document(crate::catalog::CatalogDocument {
            materials: Catalog::builtin().materials().cloned().collect(),
            conditions: Vec::new(),
        })
        .unwrap();
        {
            let mut current = state.write().await;
            *current = current.with_catalog(Arc::new(reduced));
        }

        let res = warp::test::request()
            .method("GET")
            .path("/health")
            .reply(&routes(state.clone()))
            .await;
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_ne!(body["catalog_fingerprint"], before.as_str());
    }
}
