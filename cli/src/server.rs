//! HTTP query surface.
//!
//! | Route                | Response                                             |
//! |----------------------|------------------------------------------------------|
//! | `GET /`              | `OK`                                                 |
//! | `GET /leaderboard`   | `[{address, points}]`, `?limit=N` (default 10, ≤1000) |
//! | `GET /status`        | checkpoint, pool aggregate, endpoint, indexer state  |

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;
use tracing::error;

use chainpoints_core::ledger::top_participants;
use chainpoints_core::{IndexerError, IndexerState, LeaderboardEntry, LedgerStore};
use chainpoints_rpc::ConnectionManager;

pub const MAX_LEADERBOARD_LIMIT: usize = 1_000;

#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn LedgerStore>,
    manager: Arc<ConnectionManager>,
    indexer: watch::Receiver<IndexerState>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        manager: Arc<ConnectionManager>,
        indexer: watch::Receiver<IndexerState>,
    ) -> Self {
        Self {
            store,
            manager,
            indexer,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/leaderboard", get(leaderboard))
        .route("/status", get(status))
        .with_state(state)
}

struct ApiError(IndexerError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "query failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

impl From<IndexerError> for ApiError {
    fn from(e: IndexerError) -> Self {
        Self(e)
    }
}

async fn health() -> &'static str {
    "OK"
}

#[derive(Debug, Deserialize)]
struct LeaderboardQuery {
    limit: Option<usize>,
}

async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<Vec<LeaderboardEntry>>, ApiError> {
    let limit = query.limit.map(|l| l.min(MAX_LEADERBOARD_LIMIT));
    Ok(Json(top_participants(state.store.as_ref(), limit).await?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    last_block_indexed: Option<u64>,
    position: Option<String>,
    total_shares: f64,
    last_update: i64,
    endpoint: String,
    state: String,
}

async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let checkpoint = state.store.load().await?;
    let (_, endpoint) = state.manager.current();
    let pool = checkpoint.as_ref().map(|cp| cp.pool).unwrap_or_default();

    Ok(Json(StatusResponse {
        last_block_indexed: checkpoint.as_ref().map(|cp| cp.last_block_indexed()),
        position: checkpoint.as_ref().map(|cp| cp.position.to_string()),
        total_shares: pool.total_shares,
        last_update: pool.last_update,
        endpoint,
        state: state.indexer.borrow().to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use chainpoints_core::{
        CheckpointStore, LedgerCommit, LogPosition, MemoryLedgerStore, Participant, PoolState,
    };
    use chainpoints_rpc::{ConnectionManagerConfig, HttpClientConfig, HttpTransportFactory};

    async fn app(store: Arc<MemoryLedgerStore>) -> Router {
        let factory = HttpTransportFactory::new(HttpClientConfig::default()).unwrap();
        let manager = ConnectionManager::new(
            vec!["https://rpc.example".into()],
            factory,
            ConnectionManagerConfig::default(),
        )
        .unwrap();
        let (_tx, rx) = watch::channel(IndexerState::Live);
        router(AppState::new(store, Arc::new(manager), rx))
    }

    async fn seeded() -> Arc<MemoryLedgerStore> {
        let store = Arc::new(MemoryLedgerStore::new());
        store.init(100).await.unwrap();
        for (i, (address, points)) in [("0xA", 5.0), ("0xB", 50.0), ("0xC", 20.0)].into_iter().enumerate() {
            store
                .commit(LedgerCommit {
                    participant: Some(Participant {
                        address: address.into(),
                        points,
                        shares: 0.0,
                        points_per_share_paid: 0.0,
                    }),
                    pool: PoolState {
                        total_shares: 0.0,
                        last_update: 1_700_000_000,
                        points_per_share: 0.0,
                    },
                    position: LogPosition::after_log(120, i as u32),
                })
                .await
                .unwrap();
        }
        store
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let res = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&bytes).into()));
        (status, body)
    }

    #[tokio::test]
    async fn liveness() {
        let (status, body) = get(app(seeded().await).await, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }

    #[tokio::test]
    async fn leaderboard_ordered_and_limited() {
        let app = app(seeded().await).await;

        let (status, body) = get(app.clone(), "/leaderboard").await;
        assert_eq!(status, StatusCode::OK);
        let addresses: Vec<_> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["address"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(addresses, ["0xB", "0xC", "0xA"]);

        let (_, body) = get(app, "/leaderboard?limit=1").await;
        assert_eq!(body, json!([{ "address": "0xB", "points": 50.0 }]));
    }

    #[tokio::test]
    async fn status_reports_checkpoint() {
        let (status, body) = get(app(seeded().await).await, "/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["lastBlockIndexed"], 120);
        assert_eq!(body["position"], "120:2");
        assert_eq!(body["lastUpdate"], 1_700_000_000);
        assert_eq!(body["endpoint"], "https://rpc.example");
        assert_eq!(body["state"], "live");
    }

    #[tokio::test]
    async fn status_before_first_run() {
        let (_, body) = get(app(Arc::new(MemoryLedgerStore::new())).await, "/status").await;
        assert!(body["lastBlockIndexed"].is_null());
        assert_eq!(body["totalShares"], 0.0);
    }
}
