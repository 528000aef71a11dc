use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use log::{debug, error, info};

use crate::error::{MonitorError, Result};
use crate::store::Storage;
use crate::view::{group_views, StatusView};

impl IntoResponse for MonitorError {
    fn into_response(self) -> Response {
        error!("Request failed: {self}");
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

pub fn router(storage: Storage) -> Router {
    Router::new()
        .route("/api/status", get(status))
        .route("/healthz", get(health))
        .with_state(storage)
}

type GroupedViews = BTreeMap<String, Vec<StatusView>>;

async fn status(State(storage): State<Storage>) -> Result<Json<GroupedViews>> {
    debug!("Serving /api/status");
    let grouped = storage.load_grouped().await?;
    Ok(Json(group_views(&grouped)))
}

async fn health() -> &'static str {
    "ok"
}

pub async fn serve(
    addr: SocketAddr,
    storage: Storage,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Serving status API on http://{addr}/api/status");

    axum::serve(listener, router(storage))
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::config::ConfigLoader;
    use crate::models::{HealthColor, ProjectStatus};
    use crate::store::MemoryStore;

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_status_returns_grouped_views() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"groupinfo": [{"id": 1, "name": "platform"}]}"#)
            .unwrap();

        let storage = Storage::new(Arc::new(MemoryStore::new()), ConfigLoader::new(file.path()));
        let mut billing = ProjectStatus {
            id: 7,
            name: "billing".to_string(),
            group_id: 1,
            status_color: HealthColor::Green,
            ..ProjectStatus::default()
        };
        billing.development.commit.sha = "abcdef1234567890".to_string();
        let orphan = ProjectStatus {
            id: 3,
            group_id: 9,
            ..ProjectStatus::default()
        };
        storage.save(vec![billing, orphan]).await.unwrap();

        let (status, body) = get_json(router(storage), "/api/status").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["platform"][0]["name"], "billing");
        assert_eq!(body["platform"][0]["commit_short_sha"], "abcdef12");
        assert_eq!(body["platform"][0]["status_color"], "green");
        assert_eq!(body["platform"][0]["commit_time_fmt"], "-");
        assert_eq!(body["ungrouped"][0]["id"], 3);
    }

    #[tokio::test]
    async fn test_status_reports_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(
            Arc::new(MemoryStore::new()),
            ConfigLoader::new(dir.path().join("config.json")),
        );

        let (status, body) = get_json(router(storage), "/api/status").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().starts_with("IO error"));
    }

    #[tokio::test]
    async fn test_health() {
        let storage = Storage::new(Arc::new(MemoryStore::new()), ConfigLoader::new("config.json"));

        let response = router(storage)
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
