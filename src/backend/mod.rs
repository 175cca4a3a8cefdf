pub mod db;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::error::{Result, WorkshopError};
use crate::models::{InspectionFilter, RegionFilter, ResultsEnvelope};
use crate::plugins::api::ApiOperation;

pub use db::Database;

/// A failed endpoint call, rendered as `{error, details}` with status 500.
pub struct EndpointError {
    message: &'static str,
    details: String,
}

impl EndpointError {
    fn new(message: &'static str, err: WorkshopError) -> Self {
        error!("{}: {}", message, err);
        Self {
            message,
            details: err.to_string(),
        }
    }
}

impl IntoResponse for EndpointError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.message, "details": self.details })),
        )
            .into_response()
    }
}

type EndpointResult = std::result::Result<Response, EndpointError>;

fn results<T: Serialize>(rows: Vec<T>) -> Response {
    Json(ResultsEnvelope { results: rows }).into_response()
}

/// An empty body means no filter. Any other body must parse.
fn parse_filter<T>(body: &[u8], message: &'static str) -> std::result::Result<T, EndpointError>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| EndpointError::new(message, WorkshopError::Parse(format!("Invalid request body: {}", e))))
}

/// Router exposing the infrastructure endpoints under `prefix`.
pub fn create_router(db: Arc<Database>, prefix: &str) -> Router {
    let routes = Router::new()
        .route(ApiOperation::CriticalAssets.path(), post(get_critical_assets))
        .route(ApiOperation::AssetsByRegion.path(), post(get_assets_by_region))
        .route(ApiOperation::ActiveProjects.path(), post(get_active_projects))
        .route(ApiOperation::SafetyInspections.path(), post(get_safety_inspections))
        .route(ApiOperation::AssetStatistics.path(), post(get_asset_statistics))
        .with_state(db);

    let router = if prefix.is_empty() || prefix == "/" {
        routes
    } else {
        Router::new().nest(prefix, routes)
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any))
}

pub async fn start_backend_server(config: Arc<Config>) -> Result<()> {
    let db = Arc::new(Database::connect(&config.backend).await?);
    let app = create_router(db, &config.apim.route_prefix);

    let listener = tokio::net::TcpListener::bind(&config.backend.listen_addr)
        .await
        .map_err(|e| WorkshopError::Network(format!("Failed to bind {}: {}", config.backend.listen_addr, e)))?;
    info!("Backend API listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .map_err(|e| WorkshopError::Network(format!("Backend server error: {}", e)))?;

    Ok(())
}

async fn get_critical_assets(State(db): State<Arc<Database>>) -> EndpointResult {
    info!("Processing request to get critical infrastructure assets");
    db.critical_assets()
        .await
        .map(results)
        .map_err(|e| EndpointError::new("Error getting critical assets", e))
}

async fn get_assets_by_region(State(db): State<Arc<Database>>, body: Bytes) -> EndpointResult {
    const FAILURE: &str = "Error getting assets by region";
    let filter: RegionFilter = parse_filter(&body, FAILURE)?;
    let response = match filter.region_name.as_deref().filter(|r| !r.is_empty()) {
        Some(region) => db.assets_in_region(region).await.map(results),
        None => db.region_summaries().await.map(results),
    };
    response.map_err(|e| EndpointError::new(FAILURE, e))
}

async fn get_active_projects(State(db): State<Arc<Database>>) -> EndpointResult {
    db.active_projects()
        .await
        .map(results)
        .map_err(|e| EndpointError::new("Error getting active projects", e))
}

async fn get_safety_inspections(State(db): State<Arc<Database>>, body: Bytes) -> EndpointResult {
    const FAILURE: &str = "Error getting safety inspections";
    let filter: InspectionFilter = parse_filter(&body, FAILURE)?;
    db.safety_inspections(&filter)
        .await
        .map(results)
        .map_err(|e| EndpointError::new(FAILURE, e))
}

async fn get_asset_statistics(State(db): State<Arc<Database>>) -> EndpointResult {
    db.asset_statistics()
        .await
        .map(results)
        .map_err(|e| EndpointError::new("Error getting asset statistics", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn test_router() -> Router {
        let db = Arc::new(Database::in_memory().await.unwrap());
        create_router(db, "/sql")
    }

    async fn post_json(app: Router, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
        let mut request = Request::builder().method("POST").uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app.oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_critical_endpoint() {
        let (status, body) = post_json(test_router().await, "/sql/infrastructure/critical", None).await;
        assert_eq!(status, StatusCode::OK);
        let results = body["results"].as_array().unwrap();
        assert_eq!(results.len(), 5);
        assert!(results[0].get("AssetName").is_some());
    }

    #[tokio::test]
    async fn test_by_region_with_and_without_filter() {
        let (status, body) = post_json(
            test_router().await,
            "/sql/infrastructure/by-region",
            Some(r#"{"region_name":"Zeeland"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let results = body["results"].as_array().unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r["RegionName"] == "Zeeland"));
        assert!(results[0].get("ConstructionYear").is_some());

        let (status, body) = post_json(test_router().await, "/sql/infrastructure/by-region", None).await;
        assert_eq!(status, StatusCode::OK);
        let results = body["results"].as_array().unwrap();
        assert_eq!(results.len(), 4);
        assert!(results[0].get("TotalAssets").is_some());
    }

    #[tokio::test]
    async fn test_inspections_endpoint_applies_filter() {
        let (status, body) = post_json(
            test_router().await,
            "/sql/safety/inspections",
            Some(r#"{"asset_type":"Waterway","min_safety_rating":1,"max_safety_rating":5}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let results = body["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r["AssetType"] == "Waterway"));
    }

    #[tokio::test]
    async fn test_malformed_filter_is_rejected() {
        let bodies = [
            r#"{"asset_type":"Bridge","max_safety_rating":"2"}"#,
            r#"{"asset_type":"Bridge","max_safety_rating":2.0}"#,
            "{not json",
        ];
        for raw in bodies {
            let (status, body) = post_json(test_router().await, "/sql/safety/inspections", Some(raw)).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{}", raw);
            assert_eq!(body["error"], "Error getting safety inspections");
            assert!(body["details"].as_str().unwrap().contains("Invalid request body"));
            assert!(body.get("results").is_none());
        }

        let (status, body) =
            post_json(test_router().await, "/sql/infrastructure/by-region", Some(r#"{"region_name":"#)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Error getting assets by region");
    }

    #[tokio::test]
    async fn test_blank_body_means_no_filter() {
        let (status, body) = post_json(test_router().await, "/sql/safety/inspections", Some("  ")).await;
        assert_eq!(status, StatusCode::OK);
        let (_, unfiltered) = post_json(test_router().await, "/sql/safety/inspections", None).await;
        assert_eq!(body["results"], unfiltered["results"]);
    }

    #[tokio::test]
    async fn test_database_failure_returns_error_body() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        db.close().await;
        let app = create_router(db, "/sql");

        let (status, body) = post_json(app, "/sql/assets/statistics", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Error getting asset statistics");
        assert!(body["details"].as_str().unwrap().contains("Database error"));
        assert!(body.get("results").is_none());
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let app = test_router().await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/sql/infrastructure/unknown")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
