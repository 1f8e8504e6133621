//! Store health and deployment labels.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::health::Status;

/// Structured health.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub version: String,
    pub environment: String,
    pub database: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dsn: Option<String>,
}

/// Answer 200 when the store answers, 503 otherwise.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Health>) {
    let config = &state.config;
    let (code, status) = match state.health.status().await {
        Status::Up => (StatusCode::OK, "ok"),
        Status::Down => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
    };

    (
        code,
        Json(Health {
            status: status.to_owned(),
            version: config.version.clone(),
            environment: config.environment.clone(),
            database: config.database.to_string(),
            dsn: config.is_local().then(|| config.dsn.clone()),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::*;
    use axum::http::Method;
    use http_body_util::BodyExt;

    async fn read(response: axum::http::Response<axum::body::Body>) -> Health {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let state = test_state();
        let app = app(state.clone());

        let response =
            make_request(app, Method::GET, "/v1/health", String::default(), None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let health = read(response).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.environment, "local");
        assert_eq!(health.dsn.as_deref(), Some(TEST_DSN));
    }

    #[tokio::test]
    async fn test_health_hides_dsn_outside_local() {
        let mut config = test_config();
        config.environment = "production".into();
        let (state, repo) = test_state_with(config);
        repo.set_unavailable(true);

        let response = make_request(
            app(state),
            Method::GET,
            "/v1/health",
            String::default(),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let health = read(response).await;
        assert_eq!(health.status, "unavailable");
        assert!(health.dsn.is_none());
    }
}
