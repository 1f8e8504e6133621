//! Accounts is a user directory that hands out signed bearer tokens.
//!
//! The same operations are served over JSON/HTTP and gRPC, on top of a
//! MongoDB or PostgreSQL store selected at startup.

#![forbid(unsafe_code)]
pub mod claims;
pub mod config;
pub mod crypto;
pub mod error;
pub mod health;
mod middleware;
pub mod repository;
mod router;
pub mod rpc;
pub mod telemetry;
pub mod token;
pub mod user;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, header};
use axum::routing::get;
use axum::{Router, middleware as AxumMiddleware};
use error::ServerError;
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub users: user::UserService,
    pub policy: Arc<user::AccessPolicy>,
    pub health: health::Health,
    pub metrics: Option<PrometheusHandle>,
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Remove sensitive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        )
        .layer(AxumMiddleware::from_fn(middleware::recover))
        .layer(AxumMiddleware::from_fn_with_state(state.clone(), middleware::logger))
        .layer(AxumMiddleware::from_fn_with_state(
            state.config.timeout,
            middleware::deadline,
        ));

    let mut router = Router::new()
        .nest("/v1", router::router(&state))
        .with_state(state.clone());

    // `GET /metrics` only exists when a recorder is installed.
    if let Some(handle) = state.metrics {
        router = router.route("/metrics", get(move || std::future::ready(handle.render())));
    }

    router
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state(
    config: Arc<config::Configuration>,
    metrics: Option<PrometheusHandle>,
) -> Result<AppState, Box<dyn std::error::Error>> {
    let repo = repository::connect(&config).await?;

    let pwd = crypto::PasswordManager::new(config.argon2.clone())?;
    let tokens = token::TokenManager::new(&config.jwt_secret, &claims::CATALOG);
    let users = user::UserService::new(Arc::clone(&repo), pwd, tokens, &claims::CATALOG);

    Ok(AppState {
        health: health::Health::new(repo),
        policy: Arc::new(user::UserService::access_policy()),
        config,
        users,
        metrics,
    })
}

/// Password of users built by [`test_user`].
#[cfg(test)]
pub const TEST_PASSWORD: &str = "correct horse battery staple";

#[cfg(test)]
pub const TEST_DSN: &str = "memory://accounts";

#[cfg(test)]
pub fn test_config() -> config::Configuration {
    let mut config = config::Configuration::default();
    config.dsn = TEST_DSN.into();
    config.jwt_secret = "test-secret".into();
    config
}

/// State over an in-memory repository.
#[cfg(test)]
pub fn test_state_with(
    config: config::Configuration,
) -> (AppState, Arc<repository::memory::InMemoryUserRepository>) {
    let repo = Arc::new(repository::memory::InMemoryUserRepository::new());
    let tokens = token::TokenManager::new(&config.jwt_secret, &claims::CATALOG);
    let users = user::UserService::new(repo.clone(), crypto::test_manager(), tokens, &claims::CATALOG);

    let state = AppState {
        config: Arc::new(config),
        users,
        policy: Arc::new(user::UserService::access_policy()),
        health: health::Health::new(repo.clone()),
        metrics: None,
    };
    (state, repo)
}

#[cfg(test)]
pub fn test_state() -> AppState {
    test_state_with(test_config()).0
}

#[cfg(test)]
pub fn test_user(email: &str) -> user::CreateUser {
    user::CreateUser {
        name: "Ada".into(),
        surnames: "Lovelace".into(),
        email: email.into(),
        password: TEST_PASSWORD.into(),
        claims: vec![],
    }
}

/// Signed token for `user_id`, without the `Bearer` scheme.
#[cfg(test)]
pub fn test_token(state: &AppState, user_id: &str, claims: &[claims::ClaimId]) -> String {
    state.users.tokens().create(user_id, claims).expect("cannot create JWT")
}

/// Send a request with `authorization` as the raw header value.
///
/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_raw_request(
    app: Router,
    method: Method,
    path: &str,
    body: String,
    authorization: Option<&str>,
) -> axum::http::Response<axum::body::Body> {
    use tower::util::ServiceExt;

    let mut request = axum::extract::Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(authorization) = authorization {
        request = request.header(header::AUTHORIZATION, authorization);
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// Send a request carrying `token` as a bearer token.
///
/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    app: Router,
    method: Method,
    path: &str,
    body: String,
    token: Option<&str>,
) -> axum::http::Response<axum::body::Body> {
    let authorization = token.map(|token| format!("Bearer {token}"));
    make_raw_request(app, method, path, body, authorization.as_deref()).await
}
