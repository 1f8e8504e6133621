//! Middlewares for routes.
//!
//! Applied from outer to inner: [`recover`], [`logger`], [`deadline`] and,
//! per route, [`authenticate`].

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures::FutureExt;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::token::{TokenClaims, TokenManager, extract_bearer};
use crate::user::{Access, Operation};

/// Largest body the logger buffers.
const BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Readable form of a panic payload.
pub fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else {
        "unknown panic".to_owned()
    }
}

/// Turn a panic anywhere downstream into an internal error response.
pub async fn recover(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => ServerError::internal(format!(
            "panic recovered on {method} {path}: {}",
            panic_message(panic.as_ref())
        ))
        .into_response(),
    }
}

/// Log method, path, status, latency and bounded body snapshots.
pub async fn logger(State(state): State<AppState>, req: Request, next: Next) -> Result<Response> {
    let path = req.uri().path().to_owned();
    let log = &state.config.log;
    if log.skip_paths.iter().any(|prefix| path.starts_with(prefix.as_str())) {
        return Ok(next.run(req).await);
    }

    let method = req.method().clone();
    let start = Instant::now();

    let (parts, body) = req.into_parts();
    let bytes = to_bytes(body, BODY_LIMIT)
        .await
        .map_err(|err| ServerError::Validation(format!("cannot read request body: {err}")))?;
    let request_snapshot = crate::telemetry::snapshot(&bytes, log.snapshot_limit);
    let req = Request::from_parts(parts, Body::from(bytes));

    let response = next.run(req).await;

    let (parts, body) = response.into_parts();
    let bytes = to_bytes(body, usize::MAX)
        .await
        .map_err(|err| ServerError::wrap("cannot read response body", err))?;
    let response_snapshot = crate::telemetry::snapshot(&bytes, log.snapshot_limit);

    tracing::info!(
        %method,
        %path,
        status = parts.status.as_u16(),
        latency = ?start.elapsed(),
        request = %request_snapshot,
        response = %response_snapshot,
        "request handled"
    );

    Ok(Response::from_parts(parts, Body::from(bytes)))
}

/// Fail requests outliving the configured timeout.
pub async fn deadline(State(timeout): State<Duration>, req: Request, next: Next) -> Response {
    match tokio::time::timeout(timeout, next.run(req)).await {
        Ok(response) => response,
        Err(_) => ServerError::internal("request deadline exceeded").into_response(),
    }
}

/// Check an `Authorization` value against `access`.
///
/// Public operations never look at the header.
pub fn check_access(
    tokens: &TokenManager,
    access: &Access,
    authorization: Option<&str>,
) -> Result<Option<TokenClaims>> {
    if *access == Access::Public {
        return Ok(None);
    }

    let token = extract_bearer(authorization)?;
    let claims = tokens.decode(token)?;
    tokens.authorize(&claims, access.required_claims())?;

    Ok(Some(claims))
}

/// State of the [`authenticate`] middleware of one route.
#[derive(Clone)]
pub struct Guard {
    state: AppState,
    operation: Operation,
}

impl Guard {
    pub fn new(state: &AppState, operation: Operation) -> Self {
        Self {
            state: state.clone(),
            operation,
        }
    }
}

/// Enforce the access declared for the route operation and expose the
/// token claims to handlers.
pub async fn authenticate(
    State(guard): State<Guard>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let access = guard.state.policy.access(guard.operation);
    let authorization = req
        .headers()
        .get(header::AUTHORIZATION)
        .map(|value| value.to_str().unwrap_or_default());

    if let Some(claims) = check_access(guard.state.users.tokens(), access, authorization)? {
        tracing::debug!(
            operation = guard.operation.as_str(),
            user_id = %claims.user_id,
            "request authenticated"
        );
        req.extensions_mut().insert(claims);
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::{ADMIN, CATALOG};
    use crate::error::{ErrorKind, ResponseError};
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;
    use http_body_util::BodyExt;
    use tower::util::ServiceExt;

    async fn boom() -> &'static str {
        panic!("boom")
    }

    async fn slow() -> &'static str {
        tokio::time::sleep(Duration::from_secs(5)).await;
        "late"
    }

    async fn call(app: Router, path: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: ResponseError = serde_json::from_slice(&body).unwrap();
        (status, body.error)
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");

        let payload: Box<dyn Any + Send> = Box::new(42);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn test_check_access() {
        let tokens = TokenManager::new("secret", &CATALOG);
        let user = format!("Bearer {}", tokens.create("1", &[]).unwrap());
        let admin = format!("Bearer {}", tokens.create("2", &[0]).unwrap());
        let admin_only = Access::Claims(vec![ADMIN]);

        assert!(check_access(&tokens, &Access::Public, None).unwrap().is_none());

        let err = check_access(&tokens, &Access::Authenticated, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthRequired);

        let claims = check_access(&tokens, &Access::Authenticated, Some(&user))
            .unwrap()
            .unwrap();
        assert_eq!(claims.user_id, "1");

        let err = check_access(&tokens, &admin_only, Some(&user)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        assert!(check_access(&tokens, &admin_only, Some(&admin)).is_ok());
    }

    #[tokio::test]
    async fn test_recover() {
        let app = Router::new()
            .route("/boom", get(boom))
            .layer(axum::middleware::from_fn(recover));

        let (status, error) = call(app, "/boom").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error, "panic recovered on GET /boom: boom");
    }

    #[tokio::test]
    async fn test_deadline() {
        let app = Router::new()
            .route("/slow", get(slow))
            .layer(axum::middleware::from_fn_with_state(
                Duration::from_millis(10),
                deadline,
            ));

        let (status, error) = call(app, "/slow").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error, "request deadline exceeded");
    }
}
