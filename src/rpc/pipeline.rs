//! Request pipeline for gRPC handlers.
//!
//! Every call goes through the same stages as HTTP requests: panic
//! recovery, logging, deadline and authentication.

use std::fmt::Debug;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use futures::FutureExt;
use regex_lite::Regex;
use tonic::{Request, Response, Status};

use crate::error::{Result, ServerError};
use crate::middleware::{check_access, panic_message};
use crate::telemetry::{record_rpc, truncate};
use crate::token::TokenManager;
use crate::user::{AccessPolicy, Operation};

const SERVICE_PATH: &str = "/users.v1.Users";

/// Credential fields of a `Debug` rendered message, optional or not.
static SECRET_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(\w*(?:password|token|authorization)\w*): (Some\()?"(?:[^"\\]|\\.)*""#)
        .expect("secret redaction pattern is valid")
});

/// Log-safe, bounded view of a message.
pub fn snapshot(message: &impl Debug, limit: usize) -> String {
    let text = format!("{message:?}");
    let redacted = SECRET_FIELD.replace_all(&text, r#"$1: $2"[REDACTED]""#);
    truncate(redacted.into_owned(), limit)
}

/// Shared stages wrapped around every handler.
#[derive(Clone)]
pub struct Pipeline {
    policy: Arc<AccessPolicy>,
    tokens: TokenManager,
    timeout: Duration,
    snapshot_limit: usize,
}

impl Pipeline {
    pub fn new(
        policy: Arc<AccessPolicy>,
        tokens: TokenManager,
        timeout: Duration,
        snapshot_limit: usize,
    ) -> Self {
        Self {
            policy,
            tokens,
            timeout,
            snapshot_limit,
        }
    }

    /// Run `handler` on `request` as `operation`.
    ///
    /// The handler gets the request with the caller's
    /// [`TokenClaims`](crate::token::TokenClaims) in
    /// its extensions when the operation is not public.
    pub async fn unary<Req, Res, F, Fut>(
        &self,
        operation: Operation,
        request: Request<Req>,
        handler: F,
    ) -> std::result::Result<Response<Res>, Status>
    where
        Req: Debug,
        Res: Debug,
        F: FnOnce(Request<Req>) -> Fut,
        Fut: Future<Output = Result<Res>>,
    {
        let method = format!("{SERVICE_PATH}/{}", operation.as_str());
        let start = Instant::now();
        let request_snapshot = snapshot(request.get_ref(), self.snapshot_limit);

        let result = match AssertUnwindSafe(self.run(operation, request, handler))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => Err(ServerError::internal(format!(
                "panic recovered on {method}: {}",
                panic_message(panic.as_ref())
            ))),
        };

        let latency = start.elapsed();
        match result {
            Ok(message) => {
                tracing::info!(
                    %method,
                    code = ?tonic::Code::Ok,
                    ?latency,
                    request = %request_snapshot,
                    response = %snapshot(&message, self.snapshot_limit),
                    "call handled"
                );
                record_rpc(&method, tonic::Code::Ok, latency);
                Ok(Response::new(message))
            },
            Err(err) => {
                let status = Status::from(err);
                tracing::info!(
                    %method,
                    code = ?status.code(),
                    ?latency,
                    request = %request_snapshot,
                    error = %status.message(),
                    "call handled"
                );
                record_rpc(&method, status.code(), latency);
                Err(status)
            },
        }
    }

    async fn run<Req, Res, F, Fut>(
        &self,
        operation: Operation,
        mut request: Request<Req>,
        handler: F,
    ) -> Result<Res>
    where
        F: FnOnce(Request<Req>) -> Fut,
        Fut: Future<Output = Result<Res>>,
    {
        let authorization = request
            .metadata()
            .get("authorization")
            .map(|value| value.to_str().unwrap_or_default());

        if let Some(claims) = check_access(&self.tokens, self.policy.access(operation), authorization)? {
            tracing::debug!(
                operation = operation.as_str(),
                user_id = %claims.user_id,
                "call authenticated"
            );
            request.extensions_mut().insert(claims);
        }

        match tokio::time::timeout(self.timeout, handler(request)).await {
            Ok(result) => result,
            Err(_) => Err(ServerError::internal("request deadline exceeded")),
        }
    }
}
