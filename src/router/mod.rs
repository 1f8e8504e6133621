//! JSON/HTTP surface, mounted under `/v1`.
pub mod claims;
pub mod create;
pub mod login;
pub mod status;
pub mod users;

use axum::extract::FromRequest;
use axum::routing::{MethodRouter, delete, get, patch, post};
use axum::{Router, middleware as AxumMiddleware};

use crate::middleware::{self, Guard};
use crate::user::Operation;
use crate::{AppState, ServerError};

/// JSON body whose rejections become `Validation` errors.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ServerError))]
pub struct JsonBody<T>(pub T);

/// Attach the access guard of `operation` to `route`.
fn guarded(
    state: &AppState,
    operation: Operation,
    route: MethodRouter<AppState>,
) -> MethodRouter<AppState> {
    route.route_layer(AxumMiddleware::from_fn_with_state(
        Guard::new(state, operation),
        middleware::authenticate,
    ))
}

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        // `POST /users/login` goes to `login`.
        .route(
            "/users/login",
            guarded(state, Operation::Login, post(login::handler)),
        )
        .route(
            "/users",
            guarded(state, Operation::Create, post(create::handler))
                .merge(guarded(state, Operation::GetAll, get(users::get::all))),
        )
        .route(
            "/users/many",
            guarded(state, Operation::CreateMany, post(create::many)),
        )
        .route(
            "/users/email/{email}",
            guarded(state, Operation::GetByEmail, get(users::get::by_email)),
        )
        .route(
            "/users/{id}",
            guarded(state, Operation::GetById, get(users::get::by_id))
                .merge(guarded(state, Operation::Update, patch(users::update::handler)))
                .merge(guarded(state, Operation::Delete, delete(users::delete::handler))),
        )
        .route(
            "/claims",
            guarded(state, Operation::GetUserClaims, get(claims::handler)),
        )
        // `GET /health` is never guarded.
        .route("/health", get(status::health))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};

    use crate::error::ResponseError;
    use crate::*;

    async fn body(response: axum::http::Response<axum::body::Body>) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let state = test_state();
        let app = app(state.clone());

        let response = make_request(
            app.clone(),
            Method::POST,
            "/v1/users",
            json!({"email": "a@b", "password": "p", "claims": []}).to_string(),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let id = body(response).await["inserted_id"].as_str().unwrap().to_owned();

        let token = test_token(&state, "viewer", &[]);
        let response = make_request(
            app,
            Method::GET,
            &format!("/v1/users/{id}"),
            String::default(),
            Some(&token),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[axum::http::header::CONTENT_TYPE],
            "application/json"
        );

        let user = body(response).await;
        assert_eq!(user["id"], id);
        assert_eq!(user["email"], "a@b");
        assert_eq!(user["claims"], json!([]));
        assert!(user.get("password_hash").is_none());
        assert!(user.get("created_at").is_some());
    }

    #[tokio::test]
    async fn test_login() {
        let state = test_state();
        let app = app(state.clone());
        make_request(
            app.clone(),
            Method::POST,
            "/v1/users",
            json!({"email": "a@b", "password": "p"}).to_string(),
            None,
        )
        .await;

        let response = make_request(
            app.clone(),
            Method::POST,
            "/v1/users/login",
            json!({"email": "a@b", "password": "p"}).to_string(),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let session = body(response).await;
        let claims = state
            .users
            .tokens()
            .decode(session["token"].as_str().unwrap())
            .unwrap();
        assert!(claims.authorized);
        assert_eq!(session["user"]["id"], claims.user_id);

        let response = make_request(
            app,
            Method::POST,
            "/v1/users/login",
            json!({"email": "a@b", "password": "wrong"}).to_string(),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body(response).await,
            json!(ResponseError {
                error: "incorrect password".into()
            })
        );
    }

    #[tokio::test]
    async fn test_admin_delete() {
        let state = test_state();
        let app = app(state.clone());
        let id = state
            .users
            .create(test_user("a@b"))
            .await
            .unwrap();

        let user = test_token(&state, "viewer", &[]);
        let response = make_request(
            app.clone(),
            Method::DELETE,
            &format!("/v1/users/{id}"),
            String::default(),
            Some(&user),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let admin = test_token(&state, "root", &[0]);
        let response = make_request(
            app.clone(),
            Method::DELETE,
            &format!("/v1/users/{id}"),
            String::default(),
            Some(&admin),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = make_request(
            app,
            Method::GET,
            &format!("/v1/users/{id}"),
            String::default(),
            Some(&admin),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_claim() {
        let app = app(test_state());
        let response = make_request(
            app,
            Method::POST,
            "/v1/users",
            json!({"password": "p", "claims": [999]}).to_string(),
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body(response).await["error"], "not valid claim detected: 999");
    }

    #[tokio::test]
    async fn test_create_many_is_atomic() {
        let state = test_state();
        let app = app(state.clone());
        let token = test_token(&state, "viewer", &[]);
        state.users.create(test_user("first@b")).await.unwrap();

        let response = make_request(
            app.clone(),
            Method::POST,
            "/v1/users/many",
            json!([
                {"email": "a@b", "password": "p", "claims": []},
                {"email": "c@d", "password": "p", "claims": [999]},
            ])
            .to_string(),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = make_request(
            app.clone(),
            Method::GET,
            "/v1/users",
            String::default(),
            Some(&token),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(response).await.as_array().unwrap().len(), 1);

        let response = make_request(
            app,
            Method::POST,
            "/v1/users/many",
            json!([
                {"email": "a@b", "password": "p"},
                {"email": "c@d", "password": "p"},
            ])
            .to_string(),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(response).await["inserted_ids"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_token_boundaries() {
        let state = test_state();
        let app = app(state.clone());

        let cases = [
            (None, "missing authorization token"),
            (Some("Bearer ".to_owned()), "invalid token format"),
            (Some("Basic abc".to_owned()), "invalid token format"),
            (
                Some(format!(
                    "Bearer {}",
                    crate::token::TokenManager::new("forged", &crate::claims::CATALOG)
                        .create("1", &[])
                        .unwrap()
                )),
                "invalid token",
            ),
        ];

        for (authorization, message) in cases {
            let response = make_raw_request(
                app.clone(),
                Method::GET,
                "/v1/users",
                String::default(),
                authorization.as_deref(),
            )
            .await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(body(response).await["error"], message);
        }
    }

    #[tokio::test]
    async fn test_malformed_json() {
        let app = app(test_state());
        let response = make_request(
            app,
            Method::POST,
            "/v1/users",
            "{not json".into(),
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_unknown_fields_are_ignored() {
        let app = app(test_state());
        let response = make_request(
            app,
            Method::POST,
            "/v1/users",
            json!({"email": "a@b", "password": "p", "nickname": "ada"}).to_string(),
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
    }
}
