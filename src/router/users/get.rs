//! Read users.

use axum::Json;
use axum::extract::{Path, State};

use crate::AppState;
use crate::error::Result;
use crate::user::User;

/// Handler listing every user.
pub async fn all(State(state): State<AppState>) -> Result<Json<Vec<User>>> {
    Ok(Json(state.users.get_all().await?))
}

pub async fn by_id(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<User>> {
    Ok(Json(state.users.get_by_id(&id).await?))
}

pub async fn by_email(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<User>> {
    Ok(Json(state.users.get_by_email(&email).await?))
}

#[cfg(test)]
mod tests {
    use crate::*;
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_empty_listing() {
        let state = test_state();
        let app = app(state.clone());
        let token = test_token(&state, "viewer", &[]);

        let response =
            make_request(app, Method::GET, "/v1/users", String::default(), Some(&token)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"[]");
    }

    #[tokio::test]
    async fn test_get_by_email() {
        let state = test_state();
        let app = app(state.clone());
        let token = test_token(&state, "viewer", &[]);
        let id = state.users.create(test_user("ada@example.com")).await.unwrap();

        let response = make_request(
            app.clone(),
            Method::GET,
            "/v1/users/email/ada@example.com",
            String::default(),
            Some(&token),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let user: user::User = serde_json::from_slice(&body).unwrap();
        assert_eq!(user.id, Some(id));

        let response = make_request(
            app,
            Method::GET,
            "/v1/users/email/grace@example.com",
            String::default(),
            Some(&token),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_by_malformed_id() {
        let state = test_state();
        let app = app(state.clone());
        let token = test_token(&state, "viewer", &[]);

        let response = make_request(
            app,
            Method::GET,
            "/v1/users/not-an-id",
            String::default(),
            Some(&token),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
