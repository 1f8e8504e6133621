use axum::extract::{Path, State};
use axum::http::StatusCode;

use crate::AppState;
use crate::error::Result;
use crate::router::JsonBody;
use crate::user::UpdateUser;

/// Handler to update user fields. Absent fields are left untouched.
pub async fn handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<UpdateUser>,
) -> Result<StatusCode> {
    state.users.update(&id, body).await?;
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use crate::*;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_update_handler() {
        let state = test_state();
        let app = app(state.clone());
        let token = test_token(&state, "viewer", &[]);
        let id = state.users.create(test_user("ada@example.com")).await.unwrap();

        let response = make_request(
            app.clone(),
            Method::PATCH,
            &format!("/v1/users/{id}"),
            json!({"surnames": "Byron", "claims": [0]}).to_string(),
            Some(&token),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let user = state.users.get_by_id(&id).await.unwrap();
        assert_eq!(user.surnames, "Byron");
        assert_eq!(user.name, "Ada");
        assert_eq!(user.claim_ids, vec![0]);

        let response = make_request(
            app,
            Method::PATCH,
            &format!("/v1/users/{id}"),
            json!({"old_password": "nope", "new_password": "new"}).to_string(),
            Some(&token),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_requires_token() {
        let state = test_state();
        let app = app(state.clone());
        let id = state.users.create(test_user("ada@example.com")).await.unwrap();

        let response = make_request(
            app,
            Method::PATCH,
            &format!("/v1/users/{id}"),
            json!({"name": "Grace"}).to_string(),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(state.users.get_by_id(&id).await.unwrap().name, "Ada");
    }
}
