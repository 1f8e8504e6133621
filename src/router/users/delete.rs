use axum::extract::{Path, State};
use axum::http::StatusCode;

use crate::AppState;
use crate::error::Result;

/// Handler to delete a user. Requires the `admin` claim.
pub async fn handler(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode> {
    state.users.delete(&id).await?;
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use crate::*;
    use axum::http::{Method, StatusCode};

    #[tokio::test]
    async fn test_delete_missing_user() {
        let state = test_state();
        let app = app(state.clone());
        let token = test_token(&state, "root", &[0]);

        let response = make_request(
            app,
            Method::DELETE,
            "/v1/users/42",
            String::default(),
            Some(&token),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
