use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::Result;
use crate::router::JsonBody;
use crate::user::Session;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Body {
    pub email: String,
    pub password: String,
}

/// Handler to check credentials and hand out a bearer token.
pub async fn handler(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<Body>,
) -> Result<Json<Session>> {
    let session = state.users.login(&body.email, &body.password).await?;
    Ok(Json(session))
}
