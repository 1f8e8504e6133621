use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::Result;
use crate::router::JsonBody;
use crate::user::CreateUser;

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub inserted_id: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct ManyResponse {
    pub inserted_ids: Vec<String>,
}

/// Handler to create user.
pub async fn handler(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<CreateUser>,
) -> Result<Json<Response>> {
    let inserted_id = state.users.create(body).await?;
    Ok(Json(Response { inserted_id }))
}

/// Handler to create a batch of users, all or none.
pub async fn many(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<Vec<CreateUser>>,
) -> Result<Json<ManyResponse>> {
    let inserted_ids = state.users.create_many(body).await?;
    Ok(Json(ManyResponse { inserted_ids }))
}
