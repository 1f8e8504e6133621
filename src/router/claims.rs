use std::collections::BTreeMap;

use axum::Json;
use axum::extract::State;

use crate::AppState;
use crate::claims::ClaimId;

/// Handler listing the claim catalog.
pub async fn handler(State(state): State<AppState>) -> Json<BTreeMap<ClaimId, String>> {
    Json(state.users.get_user_claims())
}
