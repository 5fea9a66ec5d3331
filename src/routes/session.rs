use axum::{extract::State, Json};
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::{self, IssuedToken};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    password: String,
}

/// Exchanges the reviewer password for a signed session token.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<IssuedToken>, ApiError> {
    let issued = auth::login(&state, &request.password).await?;
    Ok(Json(issued))
}
