use axum::{extract::State, Extension, Json};
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::db;
use crate::dto::{PhysicalStatsRequest, UserResponse, GENDER_MESSAGE};
use crate::error::{AppError, AppResult};
use crate::models::user::User;
use crate::AppState;

/// GET /v1/me
pub async fn me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<User>> {
    let user = db::user::find_by_id(&state.db, auth_user.id).await?;
    Ok(Json(user))
}

/// POST /v1/physical-stats
pub async fn save_physical_stats(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<PhysicalStatsRequest>,
) -> AppResult<Json<UserResponse>> {
    req.validate()?;
    let stats = req
        .into_stats()
        .ok_or_else(|| AppError::Validation(GENDER_MESSAGE.into()))?;

    let user = db::user::save_physical_stats(&state.db, auth_user.id, &stats).await?;
    tracing::info!(user_id = %user.id, chat_id = auth_user.chat_id, "Physical stats updated");
    Ok(Json(UserResponse { user }))
}
