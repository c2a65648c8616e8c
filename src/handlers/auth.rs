use axum::{extract::State, Json};
use chrono::Duration;
use validator::Validate;

use crate::auth::jwt::create_access_token;
use crate::db;
use crate::dto::{AuthResponse, AuthTelegramRequest};
use crate::error::{AppError, AppResult};
use crate::models::user::NewUser;
use crate::telegram::init_data;
use crate::AppState;

/// Maximum age of Mini App init data.
const INIT_DATA_MAX_AGE_HOURS: i64 = 24;

/// POST /auth/telegram
pub async fn telegram_auth(
    State(state): State<AppState>,
    Json(req): Json<AuthTelegramRequest>,
) -> AppResult<Json<AuthResponse>> {
    req.validate()?;

    let init = init_data::validate_and_parse(
        &req.query,
        &state.config.telegram_bot_token,
        Duration::hours(INIT_DATA_MAX_AGE_HOURS),
    )
    .map_err(|e| {
        tracing::debug!(error = %e, "Rejected init data");
        AppError::InvalidInitData
    })?;

    let profile = NewUser::from_telegram(
        init.user.id,
        init.user.username.as_deref(),
        &init.user.first_name,
        init.user.last_name.as_deref(),
    );
    let (user, _) = db::user::ensure(&state.db, &profile).await?;
    let token = create_access_token(user.id, user.telegram_id, &state.config)?;

    tracing::info!(user_id = %user.id, auth_date = %init.auth_date, "Telegram login");
    Ok(Json(AuthResponse { token, user }))
}
