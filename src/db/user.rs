use chrono::Utc;
use sqlx::types::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::user::{NewUser, PhysicalStats, User};

const USER_COLUMNS: &str =
    "id, telegram_id, name, username, avatar_url, physical_stats, created_at, updated_at";

pub async fn find_by_telegram_id(db: &SqlitePool, telegram_id: i64) -> AppResult<User> {
    sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE telegram_id = ? AND deleted_at IS NULL"
    ))
    .bind(telegram_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".into()))
}

pub async fn find_by_id(db: &SqlitePool, id: Uuid) -> AppResult<User> {
    sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = ? AND deleted_at IS NULL"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".into()))
}

pub async fn create(db: &SqlitePool, new_user: &NewUser) -> AppResult<User> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO users (id, telegram_id, username, name, avatar_url, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(new_user.telegram_id)
    .bind(&new_user.username)
    .bind(&new_user.name)
    .bind(&new_user.avatar_url)
    .bind(now)
    .bind(now)
    .execute(db)
    .await?;

    find_by_id(db, id).await
}

/// Fills in whichever of username, avatar and name are still empty.
pub async fn backfill_profile(db: &SqlitePool, profile: &NewUser) -> AppResult<User> {
    sqlx::query(
        r#"
        UPDATE users SET
            username   = COALESCE(NULLIF(username, ''), ?),
            avatar_url = COALESCE(NULLIF(avatar_url, ''), ?),
            name       = COALESCE(NULLIF(name, ''), ?),
            updated_at = ?
        WHERE telegram_id = ?
        "#,
    )
    .bind(&profile.username)
    .bind(&profile.avatar_url)
    .bind(&profile.name)
    .bind(Utc::now())
    .bind(profile.telegram_id)
    .execute(db)
    .await?;

    find_by_telegram_id(db, profile.telegram_id).await
}

/// Looks the user up by Telegram id, creating or backfilling as needed.
/// The flag is true when the user was created by this call.
pub async fn ensure(db: &SqlitePool, profile: &NewUser) -> AppResult<(User, bool)> {
    match find_by_telegram_id(db, profile.telegram_id).await {
        Ok(user) if needs_backfill(&user) => Ok((backfill_profile(db, profile).await?, false)),
        Ok(user) => Ok((user, false)),
        Err(AppError::NotFound(_)) => {
            let user = create(db, profile).await?;
            tracing::info!(user_id = %user.id, telegram_id = user.telegram_id, "User registered");
            Ok((user, true))
        }
        Err(e) => Err(e),
    }
}

fn needs_backfill(user: &User) -> bool {
    let missing = |v: &Option<String>| v.as_deref().map_or(true, str::is_empty);
    missing(&user.username) || missing(&user.avatar_url)
}

pub async fn save_physical_stats(
    db: &SqlitePool,
    user_id: Uuid,
    stats: &PhysicalStats,
) -> AppResult<User> {
    let result = sqlx::query("UPDATE users SET physical_stats = ?, updated_at = ? WHERE id = ?")
        .bind(Json(stats))
        .bind(Utc::now())
        .bind(user_id)
        .execute(db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".into()));
    }

    find_by_id(db, user_id).await
}
