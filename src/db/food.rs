use chrono::{Duration, NaiveDate, TimeZone, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::food::{FoodItem, FoodLog};

const FOOD_ITEM_COLUMNS: &str = "id, name, barcode, calories, macronutrients, micronutrients, \
                                 ingredients, created_at, updated_at";
const FOOD_LOG_COLUMNS: &str = "id, user_id, food_item_id, quantity, meal_type, image_url, \
                                log_date, created_at, updated_at";

/// Exact, case-sensitive name match.
pub async fn find_food_item_by_name(db: &SqlitePool, name: &str) -> AppResult<FoodItem> {
    sqlx::query_as::<_, FoodItem>(&format!(
        "SELECT {FOOD_ITEM_COLUMNS} FROM food_items WHERE name = ? ORDER BY created_at LIMIT 1"
    ))
    .bind(name)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Food item '{name}' not found")))
}

pub async fn get_food_item(db: &SqlitePool, id: Uuid) -> AppResult<FoodItem> {
    sqlx::query_as::<_, FoodItem>(&format!(
        "SELECT {FOOD_ITEM_COLUMNS} FROM food_items WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::NotFound("Food item not found".into()))
}

pub async fn create_food_item(db: &SqlitePool, item: &FoodItem) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO food_items
            (id, name, barcode, calories, macronutrients, micronutrients, ingredients, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(item.id)
    .bind(&item.name)
    .bind(&item.barcode)
    .bind(item.calories)
    .bind(&item.macronutrients)
    .bind(&item.micronutrients)
    .bind(&item.ingredients)
    .bind(item.created_at)
    .bind(item.updated_at)
    .execute(db)
    .await?;

    Ok(())
}

pub async fn create_food_log(db: &SqlitePool, log: &FoodLog) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO food_logs
            (id, user_id, food_item_id, quantity, meal_type, image_url, log_date, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(log.id)
    .bind(log.user_id)
    .bind(log.food_item_id)
    .bind(log.quantity)
    .bind(log.meal_type)
    .bind(&log.image_url)
    .bind(log.log_date)
    .bind(log.created_at)
    .bind(log.updated_at)
    .execute(db)
    .await?;

    Ok(())
}

/// Logs in `[date 00:00 UTC, date + 24h)`, oldest first.
pub async fn list_user_food_logs(
    db: &SqlitePool,
    user_id: Uuid,
    date: NaiveDate,
) -> AppResult<Vec<FoodLog>> {
    let start = Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN));
    let end = start + Duration::hours(24);

    let logs = sqlx::query_as::<_, FoodLog>(&format!(
        r#"
        SELECT {FOOD_LOG_COLUMNS} FROM food_logs
        WHERE user_id = ? AND log_date >= ? AND log_date < ?
        ORDER BY log_date ASC
        "#
    ))
    .bind(user_id)
    .bind(start)
    .bind(end)
    .fetch_all(db)
    .await?;

    Ok(logs)
}

/// Newest first.
pub async fn list_food_logs_by_food_item(
    db: &SqlitePool,
    food_item_id: Uuid,
) -> AppResult<Vec<FoodLog>> {
    let logs = sqlx::query_as::<_, FoodLog>(&format!(
        "SELECT {FOOD_LOG_COLUMNS} FROM food_logs WHERE food_item_id = ? ORDER BY log_date DESC"
    ))
    .bind(food_item_id)
    .fetch_all(db)
    .await?;

    Ok(logs)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::pool::test_pool;
    use crate::models::food::{IngredientInfo, Macronutrients, MealType, Micronutrients};
    use crate::models::user::NewUser;
    use chrono::DateTime;
    use sqlx::types::Json;

    pub(crate) fn sample_item(name: &str, calories: i64) -> FoodItem {
        let now = Utc::now();
        FoodItem {
            id: Uuid::new_v4(),
            name: name.into(),
            barcode: None,
            calories,
            macronutrients: Json(Macronutrients {
                proteins: 10.0,
                fats: 5.0,
                carbs: 20.0,
            }),
            micronutrients: Some(Json(Micronutrients {
                sodium_mg: 300.0,
                ..Default::default()
            })),
            ingredients: Some(Json(vec![IngredientInfo {
                name: "lettuce".into(),
                quantity: 80.0,
                unit: "gram".into(),
                kind: "vegetable".into(),
                state: "raw".into(),
            }])),
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn sample_log(
        user_id: Uuid,
        food_item_id: Uuid,
        quantity: f64,
        at: DateTime<Utc>,
    ) -> FoodLog {
        FoodLog {
            id: Uuid::new_v4(),
            user_id,
            food_item_id,
            quantity,
            meal_type: MealType::at(&at),
            image_url: Some(format!("https://cdn.example.com/{}.jpg", at.timestamp())),
            log_date: at,
            created_at: at,
            updated_at: at,
        }
    }

    async fn user(db: &SqlitePool) -> Uuid {
        let profile = NewUser::from_telegram(99, Some("eater"), "Eve", None);
        crate::db::user::create(db, &profile).await.unwrap().id
    }

    #[tokio::test]
    async fn test_food_item_lookup_by_name() {
        let db = test_pool().await;
        let item = sample_item("Caesar Salad", 350);
        create_food_item(&db, &item).await.unwrap();

        let first = find_food_item_by_name(&db, "Caesar Salad").await.unwrap();
        let second = find_food_item_by_name(&db, "Caesar Salad").await.unwrap();
        assert_eq!(first.id, item.id);
        assert_eq!(second.id, item.id);
        assert_eq!(first.macronutrients.0.proteins, 10.0);
        assert_eq!(first.ingredients().len(), 1);
        assert_eq!(first.micronutrients.unwrap().0.sodium_mg, 300.0);
    }

    #[tokio::test]
    async fn test_food_item_lookup_is_exact() {
        let db = test_pool().await;
        create_food_item(&db, &sample_item("Caesar Salad", 350))
            .await
            .unwrap();

        let err = find_food_item_by_name(&db, "caesar salad").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        let err = find_food_item_by_name(&db, "Caesar").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_duplicate_food_item_id_fails() {
        let db = test_pool().await;
        let item = sample_item("Soup", 40);
        create_food_item(&db, &item).await.unwrap();
        let err = create_food_item(&db, &item).await.unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
    }

    #[tokio::test]
    async fn test_get_food_item_missing() {
        let db = test_pool().await;
        let err = get_food_item(&db, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_user_food_logs_day_window() {
        let db = test_pool().await;
        let user_id = user(&db).await;
        let item = sample_item("Toast", 250);
        create_food_item(&db, &item).await.unwrap();

        let day = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let at = |h: u32, m: u32, s: u32| Utc.from_utc_datetime(&day.and_hms_opt(h, m, s).unwrap());
        let before = Utc.from_utc_datetime(
            &day.pred_opt().unwrap().and_hms_milli_opt(23, 59, 59, 999).unwrap(),
        );
        let next_day = Utc.from_utc_datetime(&day.succ_opt().unwrap().and_hms_opt(0, 0, 0).unwrap());

        for ts in [at(12, 0, 0), at(0, 0, 0), before, next_day, at(23, 59, 59)] {
            create_food_log(&db, &sample_log(user_id, item.id, 100.0, ts))
                .await
                .unwrap();
        }

        let logs = list_user_food_logs(&db, user_id, day).await.unwrap();
        let times: Vec<_> = logs.iter().map(|l| l.log_date).collect();
        assert_eq!(times, vec![at(0, 0, 0), at(12, 0, 0), at(23, 59, 59)]);
    }

    #[tokio::test]
    async fn test_user_food_logs_scoped_to_user() {
        let db = test_pool().await;
        let user_id = user(&db).await;
        let other = crate::db::user::create(&db, &NewUser::from_telegram(100, None, "", None))
            .await
            .unwrap()
            .id;
        let item = sample_item("Toast", 250);
        create_food_item(&db, &item).await.unwrap();

        let now = Utc::now();
        create_food_log(&db, &sample_log(other, item.id, 100.0, now))
            .await
            .unwrap();

        let logs = list_user_food_logs(&db, user_id, now.date_naive())
            .await
            .unwrap();
        assert!(logs.is_empty());
    }

    #[tokio::test]
    async fn test_logs_by_food_item_newest_first() {
        let db = test_pool().await;
        let user_id = user(&db).await;
        let item = sample_item("Pasta", 160);
        create_food_item(&db, &item).await.unwrap();

        let now = Utc::now();
        let older = sample_log(user_id, item.id, 100.0, now - Duration::hours(5));
        let newer = sample_log(user_id, item.id, 150.0, now);
        create_food_log(&db, &older).await.unwrap();
        create_food_log(&db, &newer).await.unwrap();

        let logs = list_food_logs_by_food_item(&db, item.id).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].id, newer.id);
        assert_eq!(logs[0].meal_type, newer.meal_type);
        assert_eq!(logs[1].id, older.id);
    }

    #[tokio::test]
    async fn test_food_log_requires_existing_item() {
        let db = test_pool().await;
        let user_id = user(&db).await;
        let log = sample_log(user_id, Uuid::new_v4(), 100.0, Utc::now());
        assert!(create_food_log(&db, &log).await.is_err());
    }
}
