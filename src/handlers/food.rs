use axum::{
    extract::{Multipart, Path, State},
    Extension, Json,
};
use bytes::Bytes;
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::db;
use crate::dto::{
    DailyFoodLogs, FoodDetailResponse, FoodLogSummary, RecognitionResponse, RecognitionSummary,
    RecognizedFood, SkippedDish,
};
use crate::error::{AppError, AppResult};
use crate::models::food::{IngredientInfo, Macronutrients};
use crate::storage::food_image_key;
use crate::AppState;

const HISTORY_DAYS: i64 = 7;

/// GET /v1/food-logs
///
/// One bucket per day for today and the six days before it, newest first.
pub async fn list_food_logs(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<Vec<DailyFoodLogs>>> {
    let today = Utc::now().date_naive();
    let mut days = Vec::with_capacity(HISTORY_DAYS as usize);

    for offset in 0..HISTORY_DAYS {
        let date = today - Duration::days(offset);
        let mut bucket = DailyFoodLogs {
            date: date.format("%Y-%m-%d").to_string(),
            total_calories: 0,
            logs: Vec::new(),
        };

        for log in db::food::list_user_food_logs(&state.db, auth_user.id, date).await? {
            let item = match db::food::get_food_item(&state.db, log.food_item_id).await {
                Ok(item) => item,
                Err(e) => {
                    tracing::warn!(food_log_id = %log.id, error = %e, "Skipping log without food item");
                    continue;
                }
            };

            let calories = (item.calories as f64 * log.quantity / 100.0).trunc() as i64;
            bucket.total_calories += calories;
            bucket.logs.push(FoodLogSummary {
                id: log.id,
                food_item_id: log.food_item_id,
                name: item.name,
                calories,
                log_time: log.log_date,
                image_url: log.image_url,
            });
        }

        days.push(bucket);
    }

    Ok(Json(days))
}

/// GET /v1/food/:id
pub async fn get_food_detail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<FoodDetailResponse>> {
    let item = db::food::get_food_item(&state.db, id).await?;

    let image_url = db::food::list_food_logs_by_food_item(&state.db, id)
        .await?
        .into_iter()
        .next()
        .and_then(|log| log.image_url);

    let ingredients = item.ingredients().to_vec();
    let macronutrients = item.macronutrients.0;

    Ok(Json(FoodDetailResponse {
        id: item.id,
        description: describe(&ingredients),
        tags: tags(&macronutrients, &ingredients),
        cooking_time: format!("{} min", cooking_minutes(&ingredients)),
        name: item.name,
        calories: item.calories,
        image_url,
        macronutrients,
        micronutrients: item.micronutrients.map(|m| m.0),
        ingredients,
    }))
}

fn tags(macros: &Macronutrients, ingredients: &[IngredientInfo]) -> Vec<String> {
    let mut tags = Vec::new();
    if macros.proteins > 20.0 {
        tags.push("PROTEIN".to_string());
    }
    if !ingredients
        .iter()
        .any(|i| i.kind == "meat" || i.kind == "seafood")
    {
        tags.push("VEGETARIAN".to_string());
    }
    if ingredients.len() <= 5 {
        tags.push("EASY".to_string());
    }
    tags
}

fn describe(ingredients: &[IngredientInfo]) -> String {
    if ingredients.is_empty() {
        return "A delicious meal".to_string();
    }
    let main: Vec<&str> = ingredients.iter().take(3).map(|i| i.name.as_str()).collect();
    format!(
        "A flavorful meal with {}: simple, tasty, and satisfying.",
        main.join(", ")
    )
}

fn cooking_minutes(ingredients: &[IngredientInfo]) -> u32 {
    ingredients
        .iter()
        .map(|i| match i.state.as_str() {
            "baked" | "roasted" => 30,
            "boiled" | "steamed" => 20,
            "grilled" | "fried" => 15,
            _ => 5,
        })
        .fold(5, u32::max)
}

/// Uploads a food photo and returns its public URL.
pub(crate) async fn upload_food_image(state: &AppState, image: Bytes) -> AppResult<String> {
    let storage = state
        .storage
        .as_ref()
        .ok_or_else(|| AppError::Storage("object storage is not configured".into()))?;

    let key = food_image_key();
    let size = image.len();
    let url = storage
        .upload(image, &key, "image/jpeg")
        .await
        .map_err(|e| AppError::Storage(e.to_string()))?;

    tracing::debug!(key = %key, size, "Food image uploaded");
    Ok(url)
}

async fn read_image(multipart: &mut Multipart) -> AppResult<Option<Bytes>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(e.body_text()))?
    {
        if field.name() == Some("image") {
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(e.body_text()))?;
            return Ok(Some(data));
        }
    }
    Ok(None)
}

/// POST /v1/food/recognize
pub async fn recognize(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    mut multipart: Multipart,
) -> AppResult<Json<RecognitionResponse>> {
    let image = read_image(&mut multipart)
        .await?
        .filter(|b| !b.is_empty())
        .ok_or_else(|| AppError::Validation("Image file is required".into()))?;

    if !state.pipeline.is_configured() {
        return Err(AppError::Configuration("AI service is not configured".into()));
    }

    let image_url = upload_food_image(&state, image).await?;
    let result = state
        .pipeline
        .process(auth_user.id, &image_url, &state.prompts)
        .await?;

    let food_logs: Vec<RecognizedFood> = result
        .processed()
        .map(|food| RecognizedFood {
            id: food.food_log.id,
            food_item_id: food.food_item.id,
            name: food.food_item.name.clone(),
            quantity: food.quantity,
            calories: food.calories as i64,
            image_url: image_url.clone(),
            meal_type: food.food_log.meal_type,
            log_date: food.food_log.log_date,
            macronutrients: food.macronutrients,
            ingredients: food.ingredients.clone(),
        })
        .collect();

    let summary = RecognitionSummary {
        total_calories: result.total_calories,
        total_proteins: result.total_proteins,
        total_carbs: result.total_carbs,
        total_fats: result.total_fats,
        confidence: result.confidence * 100.0,
        items_detected: food_logs.len(),
        items_skipped: result.skipped_count(),
    };

    tracing::info!(
        user_id = %auth_user.id,
        chat_id = auth_user.chat_id,
        detected = summary.items_detected,
        skipped = summary.items_skipped,
        "Food recognized"
    );

    let skipped = result
        .skipped()
        .map(|(dish, reason)| SkippedDish {
            dish: dish.to_string(),
            reason: reason.to_string(),
        })
        .collect();

    Ok(Json(RecognitionResponse {
        food_logs,
        summary,
        skipped,
    }))
}
