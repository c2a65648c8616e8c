//! Request and response contracts for the REST API.
//!
//! - `*Request` is deserialized from a client JSON body
//! - `*Response` is serialized back to the client
//! - Field constraints are expressed with `validator`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::food::{IngredientInfo, Macronutrients, MealType, Micronutrients};
use crate::models::user::{Gender, PhysicalStats, User};

// ============================================================================
// Auth
// ============================================================================

/// POST /auth/telegram
#[derive(Debug, Deserialize, Validate)]
pub struct AuthTelegramRequest {
    /// Raw Mini App init data.
    #[validate(length(min = 1, message = "query cannot be empty"))]
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

// ============================================================================
// Users
// ============================================================================

pub const GENDER_MESSAGE: &str = "gender must be 'male', 'female', or 'other'";

/// POST /v1/physical-stats
#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = "validate_physical_stats"))]
pub struct PhysicalStatsRequest {
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub body_fat_percentage: Option<f64>,
}

impl PhysicalStatsRequest {
    /// `None` when the gender is not one of the known values.
    pub fn into_stats(self) -> Option<PhysicalStats> {
        Some(PhysicalStats {
            weight: self.weight,
            height: self.height,
            gender: Gender::parse(&self.gender)?,
            body_fat_percentage: self.body_fat_percentage,
        })
    }
}

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

fn validate_physical_stats(req: &PhysicalStatsRequest) -> Result<(), ValidationError> {
    if req.weight <= 0.0 {
        return Err(invalid("weight", "weight must be greater than 0"));
    }
    if req.height <= 0.0 {
        return Err(invalid("height", "height must be greater than 0"));
    }
    if req.gender.is_empty() {
        return Err(invalid("gender", "gender cannot be empty"));
    }
    if Gender::parse(&req.gender).is_none() {
        return Err(invalid("gender", GENDER_MESSAGE));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: User,
}

// ============================================================================
// Food
// ============================================================================

/// One entry of GET /v1/food-logs.
#[derive(Debug, Serialize)]
pub struct FoodLogSummary {
    pub id: Uuid,
    pub food_item_id: Uuid,
    pub name: String,
    pub calories: i64,
    pub log_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DailyFoodLogs {
    /// `YYYY-MM-DD`
    pub date: String,
    pub total_calories: i64,
    pub logs: Vec<FoodLogSummary>,
}

/// GET /v1/food/:id
#[derive(Debug, Serialize)]
pub struct FoodDetailResponse {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub calories: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub tags: Vec<String>,
    pub macronutrients: Macronutrients,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub micronutrients: Option<Micronutrients>,
    pub ingredients: Vec<IngredientInfo>,
    pub cooking_time: String,
}

#[derive(Debug, Serialize)]
pub struct RecognizedFood {
    pub id: Uuid,
    pub food_item_id: Uuid,
    pub name: String,
    pub quantity: f64,
    pub calories: i64,
    pub image_url: String,
    pub meal_type: MealType,
    pub log_date: DateTime<Utc>,
    pub macronutrients: Macronutrients,
    pub ingredients: Vec<IngredientInfo>,
}

#[derive(Debug, Serialize)]
pub struct RecognitionSummary {
    pub total_calories: f64,
    pub total_proteins: f64,
    pub total_carbs: f64,
    pub total_fats: f64,
    /// Percentage.
    pub confidence: f64,
    pub items_detected: usize,
    pub items_skipped: usize,
}

#[derive(Debug, Serialize)]
pub struct SkippedDish {
    pub dish: String,
    pub reason: String,
}

/// POST /v1/food/recognize
#[derive(Debug, Serialize)]
pub struct RecognitionResponse {
    pub food_logs: Vec<RecognizedFood>,
    pub summary: RecognitionSummary,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedDish>,
}
