use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Catalog entry. Nutrition values are per 100 g; `name` is the dedup key.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FoodItem {
    pub id: Uuid,
    pub name: String,
    pub barcode: Option<String>,
    pub calories: i64,
    pub macronutrients: Json<Macronutrients>,
    pub micronutrients: Option<Json<Micronutrients>>,
    pub ingredients: Option<Json<Vec<IngredientInfo>>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FoodItem {
    pub fn ingredients(&self) -> &[IngredientInfo] {
        self.ingredients.as_ref().map(|i| i.0.as_slice()).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Macronutrients {
    #[serde(rename = "proteins_g")]
    pub proteins: f64,
    #[serde(rename = "fats_g")]
    pub fats: f64,
    #[serde(rename = "carbs_g")]
    pub carbs: f64,
}

impl Macronutrients {
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            proteins: self.proteins * factor,
            fats: self.fats * factor,
            carbs: self.carbs * factor,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Micronutrients {
    #[serde(default)]
    pub sodium_mg: f64,
    #[serde(default)]
    pub fiber_g: f64,
    #[serde(default)]
    pub sugar_g: f64,
    #[serde(default)]
    pub iron_mg: f64,
    #[serde(default)]
    pub calcium_mg: f64,
    #[serde(default)]
    pub vitamin_c_mg: f64,
    #[serde(default)]
    pub vitamin_a_iu: f64,
    #[serde(default)]
    pub potassium_mg: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngredientInfo {
    pub name: String,
    pub quantity: f64,
    pub unit: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FoodLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub food_item_id: Uuid,
    pub quantity: f64,
    pub meal_type: MealType,
    pub image_url: Option<String>,
    pub log_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MealType {
    Breakfast,
    Lunch,
    Snack,
    Dinner,
}

impl MealType {
    pub fn for_hour(hour: u32) -> Self {
        match hour {
            5..=10 => Self::Breakfast,
            11..=14 => Self::Lunch,
            15..=17 => Self::Snack,
            _ => Self::Dinner,
        }
    }

    pub fn at<T: Timelike>(time: &T) -> Self {
        Self::for_hour(time.hour())
    }
}
