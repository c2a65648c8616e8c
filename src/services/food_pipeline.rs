use std::fmt::Write as _;
use std::sync::Arc;

use chrono::Utc;
use sqlx::types::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::ai::{AiError, DetectedDish, DetectedIngredient, DishDetection, DishNutrition};
use crate::ai::{NutritionModel, PromptTemplates};
use crate::db;
use crate::error::{AppError, AppResult};
use crate::models::food::{FoodItem, FoodLog, IngredientInfo, Macronutrients, MealType};

/// Reference quantity the catalog's nutrition values are expressed in.
const REFERENCE_GRAMS: f64 = 100.0;

#[derive(Debug, Clone)]
pub struct ProcessedFood {
    pub food_item: FoodItem,
    pub food_log: FoodLog,
    pub quantity: f64,
    /// Scaled to `quantity`.
    pub calories: f64,
    /// Scaled to `quantity`.
    pub macronutrients: Macronutrients,
    pub ingredients: Vec<IngredientInfo>,
}

#[derive(Debug, thiserror::Error)]
pub enum SkipReason {
    #[error("nutrition analysis failed: {0}")]
    Nutrition(#[source] AiError),
    #[error("food item lookup failed: {0}")]
    Catalog(#[source] AppError),
    #[error("food log write failed: {0}")]
    Log(#[source] AppError),
}

#[derive(Debug)]
pub enum DishOutcome {
    Processed(ProcessedFood),
    Skipped { dish: String, reason: SkipReason },
}

#[derive(Debug, Default)]
pub struct ProcessingResult {
    pub outcomes: Vec<DishOutcome>,
    pub total_calories: f64,
    pub total_proteins: f64,
    pub total_carbs: f64,
    pub total_fats: f64,
    /// Detection-level confidence in `[0, 1]`.
    pub confidence: f64,
}

impl ProcessingResult {
    pub fn processed(&self) -> impl Iterator<Item = &ProcessedFood> {
        self.outcomes.iter().filter_map(|o| match o {
            DishOutcome::Processed(food) => Some(food),
            DishOutcome::Skipped { .. } => None,
        })
    }

    pub fn skipped(&self) -> impl Iterator<Item = (&str, &SkipReason)> {
        self.outcomes.iter().filter_map(|o| match o {
            DishOutcome::Skipped { dish, reason } => Some((dish.as_str(), reason)),
            DishOutcome::Processed(_) => None,
        })
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped().count()
    }

    pub fn food_names(&self) -> Vec<&str> {
        self.processed().map(|f| f.food_item.name.as_str()).collect()
    }

    fn add(&mut self, food: &ProcessedFood) {
        self.total_calories += food.calories;
        self.total_proteins += food.macronutrients.proteins;
        self.total_carbs += food.macronutrients.carbs;
        self.total_fats += food.macronutrients.fats;
    }
}

/// Photo URL in, food logs and nutrition totals out.
#[derive(Clone)]
pub struct FoodPipeline {
    db: SqlitePool,
    ai: Option<Arc<dyn NutritionModel>>,
}

impl FoodPipeline {
    pub fn new(db: SqlitePool, ai: Option<Arc<dyn NutritionModel>>) -> Self {
        Self { db, ai }
    }

    pub fn is_configured(&self) -> bool {
        self.ai.is_some()
    }

    /// Only a missing model or a failed detection call fail the whole run.
    /// Every dish after that is handled on its own and may be skipped.
    pub async fn process(
        &self,
        user_id: Uuid,
        image_url: &str,
        prompts: &PromptTemplates,
    ) -> AppResult<ProcessingResult> {
        let ai = self
            .ai
            .as_deref()
            .ok_or_else(|| AppError::Configuration("AI service is not configured".into()))?;

        let detection = ai.detect_dishes(image_url, &prompts.dish_detection).await?;

        let mut result = ProcessingResult {
            confidence: detection.overall_confidence,
            ..Default::default()
        };

        for dish in &detection.detected_dishes {
            match self
                .process_dish(ai, user_id, image_url, dish, &detection, prompts)
                .await
            {
                Ok(food) => {
                    result.add(&food);
                    result.outcomes.push(DishOutcome::Processed(food));
                }
                Err(reason) => {
                    tracing::warn!(
                        user_id = %user_id,
                        dish = %dish.dish_name.value,
                        reason = %reason,
                        "Skipping dish"
                    );
                    result.outcomes.push(DishOutcome::Skipped {
                        dish: dish.dish_name.value.clone(),
                        reason,
                    });
                }
            }
        }

        tracing::info!(
            user_id = %user_id,
            detected = detection.detected_dishes.len(),
            skipped = result.skipped_count(),
            total_calories = result.total_calories,
            "Food image processed"
        );

        Ok(result)
    }

    async fn process_dish(
        &self,
        ai: &dyn NutritionModel,
        user_id: Uuid,
        image_url: &str,
        dish: &DetectedDish,
        detection: &DishDetection,
        prompts: &PromptTemplates,
    ) -> Result<ProcessedFood, SkipReason> {
        let description = describe_dish(dish, detection);
        let nutrition = ai
            .analyze_nutrition(&description, &prompts.dish_nutrition)
            .await
            .map_err(SkipReason::Nutrition)?;

        let food_item = self
            .resolve_food_item(&nutrition, dish)
            .await
            .map_err(SkipReason::Catalog)?;

        let quantity = estimate_quantity(&dish.ingredients);
        let now = Utc::now();
        let food_log = FoodLog {
            id: Uuid::new_v4(),
            user_id,
            food_item_id: food_item.id,
            quantity,
            meal_type: MealType::at(&now),
            image_url: Some(image_url.to_string()),
            log_date: now,
            created_at: now,
            updated_at: now,
        };
        db::food::create_food_log(&self.db, &food_log)
            .await
            .map_err(SkipReason::Log)?;

        let factor = quantity / REFERENCE_GRAMS;
        Ok(ProcessedFood {
            calories: food_item.calories as f64 * factor,
            macronutrients: food_item.macronutrients.0.scaled(factor),
            ingredients: food_item.ingredients().to_vec(),
            quantity,
            food_item,
            food_log,
        })
    }

    /// Existing catalog entry with the same name, or a new one built from
    /// this nutrition estimate.
    async fn resolve_food_item(
        &self,
        nutrition: &DishNutrition,
        dish: &DetectedDish,
    ) -> AppResult<FoodItem> {
        match db::food::find_food_item_by_name(&self.db, &nutrition.name).await {
            Ok(item) => Ok(item),
            Err(AppError::NotFound(_)) => {
                let item = new_food_item(nutrition, dish);
                db::food::create_food_item(&self.db, &item).await?;
                tracing::debug!(food_item_id = %item.id, name = %item.name, "Food item created");
                Ok(item)
            }
            Err(e) => Err(e),
        }
    }
}

fn new_food_item(nutrition: &DishNutrition, dish: &DetectedDish) -> FoodItem {
    let now = Utc::now();
    let ingredients = dish
        .ingredients
        .iter()
        .map(|ing| IngredientInfo {
            name: ing.name.clone(),
            quantity: ing.quantity_estimation.value,
            unit: ing.quantity_estimation.unit.clone(),
            kind: ing.kind.clone(),
            state: ing.state.clone(),
        })
        .collect();

    FoodItem {
        id: Uuid::new_v4(),
        name: nutrition.name.clone(),
        barcode: None,
        calories: nutrition.calories_kcal as i64,
        macronutrients: Json(Macronutrients {
            proteins: nutrition.protein_g,
            fats: nutrition.fat_g,
            carbs: nutrition.carbohydrates_g,
        }),
        micronutrients: Some(Json(nutrition.micronutrients)),
        ingredients: Some(Json(ingredients)),
        created_at: now,
        updated_at: now,
    }
}

/// First ingredient measured in grams, else the reference quantity.
pub fn estimate_quantity(ingredients: &[DetectedIngredient]) -> f64 {
    ingredients
        .iter()
        .find(|ing| ing.quantity_estimation.unit == "gram")
        .map(|ing| ing.quantity_estimation.value)
        .unwrap_or(REFERENCE_GRAMS)
}

/// Plain-text dish summary for the nutrition prompt, escaped for embedding
/// in a JSON string.
pub fn describe_dish(dish: &DetectedDish, detection: &DishDetection) -> String {
    let mut text = String::new();

    let _ = writeln!(
        text,
        "Dish: {} (confidence: {:.1}%)",
        dish.dish_name.value,
        dish.dish_name.confidence * 100.0
    );

    text.push_str("\nIngredients:\n");
    for ing in &dish.ingredients {
        let _ = writeln!(
            text,
            "- {}: {:.1} {} ({}, {})",
            ing.name,
            ing.quantity_estimation.value,
            ing.quantity_estimation.unit,
            ing.kind,
            ing.state
        );
    }

    let _ = writeln!(text, "\nPreparation method: {}", dish.preparation_method_guess);

    if !dish.potential_hidden_ingredients.is_empty() {
        let _ = writeln!(
            text,
            "\nPotential hidden ingredients: {}",
            dish.potential_hidden_ingredients.join(", ")
        );
    }

    let _ = writeln!(
        text,
        "\nOverall confidence: {:.1}%",
        detection.overall_confidence * 100.0
    );
    let assessment = &detection.image_assessment;
    let _ = writeln!(
        text,
        "Image quality - Clarity: {}, Lighting: {}, Obstructions: {}",
        assessment.clarity, assessment.lighting, assessment.obstructions
    );

    escape_json_text(&text)
}

fn escape_json_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}
