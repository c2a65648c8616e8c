//! Nutrition model: dish detection from a photo and nutrition estimation
//! from a dish description.

pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub use openai::OpenAiClient;

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("failed to parse prompt template: {0}")]
    Template(#[source] serde_json::Error),

    #[error("request to model failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("model returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("model response has no output text")]
    EmptyOutput,

    #[error("failed to decode model output: {0}")]
    Decode(#[source] serde_json::Error),
}

impl From<AiError> for AppError {
    fn from(err: AiError) -> Self {
        AppError::Upstream(err.to_string())
    }
}

#[async_trait]
pub trait NutritionModel: Send + Sync {
    async fn detect_dishes(
        &self,
        image_url: &str,
        prompt_template: &str,
    ) -> Result<DishDetection, AiError>;

    async fn analyze_nutrition(
        &self,
        description: &str,
        prompt_template: &str,
    ) -> Result<DishNutrition, AiError>;
}

/// Request bodies for the two model calls, read once at startup.
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    pub dish_detection: String,
    pub dish_nutrition: String,
}

impl PromptTemplates {
    pub fn load(dir: &std::path::Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let read = |file: &str| {
            let path = dir.join(file);
            std::fs::read_to_string(&path)
                .with_context(|| format!("failed to load prompt {}", path.display()))
        };

        Ok(Self {
            dish_detection: read("dish_detection.json")?,
            dish_nutrition: read("dish_nutrition.json")?,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DishDetection {
    #[serde(default)]
    pub detected_dishes: Vec<DetectedDish>,
    #[serde(default)]
    pub overall_confidence: f64,
    #[serde(default)]
    pub unidentifiable_items: Vec<String>,
    #[serde(default)]
    pub image_assessment: ImageAssessment,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectedDish {
    pub dish_name: DishName,
    #[serde(default)]
    pub ingredients: Vec<DetectedIngredient>,
    #[serde(default)]
    pub preparation_method_guess: String,
    #[serde(default)]
    pub potential_hidden_ingredients: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DishName {
    pub value: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub alternatives: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectedIngredient {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub quantity_estimation: QuantityEstimation,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuantityEstimation {
    pub value: f64,
    pub unit: String,
    #[serde(default)]
    pub estimation_basis: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageAssessment {
    #[serde(default)]
    pub clarity: String,
    #[serde(default)]
    pub lighting: String,
    #[serde(default)]
    pub obstructions: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DishNutrition {
    pub name: String,
    pub calories_kcal: f64,
    pub protein_g: f64,
    pub carbohydrates_g: f64,
    pub fat_g: f64,
    #[serde(default)]
    pub micronutrients: crate::models::food::Micronutrients,
}
