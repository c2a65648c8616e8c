//! In-process fakes for the AI model, object storage and Telegram.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use crate::ai::{
    AiError, DetectedDish, DetectedIngredient, DishDetection, DishName, DishNutrition,
    ImageAssessment, NutritionModel, PromptTemplates, QuantityEstimation,
};
use crate::config::Config;
use crate::db::pool::test_pool;
use crate::models::food::Micronutrients;
use crate::models::user::{NewUser, User};
use crate::services::{FoodPipeline, PhotoJobs};
use crate::storage::ObjectStorage;
use crate::telegram::types::{Chat, Message, SendMessage, SendPhoto};
use crate::telegram::BotApi;
use crate::AppState;

pub fn prompts() -> PromptTemplates {
    PromptTemplates::load(&Path::new(env!("CARGO_MANIFEST_DIR")).join("templates/prompts"))
        .unwrap()
}

/// Dish with `(name, value, unit)` ingredients.
pub fn dish(name: &str, ingredients: &[(&str, f64, &str)]) -> DetectedDish {
    DetectedDish {
        dish_name: DishName {
            value: name.into(),
            confidence: 0.9,
            alternatives: vec![],
        },
        ingredients: ingredients
            .iter()
            .map(|(name, value, unit)| DetectedIngredient {
                name: name.to_string(),
                kind: "vegetable".into(),
                state: "raw".into(),
                confidence: 0.8,
                quantity_estimation: QuantityEstimation {
                    value: *value,
                    unit: unit.to_string(),
                    estimation_basis: "plate size".into(),
                },
            })
            .collect(),
        preparation_method_guess: "raw".into(),
        potential_hidden_ingredients: vec![],
    }
}

pub fn nutrition(name: &str, kcal: f64, protein: f64, carbs: f64, fat: f64) -> DishNutrition {
    DishNutrition {
        name: name.into(),
        calories_kcal: kcal,
        protein_g: protein,
        carbohydrates_g: carbs,
        fat_g: fat,
        micronutrients: Micronutrients {
            sodium_mg: 120.0,
            fiber_g: 2.0,
            ..Default::default()
        },
    }
}

/// Answers nutrition requests by the dish name found in the description.
/// Dishes without a registered answer fail.
pub struct FakeModel {
    detection: Option<DishDetection>,
    nutrition: HashMap<String, DishNutrition>,
    descriptions: Mutex<Vec<String>>,
}

impl FakeModel {
    pub fn new(dishes: Vec<DetectedDish>) -> Self {
        Self {
            detection: Some(DishDetection {
                detected_dishes: dishes,
                overall_confidence: 0.85,
                unidentifiable_items: vec![],
                image_assessment: ImageAssessment {
                    clarity: "high".into(),
                    lighting: "good".into(),
                    obstructions: "none".into(),
                },
            }),
            nutrition: HashMap::new(),
            descriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_detection() -> Self {
        Self {
            detection: None,
            nutrition: HashMap::new(),
            descriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn with_nutrition(mut self, nutrition: DishNutrition) -> Self {
        self.nutrition.insert(nutrition.name.clone(), nutrition);
        self
    }

    pub fn nutrition_calls(&self) -> usize {
        self.descriptions.lock().unwrap().len()
    }
}

fn dish_name(description: &str) -> &str {
    description
        .strip_prefix("Dish: ")
        .and_then(|rest| rest.split(" (confidence").next())
        .unwrap_or_default()
}

#[async_trait]
impl NutritionModel for FakeModel {
    async fn detect_dishes(&self, _: &str, _: &str) -> Result<DishDetection, AiError> {
        self.detection.clone().ok_or(AiError::Status {
            status: 500,
            body: "model unavailable".into(),
        })
    }

    async fn analyze_nutrition(&self, description: &str, _: &str) -> Result<DishNutrition, AiError> {
        self.descriptions.lock().unwrap().push(description.to_string());
        self.nutrition
            .get(dish_name(description))
            .cloned()
            .ok_or(AiError::EmptyOutput)
    }
}

#[derive(Default)]
pub struct FakeStorage {
    pub fail: bool,
    pub keys: Mutex<Vec<String>>,
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn upload(&self, _body: Bytes, key: &str, _content_type: &str) -> anyhow::Result<String> {
        if self.fail {
            anyhow::bail!("bucket unreachable");
        }
        self.keys.lock().unwrap().push(key.to_string());
        Ok(format!("https://cdn.test/{key}"))
    }
}

#[derive(Default)]
pub struct FakeBot {
    pub fail_photo: bool,
    pub messages: Mutex<Vec<SendMessage>>,
    pub photos: Mutex<Vec<SendPhoto>>,
    pub deleted: Mutex<Vec<(i64, i64)>>,
    pub answered: Mutex<Vec<String>>,
    pub downloads: Mutex<Vec<String>>,
}

impl FakeBot {
    pub fn texts(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.text.clone())
            .collect()
    }

    fn reply(&self, chat_id: i64, message_id: i64) -> Message {
        Message {
            message_id,
            from: None,
            chat: Chat { id: chat_id },
            text: None,
            photo: vec![],
        }
    }
}

#[async_trait]
impl BotApi for FakeBot {
    async fn send_message(&self, message: &SendMessage) -> anyhow::Result<Message> {
        let mut messages = self.messages.lock().unwrap();
        messages.push(message.clone());
        Ok(self.reply(message.chat_id, 1000 + messages.len() as i64))
    }

    async fn send_photo(&self, photo: &SendPhoto) -> anyhow::Result<Message> {
        if self.fail_photo {
            anyhow::bail!("Telegram API error: wrong file identifier");
        }
        self.photos.lock().unwrap().push(photo.clone());
        Ok(self.reply(photo.chat_id, 1))
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> anyhow::Result<()> {
        self.deleted.lock().unwrap().push((chat_id, message_id));
        Ok(())
    }

    async fn answer_callback_query(&self, callback_query_id: &str) -> anyhow::Result<()> {
        self.answered
            .lock()
            .unwrap()
            .push(callback_query_id.to_string());
        Ok(())
    }

    async fn download_file(&self, file_id: &str) -> anyhow::Result<Bytes> {
        self.downloads.lock().unwrap().push(file_id.to_string());
        Ok(Bytes::from_static(b"\xff\xd8\xff\xe0jpeg"))
    }

    async fn set_webhook(&self, _url: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

pub struct TestApp {
    pub state: AppState,
    pub storage: Arc<FakeStorage>,
    pub bot: Arc<FakeBot>,
}

pub async fn test_app(model: FakeModel) -> TestApp {
    test_app_with(model, FakeStorage::default(), FakeBot::default()).await
}

pub async fn test_app_with(model: FakeModel, storage: FakeStorage, bot: FakeBot) -> TestApp {
    let config = Config::for_tests();
    let db = test_pool().await;
    let model = Arc::new(model);
    let storage = Arc::new(storage);
    let bot = Arc::new(bot);

    let state = AppState {
        pipeline: FoodPipeline::new(db.clone(), Some(model as Arc<dyn NutritionModel>)),
        photo_jobs: PhotoJobs::new(config.photo_job_timeout()),
        prompts: Arc::new(prompts()),
        storage: Some(storage.clone() as Arc<dyn ObjectStorage>),
        bot: bot.clone() as Arc<dyn BotApi>,
        config: Arc::new(config),
        db,
    };

    TestApp {
        state,
        storage,
        bot,
    }
}

/// Registers a Telegram user and returns a bearer token for them.
pub async fn signed_in(state: &AppState, telegram_id: i64) -> (User, String) {
    let profile = NewUser::from_telegram(telegram_id, None, "Test", None);
    let (user, _) = crate::db::user::ensure(&state.db, &profile).await.unwrap();
    let token =
        crate::auth::jwt::create_access_token(user.id, telegram_id, &state.config).unwrap();
    (user, token)
}

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = if body.is_null() {
        Body::empty()
    } else {
        Body::from(body.to_string())
    };
    builder.body(body).unwrap()
}

/// Sends one request through the router and decodes the JSON body
/// (`Value::Null` when the body is empty or not JSON).
pub async fn call(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}
