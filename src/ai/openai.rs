use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{AiError, DishDetection, DishNutrition, NutritionModel};

const IMAGE_URL_PLACEHOLDER: &str = "{{imageURL}}";
const DESCRIPTION_PLACEHOLDER: &str = "{{dishDescription}}";

/// Client for an OpenAI-compatible `/v1/responses` endpoint.
#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct ResponsesBody {
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Debug, Deserialize)]
struct OutputContent {
    #[serde(default)]
    text: Option<String>,
}

impl ResponsesBody {
    /// First text part across all output items. Reasoning items carry no
    /// content and are skipped.
    fn output_text(&self) -> Option<&str> {
        self.output
            .iter()
            .flat_map(|item| item.content.iter())
            .find_map(|c| c.text.as_deref())
    }
}

impl OpenAiClient {
    pub fn new(api_key: &str, endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            endpoint: endpoint.to_string(),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        template: &str,
        placeholder: &str,
        value: &str,
    ) -> Result<T, AiError> {
        let request: serde_json::Value =
            serde_json::from_str(&template.replacen(placeholder, value, 1))
                .map_err(AiError::Template)?;

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Status { status, body });
        }

        let raw = response.text().await?;
        let body: ResponsesBody = serde_json::from_str(&raw).map_err(AiError::Decode)?;
        let text = body.output_text().ok_or(AiError::EmptyOutput)?;
        serde_json::from_str(text).map_err(AiError::Decode)
    }
}

#[async_trait]
impl NutritionModel for OpenAiClient {
    async fn detect_dishes(
        &self,
        image_url: &str,
        prompt_template: &str,
    ) -> Result<DishDetection, AiError> {
        let detection: DishDetection = self
            .call(prompt_template, IMAGE_URL_PLACEHOLDER, image_url)
            .await?;
        tracing::debug!(
            dishes = detection.detected_dishes.len(),
            confidence = detection.overall_confidence,
            "Dish detection finished"
        );
        Ok(detection)
    }

    async fn analyze_nutrition(
        &self,
        description: &str,
        prompt_template: &str,
    ) -> Result<DishNutrition, AiError> {
        self.call(prompt_template, DESCRIPTION_PLACEHOLDER, description)
            .await
    }
}
