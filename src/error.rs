use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use validator::ValidationErrors;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("invalid init data")]
    InvalidInitData,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized | AppError::InvalidInitData => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Upstream(_) | AppError::Storage(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Chat text shown to a user whose photo could not be processed.
    pub fn chat_message(&self) -> String {
        let reason = match self {
            AppError::Configuration(_) => " The AI service is temporarily unavailable.",
            AppError::Validation(_) => " Please send a photo.",
            AppError::Storage(_) => " There was an issue saving your image.",
            AppError::Upstream(_) => " Please try with a clearer photo of the food.",
            _ => " Please try again later.",
        };
        format!("❌ Sorry, I couldn't analyze your food image.{reason}")
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .into_values()
            .flat_map(|errs| errs.iter())
            .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
            .unwrap_or_else(|| "invalid request".to_string());
        AppError::Validation(message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Unauthorized | AppError::InvalidInitData => self.to_string(),
            AppError::NotFound(msg) | AppError::Validation(msg) => msg.clone(),
            AppError::Configuration(msg) => {
                tracing::warn!(error = %msg, "Service not configured");
                "Service temporarily unavailable".into()
            }
            AppError::Upstream(msg) => {
                tracing::error!(error = %msg, "Upstream error");
                "Upstream service error".into()
            }
            AppError::Storage(msg) => {
                tracing::error!(error = %msg, "Storage error");
                "Failed to store image".into()
            }
            AppError::Database(e) => {
                tracing::error!(error = %e, "Database error");
                "Internal server error".into()
            }
            AppError::Internal(e) => {
                tracing::error!(error = %e, "Internal error");
                "Internal server error".into()
            }
        };

        let body = json!({
            "error": {
                "message": message,
                "code": status.as_u16(),
            }
        });

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
