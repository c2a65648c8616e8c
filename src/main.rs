use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;

mod ai;
mod auth;
mod config;
mod db;
mod dto;
mod error;
mod handlers;
mod models;
mod routes;
mod services;
mod storage;
mod telegram;

#[cfg(test)]
mod testing;

use ai::{NutritionModel, OpenAiClient, PromptTemplates};
use config::Config;
use services::{FoodPipeline, PhotoJobs};
use storage::{ObjectStorage, S3Storage};
use telegram::{BotApi, TelegramClient};

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<Config>,
    /// `None` when S3 is not configured; uploads then fail with a storage error.
    pub storage: Option<Arc<dyn ObjectStorage>>,
    pub bot: Arc<dyn BotApi>,
    pub pipeline: FoodPipeline,
    pub prompts: Arc<PromptTemplates>,
    pub photo_jobs: PhotoJobs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wellie_api=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    let config = Arc::new(Config::from_env()?);

    // Database
    let db = db::create_pool(&db::DbConfig::new(&config.database_url)).await?;
    db::run_migrations(&db).await?;
    tracing::info!("Database migrations applied");

    let storage: Option<Arc<dyn ObjectStorage>> = match &config.s3 {
        Some(s3) => match S3Storage::new(s3).await {
            Ok(storage) => Some(Arc::new(storage) as Arc<dyn ObjectStorage>),
            Err(e) => {
                tracing::warn!(error = %e, "Object storage unavailable, image uploads are disabled");
                None
            }
        },
        None => None,
    };

    let ai: Option<Arc<dyn NutritionModel>> = match &config.openai_api_key {
        Some(key) => {
            let client = OpenAiClient::new(
                key,
                &config.openai_responses_url,
                Duration::from_secs(config.ai_timeout_secs),
            )?;
            Some(Arc::new(client) as Arc<dyn NutritionModel>)
        }
        None => {
            tracing::warn!("OPENAI_API_KEY not set, food recognition is disabled");
            None
        }
    };

    let prompts = Arc::new(PromptTemplates::load(&config.prompts_dir)?);
    let bot: Arc<dyn BotApi> = Arc::new(TelegramClient::new(
        &config.telegram_api_base,
        &config.telegram_bot_token,
    )?);

    if let Some(url) = config.webhook_url() {
        match bot.set_webhook(&url).await {
            Ok(()) => tracing::info!(%url, "Telegram webhook registered"),
            Err(e) => tracing::warn!(error = %e, "Failed to register Telegram webhook"),
        }
    }

    let photo_jobs = PhotoJobs::new(config.photo_job_timeout());
    let state = AppState {
        pipeline: FoodPipeline::new(db.clone(), ai),
        db,
        config: config.clone(),
        storage,
        bot,
        prompts,
        photo_jobs: photo_jobs.clone(),
    };

    let app = routes::build_router(state);

    let addr = config.listen_addr();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(photo_jobs.clone()))
        .await?;

    photo_jobs.shutdown(config.shutdown_grace()).await;
    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM. Photo jobs stop accepting work right away,
/// while in-flight HTTP requests are still being drained.
async fn shutdown_signal(photo_jobs: PhotoJobs) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    photo_jobs.close();
}
