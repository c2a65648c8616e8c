use anyhow::Context;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,

    pub jwt_secret: String,
    pub jwt_ttl_secs: i64,

    pub telegram_bot_token: String,
    pub telegram_webapp_url: String,
    pub telegram_api_base: String,
    /// Public base URL of this service, used to register the webhook.
    pub external_url: Option<String>,

    pub openai_api_key: Option<String>,
    pub openai_responses_url: String,
    pub ai_timeout_secs: u64,
    pub prompts_dir: PathBuf,

    pub s3: Option<S3Config>,

    pub photo_job_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub access_key_id: String,
    pub access_key_secret: String,
    pub bucket: String,
    pub public_url: Option<String>,
    pub region: String,
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn parsed<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{key} must be a number")),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: optional("DATABASE_URL").unwrap_or_else(|| "sqlite://wellie.db".into()),
            host: optional("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed("PORT", 8080)?,

            jwt_secret: optional("JWT_SECRET").context("JWT_SECRET must be set")?,
            jwt_ttl_secs: parsed("JWT_TTL_SECS", 86_400)?,

            telegram_bot_token: optional("TELEGRAM_BOT_TOKEN")
                .context("TELEGRAM_BOT_TOKEN must be set")?,
            telegram_webapp_url: optional("TELEGRAM_WEBAPP_URL").unwrap_or_default(),
            telegram_api_base: optional("TELEGRAM_API_BASE")
                .unwrap_or_else(|| "https://api.telegram.org".into()),
            external_url: optional("EXTERNAL_URL"),

            openai_api_key: optional("OPENAI_API_KEY"),
            openai_responses_url: optional("OPENAI_RESPONSES_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1/responses".into()),
            ai_timeout_secs: parsed("AI_TIMEOUT_SECS", 90)?,
            prompts_dir: optional("PROMPTS_DIR")
                .unwrap_or_else(|| "templates/prompts".into())
                .into(),

            s3: S3Config::from_env(),

            photo_job_timeout_secs: parsed("PHOTO_JOB_TIMEOUT_SECS", 180)?,
            shutdown_grace_secs: parsed("SHUTDOWN_GRACE_SECS", 30)?,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn photo_job_timeout(&self) -> Duration {
        Duration::from_secs(self.photo_job_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn webhook_url(&self) -> Option<String> {
        self.external_url
            .as_ref()
            .map(|base| format!("{}/webhook", base.trim_end_matches('/')))
    }
}

impl S3Config {
    /// Returns `None` unless endpoint, bucket and both keys are present.
    fn from_env() -> Option<Self> {
        let endpoint = optional("S3_ENDPOINT");
        let bucket = optional("S3_BUCKET");
        let access_key_id = optional("S3_ACCESS_KEY_ID");
        let access_key_secret = optional("S3_ACCESS_KEY_SECRET");

        match (endpoint, bucket, access_key_id, access_key_secret) {
            (Some(endpoint), Some(bucket), Some(access_key_id), Some(access_key_secret)) => {
                Some(Self {
                    endpoint,
                    access_key_id,
                    access_key_secret,
                    bucket,
                    public_url: optional("S3_PUBLIC_URL"),
                    region: optional("S3_REGION").unwrap_or_else(|| "auto".into()),
                })
            }
            _ => {
                tracing::warn!("S3 settings incomplete, image uploads are disabled");
                None
            }
        }
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Self {
            database_url: "sqlite::memory:".into(),
            host: "127.0.0.1".into(),
            port: 0,
            jwt_secret: "test-secret".into(),
            jwt_ttl_secs: 86_400,
            telegram_bot_token: "123456:TEST-TOKEN".into(),
            telegram_webapp_url: "https://app.example.com".into(),
            telegram_api_base: "http://127.0.0.1:9".into(),
            external_url: None,
            openai_api_key: Some("sk-test".into()),
            openai_responses_url: "http://127.0.0.1:9/v1/responses".into(),
            ai_timeout_secs: 5,
            prompts_dir: "templates/prompts".into(),
            s3: None,
            photo_job_timeout_secs: 5,
            shutdown_grace_secs: 1,
        }
    }
}
