use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use bytes::Bytes;
use chrono::Utc;
use uuid::Uuid;

use crate::config::S3Config;

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Stores the object and returns its public URL.
    async fn upload(&self, body: Bytes, key: &str, content_type: &str) -> anyhow::Result<String>;
}

#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    endpoint: String,
    public_url: Option<String>,
}

impl S3Storage {
    pub async fn new(config: &S3Config) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(Credentials::new(
                &config.access_key_id,
                &config.access_key_secret,
                None,
                None,
                "static",
            ))
            .endpoint_url(&config.endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(&config.endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: config.bucket.clone(),
            endpoint: config.endpoint.clone(),
            public_url: config.public_url.clone(),
        })
    }

    fn object_url(&self, key: &str) -> String {
        public_object_url(self.public_url.as_deref(), &self.endpoint, &self.bucket, key)
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn upload(&self, body: Bytes, key: &str, content_type: &str) -> anyhow::Result<String> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .context("s3 put_object")?;
        Ok(self.object_url(key))
    }
}

/// `{public_url}/{key}` when a public base is set, otherwise a path-style
/// URL on the endpoint host.
pub fn public_object_url(public_url: Option<&str>, endpoint: &str, bucket: &str, key: &str) -> String {
    match public_url {
        Some(base) => join_key(base, key),
        None => {
            let host = endpoint
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/');
            join_key(&format!("https://{host}/{bucket}"), key)
        }
    }
}

fn join_key(base: &str, key: &str) -> String {
    match url::Url::parse(base) {
        Ok(mut url) => {
            if let Ok(mut segments) = url.path_segments_mut() {
                segments.pop_if_empty().extend(key.split('/'));
            }
            url.to_string()
        }
        Err(_) => format!("{}/{}", base.trim_end_matches('/'), key),
    }
}

/// `food-images/{uuid}-{YYYYMMDD}.jpg`
pub fn food_image_key() -> String {
    format!(
        "food-images/{}-{}.jpg",
        Uuid::new_v4(),
        Utc::now().format("%Y%m%d")
    )
}
