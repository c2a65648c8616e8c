//! Validation of Telegram Mini App init data.
//!
//! The secret key is `HMAC_SHA256(key = "WebAppData", msg = bot_token)`. The
//! signature is `HMAC_SHA256(key = secret, msg = data_check_string)`, where the
//! data-check string is every `key=value` pair except `hash`, sorted by key
//! and joined with `\n`.

use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::types::TelegramUser;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InitDataError {
    #[error("init data is malformed")]
    Malformed,
    #[error("hash is missing")]
    MissingHash,
    #[error("auth_date is missing")]
    MissingAuthDate,
    #[error("init data is expired")]
    Expired,
    #[error("signature is invalid")]
    SignatureInvalid,
    #[error("user is missing")]
    MissingUser,
}

#[derive(Debug, Clone)]
pub struct InitData {
    pub auth_date: DateTime<Utc>,
    pub user: TelegramUser,
}

fn mac(key: &[u8]) -> Result<HmacSha256, InitDataError> {
    HmacSha256::new_from_slice(key).map_err(|_| InitDataError::Malformed)
}

fn pairs(raw: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(raw.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn data_check_string(pairs: &[(String, String)]) -> String {
    let mut fields: Vec<String> = pairs
        .iter()
        .filter(|(k, _)| k != "hash")
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    fields.sort();
    fields.join("\n")
}

fn secret_key(bot_token: &str) -> Result<Vec<u8>, InitDataError> {
    let mut secret = mac(b"WebAppData")?;
    secret.update(bot_token.as_bytes());
    Ok(secret.finalize().into_bytes().to_vec())
}

fn auth_date(pairs: &[(String, String)]) -> Result<DateTime<Utc>, InitDataError> {
    let raw = pairs
        .iter()
        .find(|(k, _)| k == "auth_date")
        .map(|(_, v)| v.as_str())
        .ok_or(InitDataError::MissingAuthDate)?;
    let secs: i64 = raw.parse().map_err(|_| InitDataError::Malformed)?;
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or(InitDataError::Malformed)
}

/// Checks the signature and, when `max_age` is positive, the age of the data.
pub fn validate(
    raw: &str,
    bot_token: &str,
    max_age: Duration,
    now: DateTime<Utc>,
) -> Result<(), InitDataError> {
    let pairs = pairs(raw);

    let hash = pairs
        .iter()
        .find(|(k, _)| k == "hash")
        .map(|(_, v)| v.as_str())
        .filter(|h| !h.is_empty())
        .ok_or(InitDataError::MissingHash)?;

    if max_age > Duration::zero() {
        let signed_at = auth_date(&pairs)?;
        if signed_at + max_age < now {
            return Err(InitDataError::Expired);
        }
    }

    let expected = hex::decode(hash).map_err(|_| InitDataError::SignatureInvalid)?;
    let mut signature = mac(&secret_key(bot_token)?)?;
    signature.update(data_check_string(&pairs).as_bytes());
    signature
        .verify_slice(&expected)
        .map_err(|_| InitDataError::SignatureInvalid)
}

pub fn parse(raw: &str) -> Result<InitData, InitDataError> {
    let pairs = pairs(raw);
    let auth_date = auth_date(&pairs)?;
    let user_json = pairs
        .iter()
        .find(|(k, _)| k == "user")
        .map(|(_, v)| v.as_str())
        .ok_or(InitDataError::MissingUser)?;
    let user: TelegramUser =
        serde_json::from_str(user_json).map_err(|_| InitDataError::Malformed)?;

    Ok(InitData { auth_date, user })
}

pub fn validate_and_parse(
    raw: &str,
    bot_token: &str,
    max_age: Duration,
) -> Result<InitData, InitDataError> {
    validate(raw, bot_token, max_age, Utc::now())?;
    parse(raw)
}

/// Builds a signed init-data query string.
#[cfg(test)]
pub(crate) fn sign(fields: &[(&str, String)], bot_token: &str) -> String {
    let owned: Vec<(String, String)> = fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    let mut signature = mac(&secret_key(bot_token).unwrap()).unwrap();
    signature.update(data_check_string(&owned).as_bytes());
    let hash = hex::encode(signature.finalize().into_bytes());

    let mut query = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in &owned {
        query.append_pair(k, v);
    }
    query.append_pair("hash", &hash);
    query.finish()
}

#[cfg(test)]
pub(crate) fn signed_for_user(telegram_id: i64, bot_token: &str) -> String {
    let user = serde_json::json!({
        "id": telegram_id,
        "first_name": "Ann",
        "last_name": "Lee",
        "username": "annlee",
        "language_code": "en"
    });
    sign(
        &[
            ("auth_date", Utc::now().timestamp().to_string()),
            ("query_id", "AAH-test".to_string()),
            ("user", user.to_string()),
        ],
        bot_token,
    )
}
