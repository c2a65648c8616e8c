use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub telegram_id: i64,
    pub name: Option<String>,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
    pub physical_stats: Option<Json<PhysicalStats>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "male" => Some(Self::Male),
            "female" => Some(Self::Female),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhysicalStats {
    pub weight: f64,
    pub height: f64,
    pub gender: Gender,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_fat_percentage: Option<f64>,
}

/// Identity fields taken from a Telegram user on first contact.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub telegram_id: i64,
    pub username: String,
    pub name: Option<String>,
    pub avatar_url: String,
}

impl NewUser {
    pub fn from_telegram(
        telegram_id: i64,
        username: Option<&str>,
        first_name: &str,
        last_name: Option<&str>,
    ) -> Self {
        let username = username
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("user_{telegram_id}"));

        let name = match (first_name, last_name.filter(|l| !l.is_empty())) {
            ("", _) => None,
            (first, Some(last)) => Some(format!("{first} {last}")),
            (first, None) => Some(first.to_string()),
        };

        Self {
            telegram_id,
            username,
            name,
            avatar_url: placeholder_avatar(),
        }
    }
}

pub fn placeholder_avatar() -> String {
    use rand::Rng;
    let n = rand::thread_rng().gen_range(1..=30);
    format!("https://assets.peatch.io/avatars/{n}.svg")
}
