use axum::{extract::State, http::StatusCode};
use bytes::Bytes;
use uuid::Uuid;

use crate::db;
use crate::error::{AppError, AppResult};
use crate::handlers::food::upload_food_image;
use crate::models::user::NewUser;
use crate::services::ProcessingResult;
use crate::telegram::types::{
    InlineKeyboardMarkup, Message, SendMessage, SendPhoto, TelegramUser, Update,
};
use crate::AppState;

const WELCOME_IMAGE_URL: &str =
    "https://assets.peatch.io/isometric-icon-A-delicious-layered--by-bnbicons.com.png";

const WELCOME_CAPTION: &str = "Hi\\! I'm *Wellie*, your pocket nutrition tracker\\.\n\n\
     Keep an eye on what you eat with this bot\\.\n\n\
     Send me a photo of your food and I'll tell you its calories and what it is made of\\. \
     You can also open the app\\.";

const OPEN_APP_BUTTON: &str = "Open the app";

const NEW_USER_TEXT: &str = "Welcome! Use /start to get started with the bot.";

const HELP_TEXT: &str = "Send me a photo of your meal and I'll estimate its calories and macronutrients.\n\n\
     Commands:\n\
     /start - open the app\n\
     /help - show this message";

const UNKNOWN_COMMAND_TEXT: &str = "Unknown command. Use /help to see what I can do.";

const PHOTO_HINT_TEXT: &str = "Send me a photo of your food to track nutrition!";

const ANALYZING_TEXT: &str = "🔍 Analyzing your food image... This may take a moment.";

/// POST /webhook
///
/// Telegram only needs to know the update was received, so every parsed
/// update is answered with 200 whatever happens while handling it.
pub async fn telegram_webhook(State(state): State<AppState>, body: Bytes) -> StatusCode {
    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected malformed update");
            return StatusCode::BAD_REQUEST;
        }
    };

    if let Some(callback) = &update.callback_query {
        tracing::debug!(
            telegram_id = callback.from.id,
            data = callback.data.as_deref().unwrap_or_default(),
            "Callback query"
        );
        if let Err(e) = state.bot.answer_callback_query(&callback.id).await {
            tracing::warn!(error = %e, "Failed to answer callback query");
        }
    }

    if let Some(message) = update.message {
        if let Err(e) = handle_message(&state, message).await {
            tracing::error!(update_id = update.update_id, error = %e, "Failed to handle message");
        }
    }

    StatusCode::OK
}

async fn handle_message(state: &AppState, message: Message) -> AppResult<()> {
    let Some(from) = &message.from else {
        return Ok(());
    };
    let chat_id = message.chat.id;
    let (user, created) = db::user::ensure(&state.db, &profile(from)).await?;

    match message.command() {
        Some("start") => send_welcome(state, chat_id).await,
        Some("help") => reply(state, SendMessage::text(chat_id, HELP_TEXT)).await,
        Some(_) => reply(state, SendMessage::text(chat_id, UNKNOWN_COMMAND_TEXT)).await,
        None if !message.photo.is_empty() => start_photo_analysis(state, user.id, &message).await,
        None if created => reply(state, SendMessage::text(chat_id, NEW_USER_TEXT)).await,
        None => reply(state, SendMessage::text(chat_id, PHOTO_HINT_TEXT)).await,
    }

    Ok(())
}

fn profile(from: &TelegramUser) -> NewUser {
    NewUser::from_telegram(
        from.id,
        from.username.as_deref(),
        &from.first_name,
        from.last_name.as_deref(),
    )
}

async fn reply(state: &AppState, message: SendMessage) {
    if let Err(e) = state.bot.send_message(&message).await {
        tracing::warn!(chat_id = message.chat_id, error = %e, "Failed to send message");
    }
}

async fn send_welcome(state: &AppState, chat_id: i64) {
    let markup = InlineKeyboardMarkup::web_app_button(
        OPEN_APP_BUTTON,
        state.config.telegram_webapp_url.clone(),
    );
    let photo = SendPhoto {
        chat_id,
        photo: WELCOME_IMAGE_URL.to_string(),
        caption: Some(WELCOME_CAPTION.to_string()),
        parse_mode: Some("MarkdownV2".to_string()),
        reply_markup: Some(markup.clone()),
    };

    if let Err(e) = state.bot.send_photo(&photo).await {
        tracing::warn!(chat_id, error = %e, "Welcome photo failed, sending text");
        let text = SendMessage {
            chat_id,
            text: WELCOME_CAPTION.to_string(),
            parse_mode: Some("MarkdownV2".to_string()),
            reply_markup: Some(markup),
        };
        reply(state, text).await;
    }
}

/// Acknowledges the photo and hands the analysis to a background job. The
/// job reports back through a follow-up message.
async fn start_photo_analysis(state: &AppState, user_id: Uuid, message: &Message) {
    let chat_id = message.chat.id;
    let Some(photo) = message.largest_photo() else {
        return;
    };
    let file_id = photo.file_id.clone();

    if state.photo_jobs.is_shutting_down() {
        let text = AppError::Internal(anyhow::anyhow!("shutting down")).chat_message();
        reply(state, SendMessage::text(chat_id, text)).await;
        return;
    }

    let status_id = match state
        .bot
        .send_message(&SendMessage::text(chat_id, ANALYZING_TEXT))
        .await
    {
        Ok(sent) => Some(sent.message_id),
        Err(e) => {
            tracing::warn!(chat_id, error = %e, "Failed to send status message");
            None
        }
    };

    let job_state = state.clone();
    let job = async move {
        let text = match analyze_photo(&job_state, user_id, &file_id).await {
            Ok(result) => result_text(&result),
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "Photo analysis failed");
                e.chat_message()
            }
        };
        clear_status(&job_state, chat_id, status_id).await;
        reply(&job_state, SendMessage::text(chat_id, text)).await;
    };

    let abort_state = state.clone();
    let on_abort = async move {
        clear_status(&abort_state, chat_id, status_id).await;
        let text = AppError::Internal(anyhow::anyhow!("photo analysis aborted")).chat_message();
        reply(&abort_state, SendMessage::text(chat_id, text)).await;
    };

    state.photo_jobs.spawn(job, on_abort);
    tracing::debug!(user_id = %user_id, in_flight = state.photo_jobs.in_flight(), "Photo job queued");
}

async fn analyze_photo(
    state: &AppState,
    user_id: Uuid,
    file_id: &str,
) -> AppResult<ProcessingResult> {
    if !state.pipeline.is_configured() {
        return Err(AppError::Configuration("AI service is not configured".into()));
    }

    let image = state.bot.download_file(file_id).await?;
    let image_url = upload_food_image(state, image).await?;
    state
        .pipeline
        .process(user_id, &image_url, &state.prompts)
        .await
}

async fn clear_status(state: &AppState, chat_id: i64, status_id: Option<i64>) {
    if let Some(message_id) = status_id {
        if let Err(e) = state.bot.delete_message(chat_id, message_id).await {
            tracing::debug!(chat_id, error = %e, "Failed to delete status message");
        }
    }
}

fn result_text(result: &ProcessingResult) -> String {
    if result.processed().next().is_none() && result.skipped_count() > 0 {
        let dishes: Vec<&str> = result.skipped().map(|(dish, _)| dish).collect();
        return format!(
            "⚠️ I spotted {} but couldn't work out the nutrition. Please try again later.",
            format_food_names(&dishes)
        );
    }

    format!(
        "✅ Food analysis complete!\n\n\
         🍽 {}\n\n\
         📊 Nutritional Information:\n\
         • Calories: {:.0} kcal\n\
         • Protein: {:.1} g\n\
         • Carbs: {:.1} g\n\
         • Fat: {:.1} g",
        format_food_names(&result.food_names()),
        result.total_calories,
        result.total_proteins,
        result.total_carbs,
        result.total_fats,
    )
}

fn format_food_names(names: &[&str]) -> String {
    match names {
        [] => "Unknown food".to_string(),
        [one] => one.to_string(),
        [first, second] => format!("{first} and {second}"),
        [first, second, rest @ ..] => format!("{first}, {second} and {} more", rest.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::routes::build_router;
    use crate::testing::{
        dish, nutrition, test_app, test_app_with, FakeBot, FakeModel, FakeStorage, TestApp,
    };

    async fn post_update(app: &TestApp, update: Value) -> StatusCode {
        post_raw(app, update.to_string()).await
    }

    async fn post_raw(app: &TestApp, body: String) -> StatusCode {
        let request = Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        build_router(app.state.clone())
            .oneshot(request)
            .await
            .unwrap()
            .status()
    }

    fn text_update(telegram_id: i64, text: &str) -> Value {
        json!({
            "update_id": 1,
            "message": {
                "message_id": 10,
                "from": { "id": telegram_id, "first_name": "Ann", "username": "ann" },
                "chat": { "id": telegram_id },
                "text": text
            }
        })
    }

    fn photo_update(telegram_id: i64) -> Value {
        json!({
            "update_id": 2,
            "message": {
                "message_id": 11,
                "from": { "id": telegram_id, "first_name": "Ann" },
                "chat": { "id": telegram_id },
                "photo": [
                    { "file_id": "small", "width": 90, "height": 90 },
                    { "file_id": "large", "width": 1280, "height": 960 },
                    { "file_id": "medium", "width": 320, "height": 240 }
                ]
            }
        })
    }

    async fn drain(app: &TestApp) {
        app.state.photo_jobs.shutdown(Duration::from_secs(5)).await;
    }

    #[test]
    fn test_format_food_names() {
        assert_eq!(format_food_names(&[]), "Unknown food");
        assert_eq!(format_food_names(&["Soup"]), "Soup");
        assert_eq!(format_food_names(&["Soup", "Bread"]), "Soup and Bread");
        assert_eq!(
            format_food_names(&["Soup", "Bread", "Tea", "Cake"]),
            "Soup, Bread and 2 more"
        );
    }

    #[tokio::test]
    async fn test_malformed_update_is_bad_request() {
        let app = test_app(FakeModel::new(vec![])).await;
        assert_eq!(post_raw(&app, "not json".into()).await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_empty_update_is_ignored() {
        let app = test_app(FakeModel::new(vec![])).await;
        assert_eq!(post_update(&app, json!({ "update_id": 5 })).await, StatusCode::OK);
        assert!(app.bot.texts().is_empty());
        assert!(app.bot.photos.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_start_sends_welcome_photo_and_registers_user() {
        let app = test_app(FakeModel::new(vec![])).await;
        assert_eq!(post_update(&app, text_update(77, "/start")).await, StatusCode::OK);

        let photos = app.bot.photos.lock().unwrap().clone();
        assert_eq!(photos.len(), 1);
        assert_eq!(photos[0].chat_id, 77);
        assert_eq!(photos[0].photo, WELCOME_IMAGE_URL);
        assert_eq!(photos[0].parse_mode.as_deref(), Some("MarkdownV2"));
        let button = &photos[0].reply_markup.as_ref().unwrap().inline_keyboard[0][0];
        assert_eq!(
            button.web_app.as_ref().unwrap().url,
            app.state.config.telegram_webapp_url
        );
        assert!(app.bot.texts().is_empty());

        let user = db::user::find_by_telegram_id(&app.state.db, 77).await.unwrap();
        assert_eq!(user.username.as_deref(), Some("ann"));
        assert!(user.avatar_url.unwrap().starts_with("https://assets.peatch.io/avatars/"));
    }

    #[tokio::test]
    async fn test_start_falls_back_to_text() {
        let bot = FakeBot {
            fail_photo: true,
            ..Default::default()
        };
        let app = test_app_with(FakeModel::new(vec![]), FakeStorage::default(), bot).await;
        post_update(&app, text_update(77, "/start@wellie_bot")).await;

        let messages = app.bot.messages.lock().unwrap().clone();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, WELCOME_CAPTION);
        assert!(messages[0].reply_markup.is_some());
    }

    #[tokio::test]
    async fn test_help_and_unknown_commands() {
        let app = test_app(FakeModel::new(vec![])).await;
        post_update(&app, text_update(3, "/help")).await;
        post_update(&app, text_update(3, "/dance now")).await;
        assert_eq!(app.bot.texts(), vec![HELP_TEXT, UNKNOWN_COMMAND_TEXT]);
    }

    #[tokio::test]
    async fn test_plain_text_first_contact_then_hint() {
        let app = test_app(FakeModel::new(vec![])).await;
        post_update(&app, text_update(3, "hello")).await;
        post_update(&app, text_update(3, "hello again")).await;
        assert_eq!(app.bot.texts(), vec![NEW_USER_TEXT, PHOTO_HINT_TEXT]);
    }

    #[tokio::test]
    async fn test_callback_query_is_answered() {
        let app = test_app(FakeModel::new(vec![])).await;
        let update = json!({
            "update_id": 9,
            "callback_query": { "id": "cb-1", "from": { "id": 3, "first_name": "Ann" }, "data": "x" }
        });
        assert_eq!(post_update(&app, update).await, StatusCode::OK);
        assert_eq!(*app.bot.answered.lock().unwrap(), vec!["cb-1".to_string()]);
    }

    #[tokio::test]
    async fn test_photo_is_analyzed_in_background() {
        let model = FakeModel::new(vec![dish("Caesar Salad", &[("romaine", 1.0, "cup")])])
            .with_nutrition(nutrition("Caesar Salad", 350.0, 10.0, 12.0, 28.0));
        let app = test_app(model).await;

        assert_eq!(post_update(&app, photo_update(55)).await, StatusCode::OK);
        drain(&app).await;

        assert_eq!(*app.bot.downloads.lock().unwrap(), vec!["large".to_string()]);
        assert_eq!(app.storage.keys.lock().unwrap().len(), 1);

        let texts = app.bot.texts();
        assert_eq!(texts.len(), 2);
        assert_eq!(texts[0], ANALYZING_TEXT);
        assert_eq!(
            texts[1],
            "✅ Food analysis complete!\n\n🍽 Caesar Salad\n\n📊 Nutritional Information:\n\
             • Calories: 350 kcal\n• Protein: 10.0 g\n• Carbs: 12.0 g\n• Fat: 28.0 g"
        );
        assert_eq!(*app.bot.deleted.lock().unwrap(), vec![(55, 1001)]);

        let user = db::user::find_by_telegram_id(&app.state.db, 55).await.unwrap();
        let logs = db::food::list_user_food_logs(&app.state.db, user.id, chrono::Utc::now().date_naive())
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].image_url.as_deref().unwrap().starts_with("https://cdn.test/food-images/"));
    }

    #[tokio::test]
    async fn test_all_dishes_skipped_reply() {
        // Detected, but no nutrition answer for either dish.
        let model = FakeModel::new(vec![
            dish("Borscht", &[("beet", 150.0, "g")]),
            dish("Pampushky", &[("dough", 80.0, "g")]),
        ]);
        let app = test_app(model).await;
        post_update(&app, photo_update(55)).await;
        drain(&app).await;

        assert_eq!(
            app.bot.texts().last().unwrap(),
            "⚠️ I spotted Borscht and Pampushky but couldn't work out the nutrition. \
             Please try again later."
        );
    }

    #[tokio::test]
    async fn test_nothing_detected_reply() {
        let app = test_app(FakeModel::new(vec![])).await;
        post_update(&app, photo_update(55)).await;
        drain(&app).await;

        assert!(app
            .bot
            .texts()
            .last()
            .unwrap()
            .starts_with("✅ Food analysis complete!\n\n🍽 Unknown food"));
    }

    #[tokio::test]
    async fn test_photo_while_draining_is_refused() {
        let app = test_app(FakeModel::new(vec![])).await;
        app.state.photo_jobs.close();

        assert_eq!(post_update(&app, photo_update(55)).await, StatusCode::OK);

        assert_eq!(
            app.bot.texts(),
            vec!["❌ Sorry, I couldn't analyze your food image. Please try again later."]
        );
        assert!(app.bot.downloads.lock().unwrap().is_empty());
        assert_eq!(app.state.photo_jobs.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_photo_failure_sends_friendly_error() {
        let app = test_app(FakeModel::failing_detection()).await;
        post_update(&app, photo_update(55)).await;
        drain(&app).await;

        let texts = app.bot.texts();
        assert_eq!(
            texts.last().unwrap(),
            "❌ Sorry, I couldn't analyze your food image. Please try with a clearer photo of the food."
        );
        assert_eq!(app.bot.deleted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_photo_upload_failure_message() {
        let storage = FakeStorage {
            fail: true,
            ..Default::default()
        };
        let app = test_app_with(FakeModel::new(vec![]), storage, FakeBot::default()).await;
        post_update(&app, photo_update(55)).await;
        drain(&app).await;

        assert_eq!(
            app.bot.texts().last().unwrap(),
            "❌ Sorry, I couldn't analyze your food image. There was an issue saving your image."
        );
    }
}
