use axum::{
    extract::{Extension, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use std::sync::Arc;

use super::{loose_flag, loose_id, require_user};
use crate::{
    data::model::{Conversation, ConversationWithMessages, CurrentUser, MessageRole, DEFAULT_TITLE},
    error::{AppError, Result},
    AppState,
};

const ID_REQUIRED: &str = "Conversation ID required";
const NOT_FOUND: &str = "Conversation not found";

fn not_found() -> AppError {
    AppError::NotFound(NOT_FOUND.to_string())
}

/// A missing or malformed JSON body reads as an empty object.
fn body_or_default<T: Default>(payload: Option<Json<T>>) -> T {
    payload.map(|Json(body)| body).unwrap_or_default()
}

#[derive(Serialize)]
pub struct ConversationList {
    conversations: Vec<Conversation>,
}

#[derive(Serialize)]
pub struct Success {
    success: bool,
}

const SUCCESS: Success = Success { success: true };

pub async fn list(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Option<CurrentUser>>,
) -> Result<Json<ConversationList>> {
    let user = require_user(current_user)?;
    let conversations = state.conversation_repo.list(user.id).await?;
    Ok(Json(ConversationList { conversations }))
}

#[derive(Deserialize, Debug, Default)]
pub struct NewConversation {
    title: Option<String>,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    payload: Option<Json<NewConversation>>,
) -> Result<Json<ConversationWithMessages>> {
    let user = require_user(current_user)?;
    let new_conversation = body_or_default(payload);

    let title = new_conversation
        .title
        .as_deref()
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .unwrap_or(DEFAULT_TITLE);

    let conversation = state.conversation_repo.create(user.id, title).await?;
    tracing::debug!("user {} created conversation {}", user.id, conversation.id);

    Ok(Json(ConversationWithMessages {
        conversation,
        messages: Vec::new(),
    }))
}

#[derive(Deserialize, Debug)]
pub struct ConversationQuery {
    id: Option<String>,
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    Query(query): Query<ConversationQuery>,
) -> Result<Json<ConversationWithMessages>> {
    let user = require_user(current_user)?;

    let id = query
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest(ID_REQUIRED.to_string()))?;
    let id = id.parse::<i64>().map_err(|_| not_found())?;

    state
        .conversation_repo
        .retrieve(user.id, id)
        .await?
        .map(Json)
        .ok_or_else(not_found)
}

#[derive(Deserialize, Debug, Default)]
pub struct ConversationUpdate {
    #[serde(default, deserialize_with = "loose_id")]
    id: Option<i64>,
    title: Option<String>,
    #[serde(default, deserialize_with = "loose_flag")]
    auto_renamed: Option<bool>,
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    payload: Option<Json<ConversationUpdate>>,
) -> Result<Json<Success>> {
    let user = require_user(current_user)?;
    let update = body_or_default(payload);

    let id = update
        .id
        .ok_or_else(|| AppError::BadRequest(ID_REQUIRED.to_string()))?;

    if state.conversation_repo.find(user.id, id).await?.is_none() {
        return Err(not_found());
    }

    if update.title.is_none() && update.auto_renamed.is_none() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    let updated = state
        .conversation_repo
        .update(user.id, id, update.title.as_deref(), update.auto_renamed)
        .await?;
    if !updated {
        return Err(not_found());
    }

    Ok(Json(SUCCESS))
}

#[derive(Deserialize, Debug, Default)]
pub struct ConversationDelete {
    #[serde(default, deserialize_with = "loose_id")]
    id: Option<i64>,
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    payload: Option<Json<ConversationDelete>>,
) -> Result<Json<Success>> {
    let user = require_user(current_user)?;
    let id = body_or_default(payload)
        .id
        .ok_or_else(|| AppError::BadRequest(ID_REQUIRED.to_string()))?;

    // messages go with it via the foreign key cascade
    let rows_affected = state.conversation_repo.delete(user.id, id).await?;
    if rows_affected == 0 {
        return Err(not_found());
    }

    tracing::debug!("user {} deleted conversation {}", user.id, id);
    Ok(Json(SUCCESS))
}

#[derive(Deserialize, Debug, Default)]
pub struct NewMessage {
    #[serde(default, deserialize_with = "loose_id")]
    conversation_id: Option<i64>,
    role: Option<String>,
    content: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct MessageAdded {
    id: i64,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
}

pub async fn add_message(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    payload: Option<Json<NewMessage>>,
) -> Result<Json<MessageAdded>> {
    let user = require_user(current_user)?;
    let message = body_or_default(payload);

    let (Some(conversation_id), Some(role), Some(content)) = (
        message.conversation_id,
        message.role.filter(|role| !role.is_empty()),
        message.content.filter(|content| !content.is_empty()),
    ) else {
        return Err(AppError::BadRequest("Missing required fields".to_string()));
    };

    let role = role
        .parse::<MessageRole>()
        .map_err(|_| AppError::BadRequest("Invalid role".to_string()))?;

    let appended = state
        .conversation_repo
        .add_message(user.id, conversation_id, role, &content)
        .await?
        .ok_or_else(not_found)?;

    if let Some(title) = &appended.title {
        tracing::debug!("conversation {} auto-renamed to {:?}", conversation_id, title);
    }

    Ok(Json(MessageAdded {
        id: appended.id,
        success: true,
        title: appended.title,
    }))
}

#[derive(Deserialize, Debug)]
pub struct SearchQuery {
    q: Option<String>,
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ConversationList>> {
    let user = require_user(current_user)?;
    let conversations = state
        .conversation_repo
        .search(user.id, query.q.as_deref().unwrap_or(""))
        .await?;
    Ok(Json(ConversationList { conversations }))
}
