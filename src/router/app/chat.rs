use axum::{
    extract::{Extension, State},
    response::Response,
};

use serde::Serialize;
use tera::Context;

use std::sync::Arc;

use super::render_page;
use crate::{data::model::CurrentUser, AppState};

/// Everything the browser needs to drive the chat on its own.
#[derive(Serialize)]
struct ChatSettings<'a> {
    llm_api_url: &'a str,
    llm_api_key: &'a str,
    llm_model: &'a str,
    conversations_api: &'static str,
    context_api: &'static str,
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Option<CurrentUser>>,
) -> Response {
    let llm = &state.config.llm;
    let settings = ChatSettings {
        llm_api_url: &llm.api_url,
        llm_api_key: &llm.api_key,
        llm_model: &llm.model,
        conversations_api: "/api/conversations",
        context_api: "/api/knowledge/context",
    };

    let mut context = Context::new();
    context.insert("settings", &settings);

    render_page(&state, "views/chat.html", &context, &current_user)
}
