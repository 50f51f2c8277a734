use axum::{
    extract::{Extension, State},
    response::Response,
};

use tera::Context;

use std::sync::Arc;

use super::render_page;
use crate::{data::model::CurrentUser, knowledge::size::format_size, AppState};

pub async fn knowledge(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Option<CurrentUser>>,
) -> Response {
    let max_file_size = state.config.knowledge.max_upload_size();
    let csrf_token = current_user
        .as_ref()
        .map(|user| user.csrf_token.as_str())
        .unwrap_or_default();

    let mut context = Context::new();
    context.insert("csrf_token", csrf_token);
    context.insert("max_file_size", &max_file_size);
    context.insert("max_file_size_formatted", &format_size(max_file_size));

    render_page(&state, "views/knowledge.html", &context, &current_user)
}
