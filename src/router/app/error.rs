use axum::{
    extract::{Extension, Query, State},
    response::Response,
};

use serde::Deserialize;
use tera::Context;

use std::sync::Arc;

use super::render_page;
use crate::{data::model::CurrentUser, AppState};

#[derive(Deserialize)]
pub struct ErrorParams {
    code: Option<u16>,
    message: Option<String>,
}

pub async fn error(
    Query(params): Query<ErrorParams>,
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Option<CurrentUser>>,
) -> Response {
    let mut context = Context::new();
    context.insert("status_code", &params.code.unwrap_or(500));
    context.insert(
        "status_text",
        params.message.as_deref().unwrap_or("Something went wrong"),
    );

    render_page(&state, "views/error.html", &context, &current_user)
}
