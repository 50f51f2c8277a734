use axum::{
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};

use tera::Context;

use std::sync::Arc;

use crate::{
    data::model::CurrentUser,
    middleware::{admin, auth, handle_error},
    AppState,
};

mod home;
use home::app;
mod chat;
use chat::chat;
mod auth;
use auth::{login, login_form, logout, signup, signup_form};
mod knowledge;
use knowledge::knowledge;
mod error;
use error::error;

pub fn app_router(state: Arc<AppState>) -> Router {
    let chat_router = Router::new()
        .route("/", get(chat))
        .layer(from_fn(auth));

    let admin_router = Router::new()
        .route("/knowledge", get(knowledge))
        .layer(from_fn(admin));

    Router::new()
        .route("/", get(app))
        .route("/error", get(error))
        .route("/login", get(login).post(login_form))
        .route("/signup", get(signup).post(signup_form))
        .route("/logout", get(logout))
        .nest("/chat", chat_router)
        .nest("/admin", admin_router)
        .layer(from_fn_with_state(state.clone(), handle_error))
        .with_state(state)
}

/// Renders `template` and wraps it in the main layout.
pub(crate) fn render_page(
    state: &AppState,
    template: &str,
    context: &Context,
    current_user: &Option<CurrentUser>,
) -> Response {
    let rendered = state.tera.render(template, context).and_then(|view| {
        let mut context = Context::new();
        context.insert("view", &view);
        context.insert("current_user", current_user);
        state.tera.render("views/main.html", &context)
    });

    match rendered {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!("failed to render {}: {:?}", template, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
