use axum::{
    extract::State,
    http::{HeaderValue, Request},
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
    Extension,
};

use tera::Context;
use tower_cookies::Cookies;
use url::form_urlencoded;

use std::sync::Arc;

use crate::{data::model::CurrentUser, AppState};

pub const SESSION_COOKIE: &str = "bitty-session";

pub fn error_response(code: u16, message: &str) -> Response {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("code", &code.to_string())
        .append_pair("message", message)
        .finish();
    let to = format!("/error?{}", query);
    let mut r = Redirect::to(&to).into_response();
    if let Ok(value) = HeaderValue::from_str(&to) {
        r.headers_mut().insert("HX-Redirect", value);
    }
    r
}

pub async fn extract_user<B>(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    mut req: Request<B>,
    next: Next<B>,
) -> Response
where
    B: Send + 'static,
{
    let token = cookies
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string());

    let current_user = match token {
        Some(token) => match state.user_repo.session_user(&token).await {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!("session lookup failed: {}", e);
                None
            }
        },
        None => None,
    };

    req.extensions_mut().insert(current_user);
    next.run(req).await
}

pub async fn auth<B>(
    Extension(current_user): Extension<Option<CurrentUser>>,
    req: Request<B>,
    next: Next<B>,
) -> Response
where
    B: Send + 'static,
{
    match current_user {
        Some(_user) => next.run(req).await,
        _ => Redirect::to("/login").into_response(),
    }
}

pub async fn admin<B>(
    Extension(current_user): Extension<Option<CurrentUser>>,
    req: Request<B>,
    next: Next<B>,
) -> Response
where
    B: Send + 'static,
{
    match current_user {
        Some(user) if user.is_admin() => next.run(req).await,
        Some(_) => error_response(403, "This page is for grown-ups only"),
        None => Redirect::to("/login").into_response(),
    }
}

/// Renders any page response with status >= 400 through the error view.
pub async fn handle_error<B>(
    Extension(current_user): Extension<Option<CurrentUser>>,
    State(state): State<Arc<AppState>>,
    req: Request<B>,
    next: Next<B>,
) -> Response
where
    B: Send + 'static,
{
    let response = next.run(req).await;
    let status = response.status();

    if status.as_u16() < 400 {
        return response;
    }

    let mut context = Context::new();
    context.insert("status_code", &status.as_u16());
    context.insert("status_text", status.canonical_reason().unwrap_or("Error"));

    let rendered = state
        .tera
        .render("views/error.html", &context)
        .and_then(|error| {
            let mut context = Context::new();
            context.insert("view", &error);
            context.insert("current_user", &current_user);
            state.tera.render("views/main.html", &context)
        });

    match rendered {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            tracing::error!("failed to render error page: {}", e);
            (status, status.canonical_reason().unwrap_or("Error")).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::header;

    use super::*;

    #[test]
    fn test_error_response_encodes_message() {
        let response = error_response(403, "Grown-ups & helpers only?");
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .unwrap();
        assert_eq!(
            location,
            "/error?code=403&message=Grown-ups+%26+helpers+only%3F"
        );
        assert_eq!(
            response.headers().get("HX-Redirect").unwrap(),
            location
        );
    }
}
