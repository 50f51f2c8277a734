use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Deserializer};

use std::sync::Arc;

use crate::{
    data::model::CurrentUser,
    error::{AppError, Result},
    knowledge::size::parse_size,
    AppState,
};

mod conversations;
mod knowledge;

pub const CSRF_HEADER: &str = "x-csrf-token";

pub fn api_router(state: Arc<AppState>) -> Router {
    let conversation_router = Router::new()
        .route("/", get(conversations::list))
        .route("/create", post(conversations::create))
        .route("/get", get(conversations::get))
        .route("/update", post(conversations::update))
        .route("/delete", post(conversations::delete))
        .route("/message", post(conversations::add_message))
        .route("/search", get(conversations::search));

    let post_limit = parse_size(&state.config.knowledge.post_max_size);
    let knowledge_router = Router::new()
        .route("/health", get(knowledge::health))
        .route("/upload", post(knowledge::upload))
        .route("/files", get(knowledge::list_files))
        .route("/delete", post(knowledge::delete))
        .route("/rename", post(knowledge::rename))
        .route("/search", get(knowledge::search))
        .route("/context", get(knowledge::context))
        .layer(DefaultBodyLimit::max(post_limit as usize));

    Router::new()
        .nest("/conversations", conversation_router)
        .nest("/knowledge", knowledge_router)
        .with_state(state)
}

pub(crate) fn require_user(current_user: Option<CurrentUser>) -> Result<CurrentUser> {
    current_user.ok_or(AppError::Unauthorized)
}

pub(crate) fn require_admin(current_user: Option<CurrentUser>) -> Result<CurrentUser> {
    let user = require_user(current_user)?;
    if !user.is_admin() {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }
    Ok(user)
}

pub(crate) fn verify_csrf(user: &CurrentUser, token: Option<&str>) -> Result<()> {
    match token {
        Some(token) if !token.is_empty() && token == user.csrf_token => Ok(()),
        _ => Err(AppError::Forbidden("Invalid CSRF token".to_string())),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Accepts `12` or `"12"`; anything else reads as absent.
pub(crate) fn loose_id<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Loose>::deserialize(deserializer)? {
        Some(Loose::Int(id)) => Some(id),
        Some(Loose::Text(text)) => text.trim().parse().ok(),
        _ => None,
    })
}

/// Accepts `true`, `1`, `"1"` and their falsy counterparts.
pub(crate) fn loose_flag<'de, D>(deserializer: D) -> std::result::Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Loose>::deserialize(deserializer)? {
        Some(Loose::Bool(flag)) => Some(flag),
        Some(Loose::Int(n)) => Some(n != 0),
        Some(Loose::Float(n)) => Some(n != 0.0),
        Some(Loose::Text(text)) => match text.trim() {
            "true" => Some(true),
            "false" | "" => Some(false),
            other => other.parse::<i64>().ok().map(|n| n != 0),
        },
        None => None,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::data::model::UserRole;

    #[derive(Deserialize)]
    struct Probe {
        #[serde(default, deserialize_with = "loose_id")]
        id: Option<i64>,
        #[serde(default, deserialize_with = "loose_flag")]
        flag: Option<bool>,
    }

    fn probe(value: serde_json::Value) -> Probe {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_loose_fields() {
        let p = probe(json!({"id": 7, "flag": 1}));
        assert_eq!((p.id, p.flag), (Some(7), Some(true)));

        let p = probe(json!({"id": "7", "flag": false}));
        assert_eq!((p.id, p.flag), (Some(7), Some(false)));

        let p = probe(json!({"id": "abc", "flag": "0"}));
        assert_eq!((p.id, p.flag), (None, Some(false)));

        let p = probe(json!({"id": null}));
        assert_eq!((p.id, p.flag), (None, None));
    }

    #[test]
    fn test_verify_csrf() {
        let user = CurrentUser {
            id: 1,
            email: "admin@test.com".to_string(),
            role: UserRole::Admin,
            csrf_token: "token".to_string(),
        };
        assert!(verify_csrf(&user, Some("token")).is_ok());
        assert!(matches!(
            verify_csrf(&user, Some("nope")),
            Err(AppError::Forbidden(_))
        ));
        assert!(verify_csrf(&user, None).is_err());
    }
}
