use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Extension, Multipart, Query, State,
    },
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use std::sync::Arc;

use super::{require_admin, verify_csrf, CSRF_HEADER};
use crate::{
    data::model::CurrentUser,
    error::{AppError, Result},
    knowledge::{size::format_size, Relayed, UploadFailure, UploadedFile},
    AppState,
};

const DEFAULT_SEARCH_LIMIT: i64 = 5;
const DEFAULT_CONTEXT_LIMIT: i64 = 3;

fn header_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CSRF_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn parse_limit(limit: Option<&str>, default: i64) -> i64 {
    limit
        .and_then(|limit| limit.trim().parse().ok())
        .unwrap_or(default)
}

#[derive(Serialize, Debug)]
pub struct ServiceConfig {
    max_file_size: u64,
    max_file_size_formatted: String,
    service_host: String,
    service_port: u16,
}

#[derive(Serialize, Debug)]
pub struct Health {
    success: bool,
    service_running: bool,
    message: &'static str,
    config: ServiceConfig,
}

pub async fn health(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Option<CurrentUser>>,
) -> Result<Json<Health>> {
    require_admin(current_user)?;

    let service_running = state.knowledge.is_running().await;
    let knowledge = &state.config.knowledge;
    let max_file_size = knowledge.max_upload_size();

    Ok(Json(Health {
        success: true,
        service_running,
        message: if service_running {
            "Knowledge base service is running"
        } else {
            "Knowledge base service is not running"
        },
        config: ServiceConfig {
            max_file_size,
            max_file_size_formatted: format_size(max_file_size),
            service_host: knowledge.service_host.clone(),
            service_port: knowledge.service_port,
        },
    }))
}

/// Maps a broken multipart read to what the uploader is told. A body cut off
/// by the request size limit reads as too large, anything else as partial.
fn read_failure(e: &MultipartError) -> UploadFailure {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        UploadFailure::TooLarge
    } else {
        UploadFailure::Partial
    }
}

#[derive(Default)]
struct UploadForm {
    csrf_token: Option<String>,
    file: Option<UploadedFile>,
    failure: Option<UploadFailure>,
}

async fn read_upload_form(mut multipart: Multipart) -> UploadForm {
    let mut form = UploadForm::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("multipart stream broke off: {}", e);
                form.failure = Some(read_failure(&e));
                break;
            }
        };

        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("csrf_token") => form.csrf_token = field.text().await.ok(),
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                match field.bytes().await {
                    Ok(data) => {
                        form.file = Some(UploadedFile {
                            file_name,
                            content_type,
                            data,
                        })
                    }
                    Err(e) => {
                        tracing::warn!("file part broke off: {}", e);
                        form.failure = Some(read_failure(&e));
                        break;
                    }
                }
            }
            _ => {}
        }
    }

    form
}

pub async fn upload(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    headers: HeaderMap,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Relayed> {
    let user = require_admin(current_user)?;

    let form = match multipart {
        Ok(multipart) => read_upload_form(multipart).await,
        Err(rejection) => {
            tracing::warn!("upload without a multipart body: {}", rejection);
            UploadForm {
                failure: Some(UploadFailure::NoFile),
                ..UploadForm::default()
            }
        }
    };

    let max_upload_size = state.config.knowledge.max_upload_size();
    let too_large = || AppError::BadRequest(UploadFailure::TooLarge.message(max_upload_size));

    // an oversized body may end before the form's token was read
    if form.failure == Some(UploadFailure::TooLarge) {
        return Err(too_large());
    }

    let token = header_token(&headers).or(form.csrf_token);
    verify_csrf(&user, token.as_deref())?;

    let file = match (form.failure, form.file) {
        (Some(failure), _) => Err(failure),
        (None, Some(file)) if file.file_name.is_empty() => Err(UploadFailure::NoFile),
        (None, Some(file)) if file.data.len() as u64 > max_upload_size => {
            Err(UploadFailure::TooLarge)
        }
        (None, Some(file)) => Ok(file),
        (None, None) => Err(UploadFailure::NoFile),
    }
    .map_err(|failure| AppError::BadRequest(failure.message(max_upload_size)))?;

    tracing::info!(
        "user {} uploading {} ({})",
        user.id,
        file.file_name,
        format_size(file.data.len() as u64)
    );
    state.knowledge.upload(file).await
}

pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Option<CurrentUser>>,
) -> Result<Relayed> {
    require_admin(current_user)?;
    state.knowledge.list_files().await
}

#[derive(Deserialize, Debug, Default)]
pub struct FileAction {
    file_id: Option<String>,
    new_name: Option<String>,
    csrf_token: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    headers: HeaderMap,
    payload: Option<Json<FileAction>>,
) -> Result<Relayed> {
    let user = require_admin(current_user)?;
    let action = payload.map(|Json(action)| action).unwrap_or_default();

    let token = header_token(&headers).or(action.csrf_token);
    verify_csrf(&user, token.as_deref())?;

    let file_id = non_empty(action.file_id)
        .ok_or_else(|| AppError::BadRequest("File ID is required".to_string()))?;

    tracing::info!("user {} deleting knowledge file {}", user.id, file_id);
    state.knowledge.delete_file(&file_id).await
}

pub async fn rename(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    headers: HeaderMap,
    payload: Option<Json<FileAction>>,
) -> Result<Relayed> {
    let user = require_admin(current_user)?;
    let action = payload.map(|Json(action)| action).unwrap_or_default();

    let token = header_token(&headers).or(action.csrf_token);
    verify_csrf(&user, token.as_deref())?;

    let (Some(file_id), Some(new_name)) = (non_empty(action.file_id), non_empty(action.new_name))
    else {
        return Err(AppError::BadRequest(
            "File ID and new name are required".to_string(),
        ));
    };

    state.knowledge.rename_file(&file_id, &new_name).await
}

#[derive(Deserialize, Debug)]
pub struct KnowledgeQuery {
    query: Option<String>,
    limit: Option<String>,
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    Query(params): Query<KnowledgeQuery>,
) -> Result<Relayed> {
    require_admin(current_user)?;

    let query = non_empty(params.query)
        .ok_or_else(|| AppError::BadRequest("Query is required".to_string()))?;
    let limit = parse_limit(params.limit.as_deref(), DEFAULT_SEARCH_LIMIT);

    state.knowledge.search(&query, limit).await
}

fn empty_context() -> Json<Value> {
    Json(json!({"context": "", "sources": []}))
}

/// Context for the chat page. Degrades to an empty context on every failure,
/// including a missing session, so the chat never stalls on it.
pub async fn context(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Option<CurrentUser>>,
    Query(params): Query<KnowledgeQuery>,
) -> Json<Value> {
    if current_user.is_none() {
        return empty_context();
    }

    let Some(query) = non_empty(params.query) else {
        return empty_context();
    };
    let limit = parse_limit(params.limit.as_deref(), DEFAULT_CONTEXT_LIMIT);

    match state.knowledge.context(&query, limit).await {
        Ok(relayed) if relayed.status.is_success() && relayed.body.is_object() => {
            Json(relayed.body)
        }
        Ok(relayed) => {
            tracing::warn!("context lookup returned {}", relayed.status);
            empty_context()
        }
        Err(e) => {
            tracing::warn!("context lookup failed: {}", e);
            empty_context()
        }
    }
}
