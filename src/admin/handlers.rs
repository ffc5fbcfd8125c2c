use axum::{
    Json,
    body::Bytes,
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Instant;

use crate::{
    error::AppError,
    state::{AppState, SessionEntry},
    store::SaveMode,
};

use super::AdminSession;

/// Parse a JSON request body, treating an absent body as all-defaults the
/// same way missing fields are.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, AppError> {
    if body.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {e}")))
}

// ── Login / logout ────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct LoginRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

pub async fn login(state: &AppState, body: &Bytes) -> Result<Response, AppError> {
    let req: LoginRequest = parse_body(body)?;

    let verifier = state.verifier.as_ref().ok_or(AppError::Unauthorized)?;
    if !verifier.verify(&req.username, &req.password) {
        tracing::warn!(user = %req.username, "failed login attempt");
        return Err(AppError::Unauthorized);
    }

    let token = super::new_session_token();
    state.sessions.write().await.insert(
        token.clone(),
        SessionEntry {
            username: req.username.clone(),
            last_seen: Instant::now(),
        },
    );
    tracing::info!(user = %req.username, "admin logged in");

    Ok((
        [(header::SET_COOKIE, super::session_set_cookie(&token))],
        Json(json!({ "success": true, "username": req.username })),
    )
        .into_response())
}

pub async fn logout(state: &AppState, headers: &HeaderMap) -> Result<Response, AppError> {
    if let Some(token) = super::session_cookie(headers) {
        state.sessions.write().await.remove(&token);
    }
    Ok((
        [(header::SET_COOKIE, super::session_clear_cookie())],
        Json(json!({ "success": true })),
    )
        .into_response())
}

// ── Page actions ──────────────────────────────────────────────────────────────

pub async fn list_pages(state: &AppState, _session: &AdminSession) -> Result<Response, AppError> {
    let pages = state.store.list().await?;
    Ok(Json(json!({ "pages": pages })).into_response())
}

pub async fn load_page(
    state: &AppState,
    _session: &AdminSession,
    page: &str,
) -> Result<Response, AppError> {
    let loaded = state.store.load(page).await?;
    Ok(Json(json!({
        "filename": loaded.filename,
        "fullContent": loaded.content,
        "bodyContent": loaded.meta.body,
        "metaTitle": loaded.meta.title,
        "metaDescription": loaded.meta.description,
        "metaKeywords": loaded.meta.keywords,
        "lastModified": loaded.last_modified,
    }))
    .into_response())
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct SaveRequest {
    filename: String,
    content: String,
    body_content: String,
    meta_title: String,
    meta_description: String,
    save_type: String,
}

pub async fn save_page(
    state: &AppState,
    session: &AdminSession,
    body: &Bytes,
) -> Result<Response, AppError> {
    let req: SaveRequest = parse_body(body)?;
    let mode = if req.save_type == "body" {
        SaveMode::Body
    } else {
        SaveMode::Full
    };

    let bytes = state
        .store
        .save(
            &req.filename,
            &req.content,
            &req.body_content,
            &req.meta_title,
            &req.meta_description,
            mode,
        )
        .await?;

    tracing::info!(user = %session.username, page = %req.filename, "page saved");
    Ok(Json(json!({
        "success": true,
        "message": "Page saved successfully",
        "filename": req.filename,
        "bytes": bytes,
    }))
    .into_response())
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CreateRequest {
    filename: String,
    template: String,
}

pub async fn create_page(
    state: &AppState,
    session: &AdminSession,
    body: &Bytes,
) -> Result<Response, AppError> {
    let req: CreateRequest = parse_body(body)?;
    let filename = state.store.create(&req.filename, &req.template).await?;

    tracing::info!(user = %session.username, page = %filename, "page created");
    Ok(Json(json!({
        "success": true,
        "message": "Page created successfully",
        "filename": filename,
    }))
    .into_response())
}

pub async fn delete_page(
    state: &AppState,
    session: &AdminSession,
    page: &str,
) -> Result<Response, AppError> {
    state.store.delete(page).await?;

    tracing::info!(user = %session.username, page = %page, "page moved to trash");
    Ok(Json(json!({
        "success": true,
        "message": "Page moved to trash",
    }))
    .into_response())
}
