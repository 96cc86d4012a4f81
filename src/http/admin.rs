//! Admin RPC surface (§4.9 [ADDED]): agents/endpoints listing, global
//! settings, opaque backup blobs, and admin credential management. Every
//! route requires `Authorization: Bearer {username}:{password}`.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use mediator_store::StoreError;
use serde::Deserialize;

use crate::auth::authenticate_admin;
use crate::http::response::{self, HttpResponse};
use crate::state::AppState;

async fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), HttpResponse> {
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| response::unauthorized("missing Authorization header"))?;
    authenticate_admin(&state.store, authorization)
        .await
        .map(|_| ())
        .ok_or_else(|| response::unauthorized("invalid admin credentials"))
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    limit: Option<i64>,
    offset: Option<i64>,
}

pub async fn list_agents(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(page): Query<Pagination>,
) -> HttpResponse {
    if let Err(resp) = require_admin(&state, &headers).await {
        return resp;
    }
    match state
        .store
        .list_agents(page.limit.unwrap_or(50), page.offset.unwrap_or(0))
        .await
    {
        Ok(agents) => Json(agents).into_response(),
        Err(err) => response::internal_error(err),
    }
}

pub async fn list_endpoints(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(page): Query<Pagination>,
) -> HttpResponse {
    if let Err(resp) = require_admin(&state, &headers).await {
        return resp;
    }
    match state
        .store
        .list_endpoints(page.limit.unwrap_or(50), page.offset.unwrap_or(0))
        .await
    {
        Ok(endpoints) => Json(endpoints).into_response(),
        Err(err) => response::internal_error(err),
    }
}

pub async fn get_setting(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> HttpResponse {
    if let Err(resp) = require_admin(&state, &headers).await {
        return resp;
    }
    match state.store.get_setting(&name).await {
        Ok(Some(value)) => Json(value).into_response(),
        Ok(None) => response::not_found("setting not set"),
        Err(err) => response::internal_error(err),
    }
}

pub async fn put_setting(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(value): Json<serde_json::Value>,
) -> HttpResponse {
    if let Err(resp) = require_admin(&state, &headers).await {
        return resp;
    }
    match state.store.set_setting(&name, value).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => response::internal_error(err),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateBackup {
    description: String,
    #[serde(with = "base64_bytes")]
    binary_blob: Vec<u8>,
    context: Option<serde_json::Value>,
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(raw)
            .map_err(serde::de::Error::custom)
    }
}

pub async fn create_backup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateBackup>,
) -> HttpResponse {
    if let Err(resp) = require_admin(&state, &headers).await {
        return resp;
    }
    match state
        .store
        .create_backup(&req.description, &req.binary_blob, req.context)
        .await
    {
        Ok(backup) => Json(backup).into_response(),
        Err(err) => response::internal_error(err),
    }
}

pub async fn get_backup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(description): Path<String>,
) -> HttpResponse {
    if let Err(resp) = require_admin(&state, &headers).await {
        return resp;
    }
    match state.store.load_backup(&description).await {
        Ok(Some(backup)) => Json(backup).into_response(),
        Ok(None) => response::not_found("no such backup"),
        Err(err) => response::internal_error(err),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    username: String,
    password: String,
}

pub async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateUser>,
) -> HttpResponse {
    if let Err(resp) = require_admin(&state, &headers).await {
        return resp;
    }
    match state.store.create_user(&req.username, &req.password).await {
        Ok(user) => Json(user).into_response(),
        Err(StoreError::Duplicate(username)) => {
            response::bad_request(format!("user {username} already exists"))
        }
        Err(err) => response::internal_error(err),
    }
}

pub async fn delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(username): Path<String>,
) -> HttpResponse {
    if let Err(resp) = require_admin(&state, &headers).await {
        return resp;
    }
    match state.store.delete_user(&username).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => response::internal_error(err),
    }
}
