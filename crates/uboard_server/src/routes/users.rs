//! Profile endpoints under `/users`.

use crate::error::ApiError;
use crate::extract::{parse_id, ApiJson, CurrentUser};
use crate::state::{auth_service, AppState};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uboard_core::UserProfile;

#[derive(Debug, Deserialize)]
pub struct UpdateProfileBody {
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordBody {
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordBody {
    pub current_password: String,
    pub new_password: String,
}

pub async fn me(current: CurrentUser) -> Json<UserProfile> {
    Json(current.user.private_profile())
}

pub async fn update_me(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiJson(body): ApiJson<UpdateProfileBody>,
) -> Result<Json<UserProfile>, ApiError> {
    let user_id = current.user.id;
    let profile = state
        .run(move |conn, ctx| {
            Ok(auth_service(conn, ctx).update_profile(user_id, &body.first_name, &body.last_name)?)
        })
        .await?;
    Ok(Json(profile))
}

pub async fn delete_me(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiJson(body): ApiJson<PasswordBody>,
) -> Result<StatusCode, ApiError> {
    state
        .run(move |conn, ctx| {
            Ok(auth_service(conn, ctx).delete_account(&current.user, &body.password)?)
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn change_password(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiJson(body): ApiJson<ChangePasswordBody>,
) -> Result<StatusCode, ApiError> {
    state
        .run(move |conn, ctx| {
            Ok(auth_service(conn, ctx).change_password(
                &current.user,
                Some(&current.token),
                &body.current_password,
                &body.new_password,
            )?)
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_user(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<UserProfile>, ApiError> {
    let user_id = parse_id("user", &id)?;
    let viewer = current.user.id;
    let profile = state
        .run(move |conn, ctx| Ok(auth_service(conn, ctx).get_profile(viewer, user_id)?))
        .await?;
    Ok(Json(profile))
}
