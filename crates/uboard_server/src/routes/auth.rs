//! Account lifecycle endpoints under `/auth`.

use crate::error::ApiError;
use crate::extract::{ApiJson, CurrentUser};
use crate::state::{auth_service, AppState};
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uboard_core::{NewUser, SignInResult, UserProfile};

#[derive(Debug, Deserialize)]
pub struct TokenBody {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailBody {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct SignInBody {
    /// Username or email address.
    pub login: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordBody {
    pub token: String,
    pub password: String,
}

pub async fn sign_up(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<NewUser>,
) -> Result<(StatusCode, Json<UserProfile>), ApiError> {
    let profile = state
        .run(move |conn, ctx| Ok(auth_service(conn, ctx).sign_up(&body)?))
        .await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

pub async fn confirm_email(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<TokenBody>,
) -> Result<StatusCode, ApiError> {
    state
        .run(move |conn, ctx| Ok(auth_service(conn, ctx).confirm_email(&body.token)?))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn resend_confirmation(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<EmailBody>,
) -> Result<StatusCode, ApiError> {
    state
        .run(move |conn, ctx| Ok(auth_service(conn, ctx).resend_confirmation(&body.email)?))
        .await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn sign_in(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SignInBody>,
) -> Result<Json<SignInResult>, ApiError> {
    let session = state
        .run(move |conn, ctx| Ok(auth_service(conn, ctx).sign_in(&body.login, &body.password)?))
        .await?;
    Ok(Json(session))
}

pub async fn sign_out(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<StatusCode, ApiError> {
    state
        .run(move |conn, ctx| Ok(auth_service(conn, ctx).sign_out(&current.token)?))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn request_password_reset(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<EmailBody>,
) -> Result<StatusCode, ApiError> {
    state
        .run(move |conn, ctx| Ok(auth_service(conn, ctx).request_password_reset(&body.email)?))
        .await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn reset_password(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ResetPasswordBody>,
) -> Result<StatusCode, ApiError> {
    state
        .run(move |conn, ctx| {
            Ok(auth_service(conn, ctx).reset_password(&body.token, &body.password)?)
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
