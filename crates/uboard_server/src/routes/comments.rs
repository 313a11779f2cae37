//! Comment endpoints.

use crate::error::ApiError;
use crate::extract::{parse_id, ApiJson, ApiQuery, CurrentUser};
use crate::state::{comment_service, AppState};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uboard_core::{CommentView, Page};

#[derive(Debug, Deserialize)]
pub struct CommentBody {
    pub body: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

pub async fn list_comments(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(post_id): Path<String>,
    ApiQuery(params): ApiQuery<PageParams>,
) -> Result<Json<Page<CommentView>>, ApiError> {
    let post_id = parse_id("post", &post_id)?;
    let page = state
        .run(move |conn, ctx| {
            Ok(comment_service(conn, ctx).list_comments(
                post_id,
                params.limit,
                params.offset.unwrap_or(0),
            )?)
        })
        .await?;
    Ok(Json(page))
}

pub async fn add_comment(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(post_id): Path<String>,
    ApiJson(body): ApiJson<CommentBody>,
) -> Result<(StatusCode, Json<CommentView>), ApiError> {
    let post_id = parse_id("post", &post_id)?;
    let author = current.user.id;
    let comment = state
        .run(move |conn, ctx| {
            Ok(comment_service(conn, ctx).add_comment(author, post_id, &body.body)?)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn edit_comment(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<CommentBody>,
) -> Result<Json<CommentView>, ApiError> {
    let comment_id = parse_id("comment", &id)?;
    let actor = current.user.id;
    let comment = state
        .run(move |conn, ctx| {
            Ok(comment_service(conn, ctx).edit_comment(actor, comment_id, &body.body)?)
        })
        .await?;
    Ok(Json(comment))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let comment_id = parse_id("comment", &id)?;
    let actor = current.user.id;
    state
        .run(move |conn, ctx| Ok(comment_service(conn, ctx).delete_comment(actor, comment_id)?))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
