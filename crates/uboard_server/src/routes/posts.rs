//! Post, feed, map, engagement, search and tag endpoints.

use crate::error::ApiError;
use crate::extract::{parse_id, ApiJson, ApiQuery, CurrentUser};
use crate::state::{post_service, AppState};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uboard_core::{
    search_posts, BoundingBox, EngagementState, MapPin, MapQuery, Page, PostDraft, PostKind,
    PostListQuery, PostView, SearchHit, SearchQuery, TagCount,
};
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct FeedParams {
    pub kind: Option<PostKind>,
    pub tag: Option<String>,
    pub author: Option<Uuid>,
    pub q: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl From<FeedParams> for PostListQuery {
    fn from(params: FeedParams) -> Self {
        Self {
            kind: params.kind,
            tag: params.tag,
            author: params.author,
            text: params.q,
            limit: params.limit,
            offset: params.offset.unwrap_or(0),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MapParams {
    pub min_lat: Option<f64>,
    pub max_lat: Option<f64>,
    pub min_lng: Option<f64>,
    pub max_lng: Option<f64>,
    pub kind: Option<PostKind>,
    pub limit: Option<u32>,
}

impl TryFrom<MapParams> for MapQuery {
    type Error = ApiError;

    fn try_from(params: MapParams) -> Result<Self, Self::Error> {
        let bounds = match (params.min_lat, params.max_lat, params.min_lng, params.max_lng) {
            (Some(min_lat), Some(max_lat), Some(min_lng), Some(max_lng)) => Some(BoundingBox {
                min_lat,
                max_lat,
                min_lng,
                max_lng,
            }),
            (None, None, None, None) => None,
            _ => {
                return Err(ApiError::BadRequest(
                    "min_lat, max_lat, min_lng and max_lng must be given together".to_string(),
                ))
            }
        };
        Ok(Self {
            bounds,
            kind: params.kind,
            limit: params.limit,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub kind: Option<PostKind>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub raw: bool,
}

pub async fn list_posts(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiQuery(params): ApiQuery<FeedParams>,
) -> Result<Json<Page<PostView>>, ApiError> {
    let viewer = current.user.id;
    let query = PostListQuery::from(params);
    let page = state
        .run(move |conn, ctx| Ok(post_service(conn, ctx).list_posts(viewer, &query)?))
        .await?;
    Ok(Json(page))
}

pub async fn create_post(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiJson(draft): ApiJson<PostDraft>,
) -> Result<(StatusCode, Json<PostView>), ApiError> {
    let author = current.user.id;
    let post = state
        .run(move |conn, ctx| Ok(post_service(conn, ctx).create_post(author, &draft)?))
        .await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn get_post(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<PostView>, ApiError> {
    let post_id = parse_id("post", &id)?;
    let viewer = current.user.id;
    let post = state
        .run(move |conn, ctx| Ok(post_service(conn, ctx).get_post(viewer, post_id)?))
        .await?;
    Ok(Json(post))
}

pub async fn update_post(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
    ApiJson(draft): ApiJson<PostDraft>,
) -> Result<Json<PostView>, ApiError> {
    let post_id = parse_id("post", &id)?;
    let actor = current.user.id;
    let post = state
        .run(move |conn, ctx| Ok(post_service(conn, ctx).update_post(actor, post_id, &draft)?))
        .await?;
    Ok(Json(post))
}

pub async fn delete_post(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let post_id = parse_id("post", &id)?;
    let actor = current.user.id;
    state
        .run(move |conn, ctx| Ok(post_service(conn, ctx).delete_post(actor, post_id)?))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn map_pins(
    State(state): State<AppState>,
    _current: CurrentUser,
    ApiQuery(params): ApiQuery<MapParams>,
) -> Result<Json<Vec<MapPin>>, ApiError> {
    let query = MapQuery::try_from(params)?;
    let pins = state
        .run(move |conn, ctx| Ok(post_service(conn, ctx).map_pins(&query)?))
        .await?;
    Ok(Json(pins))
}

pub async fn like(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<EngagementState>, ApiError> {
    engage(state, current, &id, Engagement::Like).await
}

pub async fn unlike(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<EngagementState>, ApiError> {
    engage(state, current, &id, Engagement::Unlike).await
}

pub async fn check_in(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<EngagementState>, ApiError> {
    engage(state, current, &id, Engagement::CheckIn).await
}

pub async fn check_out(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<EngagementState>, ApiError> {
    engage(state, current, &id, Engagement::CheckOut).await
}

#[derive(Debug, Clone, Copy)]
enum Engagement {
    Like,
    Unlike,
    CheckIn,
    CheckOut,
}

async fn engage(
    state: AppState,
    current: CurrentUser,
    id: &str,
    action: Engagement,
) -> Result<Json<EngagementState>, ApiError> {
    let post_id = parse_id("post", id)?;
    let user = current.user.id;
    let outcome = state
        .run(move |conn, ctx| {
            let service = post_service(conn, ctx);
            let outcome = match action {
                Engagement::Like => service.like(user, post_id),
                Engagement::Unlike => service.unlike(user, post_id),
                Engagement::CheckIn => service.check_in(user, post_id),
                Engagement::CheckOut => service.check_out(user, post_id),
            };
            Ok(outcome?)
        })
        .await?;
    Ok(Json(outcome))
}

pub async fn search(
    State(state): State<AppState>,
    _current: CurrentUser,
    ApiQuery(params): ApiQuery<SearchParams>,
) -> Result<Json<Vec<SearchHit>>, ApiError> {
    let mut query = SearchQuery::new(params.q);
    query.kind = params.kind;
    query.raw_fts_syntax = params.raw;
    if let Some(limit) = params.limit {
        query.limit = limit;
    }
    let hits = state
        .run(move |conn, _| Ok(search_posts(conn, &query)?))
        .await?;
    Ok(Json(hits))
}

pub async fn list_tags(
    State(state): State<AppState>,
    _current: CurrentUser,
) -> Result<Json<Vec<TagCount>>, ApiError> {
    let tags = state
        .run(move |conn, ctx| Ok(post_service(conn, ctx).list_tags()?))
        .await?;
    Ok(Json(tags))
}
