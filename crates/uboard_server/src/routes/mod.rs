//! HTTP routing table.

pub mod auth;
pub mod comments;
pub mod posts;
pub mod users;

use crate::state::AppState;
use axum::extract::Request;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use log::{info, warn};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route("/auth/signup", post(auth::sign_up))
        .route("/auth/confirm-email", post(auth::confirm_email))
        .route("/auth/resend-confirmation", post(auth::resend_confirmation))
        .route("/auth/signin", post(auth::sign_in))
        .route("/auth/signout", post(auth::sign_out))
        .route("/auth/password-reset", post(auth::request_password_reset))
        .route("/auth/password-reset/confirm", post(auth::reset_password))
        .route(
            "/users/me",
            get(users::me).patch(users::update_me).delete(users::delete_me),
        )
        .route("/users/me/password", post(users::change_password))
        .route("/users/{id}", get(users::get_user))
        .route("/posts", get(posts::list_posts).post(posts::create_post))
        .route("/posts/map", get(posts::map_pins))
        .route(
            "/posts/{id}",
            get(posts::get_post)
                .patch(posts::update_post)
                .delete(posts::delete_post),
        )
        .route("/posts/{id}/like", post(posts::like).delete(posts::unlike))
        .route(
            "/posts/{id}/checkin",
            post(posts::check_in).delete(posts::check_out),
        )
        .route(
            "/posts/{id}/comments",
            get(comments::list_comments).post(comments::add_comment),
        )
        .route(
            "/comments/{id}",
            patch(comments::edit_comment).delete(comments::delete_comment),
        )
        .route("/search", get(posts::search))
        .route("/tags", get(posts::list_tags))
        .layer(middleware::from_fn(log_request))
        .with_state(state);

    match cors_layer(cors_origins) {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": uboard_core::core_version(),
    }))
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(request).await;
    info!(
        "event=http_request module=server status={} method={method} path={path} duration_ms={}",
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }

    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    if origins.iter().any(|origin| origin == "*") {
        return Some(layer.allow_origin(Any));
    }

    let allowed = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("event=cors_config module=server status=skipped origin={origin:?}");
                None
            }
        })
        .collect::<Vec<_>>();
    Some(layer.allow_origin(AllowOrigin::list(allowed)))
}
