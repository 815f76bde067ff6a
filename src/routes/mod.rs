use std::sync::Arc;

use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::error;

use crate::auth::MaybeUser;
use crate::cache::ResponseCache;
use crate::db::{Database, User};

pub mod accounts;
pub mod follow;
pub mod posts;

pub struct AppState {
    pub db: Arc<Database>,
    /// Rendered pages of the main feed
    pub index_cache: Arc<ResponseCache>,
    pub session_ttl: chrono::Duration,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(posts::index))
        .route("/group/:slug/", get(posts::group_posts))
        .route("/profile/:username/", get(posts::profile))
        .route("/posts/:post_id/", get(posts::post_detail))
        .route("/create/", get(posts::create_page).post(posts::create_submit))
        .route(
            "/posts/:post_id/edit/",
            get(posts::edit_page).post(posts::edit_submit),
        )
        .route(
            "/posts/:post_id/comment/",
            get(posts::comment_redirect).post(posts::add_comment),
        )
        .route("/follow/", get(follow::follow_index))
        .route(
            "/profile/:username/follow/",
            get(follow::profile_follow).post(follow::profile_follow),
        )
        .route(
            "/profile/:username/unfollow/",
            get(follow::profile_unfollow).post(follow::profile_unfollow),
        )
        .route(
            "/auth/signup/",
            get(accounts::signup_page).post(accounts::signup_submit),
        )
        .route(
            "/auth/login/",
            get(accounts::login_page).post(accounts::login_submit),
        )
        .route("/auth/logout/", get(accounts::logout).post(accounts::logout))
        .nest_service("/static", ServeDir::new("static"))
        .nest_service("/media", ServeDir::new("media"))
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Template)]
#[template(path = "core/404.html")]
pub struct NotFoundTemplate {
    pub viewer: Option<String>,
}

// Wrapper for HTML responses
pub struct HtmlTemplate<T>(pub T);

impl<T: Template> IntoResponse for HtmlTemplate<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(html) => Html(html).into_response(),
            Err(err) => {
                error!("Failed to render template: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to render template",
                )
                    .into_response()
            }
        }
    }
}

pub enum AppError {
    /// Missing group, user or post; carries the viewer's name for the header
    NotFound(Option<String>),
    Internal(anyhow::Error),
}

impl AppError {
    pub fn not_found(viewer: Option<&User>) -> Self {
        AppError::NotFound(viewer.map(|user| user.username.clone()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound(viewer) => not_found_page(viewer),
            AppError::Internal(err) => {
                error!("Request failed: {:#}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        AppError::Internal(err.into())
    }
}

fn not_found_page(viewer: Option<String>) -> Response {
    (
        StatusCode::NOT_FOUND,
        HtmlTemplate(NotFoundTemplate { viewer }),
    )
        .into_response()
}

async fn fallback(viewer: MaybeUser) -> Response {
    not_found_page(viewer.username())
}

/// Ids in paths that are not integers never match a row.
pub(crate) fn parse_id(raw: &str) -> Option<i64> {
    raw.parse().ok()
}

pub(crate) fn profile_url(username: &str) -> String {
    format!("/profile/{}/", urlencoding::encode(username))
}

pub(crate) fn post_url(post_id: i64) -> String {
    format!("/posts/{post_id}/")
}
