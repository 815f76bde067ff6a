use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    Form,
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use tracing::info;

use super::{AppError, AppState, HtmlTemplate};
use crate::auth::{self, AuthError, MaybeUser};

#[derive(Template)]
#[template(path = "users/login.html")]
pub struct LoginTemplate {
    pub viewer: Option<String>,
    pub error: Option<String>,
    /// Where to go after a successful login
    pub next: String,
    pub username: String,
}

#[derive(Template)]
#[template(path = "users/signup.html")]
pub struct SignupTemplate {
    pub viewer: Option<String>,
    pub error: Option<String>,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SignupForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Form errors are shown to the user; anything else is a server error.
fn form_error(err: AuthError) -> Result<String, AppError> {
    match err {
        AuthError::Internal(err) => Err(AppError::Internal(err)),
        other => Ok(other.to_string()),
    }
}

fn with_session(jar: CookieJar, token: String, state: &AppState, to: &str) -> Response {
    (
        jar.add(auth::session_cookie(token, state.session_ttl)),
        Redirect::to(to),
    )
        .into_response()
}

pub async fn login_page(
    viewer: MaybeUser,
    Query(query): Query<NextQuery>,
) -> impl IntoResponse {
    HtmlTemplate(LoginTemplate {
        viewer: viewer.username(),
        error: None,
        next: auth::safe_next(query.next.as_deref()).to_string(),
        username: String::new(),
    })
}

pub async fn login_submit(
    State(state): State<Arc<AppState>>,
    viewer: MaybeUser,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let next = auth::safe_next(form.next.as_deref());

    match auth::authenticate(&state.db, &form.username, &form.password).await {
        Ok(user) => {
            let token = auth::start_session(&state.db, user.id, state.session_ttl).await?;
            info!("User '{}' logged in", user.username);
            Ok(with_session(jar, token, &state, next))
        }
        Err(err) => Ok(HtmlTemplate(LoginTemplate {
            viewer: viewer.username(),
            error: Some(form_error(err)?),
            next: next.to_string(),
            username: form.username.trim().to_string(),
        })
        .into_response()),
    }
}

pub async fn signup_page(viewer: MaybeUser) -> impl IntoResponse {
    HtmlTemplate(SignupTemplate {
        viewer: viewer.username(),
        error: None,
        username: String::new(),
    })
}

pub async fn signup_submit(
    State(state): State<Arc<AppState>>,
    viewer: MaybeUser,
    jar: CookieJar,
    Form(form): Form<SignupForm>,
) -> Result<Response, AppError> {
    match auth::register(&state.db, &form.username, &form.password).await {
        Ok(user) => {
            let token = auth::start_session(&state.db, user.id, state.session_ttl).await?;
            Ok(with_session(jar, token, &state, "/"))
        }
        Err(err) => Ok(HtmlTemplate(SignupTemplate {
            viewer: viewer.username(),
            error: Some(form_error(err)?),
            username: form.username.trim().to_string(),
        })
        .into_response()),
    }
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    if let Some(token) = auth::session_token(&jar) {
        state.db.delete_session(&token).await?;
    }

    Ok((jar.remove(auth::removal_cookie()), Redirect::to("/")).into_response())
}
