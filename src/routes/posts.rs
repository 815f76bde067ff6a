use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use tracing::{debug, info};

use super::{parse_id, post_url, profile_url, AppError, AppState, HtmlTemplate};
use crate::auth::{MaybeUser, RequireUser};
use crate::db::{Comment, Group, Post, PostFilter, User};
use crate::forms::{CommentForm, GroupOption, PostForm, PostFormErrors};
use crate::pagination::{Page, PageQuery, Paginated, POSTS_PER_PAGE};

// Template structs
#[derive(Template)]
#[template(path = "posts/index.html")]
pub struct IndexTemplate {
    pub viewer: Option<String>,
    pub page_obj: Paginated<Post>,
}

#[derive(Template)]
#[template(path = "posts/group_list.html")]
pub struct GroupTemplate {
    pub viewer: Option<String>,
    pub group: Group,
    pub page_obj: Paginated<Post>,
}

#[derive(Template)]
#[template(path = "posts/profile.html")]
pub struct ProfileTemplate {
    pub viewer: Option<String>,
    pub author: User,
    pub page_obj: Paginated<Post>,
    pub post_count: i64,
    pub follower_count: i64,
    pub following_count: i64,
    /// Whether the viewer follows this author
    pub following: bool,
    pub can_follow: bool,
}

#[derive(Template)]
#[template(path = "posts/post_detail.html")]
pub struct PostDetailTemplate {
    pub viewer: Option<String>,
    pub post: Post,
    pub author_post_count: i64,
    pub comments: Vec<Comment>,
    pub can_edit: bool,
}

#[derive(Template)]
#[template(path = "posts/create_post.html")]
pub struct PostFormTemplate {
    pub viewer: Option<String>,
    pub form: PostForm,
    pub errors: PostFormErrors,
    pub groups: Vec<GroupOption>,
    pub is_edit: bool,
    pub action: String,
}

/// The post behind a raw path id, or a not-found page for `viewer`.
async fn find_post(
    state: &AppState,
    raw_id: &str,
    viewer: Option<&User>,
) -> Result<Post, AppError> {
    let post = match parse_id(raw_id) {
        Some(post_id) => state.db.get_post(post_id).await?,
        None => None,
    };
    post.ok_or_else(|| AppError::not_found(viewer))
}

fn is_author(viewer: &MaybeUser, post: &Post) -> bool {
    viewer.0.as_ref().is_some_and(|user| user.id == post.author_id)
}

/// Keyed by the resolved page, so any spelling of a page shares one entry.
fn cache_key(viewer: &MaybeUser, page: &Page) -> String {
    let who = viewer
        .0
        .as_ref()
        .map(|user| user.id.to_string())
        .unwrap_or_else(|| "anonymous".to_string());
    format!("{}|{}", who, page.number)
}

// Route handlers
pub async fn index(
    State(state): State<Arc<AppState>>,
    viewer: MaybeUser,
    Query(query): Query<PageQuery>,
) -> Result<Response, AppError> {
    let total = state.db.count_posts(PostFilter::All).await?;
    let page = Page::resolve(query.page.as_deref(), total, POSTS_PER_PAGE);

    let key = cache_key(&viewer, &page);
    if let Some(body) = state.index_cache.get(&key).await {
        return Ok(Html(body).into_response());
    }

    let items = state
        .db
        .get_posts(PostFilter::All, page.per_page, page.offset())
        .await?;
    let body = IndexTemplate {
        viewer: viewer.username(),
        page_obj: Paginated { page, items },
    }
    .render()?;

    state.index_cache.insert(key, body.clone()).await;
    Ok(Html(body).into_response())
}

pub async fn group_posts(
    State(state): State<Arc<AppState>>,
    viewer: MaybeUser,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let group = state
        .db
        .get_group_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::not_found(viewer.0.as_ref()))?;

    let page_obj = state
        .db
        .paginate_posts(PostFilter::Group(group.id), query.page.as_deref())
        .await?;

    Ok(HtmlTemplate(GroupTemplate {
        viewer: viewer.username(),
        group,
        page_obj,
    }))
}

pub async fn profile(
    State(state): State<Arc<AppState>>,
    viewer: MaybeUser,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let author = state
        .db
        .get_user_by_username(&username)
        .await?
        .ok_or_else(|| AppError::not_found(viewer.0.as_ref()))?;

    let page_obj = state
        .db
        .paginate_posts(PostFilter::Author(author.id), query.page.as_deref())
        .await?;

    let following = match &viewer.0 {
        Some(user) => state.db.is_following(user.id, author.id).await?,
        None => false,
    };
    let can_follow = viewer.0.as_ref().is_some_and(|user| user.id != author.id);
    let follower_count = state.db.count_followers(author.id).await?;
    let following_count = state.db.count_following(author.id).await?;

    Ok(HtmlTemplate(ProfileTemplate {
        viewer: viewer.username(),
        post_count: page_obj.page.total,
        author,
        page_obj,
        follower_count,
        following_count,
        following,
        can_follow,
    }))
}

pub async fn post_detail(
    State(state): State<Arc<AppState>>,
    viewer: MaybeUser,
    Path(post_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let post = find_post(&state, &post_id, viewer.0.as_ref()).await?;

    let comments = state.db.get_comments_for_post(post.id).await?;
    let author_post_count = state
        .db
        .count_posts(PostFilter::Author(post.author_id))
        .await?;

    Ok(HtmlTemplate(PostDetailTemplate {
        can_edit: is_author(&viewer, &post),
        viewer: viewer.username(),
        post,
        author_post_count,
        comments,
    }))
}

fn render_post_form(
    viewer: &User,
    form: PostForm,
    errors: PostFormErrors,
    groups: &[Group],
    editing: Option<i64>,
) -> Response {
    let action = match editing {
        Some(post_id) => format!("/posts/{post_id}/edit/"),
        None => "/create/".to_string(),
    };
    HtmlTemplate(PostFormTemplate {
        viewer: Some(viewer.username.clone()),
        groups: form.group_options(groups),
        form,
        errors,
        is_edit: editing.is_some(),
        action,
    })
    .into_response()
}

pub async fn create_page(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
) -> Result<Response, AppError> {
    let groups = state.db.get_all_groups().await?;
    Ok(render_post_form(
        &user,
        PostForm::default(),
        PostFormErrors::default(),
        &groups,
        None,
    ))
}

pub async fn create_submit(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
    Form(form): Form<PostForm>,
) -> Result<Response, AppError> {
    let groups = state.db.get_all_groups().await?;

    match form.clean(&groups) {
        Ok(input) => {
            let post_id = state.db.create_post(user.id, &input).await?;
            info!(post_id, author = %user.username, "Created post");
            Ok(Redirect::to(&profile_url(&user.username)).into_response())
        }
        Err(errors) => Ok(render_post_form(&user, form, errors, &groups, None)),
    }
}

pub async fn edit_page(
    State(state): State<Arc<AppState>>,
    viewer: MaybeUser,
    Path(post_id): Path<String>,
) -> Result<Response, AppError> {
    let post = find_post(&state, &post_id, viewer.0.as_ref()).await?;

    let Some(user) = viewer.0.as_ref().filter(|_| is_author(&viewer, &post)) else {
        return Ok(Redirect::to(&post_url(post.id)).into_response());
    };

    let groups = state.db.get_all_groups().await?;
    Ok(render_post_form(
        user,
        PostForm::from_post(&post),
        PostFormErrors::default(),
        &groups,
        Some(post.id),
    ))
}

pub async fn edit_submit(
    State(state): State<Arc<AppState>>,
    viewer: MaybeUser,
    Path(post_id): Path<String>,
    Form(form): Form<PostForm>,
) -> Result<Response, AppError> {
    let post = find_post(&state, &post_id, viewer.0.as_ref()).await?;

    let Some(user) = viewer.0.as_ref().filter(|_| is_author(&viewer, &post)) else {
        debug!(post_id = post.id, "Ignoring edit by someone other than the author");
        return Ok(Redirect::to(&post_url(post.id)).into_response());
    };

    let groups = state.db.get_all_groups().await?;
    match form.clean(&groups) {
        Ok(input) => {
            state.db.update_post(post.id, &input).await?;
            info!(post_id = post.id, "Updated post");
            Ok(Redirect::to(&post_url(post.id)).into_response())
        }
        Err(errors) => Ok(render_post_form(user, form, errors, &groups, Some(post.id))),
    }
}

pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
    Path(post_id): Path<String>,
    Form(form): Form<CommentForm>,
) -> Result<Redirect, AppError> {
    let post = find_post(&state, &post_id, Some(&user)).await?;

    match form.clean() {
        Ok(text) => {
            let comment_id = state.db.create_comment(post.id, user.id, &text).await?;
            info!(comment_id, post_id = post.id, author = %user.username, "Added comment");
        }
        Err(_) => debug!(post_id = post.id, "Dropping empty comment"),
    }

    Ok(Redirect::to(&post_url(post.id)))
}

/// The comment form only posts; a plain visit goes back to the post.
pub async fn comment_redirect(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
    Path(post_id): Path<String>,
) -> Result<Redirect, AppError> {
    let post = find_post(&state, &post_id, Some(&user)).await?;
    Ok(Redirect::to(&post_url(post.id)))
}
