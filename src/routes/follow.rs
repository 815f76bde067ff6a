use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect},
};
use tracing::info;

use super::{profile_url, AppError, AppState, HtmlTemplate};
use crate::auth::RequireUser;
use crate::db::{Post, PostFilter};
use crate::pagination::{PageQuery, Paginated};

#[derive(Template)]
#[template(path = "posts/follow.html")]
pub struct FollowTemplate {
    pub viewer: Option<String>,
    pub page_obj: Paginated<Post>,
}

/// Posts by every author the current user follows.
pub async fn follow_index(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page_obj = state
        .db
        .paginate_posts(PostFilter::FollowedBy(user.id), query.page.as_deref())
        .await?;

    Ok(HtmlTemplate(FollowTemplate {
        viewer: Some(user.username),
        page_obj,
    }))
}

pub async fn profile_follow(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
    Path(username): Path<String>,
) -> Result<Redirect, AppError> {
    // following yourself is a no-op
    if username == user.username {
        return Ok(Redirect::to(&profile_url(&username)));
    }

    let author = state
        .db
        .get_user_by_username(&username)
        .await?
        .ok_or_else(|| AppError::not_found(Some(&user)))?;

    if state.db.follow(user.id, author.id).await? {
        info!(follower = %user.username, author = %author.username, "Followed author");
    }

    Ok(Redirect::to(&profile_url(&author.username)))
}

pub async fn profile_unfollow(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
    Path(username): Path<String>,
) -> Result<Redirect, AppError> {
    let author = state
        .db
        .get_user_by_username(&username)
        .await?
        .ok_or_else(|| AppError::not_found(Some(&user)))?;

    if state.db.unfollow(user.id, author.id).await? {
        info!(follower = %user.username, author = %author.username, "Unfollowed author");
    }

    Ok(Redirect::to(&profile_url(&author.username)))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::db::PostInput;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    async fn create_author_with_post(state: &AppState, text: &str) -> i64 {
        let author = state.db.create_user("auth", "unused-hash").await.unwrap();
        state
            .db
            .create_post(
                author,
                &PostInput {
                    text: text.to_string(),
                    group_id: None,
                    image: None,
                },
            )
            .await
            .unwrap();
        author
    }

    mod follow_edge_tests {
        use super::*;

        #[tokio::test]
        async fn test_follow_creates_edge_and_redirects() {
            let (app, state) = create_test_app().await;
            let author = create_author_with_post(&state, "Followed post").await;
            let (reader, cookie) = create_logged_in_user(&state, "HasNoName").await;

            let response = app
                .oneshot(post_form("/profile/auth/follow/", Some(&cookie), &[]))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::SEE_OTHER);
            assert_eq!(location(&response), "/profile/auth/");
            assert!(state.db.is_following(reader.id, author).await.unwrap());
        }

        #[tokio::test]
        async fn test_follow_is_idempotent() {
            let (app, state) = create_test_app().await;
            let author = create_author_with_post(&state, "Followed post").await;
            let (reader, cookie) = create_logged_in_user(&state, "HasNoName").await;

            for _ in 0..2 {
                let response = app
                    .clone()
                    .oneshot(get("/profile/auth/follow/", Some(&cookie)))
                    .await
                    .unwrap();
                assert_eq!(response.status(), StatusCode::SEE_OTHER);
            }

            assert_eq!(state.db.count_follows(reader.id, author).await.unwrap(), 1);
        }

        #[tokio::test]
        async fn test_self_follow_is_ignored() {
            let (app, state) = create_test_app().await;
            let (user, cookie) = create_logged_in_user(&state, "HasNoName").await;

            let response = app
                .oneshot(get("/profile/HasNoName/follow/", Some(&cookie)))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::SEE_OTHER);
            assert_eq!(location(&response), "/profile/HasNoName/");
            assert_eq!(state.db.count_follows(user.id, user.id).await.unwrap(), 0);
        }

        #[tokio::test]
        async fn test_unfollow_removes_edge() {
            let (app, state) = create_test_app().await;
            let author = create_author_with_post(&state, "Followed post").await;
            let (reader, cookie) = create_logged_in_user(&state, "HasNoName").await;
            state.db.follow(reader.id, author).await.unwrap();

            let response = app
                .clone()
                .oneshot(get("/profile/auth/unfollow/", Some(&cookie)))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::SEE_OTHER);
            assert_eq!(location(&response), "/profile/auth/");
            assert!(!state.db.is_following(reader.id, author).await.unwrap());

            // unfollowing again is harmless
            let response = app
                .oneshot(get("/profile/auth/unfollow/", Some(&cookie)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::SEE_OTHER);
        }

        #[tokio::test]
        async fn test_unknown_author_is_not_found() {
            let (app, state) = create_test_app().await;
            let (_reader, cookie) = create_logged_in_user(&state, "HasNoName").await;

            let follow = app
                .clone()
                .oneshot(get("/profile/nobody/follow/", Some(&cookie)))
                .await
                .unwrap();
            assert_eq!(follow.status(), StatusCode::NOT_FOUND);

            let unfollow = app
                .oneshot(get("/profile/nobody/unfollow/", Some(&cookie)))
                .await
                .unwrap();
            assert_eq!(unfollow.status(), StatusCode::NOT_FOUND);
        }

        #[tokio::test]
        async fn test_follow_requires_login() {
            let (app, state) = create_test_app().await;
            create_author_with_post(&state, "Followed post").await;

            let response = app
                .oneshot(get("/profile/auth/follow/", None))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::SEE_OTHER);
            assert_eq!(
                location(&response),
                "/auth/login/?next=/profile/auth/follow/"
            );
        }
    }

    mod feed_tests {
        use super::*;

        #[tokio::test]
        async fn test_followed_post_appears_for_follower_only() {
            let (app, state) = create_test_app().await;
            let author = create_author_with_post(&state, "Only for followers").await;
            let (follower, follower_cookie) = create_logged_in_user(&state, "follower").await;
            let (_stranger, stranger_cookie) = create_logged_in_user(&state, "stranger").await;
            state.db.follow(follower.id, author).await.unwrap();

            let body = body_string(
                app.clone()
                    .oneshot(get("/follow/", Some(&follower_cookie)))
                    .await
                    .unwrap(),
            )
            .await;
            assert!(body.contains("Only for followers"));

            let body = body_string(
                app.oneshot(get("/follow/", Some(&stranger_cookie)))
                    .await
                    .unwrap(),
            )
            .await;
            assert!(!body.contains("Only for followers"));
            assert!(body.contains("Follow some authors"));
        }

        #[tokio::test]
        async fn test_follow_feed_requires_login() {
            let (app, _state) = create_test_app().await;

            let response = app.oneshot(get("/follow/?page=2", None)).await.unwrap();

            assert_eq!(response.status(), StatusCode::SEE_OTHER);
            assert_eq!(location(&response), "/auth/login/?next=/follow/%3Fpage%3D2");
        }
    }
}
