use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    FromRow, SqlitePool,
};

use crate::config::GroupConfig;
use crate::pagination::{Page, Paginated, POSTS_PER_PAGE};

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub date_joined: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct Group {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub description: String,
}

/// A post joined with its author's username and its group, if any.
#[derive(Debug, Clone, FromRow)]
pub struct Post {
    pub id: i64,
    pub text: String,
    pub pub_date: String,
    pub image: Option<String>,
    pub author_id: i64,
    pub author_username: String,
    pub group_id: Option<i64>,
    pub group_slug: Option<String>,
    pub group_title: Option<String>,
}

impl Post {
    /// Publication date for display, e.g. "25 September 2022".
    pub fn published_on(&self) -> String {
        display_date(&self.pub_date)
    }

    /// Image reference as a link: URLs and absolute paths are kept, anything
    /// else is resolved under `/media/`.
    pub fn image_url(&self) -> Option<String> {
        self.image.as_deref().map(|image| {
            if image.starts_with('/') || image.starts_with("http://") || image.starts_with("https://")
            {
                image.to_string()
            } else {
                format!("/media/{image}")
            }
        })
    }

    pub fn group_label(&self) -> &str {
        self.group_title.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author_id: i64,
    pub author_username: String,
    pub text: String,
    pub created: String,
}

impl Comment {
    pub fn created_on(&self) -> String {
        display_date(&self.created)
    }
}

/// Validated values for creating or editing a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostInput {
    pub text: String,
    pub group_id: Option<i64>,
    pub image: Option<String>,
}

/// Which posts a feed lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostFilter {
    All,
    Group(i64),
    Author(i64),
    /// Posts by every author the given user follows
    FollowedBy(i64),
}

impl PostFilter {
    fn where_clause(&self) -> &'static str {
        match self {
            PostFilter::All => "",
            PostFilter::Group(_) => "WHERE p.group_id = ?",
            PostFilter::Author(_) => "WHERE p.author_id = ?",
            PostFilter::FollowedBy(_) => {
                "WHERE p.author_id IN (SELECT author_id FROM follows WHERE user_id = ?)"
            }
        }
    }

    fn bind_value(&self) -> Option<i64> {
        match *self {
            PostFilter::All => None,
            PostFilter::Group(id) | PostFilter::Author(id) | PostFilter::FollowedBy(id) => Some(id),
        }
    }
}

const POST_SELECT: &str = r#"
    SELECT p.id, p.text, p.pub_date, p.image, p.author_id,
           u.username AS author_username,
           p.group_id, g.slug AS group_slug, g.title AS group_title
    FROM posts p
    JOIN users u ON u.id = p.author_id
    LEFT JOIN post_groups g ON g.id = p.group_id
"#;

/// Current time as fixed-width RFC 3339, so text order is time order.
fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn display_date(stored: &str) -> String {
    DateTime::parse_from_rfc3339(stored)
        .map(|dt| dt.format("%-d %B %Y").to_string())
        .unwrap_or_else(|_| stored.to_string())
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.foreign_keys(true);

        // Every connection to an in-memory database opens a fresh one, so
        // keep exactly one connection alive.
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        Ok(Self { pool })
    }

    pub async fn initialize(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                date_joined TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                token TEXT NOT NULL UNIQUE,
                expires_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS post_groups (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL DEFAULT ''
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY,
                text TEXT NOT NULL,
                pub_date TEXT NOT NULL,
                image TEXT,
                author_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                group_id INTEGER REFERENCES post_groups(id) ON DELETE SET NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY,
                post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                author_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                text TEXT NOT NULL,
                created TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS follows (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                author_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                UNIQUE(user_id, author_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for index in [
            "CREATE INDEX IF NOT EXISTS idx_posts_pub_date ON posts(pub_date DESC, id DESC)",
            "CREATE INDEX IF NOT EXISTS idx_posts_group ON posts(group_id, pub_date DESC)",
            "CREATE INDEX IF NOT EXISTS idx_posts_author ON posts(author_id, pub_date DESC)",
            "CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id, created)",
        ] {
            sqlx::query(index).execute(&self.pool).await?;
        }

        Ok(())
    }

    // Users and sessions

    pub async fn create_user(&self, username: &str, password_hash: &str) -> anyhow::Result<i64> {
        let result = sqlx::query(
            "INSERT INTO users (username, password_hash, date_joined) VALUES (?, ?, ?)",
        )
        .bind(username)
        .bind(password_hash)
        .bind(now_timestamp())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_user(&self, user_id: i64) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn get_user_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn create_session(
        &self,
        user_id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO sessions (user_id, token, expires_at) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(token)
            .bind(expires_at.to_rfc3339_opts(SecondsFormat::Micros, true))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// The user owning an unexpired session with this token.
    pub async fn get_session_user(&self, token: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT u.* FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.token = ? AND s.expires_at > ?
            "#,
        )
        .bind(token)
        .bind(now_timestamp())
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn delete_session(&self, token: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_expired_sessions(&self) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(now_timestamp())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // Groups

    pub async fn sync_groups(&self, configs: &[GroupConfig]) -> anyhow::Result<()> {
        for config in configs {
            sqlx::query(
                r#"
                INSERT INTO post_groups (title, slug, description)
                VALUES (?, ?, ?)
                ON CONFLICT(slug) DO UPDATE SET
                    title = excluded.title,
                    description = excluded.description
                "#,
            )
            .bind(&config.title)
            .bind(&config.slug)
            .bind(&config.description)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn create_group(
        &self,
        title: &str,
        slug: &str,
        description: &str,
    ) -> anyhow::Result<i64> {
        let result =
            sqlx::query("INSERT INTO post_groups (title, slug, description) VALUES (?, ?, ?)")
                .bind(title)
                .bind(slug)
                .bind(description)
                .execute(&self.pool)
                .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_all_groups(&self) -> anyhow::Result<Vec<Group>> {
        let groups = sqlx::query_as::<_, Group>("SELECT * FROM post_groups ORDER BY title, id")
            .fetch_all(&self.pool)
            .await?;
        Ok(groups)
    }

    pub async fn get_group_by_slug(&self, slug: &str) -> anyhow::Result<Option<Group>> {
        let group = sqlx::query_as::<_, Group>("SELECT * FROM post_groups WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(group)
    }

    /// Remove a group; its posts stay, ungrouped.
    pub async fn delete_group(&self, group_id: i64) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM post_groups WHERE id = ?")
            .bind(group_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // Posts

    pub async fn create_post(&self, author_id: i64, input: &PostInput) -> anyhow::Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO posts (text, pub_date, image, author_id, group_id)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&input.text)
        .bind(now_timestamp())
        .bind(input.image.as_deref())
        .bind(author_id)
        .bind(input.group_id)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn update_post(&self, post_id: i64, input: &PostInput) -> anyhow::Result<()> {
        sqlx::query("UPDATE posts SET text = ?, group_id = ?, image = ? WHERE id = ?")
            .bind(&input.text)
            .bind(input.group_id)
            .bind(input.image.as_deref())
            .bind(post_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_post(&self, post_id: i64) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(post_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_post(&self, post_id: i64) -> anyhow::Result<Option<Post>> {
        let sql = format!("{POST_SELECT} WHERE p.id = ?");
        let post = sqlx::query_as::<_, Post>(&sql)
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(post)
    }

    /// Posts matching `filter`, newest first.
    pub async fn get_posts(
        &self,
        filter: PostFilter,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<Post>> {
        let sql = format!(
            "{POST_SELECT} {} ORDER BY p.pub_date DESC, p.id DESC LIMIT ? OFFSET ?",
            filter.where_clause()
        );
        let mut query = sqlx::query_as::<_, Post>(&sql);
        if let Some(value) = filter.bind_value() {
            query = query.bind(value);
        }
        let posts = query
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(posts)
    }

    pub async fn count_posts(&self, filter: PostFilter) -> anyhow::Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM posts p {}", filter.where_clause());
        let mut query = sqlx::query_as::<_, (i64,)>(&sql);
        if let Some(value) = filter.bind_value() {
            query = query.bind(value);
        }
        let count = query.fetch_one(&self.pool).await?;
        Ok(count.0)
    }

    /// Resolve the requested page for `filter` and load its posts.
    pub async fn paginate_posts(
        &self,
        filter: PostFilter,
        requested: Option<&str>,
    ) -> anyhow::Result<Paginated<Post>> {
        let total = self.count_posts(filter).await?;
        let page = Page::resolve(requested, total, POSTS_PER_PAGE);
        let items = self
            .get_posts(filter, page.per_page, page.offset())
            .await?;
        Ok(Paginated { page, items })
    }

    // Comments

    pub async fn create_comment(
        &self,
        post_id: i64,
        author_id: i64,
        text: &str,
    ) -> anyhow::Result<i64> {
        let result = sqlx::query(
            "INSERT INTO comments (post_id, author_id, text, created) VALUES (?, ?, ?, ?)",
        )
        .bind(post_id)
        .bind(author_id)
        .bind(text)
        .bind(now_timestamp())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_comments_for_post(&self, post_id: i64) -> anyhow::Result<Vec<Comment>> {
        let comments = sqlx::query_as::<_, Comment>(
            r#"
            SELECT c.id, c.post_id, c.author_id, u.username AS author_username,
                   c.text, c.created
            FROM comments c
            JOIN users u ON u.id = c.author_id
            WHERE c.post_id = ?
            ORDER BY c.created, c.id
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(comments)
    }

    // Follows

    /// Get-or-create the edge; returns whether a new edge was stored.
    pub async fn follow(&self, user_id: i64, author_id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO follows (user_id, author_id) VALUES (?, ?)
            ON CONFLICT(user_id, author_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(author_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Returns whether an edge was removed.
    pub async fn unfollow(&self, user_id: i64, author_id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM follows WHERE user_id = ? AND author_id = ?")
            .bind(user_id)
            .bind(author_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn is_following(&self, user_id: i64, author_id: i64) -> anyhow::Result<bool> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM follows WHERE user_id = ? AND author_id = ?")
                .bind(user_id)
                .bind(author_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.0 > 0)
    }

    pub async fn count_follows(&self, user_id: i64, author_id: i64) -> anyhow::Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM follows WHERE user_id = ? AND author_id = ?")
                .bind(user_id)
                .bind(author_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.0)
    }

    pub async fn count_followers(&self, author_id: i64) -> anyhow::Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM follows WHERE author_id = ?")
            .bind(author_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    pub async fn count_following(&self, user_id: i64) -> anyhow::Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM follows WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }
}
