use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

use super::models::{
    AuthorSummary, Category, CategoryPatch, Comment, NewCategory, NewPost, Post, PostPatch,
    PostQuery, PostView, User,
};
use super::{CategoryStore, PostStore, UserStore};

/// Postgres-backed store. Every mutation is a single statement; comment
/// append order is the `seq` column.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn comments_for(&self, post_ids: &[Uuid]) -> ApiResult<HashMap<Uuid, Vec<Comment>>> {
        if post_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query_as::<_, CommentRow>(
            r#"
            SELECT id, post_id, user_id, content, created_at
              FROM comments
             WHERE post_id = ANY($1)
             ORDER BY seq ASC
            "#,
        )
        .bind(post_ids.to_vec())
        .fetch_all(&self.pool)
        .await?;

        let mut by_post: HashMap<Uuid, Vec<Comment>> = HashMap::new();
        for row in rows {
            by_post.entry(row.post_id).or_default().push(row.into());
        }
        Ok(by_post)
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[derive(sqlx::FromRow)]
struct PostRow {
    id: Uuid,
    title: String,
    content: String,
    author_id: Uuid,
    category_id: Uuid,
    featured_image: Option<String>,
    created_at: OffsetDateTime,
}

impl PostRow {
    fn into_post(self, comments: Vec<Comment>) -> Post {
        Post {
            id: self.id,
            title: self.title,
            content: self.content,
            author: self.author_id,
            category: self.category_id,
            featured_image: self.featured_image,
            comments,
            created_at: self.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PostViewRow {
    id: Uuid,
    title: String,
    content: String,
    author_id: Uuid,
    category_id: Uuid,
    featured_image: Option<String>,
    created_at: OffsetDateTime,
    author_name: Option<String>,
    author_email: Option<String>,
    category_name: Option<String>,
    category_description: Option<String>,
}

impl PostViewRow {
    fn into_view(self, comments: Vec<Comment>) -> PostView {
        // A missing join row means the reference dangles; hydrate to None.
        let author = match (self.author_name, self.author_email) {
            (Some(name), Some(email)) => Some(AuthorSummary {
                id: self.author_id,
                name,
                email,
            }),
            _ => None,
        };
        let category = self.category_name.map(|name| Category {
            id: self.category_id,
            name,
            description: self.category_description,
        });
        PostView {
            id: self.id,
            title: self.title,
            content: self.content,
            author,
            category,
            featured_image: self.featured_image,
            comments,
            created_at: self.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: Uuid,
    post_id: Uuid,
    user_id: Uuid,
    content: String,
    created_at: OffsetDateTime,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Comment {
            id: row.id,
            user: row.user_id,
            content: row.content,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_by_email(&self, email: &str) -> ApiResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, role,
                   reset_password_token, reset_password_expires, created_at
              FROM users
             WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_reset_token(&self, token: &str) -> ApiResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, role,
                   reset_password_token, reset_password_expires, created_at
              FROM users
             WHERE reset_password_token = $1
               AND reset_password_expires > now()
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create(&self, name: &str, email: &str, password_hash: &str) -> ApiResult<User> {
        let result = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, name, email, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, email, password_hash, role,
                      reset_password_token, reset_password_expires, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(user) => Ok(user),
            // Unique index backstops the handler's pre-check under races.
            Err(e) if is_unique_violation(&e) => {
                Err(ApiError::Conflict("User already exists".into()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, user: &User) -> ApiResult<()> {
        sqlx::query(
            r#"
            UPDATE users
               SET name = $2,
                   email = $3,
                   password_hash = $4,
                   role = $5,
                   reset_password_token = $6,
                   reset_password_expires = $7
             WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.role)
        .bind(&user.reset_password_token)
        .bind(user.reset_password_expires)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PostStore for PgStore {
    async fn list(&self, query: &PostQuery) -> ApiResult<(Vec<PostView>, u64)> {
        let rows = sqlx::query_as::<_, PostViewRow>(
            r#"
            SELECT p.id, p.title, p.content, p.author_id, p.category_id,
                   p.featured_image, p.created_at,
                   u.name AS author_name, u.email AS author_email,
                   c.name AS category_name, c.description AS category_description
              FROM posts p
              LEFT JOIN users u ON u.id = p.author_id
              LEFT JOIN categories c ON c.id = p.category_id
             WHERE ($1::text IS NULL OR p.title ILIKE '%' || $1 || '%'
                                     OR p.content ILIKE '%' || $1 || '%')
               AND ($2::uuid IS NULL OR p.category_id = $2)
             ORDER BY p.created_at DESC, p.id DESC
             LIMIT $3 OFFSET $4
            "#,
        )
        .bind(query.search.clone())
        .bind(query.category)
        .bind(query.limit)
        .bind(query.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
              FROM posts p
             WHERE ($1::text IS NULL OR p.title ILIKE '%' || $1 || '%'
                                     OR p.content ILIKE '%' || $1 || '%')
               AND ($2::uuid IS NULL OR p.category_id = $2)
            "#,
        )
        .bind(query.search.clone())
        .bind(query.category)
        .fetch_one(&self.pool)
        .await?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut comments = self.comments_for(&ids).await?;
        let views = rows
            .into_iter()
            .map(|row| {
                let post_comments = comments.remove(&row.id).unwrap_or_default();
                row.into_view(post_comments)
            })
            .collect();
        Ok((views, total as u64))
    }

    async fn get(&self, id: Uuid) -> ApiResult<PostView> {
        let row = sqlx::query_as::<_, PostViewRow>(
            r#"
            SELECT p.id, p.title, p.content, p.author_id, p.category_id,
                   p.featured_image, p.created_at,
                   u.name AS author_name, u.email AS author_email,
                   c.name AS category_name, c.description AS category_description
              FROM posts p
              LEFT JOIN users u ON u.id = p.author_id
              LEFT JOIN categories c ON c.id = p.category_id
             WHERE p.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ApiError::NotFound("Post"))?;

        let mut comments = self.comments_for(&[id]).await?;
        let post_comments = comments.remove(&id).unwrap_or_default();
        Ok(row.into_view(post_comments))
    }

    async fn create(&self, new: NewPost) -> ApiResult<Post> {
        let row = sqlx::query_as::<_, PostRow>(
            r#"
            INSERT INTO posts (id, title, content, author_id, category_id, featured_image)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, title, content, author_id, category_id, featured_image, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.title)
        .bind(&new.content)
        .bind(new.author)
        .bind(new.category)
        .bind(&new.featured_image)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into_post(Vec::new()))
    }

    async fn update(&self, id: Uuid, patch: PostPatch) -> ApiResult<Post> {
        let row = sqlx::query_as::<_, PostRow>(
            r#"
            UPDATE posts
               SET title = COALESCE($2, title),
                   content = COALESCE($3, content),
                   author_id = COALESCE($4, author_id),
                   category_id = COALESCE($5, category_id),
                   featured_image = COALESCE($6, featured_image)
             WHERE id = $1
            RETURNING id, title, content, author_id, category_id, featured_image, created_at
            "#,
        )
        .bind(id)
        .bind(patch.title)
        .bind(patch.content)
        .bind(patch.author)
        .bind(patch.category)
        .bind(patch.featured_image)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ApiError::NotFound("Post"))?;

        let mut comments = self.comments_for(&[id]).await?;
        let post_comments = comments.remove(&id).unwrap_or_default();
        Ok(row.into_post(post_comments))
    }

    async fn delete(&self, id: Uuid) -> ApiResult<()> {
        // Comments go with the post via ON DELETE CASCADE.
        sqlx::query_scalar::<_, Uuid>(r#"DELETE FROM posts WHERE id = $1 RETURNING id"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ApiError::NotFound("Post"))?;
        Ok(())
    }

    async fn add_comment(&self, post_id: Uuid, user: Uuid, content: &str) -> ApiResult<Comment> {
        // INSERT .. SELECT keeps the existence check and the append atomic.
        let row = sqlx::query_as::<_, NewCommentRow>(
            r#"
            INSERT INTO comments (id, post_id, user_id, content)
            SELECT $1, p.id, $2, $3
              FROM posts p
             WHERE p.id = $4
            RETURNING id, user_id, content, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user)
        .bind(content)
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ApiError::NotFound("Post"))?;

        Ok(Comment {
            id: row.id,
            user: row.user_id,
            content: row.content,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct NewCommentRow {
    id: Uuid,
    user_id: Uuid,
    content: String,
    created_at: OffsetDateTime,
}

#[async_trait]
impl CategoryStore for PgStore {
    async fn list(&self) -> ApiResult<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>(
            r#"SELECT id, name, description FROM categories ORDER BY name ASC"#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(categories)
    }

    async fn create(&self, new: NewCategory) -> ApiResult<Category> {
        let category = sqlx::query_as::<_, Category>(
            r#"
            INSERT INTO categories (id, name, description)
            VALUES ($1, $2, $3)
            RETURNING id, name, description
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(&new.description)
        .fetch_one(&self.pool)
        .await?;
        Ok(category)
    }

    async fn get(&self, id: Uuid) -> ApiResult<Category> {
        sqlx::query_as::<_, Category>(
            r#"SELECT id, name, description FROM categories WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ApiError::NotFound("Category"))
    }

    async fn update(&self, id: Uuid, patch: CategoryPatch) -> ApiResult<Category> {
        sqlx::query_as::<_, Category>(
            r#"
            UPDATE categories
               SET name = COALESCE($2, name),
                   description = COALESCE($3, description)
             WHERE id = $1
            RETURNING id, name, description
            "#,
        )
        .bind(id)
        .bind(patch.name)
        .bind(patch.description)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ApiError::NotFound("Category"))
    }

    async fn delete(&self, id: Uuid) -> ApiResult<()> {
        sqlx::query_scalar::<_, Uuid>(r#"DELETE FROM categories WHERE id = $1 RETURNING id"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ApiError::NotFound("Category"))?;
        Ok(())
    }
}
