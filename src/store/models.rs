use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record. Never serialized as-is; responses use the `PublicUser`
/// projection so the hash and reset fields stay server-side.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub reset_password_token: Option<String>,
    pub reset_password_expires: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub user: Uuid,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Post aggregate. Comments belong to exactly one post and keep append order;
/// author/category are references by identity, not embedded documents.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author: Uuid,
    pub category: Uuid,
    pub featured_image: Option<String>,
    pub comments: Vec<Comment>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Author fields safe to embed in read responses.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

/// Read-side post with references resolved. A dangling author or category
/// hydrates to `None` rather than failing the read.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author: Option<AuthorSummary>,
    pub category: Option<Category>,
    pub featured_image: Option<String>,
    pub comments: Vec<Comment>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub author: Uuid,
    pub category: Uuid,
    pub featured_image: Option<String>,
}

/// Partial update: only the fields present are applied.
#[derive(Debug, Clone, Default)]
pub struct PostPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub author: Option<Uuid>,
    pub category: Option<Uuid>,
    pub featured_image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewCategory {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// List filter conjunction plus page window. `new` treats out-of-range
/// paging values as unset and falls back to the defaults.
#[derive(Debug, Clone)]
pub struct PostQuery {
    pub page: i64,
    pub limit: i64,
    pub category: Option<Uuid>,
    pub search: Option<String>,
}

impl PostQuery {
    pub fn new(page: i64, limit: i64, category: Option<Uuid>, search: Option<String>) -> Self {
        Self {
            page: page.max(1),
            limit: if limit < 1 { 10 } else { limit },
            category,
            search,
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

pub fn total_pages(total: u64, limit: i64) -> u64 {
    let limit = limit.max(1) as u64;
    (total + limit - 1) / limit
}
