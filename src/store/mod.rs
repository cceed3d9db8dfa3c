//! Persistence ports and their implementations. Handlers only ever see the
//! traits; `PgStore` backs the running service, `MemoryStore` backs tests.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ApiResult;

pub mod memory;
pub mod models;
pub mod postgres;

pub use memory::MemoryStore;
pub use models::{
    total_pages, AuthorSummary, Category, CategoryPatch, Comment, NewCategory, NewPost, Post,
    PostPatch, PostQuery, PostView, User,
};
pub use postgres::PgStore;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> ApiResult<Option<User>>;

    /// Matches only while the token's expiry is strictly in the future.
    async fn find_by_reset_token(&self, token: &str) -> ApiResult<Option<User>>;

    /// Fails with `Conflict` when the email is already registered.
    async fn create(&self, name: &str, email: &str, password_hash: &str) -> ApiResult<User>;

    async fn save(&self, user: &User) -> ApiResult<()>;
}

#[async_trait]
pub trait PostStore: Send + Sync {
    /// Returns the hydrated page window plus the total match count.
    async fn list(&self, query: &PostQuery) -> ApiResult<(Vec<PostView>, u64)>;

    async fn get(&self, id: Uuid) -> ApiResult<PostView>;

    async fn create(&self, new: NewPost) -> ApiResult<Post>;

    async fn update(&self, id: Uuid, patch: PostPatch) -> ApiResult<Post>;

    /// Removes the post and its embedded comments; nothing else.
    async fn delete(&self, id: Uuid) -> ApiResult<()>;

    /// Appends with a server-assigned timestamp and returns only the new
    /// comment.
    async fn add_comment(&self, post_id: Uuid, user: Uuid, content: &str) -> ApiResult<Comment>;
}

#[async_trait]
pub trait CategoryStore: Send + Sync {
    async fn list(&self) -> ApiResult<Vec<Category>>;

    async fn create(&self, new: NewCategory) -> ApiResult<Category>;

    async fn get(&self, id: Uuid) -> ApiResult<Category>;

    async fn update(&self, id: Uuid, patch: CategoryPatch) -> ApiResult<Category>;

    /// Does not cascade to posts referencing the category.
    async fn delete(&self, id: Uuid) -> ApiResult<()>;
}
