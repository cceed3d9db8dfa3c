use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

use super::models::{
    AuthorSummary, Category, CategoryPatch, Comment, NewCategory, NewPost, Post, PostPatch,
    PostQuery, PostView, User,
};
use super::{CategoryStore, PostStore, UserStore};

/// In-process store behind the same ports as `PgStore`; backs
/// `AppState::fake()` and the test suite.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    categories: HashMap<Uuid, Category>,
    // Vec keeps arrival order, the tie-break for equal creation times.
    posts: Vec<Post>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Inner {
    fn hydrate(&self, post: &Post) -> PostView {
        let author = self.users.get(&post.author).map(|u| AuthorSummary {
            id: u.id,
            name: u.name.clone(),
            email: u.email.clone(),
        });
        let category = self.categories.get(&post.category).cloned();
        PostView {
            id: post.id,
            title: post.title.clone(),
            content: post.content.clone(),
            author,
            category,
            featured_image: post.featured_image.clone(),
            comments: post.comments.clone(),
            created_at: post.created_at,
        }
    }
}

fn matches(post: &Post, query: &PostQuery) -> bool {
    if let Some(category) = query.category {
        if post.category != category {
            return false;
        }
    }
    if let Some(search) = &query.search {
        let needle = search.to_lowercase();
        if !post.title.to_lowercase().contains(&needle)
            && !post.content.to_lowercase().contains(&needle)
        {
            return false;
        }
    }
    true
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> ApiResult<Option<User>> {
        Ok(self.read().users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_reset_token(&self, token: &str) -> ApiResult<Option<User>> {
        let now = OffsetDateTime::now_utc();
        Ok(self
            .read()
            .users
            .values()
            .find(|u| {
                u.reset_password_token.as_deref() == Some(token)
                    && u.reset_password_expires.map_or(false, |exp| exp > now)
            })
            .cloned())
    }

    async fn create(&self, name: &str, email: &str, password_hash: &str) -> ApiResult<User> {
        let mut inner = self.write();
        if inner.users.values().any(|u| u.email == email) {
            return Err(ApiError::Conflict("User already exists".into()));
        }
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            role: "user".to_string(),
            reset_password_token: None,
            reset_password_expires: None,
            created_at: OffsetDateTime::now_utc(),
        };
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn save(&self, user: &User) -> ApiResult<()> {
        self.write().users.insert(user.id, user.clone());
        Ok(())
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn list(&self, query: &PostQuery) -> ApiResult<(Vec<PostView>, u64)> {
        let inner = self.read();
        // Newest-arrival first for ties, then a stable sort by creation time.
        let mut hits: Vec<&Post> = inner.posts.iter().rev().filter(|p| matches(p, query)).collect();
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = hits.len() as u64;
        let views = hits
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit as usize)
            .map(|p| inner.hydrate(p))
            .collect();
        Ok((views, total))
    }

    async fn get(&self, id: Uuid) -> ApiResult<PostView> {
        let inner = self.read();
        let post = inner
            .posts
            .iter()
            .find(|p| p.id == id)
            .ok_or(ApiError::NotFound("Post"))?;
        Ok(inner.hydrate(post))
    }

    async fn create(&self, new: NewPost) -> ApiResult<Post> {
        let post = Post {
            id: Uuid::new_v4(),
            title: new.title,
            content: new.content,
            author: new.author,
            category: new.category,
            featured_image: new.featured_image,
            comments: Vec::new(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.write().posts.push(post.clone());
        Ok(post)
    }

    async fn update(&self, id: Uuid, patch: PostPatch) -> ApiResult<Post> {
        let mut inner = self.write();
        let post = inner
            .posts
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(ApiError::NotFound("Post"))?;
        if let Some(title) = patch.title {
            post.title = title;
        }
        if let Some(content) = patch.content {
            post.content = content;
        }
        if let Some(author) = patch.author {
            post.author = author;
        }
        if let Some(category) = patch.category {
            post.category = category;
        }
        if let Some(featured_image) = patch.featured_image {
            post.featured_image = Some(featured_image);
        }
        Ok(post.clone())
    }

    async fn delete(&self, id: Uuid) -> ApiResult<()> {
        let mut inner = self.write();
        let idx = inner
            .posts
            .iter()
            .position(|p| p.id == id)
            .ok_or(ApiError::NotFound("Post"))?;
        inner.posts.remove(idx);
        Ok(())
    }

    async fn add_comment(&self, post_id: Uuid, user: Uuid, content: &str) -> ApiResult<Comment> {
        let mut inner = self.write();
        let post = inner
            .posts
            .iter_mut()
            .find(|p| p.id == post_id)
            .ok_or(ApiError::NotFound("Post"))?;
        let comment = Comment {
            id: Uuid::new_v4(),
            user,
            content: content.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        post.comments.push(comment.clone());
        Ok(comment)
    }
}

#[async_trait]
impl CategoryStore for MemoryStore {
    async fn list(&self) -> ApiResult<Vec<Category>> {
        let mut categories: Vec<Category> = self.read().categories.values().cloned().collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn create(&self, new: NewCategory) -> ApiResult<Category> {
        let category = Category {
            id: Uuid::new_v4(),
            name: new.name,
            description: new.description,
        };
        self.write().categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn get(&self, id: Uuid) -> ApiResult<Category> {
        self.read()
            .categories
            .get(&id)
            .cloned()
            .ok_or(ApiError::NotFound("Category"))
    }

    async fn update(&self, id: Uuid, patch: CategoryPatch) -> ApiResult<Category> {
        let mut inner = self.write();
        let category = inner
            .categories
            .get_mut(&id)
            .ok_or(ApiError::NotFound("Category"))?;
        if let Some(name) = patch.name {
            category.name = name;
        }
        if let Some(description) = patch.description {
            category.description = Some(description);
        }
        Ok(category.clone())
    }

    async fn delete(&self, id: Uuid) -> ApiResult<()> {
        self.write()
            .categories
            .remove(&id)
            .ok_or(ApiError::NotFound("Category"))?;
        Ok(())
    }
}
