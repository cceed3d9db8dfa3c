use axum::extract::multipart::Field;
use axum::extract::Multipart;
use bytes::Bytes;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::storage::image_key;
use crate::store::{NewPost, Post, PostPatch};

/// Fields collected from a multipart post body. Everything is optional here;
/// create and update decide what is required.
#[derive(Debug, Default)]
pub struct PostForm {
    pub title: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub image: Option<UploadedImage>,
}

#[derive(Debug)]
pub struct UploadedImage {
    pub bytes: Bytes,
    pub content_type: String,
}

pub async fn read_post_form(mut multipart: Multipart) -> ApiResult<PostForm> {
    let mut form = PostForm::default();
    while let Some(field) = multipart.next_field().await.map_err(invalid_form)? {
        let Some(name) = field.name().map(|s| s.to_string()) else {
            continue;
        };
        match name.as_str() {
            "title" => form.title = Some(text(field).await?),
            "content" => form.content = Some(text(field).await?),
            "author" => form.author = Some(text(field).await?),
            "category" => form.category = Some(text(field).await?),
            "featuredImage" => {
                let content_type = field
                    .content_type()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "application/octet-stream".into());
                let bytes = field.bytes().await.map_err(invalid_form)?;
                form.image = Some(UploadedImage {
                    bytes,
                    content_type,
                });
            }
            _ => {}
        }
    }
    Ok(form)
}

async fn text(field: Field<'_>) -> ApiResult<String> {
    field.text().await.map_err(invalid_form)
}

fn invalid_form(_: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::Validation("Invalid form data".into())
}

fn parse_id(value: Option<&str>, message: &str) -> ApiResult<Uuid> {
    value
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or_else(|| ApiError::Validation(message.into()))
}

async fn store_image(state: &AppState, image: UploadedImage) -> ApiResult<String> {
    let key = image_key(&image.content_type);
    state
        .storage
        .put_object(&key, image.bytes, &image.content_type)
        .await?;
    Ok(key)
}

/// Validates the form and inserts the post. Reference existence is NOT
/// checked; dangling authors/categories hydrate to null on read.
pub async fn create_post(state: &AppState, form: PostForm) -> ApiResult<Post> {
    let title = form
        .title
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Validation("Title is required".into()))?;
    let content = form
        .content
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::Validation("Content is required".into()))?;
    let author = parse_id(form.author.as_deref(), "Valid author ID required")?;
    let category = parse_id(form.category.as_deref(), "Valid category ID required")?;

    let featured_image = match form.image {
        Some(image) => Some(store_image(state, image).await?),
        None => None,
    };

    state
        .posts
        .create(NewPost {
            title,
            content,
            author,
            category,
            featured_image,
        })
        .await
}

/// Partial update: only supplied fields are validated and applied.
pub async fn update_post(state: &AppState, id: Uuid, form: PostForm) -> ApiResult<Post> {
    let mut patch = PostPatch::default();
    if let Some(title) = form.title {
        if title.is_empty() {
            return Err(ApiError::Validation("Title is required".into()));
        }
        patch.title = Some(title);
    }
    if let Some(content) = form.content {
        if content.is_empty() {
            return Err(ApiError::Validation("Content is required".into()));
        }
        patch.content = Some(content);
    }
    if let Some(author) = form.author.as_deref() {
        patch.author = Some(parse_id(Some(author), "Valid author ID required")?);
    }
    if let Some(category) = form.category.as_deref() {
        patch.category = Some(parse_id(Some(category), "Valid category ID required")?);
    }
    if let Some(image) = form.image {
        patch.featured_image = Some(store_image(state, image).await?);
    }

    state.posts.update(id, patch).await
}
