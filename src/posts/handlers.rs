use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::Redirect,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
    store::{total_pages, Comment, Post, PostQuery, PostView},
};

use super::dto::{AddCommentRequest, ListPostsQuery, PostListResponse};
use super::services;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts))
        .route("/posts/:id", get(get_post))
        .route("/posts/:id/image", get(get_featured_image))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/posts", post(create_post))
        .route("/posts/:id", put(update_post).delete(delete_post))
        .route("/posts/:id/comments", post(add_comment))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB
}

#[instrument(skip(state))]
pub async fn list_posts(
    State(state): State<AppState>,
    Query(params): Query<ListPostsQuery>,
) -> ApiResult<Json<PostListResponse>> {
    let category = match params.category.as_deref().filter(|c| !c.is_empty()) {
        Some(raw) => Some(
            Uuid::parse_str(raw)
                .map_err(|_| ApiError::Validation("Valid category ID required".into()))?,
        ),
        None => None,
    };
    let search = params.search.filter(|s| !s.is_empty());

    let query = PostQuery::new(params.page, params.limit, category, search);
    let (posts, total) = state.posts.list(&query).await?;

    Ok(Json(PostListResponse {
        posts,
        total,
        page: query.page,
        total_pages: total_pages(total, query.limit),
    }))
}

#[instrument(skip(state))]
pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PostView>> {
    Ok(Json(state.posts.get(id).await?))
}

#[instrument(skip(state, multipart))]
pub async fn create_post(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Post>), ApiError> {
    let form = services::read_post_form(multipart).await?;
    let post = services::create_post(&state, form).await?;
    info!(post_id = %post.id, "post created");
    Ok((StatusCode::CREATED, Json(post)))
}

#[instrument(skip(state, multipart))]
pub async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> ApiResult<Json<Post>> {
    let form = services::read_post_form(multipart).await?;
    let post = services::update_post(&state, id, form).await?;
    info!(post_id = %id, "post updated");
    Ok(Json(post))
}

#[instrument(skip(state))]
pub async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.posts.delete(id).await?;
    info!(post_id = %id, "post deleted");
    Ok(Json(json!({ "message": "Post deleted" })))
}

#[instrument(skip(state, payload))]
pub async fn add_comment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddCommentRequest>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    if payload.content.is_empty() {
        return Err(ApiError::Validation("Comment content is required".into()));
    }
    let user = Uuid::parse_str(&payload.user)
        .map_err(|_| ApiError::Validation("Valid user ID required".into()))?;

    let comment = state.posts.add_comment(id, user, &payload.content).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// 302 to a presigned URL for the post's featured image.
#[instrument(skip(state))]
pub async fn get_featured_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Redirect, ApiError> {
    let post = state.posts.get(id).await?;
    let key = post.featured_image.ok_or(ApiError::NotFound("Image"))?;
    let url = state.storage.presign_get(&key, 600).await?;
    Ok(Redirect::temporary(&url))
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::super::services::{PostForm, UploadedImage};
    use super::*;
    use crate::store::{Category, NewCategory, User};

    async fn seed_user(state: &AppState, name: &str, email: &str) -> User {
        state.users.create(name, email, "hash").await.unwrap()
    }

    async fn seed_category(state: &AppState, name: &str) -> Category {
        state
            .categories
            .create(NewCategory {
                name: name.into(),
                description: None,
            })
            .await
            .unwrap()
    }

    fn form(title: &str, content: &str, author: Uuid, category: Uuid) -> PostForm {
        PostForm {
            title: Some(title.into()),
            content: Some(content.into()),
            author: Some(author.to_string()),
            category: Some(category.to_string()),
            image: None,
        }
    }

    async fn seed_post(
        state: &AppState,
        title: &str,
        content: &str,
        author: Uuid,
        category: Uuid,
    ) -> Post {
        services::create_post(state, form(title, content, author, category))
            .await
            .unwrap()
    }

    async fn list(state: &AppState, params: ListPostsQuery) -> PostListResponse {
        let Json(response) = list_posts(State(state.clone()), Query(params)).await.unwrap();
        response
    }

    fn page_query(page: i64, limit: i64) -> ListPostsQuery {
        ListPostsQuery {
            page,
            limit,
            category: None,
            search: None,
        }
    }

    #[tokio::test]
    async fn create_post_validates_fields() {
        let state = AppState::fake();
        let author = seed_user(&state, "Ada", "ada@example.com").await;
        let category = seed_category(&state, "Rust").await;

        let missing_title = PostForm {
            title: None,
            ..form("x", "body", author.id, category.id)
        };
        let empty_content = form("Title", "", author.id, category.id);
        let bad_author = PostForm {
            author: Some("not-a-uuid".into()),
            ..form("Title", "body", author.id, category.id)
        };

        for bad in [missing_title, empty_content, bad_author] {
            let err = services::create_post(&state, bad).await.unwrap_err();
            assert!(matches!(err, ApiError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn create_post_stores_featured_image_key() {
        let state = AppState::fake();
        let author = seed_user(&state, "Ada", "ada@example.com").await;
        let category = seed_category(&state, "Rust").await;

        let mut new_post = form("With image", "body", author.id, category.id);
        new_post.image = Some(UploadedImage {
            bytes: Bytes::from_static(b"\x89PNG fake bytes"),
            content_type: "image/png".into(),
        });

        let post = services::create_post(&state, new_post).await.unwrap();
        let key = post.featured_image.expect("key should be recorded");
        assert!(key.starts_with("posts/"));
        assert!(key.ends_with(".png"));
    }

    #[tokio::test]
    async fn pagination_windows_and_total_pages() {
        let state = AppState::fake();
        let author = seed_user(&state, "Ada", "ada@example.com").await;
        let category = seed_category(&state, "Rust").await;
        for i in 0..25 {
            seed_post(&state, &format!("Post {i}"), "body", author.id, category.id).await;
        }

        let first = list(&state, page_query(1, 10)).await;
        assert_eq!(first.posts.len(), 10);
        assert_eq!(first.total, 25);
        assert_eq!(first.total_pages, 3);
        assert_eq!(first.page, 1);

        let third = list(&state, page_query(3, 10)).await;
        assert_eq!(third.posts.len(), 5);

        // Past the last page: empty, not an error.
        let fourth = list(&state, page_query(4, 10)).await;
        assert_eq!(fourth.posts.len(), 0);
        assert_eq!(fourth.total, 25);
    }

    #[tokio::test]
    async fn newest_posts_come_first() {
        let state = AppState::fake();
        let author = seed_user(&state, "Ada", "ada@example.com").await;
        let category = seed_category(&state, "Rust").await;
        seed_post(&state, "older", "body", author.id, category.id).await;
        seed_post(&state, "newer", "body", author.id, category.id).await;

        let response = list(&state, page_query(1, 10)).await;
        assert_eq!(response.posts[0].title, "newer");
        assert_eq!(response.posts[1].title, "older");
    }

    #[tokio::test]
    async fn search_matches_content_case_insensitively() {
        let state = AppState::fake();
        let author = seed_user(&state, "Ada", "ada@example.com").await;
        let category = seed_category(&state, "Rust").await;
        seed_post(&state, "Rust tips", "systems programming", author.id, category.id).await;
        seed_post(&state, "Cooking", "the quick BROWN fox", author.id, category.id).await;

        // Substring present only in content, query differs in case.
        let hits = list(
            &state,
            ListPostsQuery {
                search: Some("brown".into()),
                ..page_query(1, 10)
            },
        )
        .await;
        assert_eq!(hits.total, 1);
        assert_eq!(hits.posts[0].title, "Cooking");

        let misses = list(
            &state,
            ListPostsQuery {
                search: Some("no such phrase".into()),
                ..page_query(1, 10)
            },
        )
        .await;
        assert_eq!(misses.total, 0);
    }

    #[tokio::test]
    async fn category_filter_composes_with_search() {
        let state = AppState::fake();
        let author = seed_user(&state, "Ada", "ada@example.com").await;
        let rust = seed_category(&state, "Rust").await;
        let cooking = seed_category(&state, "Cooking").await;
        seed_post(&state, "Borrow checker", "ownership", author.id, rust.id).await;
        seed_post(&state, "Sourdough", "ownership of starters", author.id, cooking.id).await;

        let by_category = list(
            &state,
            ListPostsQuery {
                category: Some(rust.id.to_string()),
                ..page_query(1, 10)
            },
        )
        .await;
        assert_eq!(by_category.total, 1);
        assert_eq!(by_category.posts[0].title, "Borrow checker");

        let both = list(
            &state,
            ListPostsQuery {
                category: Some(cooking.id.to_string()),
                search: Some("ownership".into()),
                ..page_query(1, 10)
            },
        )
        .await;
        assert_eq!(both.total, 1);
        assert_eq!(both.posts[0].title, "Sourdough");

        let err = list_posts(
            State(state.clone()),
            Query(ListPostsQuery {
                category: Some("not-a-uuid".into()),
                ..page_query(1, 10)
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn get_post_hydrates_author_and_category() {
        let state = AppState::fake();
        let author = seed_user(&state, "Ada", "ada@example.com").await;
        let category = seed_category(&state, "Rust").await;
        let post = seed_post(&state, "Hydrated", "body", author.id, category.id).await;

        let Json(view) = get_post(State(state.clone()), Path(post.id)).await.unwrap();
        let summary = view.author.expect("author should hydrate");
        assert_eq!(summary.name, "Ada");
        assert_eq!(summary.email, "ada@example.com");
        assert_eq!(view.category.expect("category should hydrate").name, "Rust");
        assert!(view.comments.is_empty());
    }

    #[tokio::test]
    async fn dangling_references_hydrate_to_null() {
        let state = AppState::fake();
        // Neither the author nor the category exists; the write still lands.
        let post = seed_post(&state, "Orphan", "body", Uuid::new_v4(), Uuid::new_v4()).await;

        let Json(view) = get_post(State(state.clone()), Path(post.id)).await.unwrap();
        assert!(view.author.is_none());
        assert!(view.category.is_none());
    }

    #[tokio::test]
    async fn get_post_unknown_id_is_not_found() {
        let state = AppState::fake();
        let err = get_post(State(state.clone()), Path(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound("Post")));
    }

    #[tokio::test]
    async fn update_applies_only_supplied_fields() {
        let state = AppState::fake();
        let author = seed_user(&state, "Ada", "ada@example.com").await;
        let category = seed_category(&state, "Rust").await;
        let post = seed_post(&state, "Original title", "original body", author.id, category.id).await;

        let patch = PostForm {
            content: Some("revised body".into()),
            ..PostForm::default()
        };
        let updated = services::update_post(&state, post.id, patch).await.unwrap();
        assert_eq!(updated.title, "Original title");
        assert_eq!(updated.content, "revised body");
        assert_eq!(updated.author, author.id);

        let empty_title = PostForm {
            title: Some(String::new()),
            ..PostForm::default()
        };
        let err = services::update_post(&state, post.id, empty_title)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let err = services::update_post(&state, Uuid::new_v4(), PostForm::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound("Post")));
    }

    #[tokio::test]
    async fn delete_post_removes_it() {
        let state = AppState::fake();
        let author = seed_user(&state, "Ada", "ada@example.com").await;
        let category = seed_category(&state, "Rust").await;
        let post = seed_post(&state, "Doomed", "body", author.id, category.id).await;

        delete_post(State(state.clone()), Path(post.id)).await.unwrap();
        let err = get_post(State(state.clone()), Path(post.id)).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound("Post")));

        let err = delete_post(State(state.clone()), Path(post.id)).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound("Post")));
    }

    #[tokio::test]
    async fn add_comment_appends_in_order() {
        let state = AppState::fake();
        let author = seed_user(&state, "Ada", "ada@example.com").await;
        let commenter = seed_user(&state, "Grace", "grace@example.com").await;
        let category = seed_category(&state, "Rust").await;
        let post = seed_post(&state, "Discussed", "body", author.id, category.id).await;

        for text in ["first!", "second"] {
            let (status, Json(comment)) = add_comment(
                State(state.clone()),
                Path(post.id),
                Json(AddCommentRequest {
                    user: commenter.id.to_string(),
                    content: text.into(),
                }),
            )
            .await
            .unwrap();
            assert_eq!(status, StatusCode::CREATED);
            assert_eq!(comment.content, text);
            assert_eq!(comment.user, commenter.id);
        }

        let Json(view) = get_post(State(state.clone()), Path(post.id)).await.unwrap();
        let contents: Vec<&str> = view.comments.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, ["first!", "second"]);
    }

    #[tokio::test]
    async fn add_comment_validates_input() {
        let state = AppState::fake();
        let author = seed_user(&state, "Ada", "ada@example.com").await;
        let category = seed_category(&state, "Rust").await;
        let post = seed_post(&state, "Strict", "body", author.id, category.id).await;

        let err = add_comment(
            State(state.clone()),
            Path(post.id),
            Json(AddCommentRequest {
                user: author.id.to_string(),
                content: String::new(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let err = add_comment(
            State(state.clone()),
            Path(post.id),
            Json(AddCommentRequest {
                user: "not-a-uuid".into(),
                content: "hello".into(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn add_comment_to_missing_post_mutates_nothing() {
        let state = AppState::fake();
        let author = seed_user(&state, "Ada", "ada@example.com").await;
        let category = seed_category(&state, "Rust").await;
        let post = seed_post(&state, "Untouched", "body", author.id, category.id).await;

        let err = add_comment(
            State(state.clone()),
            Path(Uuid::new_v4()),
            Json(AddCommentRequest {
                user: author.id.to_string(),
                content: "lost".into(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound("Post")));

        let Json(view) = get_post(State(state.clone()), Path(post.id)).await.unwrap();
        assert!(view.comments.is_empty());
    }

    #[tokio::test]
    async fn concurrent_comments_are_both_recorded() {
        let state = AppState::fake();
        let author = seed_user(&state, "Ada", "ada@example.com").await;
        let category = seed_category(&state, "Rust").await;
        let post = seed_post(&state, "Busy", "body", author.id, category.id).await;

        let (a, b) = tokio::join!(
            state.posts.add_comment(post.id, author.id, "from a"),
            state.posts.add_comment(post.id, author.id, "from b"),
        );
        a.unwrap();
        b.unwrap();

        let Json(view) = get_post(State(state.clone()), Path(post.id)).await.unwrap();
        let contents: Vec<&str> = view.comments.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(view.comments.len(), 2);
        assert!(contents.contains(&"from a"));
        assert!(contents.contains(&"from b"));
    }

    #[tokio::test]
    async fn featured_image_redirect_and_missing_cases() {
        let state = AppState::fake();
        let author = seed_user(&state, "Ada", "ada@example.com").await;
        let category = seed_category(&state, "Rust").await;

        let mut with_image = form("Pictured", "body", author.id, category.id);
        with_image.image = Some(UploadedImage {
            bytes: Bytes::from_static(b"fake"),
            content_type: "image/jpeg".into(),
        });
        let pictured = services::create_post(&state, with_image).await.unwrap();
        get_featured_image(State(state.clone()), Path(pictured.id))
            .await
            .expect("redirect for a stored image");

        let bare = seed_post(&state, "Bare", "body", author.id, category.id).await;
        let err = get_featured_image(State(state.clone()), Path(bare.id))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound("Image")));
    }
}
