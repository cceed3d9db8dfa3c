use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
    store::{Category, CategoryPatch, NewCategory},
};

/// One payload shape for create and update; create requires `name`.
#[derive(Debug, Deserialize)]
pub struct CategoryPayload {
    pub name: Option<String>,
    pub description: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories).post(create_category))
        .route(
            "/categories/:id",
            get(get_category)
                .put(update_category)
                .delete(delete_category),
        )
}

#[instrument(skip(state))]
pub async fn list_categories(State(state): State<AppState>) -> ApiResult<Json<Vec<Category>>> {
    Ok(Json(state.categories.list().await?))
}

#[instrument(skip(state, payload))]
pub async fn create_category(
    State(state): State<AppState>,
    Json(payload): Json<CategoryPayload>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let name = payload
        .name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::Validation("Name is required".into()))?;

    let category = state
        .categories
        .create(NewCategory {
            name,
            description: payload.description,
        })
        .await?;
    info!(category_id = %category.id, "category created");
    Ok((StatusCode::CREATED, Json(category)))
}

#[instrument(skip(state))]
pub async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Category>> {
    Ok(Json(state.categories.get(id).await?))
}

#[instrument(skip(state, payload))]
pub async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CategoryPayload>,
) -> ApiResult<Json<Category>> {
    if let Some(name) = &payload.name {
        if name.is_empty() {
            return Err(ApiError::Validation("Name is required".into()));
        }
    }

    let category = state
        .categories
        .update(
            id,
            CategoryPatch {
                name: payload.name,
                description: payload.description,
            },
        )
        .await?;
    Ok(Json(category))
}

#[instrument(skip(state))]
pub async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.categories.delete(id).await?;
    info!(category_id = %id, "category deleted");
    Ok(Json(json!({ "message": "Category deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn create(state: &AppState, name: &str, description: Option<&str>) -> Category {
        let (status, Json(category)) = create_category(
            State(state.clone()),
            Json(CategoryPayload {
                name: Some(name.into()),
                description: description.map(Into::into),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        category
    }

    #[tokio::test]
    async fn create_requires_a_name() {
        let state = AppState::fake();
        for name in [None, Some(String::new())] {
            let err = create_category(
                State(state.clone()),
                Json(CategoryPayload {
                    name,
                    description: None,
                }),
            )
            .await
            .unwrap_err();
            assert!(matches!(err, ApiError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn list_is_ordered_by_name() {
        let state = AppState::fake();
        create(&state, "Systems", None).await;
        create(&state, "Cooking", Some("recipes")).await;
        create(&state, "Rust", None).await;

        let Json(categories) = list_categories(State(state.clone())).await.unwrap();
        let names: Vec<&str> = categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Cooking", "Rust", "Systems"]);
    }

    #[tokio::test]
    async fn get_update_delete_roundtrip() {
        let state = AppState::fake();
        let category = create(&state, "Rust", None).await;

        let Json(fetched) = get_category(State(state.clone()), Path(category.id))
            .await
            .unwrap();
        assert_eq!(fetched.name, "Rust");
        assert_eq!(fetched.description, None);

        // Partial update: description only, name untouched.
        let Json(updated) = update_category(
            State(state.clone()),
            Path(category.id),
            Json(CategoryPayload {
                name: None,
                description: Some("the language".into()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(updated.name, "Rust");
        assert_eq!(updated.description.as_deref(), Some("the language"));

        delete_category(State(state.clone()), Path(category.id))
            .await
            .unwrap();
        let err = get_category(State(state.clone()), Path(category.id))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound("Category")));
    }

    #[tokio::test]
    async fn missing_ids_are_not_found() {
        let state = AppState::fake();
        let missing = Uuid::new_v4();

        let err = get_category(State(state.clone()), Path(missing))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound("Category")));

        let err = update_category(
            State(state.clone()),
            Path(missing),
            Json(CategoryPayload {
                name: Some("Renamed".into()),
                description: None,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound("Category")));

        let err = delete_category(State(state.clone()), Path(missing))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound("Category")));
    }
}
