use serde::{Deserialize, Serialize};

use crate::store::PostView;

#[derive(Debug, Deserialize)]
pub struct ListPostsQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    10
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostListResponse {
    pub posts: Vec<PostView>,
    pub total: u64,
    pub page: i64,
    pub total_pages: u64,
}

#[derive(Debug, Deserialize)]
pub struct AddCommentRequest {
    pub user: String,
    pub content: String,
}
