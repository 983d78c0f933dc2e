// HTTP surface for the feed. Thin handlers over the materializer; every
// failure is translated by AppError::into_response into the uniform
// {"error", "status"} envelope.

use axum::{
    extract::{Path as AxumPath, State},
    response::Json,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{error::AppError, feed::ThreadMaterializer, viewer::ViewerContext};

#[derive(Clone)]
pub struct FeedApi {
    materializer: Arc<ThreadMaterializer>,
}

impl FeedApi {
    pub fn new(materializer: Arc<ThreadMaterializer>) -> Self {
        FeedApi { materializer }
    }
}

pub async fn get_feed_handler(
    State(api): State<FeedApi>,
    AxumPath(viewer_id): AxumPath<i64>,
) -> Result<Json<Value>, AppError> {
    let viewer = ViewerContext::new(viewer_id);
    let feed = api.materializer.build_feed(&viewer).await?;
    Ok(Json(json!({ "feed": feed })))
}

pub async fn get_subtree_handler(
    State(api): State<FeedApi>,
    AxumPath((node_id, viewer_id)): AxumPath<(i64, i64)>,
) -> Result<Json<Value>, AppError> {
    let viewer = ViewerContext::new(viewer_id);
    let comments = api.materializer.build_subtree(node_id, &viewer).await?;
    Ok(Json(json!({ "node_id": node_id, "comments": comments })))
}

pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn create_feed_router(api: FeedApi) -> Router {
    Router::new()
        .route("/feed/{viewer_id}", get(get_feed_handler))
        .route("/nodes/{node_id}/comments/{viewer_id}", get(get_subtree_handler))
        .route("/health", get(health_handler))
        .with_state(api)
}
