use crate::params::post::IndexParams;
use crate::{AppState, Error};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use entity_api::post::{self as PostApi, PostWithAgent};
use log::*;
use serde::Serialize;
use utoipa::ToSchema;

/// Body of every post listing.
#[derive(Debug, Serialize, ToSchema)]
pub struct PostsResponse {
    pub posts: Vec<PostWithAgent>,
    pub count: usize,
}

impl From<Vec<PostWithAgent>> for PostsResponse {
    fn from(posts: Vec<PostWithAgent>) -> Self {
        Self {
            count: posts.len(),
            posts,
        }
    }
}

/// GET the most recent posts, newest first
#[utoipa::path(
    get,
    path = "/posts",
    params(IndexParams),
    responses(
        (status = 200, description = "Successfully retrieved posts with their agents", body = PostsResponse),
        (status = 400, description = "The after timestamp is not RFC 3339"),
        (status = 500, description = "The posts could not be read")
    )
)]
pub async fn index(
    State(app_state): State<AppState>,
    Query(params): Query<IndexParams>,
) -> Result<impl IntoResponse, Error> {
    debug!("GET posts with params: {params:?}");

    let limit = PostApi::parse_limit(params.limit.as_deref());
    let after = PostApi::parse_after(params.after.as_deref())?;

    let posts = PostApi::get_posts(app_state.db_conn_ref(), limit, after).await?;
    debug!("Found {} posts", posts.len());

    Ok(Json(PostsResponse::from(posts)))
}

/// GET posts strictly newer than a timestamp, for polling clients
#[utoipa::path(
    get,
    path = "/posts/after/{timestamp}",
    params(
        ("timestamp" = String, Path, description = "RFC 3339 timestamp; only newer posts are returned")
    ),
    responses(
        (status = 200, description = "Successfully retrieved newer posts", body = PostsResponse),
        (status = 400, description = "The timestamp is not RFC 3339"),
        (status = 500, description = "The posts could not be read")
    )
)]
pub async fn after(
    State(app_state): State<AppState>,
    Path(timestamp): Path<String>,
) -> Result<impl IntoResponse, Error> {
    debug!("GET posts after {timestamp}");

    let after = PostApi::parse_after(Some(&timestamp))?;
    let posts =
        PostApi::get_posts(app_state.db_conn_ref(), PostApi::DEFAULT_LIMIT, after).await?;

    Ok(Json(PostsResponse::from(posts)))
}
