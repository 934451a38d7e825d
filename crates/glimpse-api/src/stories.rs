use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use bytes::Bytes;
use tracing::{error, warn};

use glimpse_core::feed::{FeedRequest, is_flag_set};
use glimpse_core::stories::PublishItem;
use glimpse_types::api::{
    ArchiveQuery, CreateStoryQuery, CreateStoryResponse, FeedQuery, OkResponse, StoryQuery,
    UpdateStoryRequest, UsersResponse, ViewersQuery,
};
use glimpse_types::models::Viewer;

use crate::error::ApiResult;
use crate::state::AppState;

/// GET /stories
pub async fn feed(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Query(query): Query<FeedQuery>,
) -> ApiResult<impl IntoResponse> {
    let request = FeedRequest::from_query(&query, state.engine.config());
    let feed = state.run(move |engine| engine.feed(viewer, request)).await?;
    Ok(Json(feed))
}

/// POST /stories — raw media body, `Content-Type` names the mime.
pub async fn create_story(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Query(query): Query<CreateStoryQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let mime = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
        .unwrap_or_default();

    let size = body.len();
    let check_mime = mime.clone();
    let media_type = state
        .run(move |engine| engine.check_upload(viewer, &check_mime, size))
        .await?;

    let media_id = state.media.save(&body).await?;

    let stored_id = media_id.clone();
    let published = state
        .run(move |engine| {
            engine.publish_item(
                viewer,
                &PublishItem {
                    media_id: &stored_id,
                    media_type,
                    mime: &mime,
                    duration_ms: query.duration_ms,
                    privacy: query.privacy.as_deref(),
                },
            )
        })
        .await;

    let published = match published {
        Ok(p) => p,
        Err(e) => {
            if let Err(cleanup) = state.media.delete(&media_id).await {
                error!("Failed to remove orphaned media {}: {}", media_id, cleanup);
            }
            return Err(e);
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(CreateStoryResponse {
            ok: true,
            story_id: published.story_id,
            item_id: published.item_id,
        }),
    ))
}

/// GET /stories/{story_id}
pub async fn get_story(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(story_id): Path<i64>,
    Query(query): Query<StoryQuery>,
) -> ApiResult<impl IntoResponse> {
    let compact = is_flag_set(query.compact.as_deref());
    let detail = state
        .run(move |engine| engine.story_detail(viewer, story_id, compact))
        .await?;
    Ok(Json(detail))
}

/// PATCH /stories/{story_id}
pub async fn update_story(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(story_id): Path<i64>,
    Json(req): Json<UpdateStoryRequest>,
) -> ApiResult<impl IntoResponse> {
    let updated = state
        .run(move |engine| engine.update_story(viewer, story_id, &req))
        .await?;
    Ok(Json(updated))
}

/// DELETE /stories/{story_id}
pub async fn delete_story(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(story_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let media_ids = state
        .run(move |engine| engine.delete_story(viewer, story_id))
        .await?;
    for media_id in &media_ids {
        if let Err(e) = state.media.delete(media_id).await {
            warn!("Failed to remove media {}: {}", media_id, e);
        }
    }
    Ok(Json(OkResponse { ok: true }))
}

/// GET /stories/archive
pub async fn archive(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Query(query): Query<ArchiveQuery>,
) -> ApiResult<impl IntoResponse> {
    let archive = state
        .run(move |engine| engine.archive(viewer, query.limit(), query.page()))
        .await?;
    Ok(Json(archive))
}

/// POST /stories/items/{item_id}/seen
pub async fn mark_seen(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(item_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    state
        .run(move |engine| engine.mark_seen(viewer, item_id))
        .await?;
    Ok(Json(OkResponse { ok: true }))
}

/// GET /stories/{story_id}/hide
pub async fn hidden_viewers(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(story_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let users = state
        .run(move |engine| engine.hidden_viewers(viewer, story_id))
        .await?;
    Ok(Json(UsersResponse {
        count: users.len(),
        users,
    }))
}

/// POST /stories/{story_id}/hide/{user_id}
pub async fn hide_from(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path((story_id, user_id)): Path<(i64, i64)>,
) -> ApiResult<impl IntoResponse> {
    state
        .run(move |engine| engine.hide_from(viewer, story_id, user_id))
        .await?;
    Ok(Json(OkResponse { ok: true }))
}

/// DELETE /stories/{story_id}/hide/{user_id}
pub async fn unhide_from(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path((story_id, user_id)): Path<(i64, i64)>,
) -> ApiResult<impl IntoResponse> {
    let removed = state
        .run(move |engine| engine.unhide_from(viewer, story_id, user_id))
        .await?;
    Ok(Json(serde_json::json!({ "ok": true, "removed": removed })))
}

/// GET /stories/{story_id}/viewers
pub async fn viewers(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(story_id): Path<i64>,
    Query(query): Query<ViewersQuery>,
) -> ApiResult<impl IntoResponse> {
    let viewers = state
        .run(move |engine| engine.viewers_of(viewer, story_id, query.limit()))
        .await?;
    Ok(Json(viewers))
}

/// GET /stories/{story_id}/analytics
pub async fn analytics(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(story_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let analytics = state
        .run(move |engine| engine.analytics(viewer, story_id))
        .await?;
    Ok(Json(analytics))
}
