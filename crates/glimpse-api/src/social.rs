use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};

use glimpse_types::api::{OkResponse, UsersResponse};
use glimpse_types::models::Viewer;

use crate::error::ApiResult;
use crate::state::AppState;

/// POST /friends/{user_id}
pub async fn add_friend(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(user_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    state
        .run(move |engine| engine.add_friend(viewer, user_id))
        .await?;
    Ok(Json(OkResponse { ok: true }))
}

/// DELETE /friends/{user_id}
pub async fn remove_friend(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(user_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let removed = state
        .run(move |engine| engine.remove_friend(viewer, user_id))
        .await?;
    Ok(Json(serde_json::json!({ "ok": true, "removed": removed })))
}

/// POST /following/{user_id}
pub async fn follow(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(user_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    state
        .run(move |engine| engine.follow(viewer, user_id))
        .await?;
    Ok(Json(OkResponse { ok: true }))
}

/// DELETE /following/{user_id}
pub async fn unfollow(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(user_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let removed = state
        .run(move |engine| engine.unfollow(viewer, user_id))
        .await?;
    Ok(Json(serde_json::json!({ "ok": true, "removed": removed })))
}

/// GET /stories/close-friends
pub async fn close_friends(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
) -> ApiResult<impl IntoResponse> {
    let users = state.run(move |engine| engine.close_friends(viewer)).await?;
    Ok(Json(UsersResponse {
        count: users.len(),
        users,
    }))
}

/// POST /stories/close-friends/{friend_id}
pub async fn add_close_friend(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(friend_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    state
        .run(move |engine| engine.add_close_friend(viewer, friend_id))
        .await?;
    Ok(Json(OkResponse { ok: true }))
}

/// DELETE /stories/close-friends/{friend_id}
pub async fn remove_close_friend(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(friend_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let removed = state
        .run(move |engine| engine.remove_close_friend(viewer, friend_id))
        .await?;
    Ok(Json(serde_json::json!({ "ok": true, "removed": removed })))
}
