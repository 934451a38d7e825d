use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use glimpse_types::api::{AddStickerRequest, AddStickerResponse, OkResponse, PollVoteRequest};
use glimpse_types::models::Viewer;

use crate::error::ApiResult;
use crate::state::AppState;

/// POST /stories/{story_id}/items/{item_id}/stickers
pub async fn add_sticker(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path((story_id, item_id)): Path<(i64, i64)>,
    Json(req): Json<AddStickerRequest>,
) -> ApiResult<impl IntoResponse> {
    let sticker_id = state
        .run(move |engine| engine.add_sticker(viewer, story_id, item_id, &req))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(AddStickerResponse {
            success: true,
            sticker_id,
        }),
    ))
}

/// DELETE /stickers/{sticker_id}
pub async fn delete_sticker(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(sticker_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    state
        .run(move |engine| engine.delete_sticker(viewer, sticker_id))
        .await?;
    Ok(Json(OkResponse { ok: true }))
}

/// POST /stickers/{sticker_id}/vote
pub async fn vote(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(sticker_id): Path<i64>,
    Json(req): Json<PollVoteRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .run(move |engine| engine.vote_poll(viewer, sticker_id, req.option_index))
        .await?;
    Ok(Json(OkResponse { ok: true }))
}
