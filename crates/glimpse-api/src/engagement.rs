//! Reactions, replies and reports. Write paths are rate limited per user.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use glimpse_types::api::{
    ItemFilter, OkResponse, ReactionRequest, ReplyRequest, ReportRequest, ReportResponse,
    ReportsQuery, UpdateReportRequest,
};
use glimpse_types::models::Viewer;

use crate::error::ApiResult;
use crate::rate_limit::Action;
use crate::state::AppState;

/// GET /stories/{story_id}/reactions
pub async fn reactions(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(story_id): Path<i64>,
    Query(filter): Query<ItemFilter>,
) -> ApiResult<impl IntoResponse> {
    let reactions = state
        .run(move |engine| engine.reactions(viewer, story_id, filter.item_id))
        .await?;
    Ok(Json(reactions))
}

/// POST /stories/{story_id}/reactions
pub async fn react(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(story_id): Path<i64>,
    Json(req): Json<ReactionRequest>,
) -> ApiResult<impl IntoResponse> {
    state.limiter.check(viewer.id, Action::Reaction).await?;
    state
        .run(move |engine| engine.react(viewer, story_id, req.item_id, &req.reaction))
        .await?;
    Ok(Json(OkResponse { ok: true }))
}

/// DELETE /stories/{story_id}/reactions
pub async fn unreact(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(story_id): Path<i64>,
    Query(filter): Query<ItemFilter>,
) -> ApiResult<impl IntoResponse> {
    let removed = state
        .run(move |engine| engine.unreact(viewer, story_id, filter.item_id))
        .await?;
    Ok(Json(serde_json::json!({ "ok": true, "removed": removed })))
}

/// GET /stories/{story_id}/replies
pub async fn replies(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(story_id): Path<i64>,
    Query(filter): Query<ItemFilter>,
) -> ApiResult<impl IntoResponse> {
    let replies = state
        .run(move |engine| engine.replies(viewer, story_id, filter.item_id))
        .await?;
    Ok(Json(replies))
}

/// POST /stories/{story_id}/replies
pub async fn reply(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(story_id): Path<i64>,
    Json(req): Json<ReplyRequest>,
) -> ApiResult<impl IntoResponse> {
    state.limiter.check(viewer.id, Action::Reply).await?;
    let reply_id = state
        .run(move |engine| engine.reply(viewer, story_id, &req))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "ok": true, "reply_id": reply_id })),
    ))
}

/// DELETE /stories/replies/{reply_id}
pub async fn delete_reply(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(reply_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    state
        .run(move |engine| engine.delete_reply(viewer, reply_id))
        .await?;
    Ok(Json(OkResponse { ok: true }))
}

/// POST /stories/{story_id}/report
pub async fn report(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(story_id): Path<i64>,
    Json(req): Json<ReportRequest>,
) -> ApiResult<impl IntoResponse> {
    state.limiter.check(viewer.id, Action::Report).await?;
    let outcome = state
        .run(move |engine| {
            engine.submit_report(
                viewer,
                story_id,
                req.reason.as_deref(),
                req.description.as_deref(),
            )
        })
        .await?;
    Ok(Json(ReportResponse {
        success: true,
        auto_hidden: outcome.auto_hidden,
    }))
}

/// GET /stories/reports
pub async fn pending_reports(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Query(query): Query<ReportsQuery>,
) -> ApiResult<impl IntoResponse> {
    let reports = state
        .run(move |engine| engine.pending_reports(viewer, query.limit(), query.offset()))
        .await?;
    Ok(Json(reports))
}

/// PATCH /stories/reports/{report_id}
pub async fn update_report(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(report_id): Path<i64>,
    Json(req): Json<UpdateReportRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .run(move |engine| engine.update_report(viewer, report_id, &req))
        .await?;
    Ok(Json(OkResponse { ok: true }))
}
