//! REST surface for the story engine.

pub mod auth;
pub mod engagement;
pub mod error;
pub mod media;
pub mod middleware;
pub mod rate_limit;
pub mod social;
pub mod state;
pub mod stickers;
pub mod stories;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{delete, get, patch, post},
};

use crate::state::AppState;

/// Every route the server exposes. Everything outside `/auth` and
/// `/health` requires a bearer token.
pub fn router(state: AppState) -> Router {
    // One byte over the cap, so an oversized upload reaches validation and
    // gets a 400 rather than the extractor's 413.
    let upload_limit = state.engine.config().max_upload_bytes() + 1;

    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route(
            "/stories",
            get(stories::feed)
                .post(stories::create_story)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/stories/archive", get(stories::archive))
        .route("/stories/close-friends", get(social::close_friends))
        .route(
            "/stories/close-friends/{friend_id}",
            post(social::add_close_friend).delete(social::remove_close_friend),
        )
        .route("/stories/reports", get(engagement::pending_reports))
        .route("/stories/reports/{report_id}", patch(engagement::update_report))
        .route("/stories/replies/{reply_id}", delete(engagement::delete_reply))
        .route("/stories/items/{item_id}/seen", post(stories::mark_seen))
        .route(
            "/stories/{story_id}",
            get(stories::get_story)
                .patch(stories::update_story)
                .delete(stories::delete_story),
        )
        .route("/stories/{story_id}/hide", get(stories::hidden_viewers))
        .route(
            "/stories/{story_id}/hide/{user_id}",
            post(stories::hide_from).delete(stories::unhide_from),
        )
        .route("/stories/{story_id}/viewers", get(stories::viewers))
        .route("/stories/{story_id}/analytics", get(stories::analytics))
        .route(
            "/stories/{story_id}/reactions",
            get(engagement::reactions)
                .post(engagement::react)
                .delete(engagement::unreact),
        )
        .route(
            "/stories/{story_id}/replies",
            get(engagement::replies).post(engagement::reply),
        )
        .route("/stories/{story_id}/report", post(engagement::report))
        .route(
            "/stories/{story_id}/items/{item_id}/stickers",
            post(stickers::add_sticker),
        )
        .route("/stickers/{sticker_id}", delete(stickers::delete_sticker))
        .route("/stickers/{sticker_id}/vote", post(stickers::vote))
        .route(
            "/friends/{user_id}",
            post(social::add_friend).delete(social::remove_friend),
        )
        .route(
            "/following/{user_id}",
            post(social::follow).delete(social::unfollow),
        )
        .route("/media/{media_id}", get(media::get_media))
        .layer(from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
