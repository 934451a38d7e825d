use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use glimpse_types::api::Claims;
use glimpse_types::models::Viewer;

use crate::error::ApiError;
use crate::state::AppState;

/// Validate the bearer token and resolve the caller.
///
/// Inserts both the raw [`Claims`] and a [`Viewer`] carrying the moderator
/// role into the request extensions. Tokens for deleted users are rejected.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized)?
    .claims;

    let user_id = claims.sub;
    let user = state
        .run(move |engine| Ok(engine.db().get_user_by_id(user_id)?))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    req.extensions_mut()
        .insert(Viewer::new(user.id, user.is_moderator));
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
