use std::sync::Arc;

use glimpse_core::{StoryEngine, StoryResult};
use tracing::error;

use crate::error::ApiError;
use crate::media::MediaStore;
use crate::rate_limit::ActionLimiter;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub engine: StoryEngine,
    pub media: MediaStore,
    pub jwt_secret: String,
    pub limiter: ActionLimiter,
}

impl AppStateInner {
    pub fn new(engine: StoryEngine, media: MediaStore, jwt_secret: String) -> Self {
        let limiter = ActionLimiter::from_config(engine.config());
        Self {
            engine,
            media,
            jwt_secret,
            limiter,
        }
    }

    /// Run an engine call on the blocking pool.
    pub async fn run<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&StoryEngine) -> StoryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let engine = self.engine.clone();
        let result = tokio::task::spawn_blocking(move || f(&engine))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal(e.into())
            })?;
        Ok(result?)
    }
}
