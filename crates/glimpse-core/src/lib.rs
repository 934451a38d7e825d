//! Story visibility, feed aggregation and lifecycle engine.
//!
//! [`StoryEngine`] is synchronous: every call does blocking SQLite work and
//! is meant to run inside `tokio::task::spawn_blocking` from async callers.

pub mod cache;
pub mod config;
pub mod engagement;
pub mod error;
pub mod feed;
pub mod graph;
pub mod lifecycle;
pub mod moderation;
pub mod notify;
pub mod social;
pub mod stickers;
pub mod stories;
pub mod views;
pub mod visibility;

use std::sync::Arc;

use glimpse_db::Database;
use glimpse_types::models::{Story, StoryStatus, Viewer};

pub use config::StoryConfig;
pub use error::{StoryError, StoryResult};

use cache::{FeedCache, MemoryFeedCache, SaltStore};
use graph::SocialGraph;
use notify::{NotificationSink, TracingSink};
use visibility::ViewerContext;

/// Handles to every collaborator the story operations need.
#[derive(Clone)]
pub struct StoryEngine {
    db: Arc<Database>,
    graph: Arc<dyn SocialGraph>,
    cache: Arc<dyn FeedCache>,
    salts: Arc<dyn SaltStore>,
    sink: Arc<dyn NotificationSink>,
    config: Arc<StoryConfig>,
}

impl StoryEngine {
    /// Engine backed entirely by `db`, with an in-memory feed cache and
    /// events going to the log.
    pub fn new(db: Arc<Database>, config: StoryConfig) -> Self {
        Self {
            graph: db.clone(),
            salts: db.clone(),
            cache: Arc::new(MemoryFeedCache::new()),
            sink: Arc::new(TracingSink),
            config: Arc::new(config),
            db,
        }
    }

    pub fn with_graph(mut self, graph: Arc<dyn SocialGraph>) -> Self {
        self.graph = graph;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn FeedCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_salts(mut self, salts: Arc<dyn SaltStore>) -> Self {
        self.salts = salts;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &StoryConfig {
        &self.config
    }

    pub fn viewer_context(&self, viewer: Viewer) -> StoryResult<ViewerContext> {
        ViewerContext::load(self.graph.as_ref(), viewer)
    }

    /// A story that is still served. Stories pulled for review read as absent.
    pub(crate) fn live_story(&self, story_id: i64) -> StoryResult<Story> {
        match self.db.get_story(story_id)? {
            Some(story) if story.status == StoryStatus::Published => Ok(story),
            _ => Err(StoryError::NotFound),
        }
    }

    /// A published story the viewer may see.
    pub(crate) fn viewable_story(&self, viewer: Viewer, story_id: i64) -> StoryResult<Story> {
        let story = self.live_story(story_id)?;
        let ctx = self.viewer_context(viewer)?;
        if !visibility::can_view(&story, &ctx) {
            return Err(StoryError::Forbidden);
        }
        Ok(story)
    }

    /// Any story (published or not) the viewer may manage.
    pub(crate) fn managed_story(&self, viewer: Viewer, story_id: i64) -> StoryResult<Story> {
        let story = self.db.get_story(story_id)?.ok_or(StoryError::NotFound)?;
        if !visibility::can_manage(&story, viewer) {
            return Err(StoryError::Forbidden);
        }
        Ok(story)
    }
}
