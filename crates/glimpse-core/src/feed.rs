//! Feed aggregation: scoped and public story sets merged, filtered by
//! visibility, grouped per author and ordered by unseen state or recency.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use glimpse_db::stories::StoryFilter;
use glimpse_types::api::{API_VERSION, AuthorBucket, AuthorInfo, FeedQuery, FeedResponse};
use glimpse_types::models::{FeedOrder, Privacy, Scope, Story, StoryItem, Viewer};
use tracing::{debug, warn};

use crate::cache::{Salts, cache_key};
use crate::error::StoryResult;
use crate::stories::media_url;
use crate::visibility::{ViewerContext, can_view};
use crate::{StoryConfig, StoryEngine};

/// A normalized feed request. Built once at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedRequest {
    pub scope: Scope,
    pub order: FeedOrder,
    pub limit: usize,
    pub exclude_me: bool,
    pub compact: bool,
}

impl FeedRequest {
    pub fn from_query(query: &FeedQuery, config: &StoryConfig) -> Self {
        Self {
            scope: Scope::normalize(query.scope.as_deref()),
            order: FeedOrder::normalize(query.order.as_deref()),
            limit: config.clamp_feed_limit(query.limit()),
            exclude_me: is_flag_set(query.exclude_me.as_deref()),
            compact: is_flag_set(query.compact.as_deref()),
        }
    }
}

pub fn is_flag_set(value: Option<&str>) -> bool {
    matches!(value, Some("1") | Some("true"))
}

/// Per-author accumulator.
struct Group {
    author_id: i64,
    first_story_id: i64,
    story_ids: Vec<i64>,
    item_ids: Vec<i64>,
    cover_thumb: String,
    last_updated: DateTime<Utc>,
    privacy: Privacy,
}

impl StoryEngine {
    pub fn feed(&self, viewer: Viewer, request: FeedRequest) -> StoryResult<FeedResponse> {
        let mut request = request;
        request.limit = self.config.clamp_feed_limit(Some(request.limit as i64));

        if !viewer.is_authenticated() {
            return Ok(empty_feed());
        }

        let key = match Salts::load(self.salts.as_ref(), viewer.id) {
            Ok(salts) => Some(feed_cache_key(viewer.id, &request, salts)),
            Err(e) => {
                warn!("Salt lookup failed, serving feed uncached: {}", e);
                None
            }
        };

        if let Some(key) = &key {
            if let Some(hit) = self.cache.get(key) {
                match serde_json::from_str::<FeedResponse>(&hit) {
                    Ok(feed) => {
                        debug!("Feed cache hit for user {}", viewer.id);
                        return Ok(feed);
                    }
                    Err(e) => warn!("Discarding unreadable cached feed: {}", e),
                }
            }
        }

        let ctx = self.viewer_context(viewer)?;
        let feed = self.build_feed(&ctx, &request, Utc::now())?;

        if let Some(key) = &key {
            if !feed.partial {
                match serde_json::to_string(&feed) {
                    Ok(json) => self.cache.set(
                        key,
                        json,
                        Duration::from_secs(self.config.feed_cache_ttl_secs),
                    ),
                    Err(e) => warn!("Failed to encode feed for cache: {}", e),
                }
            }
        }

        Ok(feed)
    }

    fn build_feed(
        &self,
        ctx: &ViewerContext,
        request: &FeedRequest,
        now: DateTime<Utc>,
    ) -> StoryResult<FeedResponse> {
        let viewer_id = ctx.viewer.id;

        let candidates: Option<Vec<i64>> = match request.scope {
            Scope::All => None,
            Scope::Friends | Scope::Following => {
                let base = if request.scope == Scope::Friends {
                    &ctx.friends
                } else {
                    &ctx.following
                };
                let mut ids: HashSet<i64> = base.iter().copied().filter(|&id| id > 0).collect();
                if request.exclude_me {
                    ids.remove(&viewer_id);
                } else {
                    ids.insert(viewer_id);
                }
                let mut ids: Vec<i64> = ids.into_iter().collect();
                ids.sort_unstable();
                Some(ids)
            }
        };

        // Rows are stories but the limit counts authors, so read past it
        // under either order.
        let fetch_limit = self.config.overfetch(request.limit);
        let exclude_author = request.exclude_me.then_some(viewer_id);

        // No eligible authors: answer without touching the store.
        if candidates.as_ref().is_some_and(|ids| ids.is_empty()) {
            return Ok(empty_feed());
        }

        let mut stories = self.db.active_stories(&StoryFilter {
            author_ids: candidates,
            exclude_author,
            public_only: false,
            now,
            limit: fetch_limit,
        })?;

        if request.scope != Scope::All {
            let public = self.db.active_stories(&StoryFilter {
                author_ids: None,
                exclude_author,
                public_only: true,
                now,
                limit: fetch_limit,
            })?;
            stories = union_by_id(stories, public);
        }

        if stories.is_empty() {
            return Ok(empty_feed());
        }

        stories.retain(|story| can_view(story, ctx));

        let story_ids: Vec<i64> = stories.iter().map(|s| s.id).collect();
        let mut items_by_story: HashMap<i64, Vec<StoryItem>> = HashMap::new();
        for item in self.db.items_for_stories(&story_ids)? {
            items_by_story.entry(item.story_id).or_default().push(item);
        }

        let groups = group_by_author(&stories, &items_by_story);

        let author_ids: Vec<i64> = groups.iter().map(|g| g.author_id).collect();
        let names = self.db.usernames(&author_ids).unwrap_or_else(|e| {
            warn!("Author lookup failed: {}", e);
            HashMap::new()
        });

        let mut partial = false;
        let mut buckets = Vec::with_capacity(groups.len());
        for group in groups {
            let seen = match self.db.seen_item_ids(&group.item_ids, viewer_id) {
                Ok(seen) => seen,
                Err(e) => {
                    warn!(
                        "Dropping author {} from feed for user {}: {}",
                        group.author_id, viewer_id, e
                    );
                    partial = true;
                    continue;
                }
            };
            let unseen_count = group.item_ids.iter().filter(|id| !seen.contains(id)).count();
            let name = names
                .get(&group.author_id)
                .cloned()
                .unwrap_or_else(|| format!("user{}", group.author_id));

            buckets.push(AuthorBucket {
                story_id: group.first_story_id,
                author: author_info(group.author_id, name, request.compact),
                cover_thumb: group.cover_thumb,
                last_updated: group.last_updated,
                has_unseen: unseen_count > 0,
                unseen_count,
                items_count: group.item_ids.len(),
                privacy: group.privacy,
                story_ids: group.story_ids,
            });
        }

        sort_buckets(&mut buckets, request.order);
        buckets.truncate(request.limit);

        Ok(FeedResponse {
            api_version: API_VERSION.to_string(),
            stories: buckets,
            partial,
        })
    }
}

fn empty_feed() -> FeedResponse {
    FeedResponse {
        api_version: API_VERSION.to_string(),
        stories: Vec::new(),
        partial: false,
    }
}

pub fn author_info(id: i64, name: String, compact: bool) -> AuthorInfo {
    AuthorInfo {
        id,
        name,
        profile_url: (!compact).then(|| format!("/users/{}", id)),
    }
}

fn feed_cache_key(viewer_id: i64, request: &FeedRequest, salts: Salts) -> String {
    cache_key(
        "feed",
        &(
            viewer_id,
            request.scope.as_str(),
            request.order.as_str(),
            request.limit,
            request.exclude_me,
            request.compact,
            salts.user,
            salts.global,
        ),
    )
}

/// Merge two story sets, keeping each id once, newest activity first.
fn union_by_id(scoped: Vec<Story>, public: Vec<Story>) -> Vec<Story> {
    let mut seen = HashSet::with_capacity(scoped.len() + public.len());
    let mut merged: Vec<Story> = scoped
        .into_iter()
        .chain(public)
        .filter(|story| seen.insert(story.id))
        .collect();
    merged.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
    merged
}

/// Collapse stories into one group per author, in order of first appearance.
/// Stories with no items left are skipped.
fn group_by_author(stories: &[Story], items_by_story: &HashMap<i64, Vec<StoryItem>>) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<i64, usize> = HashMap::new();

    for story in stories {
        let Some(items) = items_by_story.get(&story.id).filter(|items| !items.is_empty()) else {
            continue;
        };

        let slot = *index.entry(story.author_id).or_insert_with(|| {
            groups.push(Group {
                author_id: story.author_id,
                first_story_id: story.id,
                story_ids: Vec::new(),
                item_ids: Vec::new(),
                cover_thumb: media_url(&items[0].media_id),
                last_updated: story.updated_at,
                privacy: Privacy::Public,
            });
            groups.len() - 1
        });

        let group = &mut groups[slot];
        group.story_ids.push(story.id);
        group.item_ids.extend(items.iter().map(|item| item.id));
        group.last_updated = group.last_updated.max(story.updated_at);
        group.privacy = group.privacy.more_restrictive(story.privacy);
    }

    groups
}

fn sort_buckets(buckets: &mut [AuthorBucket], order: FeedOrder) {
    buckets.sort_by(|a, b| {
        let primary = match order {
            FeedOrder::UnseenFirst => b
                .has_unseen
                .cmp(&a.has_unseen)
                .then(b.last_updated.cmp(&a.last_updated)),
            FeedOrder::RecentActivity => b.last_updated.cmp(&a.last_updated),
        };
        primary.then(b.story_id.cmp(&a.story_id))
    });
}
