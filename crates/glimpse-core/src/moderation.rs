//! Reports and the auto-hide threshold.
//!
//! A report and its threshold check commit in one transaction. Pulling the
//! story is guarded on its current status, so once a story is under review
//! later reports are stored but never trigger a second transition.

use chrono::Utc;
use glimpse_db::engagement::{action_pending_reports, pending_report_count, upsert_report};
use glimpse_db::stories::mark_pending_review;
use glimpse_types::api::{ReportEntry, ReportsResponse, UpdateReportRequest};
use glimpse_types::events::StoryEvent;
use glimpse_types::models::{ReportReason, ReportStatus, Viewer};
use tracing::info;

use crate::cache::{bump_global, bump_users};
use crate::error::{StoryError, StoryResult};
use crate::visibility::can_view;
use crate::StoryEngine;

pub const AUTO_HIDDEN_ACTION: &str = "auto_hidden";

const REPORTS_LIMIT_DEFAULT: usize = 50;
const REPORTS_LIMIT_MAX: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOutcome {
    pub status: ReportStatus,
    /// True only for the report that pulled the story.
    pub auto_hidden: bool,
}

impl StoryEngine {
    pub fn submit_report(
        &self,
        viewer: Viewer,
        story_id: i64,
        reason: Option<&str>,
        description: Option<&str>,
    ) -> StoryResult<ReportOutcome> {
        let story = self.db.get_story(story_id)?.ok_or(StoryError::NotFound)?;
        if story.author_id == viewer.id {
            return Err(StoryError::invalid("Cannot report your own story"));
        }
        if !can_view(&story, &self.viewer_context(viewer)?) {
            return Err(StoryError::Forbidden);
        }
        let reason = match reason.map(str::trim).filter(|r| !r.is_empty()) {
            None => ReportReason::Other,
            Some(raw) => ReportReason::parse(raw)
                .ok_or_else(|| StoryError::invalid(format!("Unknown report reason: {}", raw)))?,
        };
        let description = description.unwrap_or("").trim();
        let threshold = self.config.auto_hide_threshold;
        let now = Utc::now();

        let (status, hidden_with) = self.db.with_tx(|conn| {
            let status = upsert_report(conn, story.id, viewer.id, reason, description, now)?;
            if status != ReportStatus::Pending || threshold <= 0 {
                return Ok((status, None));
            }
            let pending = pending_report_count(conn, story.id)?;
            if pending < threshold || !mark_pending_review(conn, story.id, now, pending)? {
                return Ok((status, None));
            }
            action_pending_reports(conn, story.id, AUTO_HIDDEN_ACTION, now)?;
            Ok((ReportStatus::Actioned, Some(pending)))
        })?;

        let auto_hidden = hidden_with.is_some();
        if let Some(report_count) = hidden_with {
            info!(
                "Story {} auto-hidden after {} pending reports",
                story.id, report_count
            );
            bump_users(self.salts.as_ref(), &[story.author_id]);
            bump_global(self.salts.as_ref());
            self.sink.notify(StoryEvent::StoryAutoHidden {
                story_id: story.id,
                report_count,
            });
        }

        Ok(ReportOutcome {
            status,
            auto_hidden,
        })
    }

    /// Pending reports grouped by story, for moderators.
    pub fn pending_reports(
        &self,
        viewer: Viewer,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> StoryResult<ReportsResponse> {
        require_moderator(viewer)?;
        let limit = match limit {
            Some(n) if n >= 1 => (n as usize).min(REPORTS_LIMIT_MAX),
            _ => REPORTS_LIMIT_DEFAULT,
        };
        let offset = offset.unwrap_or(0).max(0) as usize;

        let reports = self
            .db
            .pending_report_groups(limit, offset)?
            .into_iter()
            .map(|group| ReportEntry {
                id: group.report.id,
                story_id: group.report.story_id,
                story_author_id: group.story_author_id,
                reporter_id: group.report.reporter_id,
                reason: group.report.reason,
                description: group.report.description,
                status: group.report.status,
                report_count: group.report_count,
                created_at: group.report.created_at,
            })
            .collect();

        Ok(ReportsResponse {
            stats: self.db.report_stats()?,
            reports,
        })
    }

    pub fn update_report(
        &self,
        viewer: Viewer,
        report_id: i64,
        req: &UpdateReportRequest,
    ) -> StoryResult<()> {
        require_moderator(viewer)?;
        let status = match req.status.as_deref() {
            None => ReportStatus::Reviewed,
            Some(raw) => ReportStatus::parse(raw)
                .ok_or_else(|| StoryError::invalid(format!("Unknown report status: {}", raw)))?,
        };
        let action = req.action_taken.as_deref().filter(|a| !a.is_empty());
        if !self
            .db
            .update_report_status(report_id, status, viewer.id, action, Utc::now())?
        {
            return Err(StoryError::NotFound);
        }
        Ok(())
    }
}

fn require_moderator(viewer: Viewer) -> StoryResult<()> {
    if viewer.is_authenticated() && viewer.is_moderator {
        Ok(())
    } else {
        Err(StoryError::Forbidden)
    }
}
