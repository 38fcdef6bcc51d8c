use std::sync::Arc;

use tracing::debug;

use super::domain::{UserId, UserReputationSummary};
use super::levels::{LevelThresholds, LevelTransition};
use super::repository::{Clock, EventLog, StoreError, SummaryStore};

/// Result of one refresh: the persisted summary plus the level transition it
/// caused, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshOutcome {
    pub summary: UserReputationSummary,
    pub transition: Option<LevelTransition>,
}

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("reputation total overflowed for user {user}")]
    Overflow { user: String },
}

/// Recomputes one user's aggregate from the event log. Full recompute is
/// O(events-for-user) and idempotent, which is what lets concurrent workers
/// race on the same user: both recompute from the log and the later write
/// wins.
pub struct SummaryRefresher<E, S> {
    log: Arc<E>,
    summaries: Arc<S>,
    thresholds: LevelThresholds,
    clock: Arc<dyn Clock>,
}

impl<E, S> SummaryRefresher<E, S>
where
    E: EventLog,
    S: SummaryStore,
{
    pub fn new(
        log: Arc<E>,
        summaries: Arc<S>,
        thresholds: LevelThresholds,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            log,
            summaries,
            thresholds,
            clock,
        }
    }

    pub fn refresh(&self, user: &UserId) -> Result<RefreshOutcome, RefreshError> {
        let events = self.log.events_for_user(user)?;

        let mut total: i64 = 0;
        for event in &events {
            total = total
                .checked_add(event.points_change)
                .ok_or_else(|| RefreshError::Overflow {
                    user: user.0.clone(),
                })?;
        }

        let level = self.thresholds.classify(total);
        // A user without a stored summary compares against the empty-score
        // level, so seeding a fresh user straight into a trusted tier still
        // registers as a promotion.
        let previous_level = self
            .summaries
            .fetch(user)?
            .map(|summary| summary.level)
            .unwrap_or_else(|| self.thresholds.classify(0));

        let summary = UserReputationSummary {
            user_id: user.clone(),
            total_score: total,
            level,
            last_refreshed_at: self.clock.now(),
        };
        self.summaries.upsert(summary.clone())?;

        let transition = LevelTransition::detect(previous_level, level);
        debug!(
            user = %user.0,
            total_score = total,
            level = level.label(),
            events = events.len(),
            transitioned = transition.is_some(),
            "summary refreshed"
        );

        Ok(RefreshOutcome {
            summary,
            transition,
        })
    }
}
