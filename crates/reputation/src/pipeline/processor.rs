use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::analytics::{AnalyticsError, AnalyticsSnapshotGenerator};
use super::breaker::{CircuitBreaker, GuardedNotifications};
use super::domain::{
    AnalyticsSnapshot, EventId, LeaderboardKind, ReputationEvent, ReputationEventKind,
    ReputationLeaderboard, UserId, UserReputationSummary, ViolationSeverity,
};
use super::leaderboard::{LeaderboardCalculator, LeaderboardConfig, LeaderboardError};
use super::levels::{features_for, FeatureAction, LevelThresholds, LevelTransition};
use super::repository::{
    AchievementService, CacheStore, Clock, EventLog, FeatureGate, LeaderboardStore,
    ModerationEscalator, NoticeKind, NotificationPublisher, PipelineMonitor, ReputationNotice,
    SnapshotStore, StoreError, SummaryStore,
};
use super::sampling::SamplingPolicy;
use super::summary::{RefreshError, SummaryRefresher};

pub const HEALTH_METRICS_KEY: &str = "reputation_health_metrics";

/// External side-effect collaborators consumed by the processor. Notification
/// failures never fail the pipeline; escalation failures propagate so the
/// queue retries the event.
pub struct Collaborators {
    pub notifications: Arc<dyn NotificationPublisher>,
    pub moderation: Arc<dyn ModerationEscalator>,
    pub achievements: Arc<dyn AchievementService>,
    pub gates: Arc<dyn FeatureGate>,
    pub monitor: Arc<dyn PipelineMonitor>,
}

/// Root tuning for the pipeline wiring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub thresholds: LevelThresholds,
    pub leaderboards: LeaderboardConfig,
    /// Every nth gained/lost event triggers an incremental snapshot merge.
    pub sampling_interval: u64,
    pub user_analytics_ttl_minutes: i64,
    pub health_metrics_ttl_minutes: i64,
    pub breaker_failure_threshold: u32,
    pub breaker_recovery_seconds: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            thresholds: LevelThresholds::default(),
            leaderboards: LeaderboardConfig::default(),
            sampling_interval: 10,
            user_analytics_ttl_minutes: 60,
            health_metrics_ttl_minutes: 5,
            breaker_failure_threshold: 5,
            breaker_recovery_seconds: 30,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Refresh(#[from] RefreshError),
    #[error(transparent)]
    Escalation(#[from] super::repository::EscalationError),
}

impl From<LeaderboardError> for ProcessingError {
    fn from(value: LeaderboardError) -> Self {
        match value {
            LeaderboardError::Store(err) => ProcessingError::Store(err),
        }
    }
}

impl From<AnalyticsError> for ProcessingError {
    fn from(value: AnalyticsError) -> Self {
        match value {
            AnalyticsError::Store(err) => ProcessingError::Store(err),
        }
    }
}

impl ProcessingError {
    /// Whether the external queue should retry the event.
    pub fn is_transient(&self) -> bool {
        match self {
            ProcessingError::Store(StoreError::Unavailable(_)) => true,
            ProcessingError::Store(StoreError::Corrupted(_)) => false,
            ProcessingError::Refresh(RefreshError::Store(StoreError::Unavailable(_))) => true,
            ProcessingError::Refresh(RefreshError::Store(StoreError::Corrupted(_))) => false,
            ProcessingError::Refresh(RefreshError::Overflow { .. }) => false,
            ProcessingError::Escalation(_) => true,
        }
    }
}

/// Counter snapshot exposed for health checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthMetrics {
    pub events_processed: u64,
    pub unknown_events: u64,
    pub missing_events: u64,
    pub summary_refreshes: u64,
    pub leaderboard_recomputes: u64,
    pub snapshot_updates: u64,
}

#[derive(Debug, Default)]
struct PipelineCounters {
    processed: AtomicU64,
    unknown: AtomicU64,
    missing: AtomicU64,
    refreshes: AtomicU64,
    snapshot_updates: AtomicU64,
}

/// Dispatches incoming reputation events to the derived-view components and
/// outbound collaborators. Invocations are fully concurrent across workers;
/// every step is idempotent or staleness-gated, so at-least-once redelivery
/// and same-user races resolve to eventual consistency.
pub struct EventProcessor<E, S, L, SS> {
    log: Arc<E>,
    summaries: Arc<S>,
    refresher: SummaryRefresher<E, S>,
    leaderboards: LeaderboardCalculator<E, L>,
    analytics: AnalyticsSnapshotGenerator<E, SS, S>,
    collaborators: Collaborators,
    cache: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    counters: PipelineCounters,
    health_ttl: Duration,
}

impl<E, S, L, SS> EventProcessor<E, S, L, SS>
where
    E: EventLog,
    S: SummaryStore,
    L: LeaderboardStore,
    SS: SnapshotStore,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        log: Arc<E>,
        summaries: Arc<S>,
        boards: Arc<L>,
        snapshots: Arc<SS>,
        cache: Arc<dyn CacheStore>,
        collaborators: Collaborators,
        sampling: Arc<dyn SamplingPolicy>,
        clock: Arc<dyn Clock>,
        config: PipelineConfig,
    ) -> Self {
        let Collaborators {
            notifications,
            moderation,
            achievements,
            gates,
            monitor,
        } = collaborators;
        let notifications: Arc<dyn NotificationPublisher> = Arc::new(GuardedNotifications::new(
            notifications,
            CircuitBreaker::new(
                config.breaker_failure_threshold,
                Duration::seconds(config.breaker_recovery_seconds),
                clock.clone(),
            ),
        ));
        let collaborators = Collaborators {
            notifications,
            moderation,
            achievements,
            gates,
            monitor,
        };

        let refresher = SummaryRefresher::new(
            log.clone(),
            summaries.clone(),
            config.thresholds,
            clock.clone(),
        );
        let leaderboards = LeaderboardCalculator::new(
            log.clone(),
            boards,
            cache.clone(),
            config.leaderboards.clone(),
            clock.clone(),
        );
        let analytics = AnalyticsSnapshotGenerator::new(
            log.clone(),
            snapshots,
            summaries.clone(),
            cache.clone(),
            sampling,
            config.thresholds,
            clock.clone(),
            Duration::minutes(config.user_analytics_ttl_minutes),
        );

        Self {
            log,
            summaries,
            refresher,
            leaderboards,
            analytics,
            collaborators,
            cache,
            clock,
            counters: PipelineCounters::default(),
            health_ttl: Duration::minutes(config.health_metrics_ttl_minutes),
        }
    }

    /// Process one queue delivery. A lookup miss or unknown event type is a
    /// success-no-op; lookup/refresh/escalation failures are logged with
    /// context and re-raised so the queue's retry policy applies.
    pub fn process(
        &self,
        event_id: &EventId,
        event_type: &str,
        user_id: &UserId,
        metadata: &BTreeMap<String, String>,
    ) -> Result<(), ProcessingError> {
        let kind = ReputationEventKind::from_label(event_type);
        if kind == ReputationEventKind::Unknown {
            warn!(
                event = %event_id.0,
                user = %user_id.0,
                event_type,
                "skipping event of unknown type"
            );
            self.counters.unknown.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        let event = match self.log.find(event_id, kind) {
            Ok(Some(event)) => event,
            Ok(None) => {
                // Already processed or never written; at-least-once delivery
                // makes this an expected no-op.
                debug!(
                    event = %event_id.0,
                    kind = kind.label(),
                    "event not found; treating as already processed"
                );
                self.counters.missing.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
            Err(err) => {
                error!(
                    event = %event_id.0,
                    user = %user_id.0,
                    kind = kind.label(),
                    %err,
                    "event lookup failed"
                );
                self.report_if_corrupted(user_id, &err);
                return Err(err.into());
            }
        };

        let outcome = self.refresher.refresh(user_id).map_err(|err| {
            error!(
                event = %event_id.0,
                user = %user_id.0,
                kind = kind.label(),
                %err,
                "summary refresh failed"
            );
            if let RefreshError::Store(store_err) = &err {
                self.report_if_corrupted(user_id, store_err);
            } else {
                self.collaborators
                    .monitor
                    .critical(Some(user_id), &err.to_string());
            }
            err
        })?;
        self.counters.refreshes.fetch_add(1, Ordering::Relaxed);

        match kind {
            ReputationEventKind::Gained => {
                self.notify(NoticeKind::PointsGained, user_id, &event, metadata);
                if let Err(err) = self
                    .collaborators
                    .achievements
                    .check_and_award(user_id, outcome.summary.total_score)
                {
                    warn!(user = %user_id.0, %err, "achievement check failed");
                }
            }
            ReputationEventKind::Lost => {
                self.notify(NoticeKind::PointsLost, user_id, &event, metadata);
                if event.severity == Some(ViolationSeverity::High) {
                    self.collaborators
                        .moderation
                        .open_ticket(user_id, ViolationSeverity::High, &event.reason)
                        .map_err(|err| {
                            error!(
                                event = %event_id.0,
                                user = %user_id.0,
                                %err,
                                "moderation escalation failed"
                            );
                            err
                        })?;
                }
            }
            ReputationEventKind::Reset => {
                self.notify(NoticeKind::ScoreReset, user_id, &event, metadata);
                let admin = event
                    .source_id
                    .clone()
                    .or_else(|| metadata.get("admin_id").cloned());
                if let Some(admin) = admin {
                    self.notify(NoticeKind::ScoreReset, &UserId(admin), &event, metadata);
                }
            }
            ReputationEventKind::LevelChanged => {
                self.notify(NoticeKind::LevelChanged, user_id, &event, metadata);
            }
            ReputationEventKind::Unknown => {}
        }

        if let Some(transition) = outcome.transition {
            self.apply_transition(user_id, &transition);
        }

        // Decoupled fan-out: the snapshot merge is fire-and-forget and the
        // leaderboard refresh is deferred to the next staleness-gated read.
        match self.analytics.maybe_update(&event) {
            Ok(Some(_)) => {
                self.counters.snapshot_updates.fetch_add(1, Ordering::Relaxed);
            }
            Ok(None) => {}
            Err(err) => warn!(user = %user_id.0, %err, "analytics update failed"),
        }

        let event_date = event.created_at.date_naive();
        for board_kind in LeaderboardKind::ordered() {
            self.leaderboards.mark_touched(board_kind, event_date);
        }

        self.counters.processed.fetch_add(1, Ordering::Relaxed);
        info!(
            event = %event_id.0,
            user = %user_id.0,
            kind = kind.label(),
            total_score = outcome.summary.total_score,
            level = outcome.summary.level.label(),
            "event processed"
        );
        Ok(())
    }

    /// Inbound operation: resolve a leaderboard for `date` (today when
    /// omitted), recomputing only if stale.
    pub fn refresh_leaderboard(
        &self,
        kind: LeaderboardKind,
        date: Option<NaiveDate>,
    ) -> Result<ReputationLeaderboard, LeaderboardError> {
        let date = date.unwrap_or_else(|| self.clock.now().date_naive());
        self.leaderboards.get_or_calculate(kind, date)
    }

    /// Inbound operation: forced incremental analytics merge for one user,
    /// bypassing the sampling policy.
    pub fn refresh_user_analytics(
        &self,
        user: &UserId,
    ) -> Result<AnalyticsSnapshot, AnalyticsError> {
        self.analytics.update_incremental(user)
    }

    /// Inbound operation: full daily snapshot regenerate.
    pub fn generate_daily_analytics(
        &self,
        date: Option<NaiveDate>,
    ) -> Result<AnalyticsSnapshot, AnalyticsError> {
        self.analytics.generate_daily(date)
    }

    /// Stored summary view, without forcing a refresh.
    pub fn summary(&self, user: &UserId) -> Result<Option<UserReputationSummary>, StoreError> {
        self.summaries.fetch(user)
    }

    /// Counter snapshot, written through the short-TTL health cache key.
    pub fn health_metrics(&self) -> HealthMetrics {
        let metrics = HealthMetrics {
            events_processed: self.counters.processed.load(Ordering::Relaxed),
            unknown_events: self.counters.unknown.load(Ordering::Relaxed),
            missing_events: self.counters.missing.load(Ordering::Relaxed),
            summary_refreshes: self.counters.refreshes.load(Ordering::Relaxed),
            leaderboard_recomputes: self.leaderboards.recomputes(),
            snapshot_updates: self.counters.snapshot_updates.load(Ordering::Relaxed),
        };
        match serde_json::to_string(&metrics) {
            Ok(payload) => self
                .cache
                .set(HEALTH_METRICS_KEY, payload, self.health_ttl),
            Err(err) => warn!(%err, "skipping health metrics cache write"),
        }
        metrics
    }

    pub fn leaderboards(&self) -> &LeaderboardCalculator<E, L> {
        &self.leaderboards
    }

    fn apply_transition(&self, user: &UserId, transition: &LevelTransition) {
        if transition.awards_milestone() {
            let mut details = BTreeMap::new();
            details.insert("new_level".to_string(), transition.to.label().to_string());
            details.insert(
                "previous_level".to_string(),
                transition.from.label().to_string(),
            );
            self.publish(ReputationNotice {
                kind: NoticeKind::Milestone,
                user_id: user.clone(),
                details,
            });
        }

        let features = features_for(transition.to);
        match transition.feature_action() {
            Some(FeatureAction::Unlock) => {
                if let Err(err) = self.collaborators.gates.unlock(user, features) {
                    warn!(user = %user.0, level = transition.to.label(), %err, "feature unlock failed");
                }
            }
            Some(FeatureAction::Restrict) => {
                if let Err(err) = self.collaborators.gates.restrict(user, features) {
                    warn!(user = %user.0, level = transition.to.label(), %err, "feature restriction failed");
                }
            }
            None => {}
        }
    }

    fn notify(
        &self,
        kind: NoticeKind,
        recipient: &UserId,
        event: &ReputationEvent,
        metadata: &BTreeMap<String, String>,
    ) {
        let mut details = metadata.clone();
        details.insert("event_id".to_string(), event.event_id.0.clone());
        details.insert(
            "points_change".to_string(),
            event.points_change.to_string(),
        );
        details.insert("reason".to_string(), event.reason.clone());
        if let Some(severity) = event.severity {
            details.insert("severity".to_string(), severity.label().to_string());
        }

        self.publish(ReputationNotice {
            kind,
            user_id: recipient.clone(),
            details,
        });
    }

    fn publish(&self, notice: ReputationNotice) {
        let kind = notice.kind;
        let user = notice.user_id.clone();
        if let Err(err) = self.collaborators.notifications.publish(notice) {
            warn!(kind = kind.label(), user = %user.0, %err, "notification dropped");
        }
    }

    fn report_if_corrupted(&self, user: &UserId, err: &StoreError) {
        if let StoreError::Corrupted(detail) = err {
            self.collaborators.monitor.critical(Some(user), detail);
        }
    }
}
