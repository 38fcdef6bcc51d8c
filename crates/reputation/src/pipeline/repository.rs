use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    AnalyticsSnapshot, DailyActivity, EventId, LeaderboardKind, ReputationEvent,
    ReputationEventKind, ReputationLeaderboard, UserId, UserReputationSummary, ViolationSeverity,
};

/// Storage failure taxonomy. `Unavailable` is transient and safe to retry
/// through the external queue; `Corrupted` is critical and surfaced to the
/// monitoring collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("stored data corrupted: {0}")]
    Corrupted(String),
}

/// Read access to the append-only reputation event log. Appends happen at the
/// edge that records reputation changes; the pipeline only ever reads, except
/// for seeding in demos and tests.
pub trait EventLog: Send + Sync {
    fn append(&self, event: ReputationEvent) -> Result<ReputationEvent, StoreError>;
    fn find(
        &self,
        event_id: &EventId,
        kind: ReputationEventKind,
    ) -> Result<Option<ReputationEvent>, StoreError>;
    fn events_for_user(&self, user: &UserId) -> Result<Vec<ReputationEvent>, StoreError>;
    /// Events with `start <= created_at < end`; a `None` bound is unbounded.
    fn events_between(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<ReputationEvent>, StoreError>;
    /// Timestamp of the newest event inside the window, if any.
    fn latest_event_at(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;
}

/// Persistence for derived per-user summaries. Last write wins.
pub trait SummaryStore: Send + Sync {
    fn fetch(&self, user: &UserId) -> Result<Option<UserReputationSummary>, StoreError>;
    fn upsert(&self, summary: UserReputationSummary) -> Result<(), StoreError>;
}

/// Persistence for derived leaderboards, keyed by kind and period start
/// (`None` for the all-time window).
pub trait LeaderboardStore: Send + Sync {
    fn fetch(
        &self,
        kind: LeaderboardKind,
        period_start: Option<DateTime<Utc>>,
    ) -> Result<Option<ReputationLeaderboard>, StoreError>;
    fn upsert(&self, board: ReputationLeaderboard) -> Result<(), StoreError>;
}

/// Snapshot plus the per-user activity map it was folded from. The activity
/// map is what makes incremental merges possible without rescanning the day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub snapshot: AnalyticsSnapshot,
    pub activity: BTreeMap<UserId, DailyActivity>,
}

/// Persistence for daily analytics snapshots, keyed by calendar date.
pub trait SnapshotStore: Send + Sync {
    fn fetch(&self, date: NaiveDate) -> Result<Option<SnapshotRecord>, StoreError>;
    fn latest(&self) -> Result<Option<SnapshotRecord>, StoreError>;
    fn upsert(&self, record: SnapshotRecord) -> Result<(), StoreError>;
}

/// Injected cache port. Write-through with short TTLs, allowed to be stale,
/// never a source of truth. The interface is infallible; adapters swallow
/// their own transport errors.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String, ttl: Duration);
    fn invalidate(&self, key: &str);
}

/// Time source, injected so staleness gates and TTLs are deterministic under
/// test.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation used everywhere outside tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Notification templates the pipeline emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeKind {
    PointsGained,
    PointsLost,
    ScoreReset,
    LevelChanged,
    Milestone,
}

impl NoticeKind {
    pub const fn label(self) -> &'static str {
        match self {
            NoticeKind::PointsGained => "points_gained",
            NoticeKind::PointsLost => "points_lost",
            NoticeKind::ScoreReset => "score_reset",
            NoticeKind::LevelChanged => "level_changed",
            NoticeKind::Milestone => "milestone",
        }
    }
}

/// Payload handed to the notification collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationNotice {
    pub kind: NoticeKind,
    pub user_id: UserId,
    pub details: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
    #[error("notification channel refusing calls")]
    Refused,
}

/// Outbound notification contract. Fire-and-forget: publish failures are
/// logged by callers and never fail the pipeline.
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, notice: ReputationNotice) -> Result<(), NotifyError>;
}

#[derive(Debug, thiserror::Error)]
pub enum EscalationError {
    #[error("moderation transport unavailable: {0}")]
    Transport(String),
}

/// Moderation escalation contract for high-severity losses. Failures
/// propagate so the queue can retry the event.
pub trait ModerationEscalator: Send + Sync {
    fn open_ticket(
        &self,
        user: &UserId,
        severity: ViolationSeverity,
        context: &str,
    ) -> Result<(), EscalationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AchievementError {
    #[error("achievement service unavailable: {0}")]
    Unavailable(String),
}

/// Score-threshold achievement contract.
pub trait AchievementService: Send + Sync {
    fn check_and_award(&self, user: &UserId, score: i64) -> Result<(), AchievementError>;
}

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("feature gate unavailable: {0}")]
    Unavailable(String),
}

/// Feature-gate contract invoked on level transitions.
pub trait FeatureGate: Send + Sync {
    fn unlock(&self, user: &UserId, features: &[&str]) -> Result<(), GateError>;
    fn restrict(&self, user: &UserId, features: &[&str]) -> Result<(), GateError>;
}

/// External monitoring/alerting sink for critical, non-recoverable faults.
pub trait PipelineMonitor: Send + Sync {
    fn critical(&self, user: Option<&UserId>, context: &str);
}
