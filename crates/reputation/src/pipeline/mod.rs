//! Reputation event pipeline: event dispatch, per-user summary refresh,
//! staleness-gated leaderboards, and the daily analytics snapshot.
//!
//! The event log is the source of truth; everything else here is a derived
//! read model kept reasonably fresh under concurrent, at-least-once event
//! delivery without full recomputation on every event.

pub mod analytics;
pub mod breaker;
pub mod domain;
pub mod leaderboard;
pub mod levels;
pub mod processor;
pub mod repository;
pub mod router;
pub mod sampling;
pub mod summary;

#[cfg(test)]
mod tests;

pub use analytics::{AnalyticsError, AnalyticsSnapshotGenerator};
pub use breaker::{BreakerError, CircuitBreaker, GuardedNotifications};
pub use domain::{
    AnalyticsSnapshot, DailyActivity, EventId, LeaderboardKind, RankingEntry, ReputationEvent,
    ReputationEventKind, ReputationLeaderboard, ReputationLevel, ScoreBucket, TopPerformer,
    UserId, UserReputationSummary, ViolationSeverity,
};
pub use leaderboard::{
    cache_key, period_for, LeaderboardCalculator, LeaderboardConfig, LeaderboardError,
};
pub use levels::{
    features_for, FeatureAction, LevelThresholds, LevelTransition, ThresholdError,
};
pub use processor::{
    Collaborators, EventProcessor, HealthMetrics, PipelineConfig, ProcessingError,
    HEALTH_METRICS_KEY,
};
pub use repository::{
    AchievementError, AchievementService, CacheStore, Clock, EscalationError, EventLog,
    FeatureGate, GateError, LeaderboardStore, ModerationEscalator, NoticeKind,
    NotificationPublisher, NotifyError, PipelineMonitor, ReputationNotice, SnapshotRecord,
    SnapshotStore, StoreError, SummaryStore, SystemClock,
};
pub use router::{pipeline_router, ProcessEventRequest};
pub use sampling::{AlwaysSample, EveryNth, NeverSample, SamplingPolicy};
pub use summary::{RefreshError, RefreshOutcome, SummaryRefresher};
