use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for reputation events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

/// Identifier wrapper for users. Ordered so tie-breaks are deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Closed set of reputation event kinds. `Unknown` is a first-class variant:
/// queue payloads carrying an unrecognized type string land here and are
/// handled as a no-op rather than failing the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReputationEventKind {
    Gained,
    Lost,
    Reset,
    LevelChanged,
    Unknown,
}

impl ReputationEventKind {
    pub const fn label(self) -> &'static str {
        match self {
            ReputationEventKind::Gained => "gained",
            ReputationEventKind::Lost => "lost",
            ReputationEventKind::Reset => "reset",
            ReputationEventKind::LevelChanged => "level_changed",
            ReputationEventKind::Unknown => "unknown",
        }
    }

    /// Parse a queue-provided type string. Anything unrecognized maps to
    /// `Unknown` instead of an error.
    pub fn from_label(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "gained" => ReputationEventKind::Gained,
            "lost" => ReputationEventKind::Lost,
            "reset" => ReputationEventKind::Reset,
            "level_changed" => ReputationEventKind::LevelChanged,
            _ => ReputationEventKind::Unknown,
        }
    }
}

/// Severity attached to point-loss events by moderation tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationSeverity {
    Low,
    Normal,
    High,
}

impl ViolationSeverity {
    pub const fn label(self) -> &'static str {
        match self {
            ViolationSeverity::Low => "low",
            ViolationSeverity::Normal => "normal",
            ViolationSeverity::High => "high",
        }
    }
}

/// Immutable record of a reputation-affecting action. The event log is
/// append-only; every derived read model must be reproducible from these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationEvent {
    pub event_id: EventId,
    pub user_id: UserId,
    pub kind: ReputationEventKind,
    pub points_change: i64,
    pub reason: String,
    pub violation_type: Option<String>,
    pub severity: Option<ViolationSeverity>,
    pub source_type: Option<String>,
    pub source_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Reputation tier derived from the total score. Variant order matches score
/// order so promotions compare with `>`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ReputationLevel {
    Restricted,
    Probation,
    Regular,
    Trusted,
    Exemplary,
}

impl ReputationLevel {
    pub const fn label(self) -> &'static str {
        match self {
            ReputationLevel::Restricted => "restricted",
            ReputationLevel::Probation => "probation",
            ReputationLevel::Regular => "regular",
            ReputationLevel::Trusted => "trusted",
            ReputationLevel::Exemplary => "exemplary",
        }
    }

    pub fn ordered() -> [ReputationLevel; 5] {
        [
            ReputationLevel::Restricted,
            ReputationLevel::Probation,
            ReputationLevel::Regular,
            ReputationLevel::Trusted,
            ReputationLevel::Exemplary,
        ]
    }
}

/// Derived per-user aggregate. Rebuilt by the summary refresher only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserReputationSummary {
    pub user_id: UserId,
    pub total_score: i64,
    pub level: ReputationLevel,
    pub last_refreshed_at: DateTime<Utc>,
}

/// Ranking window for a leaderboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeaderboardKind {
    Daily,
    Weekly,
    Monthly,
    AllTime,
}

impl LeaderboardKind {
    pub const fn label(self) -> &'static str {
        match self {
            LeaderboardKind::Daily => "daily",
            LeaderboardKind::Weekly => "weekly",
            LeaderboardKind::Monthly => "monthly",
            LeaderboardKind::AllTime => "all_time",
        }
    }

    pub fn from_label(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "daily" => Some(LeaderboardKind::Daily),
            "weekly" => Some(LeaderboardKind::Weekly),
            "monthly" => Some(LeaderboardKind::Monthly),
            "all_time" | "alltime" => Some(LeaderboardKind::AllTime),
            _ => None,
        }
    }

    pub fn ordered() -> [LeaderboardKind; 4] {
        [
            LeaderboardKind::Daily,
            LeaderboardKind::Weekly,
            LeaderboardKind::Monthly,
            LeaderboardKind::AllTime,
        ]
    }
}

/// One row of a stored ranking. Ranks are 1-based and contiguous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub user_id: UserId,
    pub score: i64,
    pub rank: u32,
}

/// Derived ranking for one `(kind, period)`. `period_start`/`period_end` are
/// `None` for the unbounded all-time window; `period_end` is exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationLeaderboard {
    pub kind: LeaderboardKind,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub rankings: Vec<RankingEntry>,
    pub total_participants: usize,
    pub last_calculated_at: DateTime<Utc>,
}

/// One histogram bucket of the daily snapshot. Bounds come from the shared
/// level threshold table; `None` means unbounded on that side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBucket {
    pub level: ReputationLevel,
    pub floor: Option<i64>,
    pub ceiling: Option<i64>,
    pub count: usize,
}

/// Snapshot entry for the day's strongest scorers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopPerformer {
    pub user_id: UserId,
    pub score: i64,
}

/// Global derived view over one calendar date of events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    pub snapshot_date: NaiveDate,
    pub total_users: usize,
    pub average_score: f64,
    pub level_distribution: BTreeMap<ReputationLevel, usize>,
    pub score_buckets: Vec<ScoreBucket>,
    pub top_performers: Vec<TopPerformer>,
    pub total_points_awarded: i64,
    pub total_points_deducted: i64,
}

/// Per-user aggregate for a single day, kept alongside the snapshot so an
/// incremental merge never rescans other users' events.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyActivity {
    pub net: i64,
    pub awarded: i64,
    pub deducted: i64,
}

impl DailyActivity {
    pub fn absorb(&mut self, points_change: i64) {
        self.net = self.net.saturating_add(points_change);
        if points_change >= 0 {
            self.awarded = self.awarded.saturating_add(points_change);
        } else {
            self.deducted = self.deducted.saturating_add(points_change.saturating_neg());
        }
    }
}
