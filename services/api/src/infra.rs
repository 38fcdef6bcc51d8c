use chrono::{DateTime, Duration, NaiveDate, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use reputation::pipeline::{
    AchievementError, AchievementService, CacheStore, Clock, EscalationError, EventId, EventLog,
    FeatureGate, GateError, LeaderboardKind, LeaderboardStore, ModerationEscalator,
    NotificationPublisher, NotifyError, PipelineConfig, PipelineMonitor, ReputationEvent,
    ReputationEventKind, ReputationLeaderboard, ReputationNotice, SnapshotRecord, SnapshotStore,
    StoreError, SummaryStore, SystemClock, UserId, UserReputationSummary, ViolationSeverity,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryEventLog {
    events: Arc<Mutex<Vec<ReputationEvent>>>,
}

impl EventLog for InMemoryEventLog {
    fn append(&self, event: ReputationEvent) -> Result<ReputationEvent, StoreError> {
        let mut guard = self.events.lock().expect("event log mutex poisoned");
        guard.push(event.clone());
        Ok(event)
    }

    fn find(
        &self,
        event_id: &EventId,
        kind: ReputationEventKind,
    ) -> Result<Option<ReputationEvent>, StoreError> {
        let guard = self.events.lock().expect("event log mutex poisoned");
        Ok(guard
            .iter()
            .find(|event| &event.event_id == event_id && event.kind == kind)
            .cloned())
    }

    fn events_for_user(&self, user: &UserId) -> Result<Vec<ReputationEvent>, StoreError> {
        let guard = self.events.lock().expect("event log mutex poisoned");
        Ok(guard
            .iter()
            .filter(|event| &event.user_id == user)
            .cloned()
            .collect())
    }

    fn events_between(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<ReputationEvent>, StoreError> {
        let guard = self.events.lock().expect("event log mutex poisoned");
        Ok(guard
            .iter()
            .filter(|event| {
                start.map_or(true, |start| event.created_at >= start)
                    && end.map_or(true, |end| event.created_at < end)
            })
            .cloned()
            .collect())
    }

    fn latest_event_at(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self
            .events_between(start, end)?
            .iter()
            .map(|event| event.created_at)
            .max())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemorySummaryStore {
    summaries: Arc<Mutex<HashMap<UserId, UserReputationSummary>>>,
}

impl SummaryStore for InMemorySummaryStore {
    fn fetch(&self, user: &UserId) -> Result<Option<UserReputationSummary>, StoreError> {
        let guard = self.summaries.lock().expect("summary mutex poisoned");
        Ok(guard.get(user).cloned())
    }

    fn upsert(&self, summary: UserReputationSummary) -> Result<(), StoreError> {
        let mut guard = self.summaries.lock().expect("summary mutex poisoned");
        guard.insert(summary.user_id.clone(), summary);
        Ok(())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryLeaderboardStore {
    boards: Arc<Mutex<HashMap<(LeaderboardKind, Option<DateTime<Utc>>), ReputationLeaderboard>>>,
}

impl LeaderboardStore for InMemoryLeaderboardStore {
    fn fetch(
        &self,
        kind: LeaderboardKind,
        period_start: Option<DateTime<Utc>>,
    ) -> Result<Option<ReputationLeaderboard>, StoreError> {
        let guard = self.boards.lock().expect("leaderboard mutex poisoned");
        Ok(guard.get(&(kind, period_start)).cloned())
    }

    fn upsert(&self, board: ReputationLeaderboard) -> Result<(), StoreError> {
        let mut guard = self.boards.lock().expect("leaderboard mutex poisoned");
        guard.insert((board.kind, board.period_start), board);
        Ok(())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemorySnapshotStore {
    records: Arc<Mutex<BTreeMap<NaiveDate, SnapshotRecord>>>,
}

impl SnapshotStore for InMemorySnapshotStore {
    fn fetch(&self, date: NaiveDate) -> Result<Option<SnapshotRecord>, StoreError> {
        let guard = self.records.lock().expect("snapshot mutex poisoned");
        Ok(guard.get(&date).cloned())
    }

    fn latest(&self) -> Result<Option<SnapshotRecord>, StoreError> {
        let guard = self.records.lock().expect("snapshot mutex poisoned");
        Ok(guard.values().next_back().cloned())
    }

    fn upsert(&self, record: SnapshotRecord) -> Result<(), StoreError> {
        let mut guard = self.records.lock().expect("snapshot mutex poisoned");
        guard.insert(record.snapshot.snapshot_date, record);
        Ok(())
    }
}

/// Process-local TTL cache. Entries expire lazily on read.
#[derive(Default, Clone)]
pub(crate) struct InMemoryCache {
    entries: Arc<Mutex<HashMap<String, (String, DateTime<Utc>)>>>,
}

impl CacheStore for InMemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        let mut guard = self.entries.lock().expect("cache mutex poisoned");
        match guard.get(key) {
            Some((value, expires_at)) if *expires_at > SystemClock.now() => Some(value.clone()),
            Some(_) => {
                guard.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: &str, value: String, ttl: Duration) {
        let mut guard = self.entries.lock().expect("cache mutex poisoned");
        guard.insert(key.to_string(), (value, SystemClock.now() + ttl));
    }

    fn invalidate(&self, key: &str) {
        let mut guard = self.entries.lock().expect("cache mutex poisoned");
        guard.remove(key);
    }
}

/// Stand-in notification adapter: structured log lines instead of a real
/// transport.
#[derive(Default, Clone)]
pub(crate) struct LoggingNotificationPublisher;

impl NotificationPublisher for LoggingNotificationPublisher {
    fn publish(&self, notice: ReputationNotice) -> Result<(), NotifyError> {
        info!(
            kind = notice.kind.label(),
            user = %notice.user_id.0,
            "notification dispatched"
        );
        Ok(())
    }
}

#[derive(Default, Clone)]
pub(crate) struct LoggingModerationEscalator;

impl ModerationEscalator for LoggingModerationEscalator {
    fn open_ticket(
        &self,
        user: &UserId,
        severity: ViolationSeverity,
        context: &str,
    ) -> Result<(), EscalationError> {
        warn!(
            user = %user.0,
            severity = severity.label(),
            context,
            "moderation ticket opened"
        );
        Ok(())
    }
}

#[derive(Default, Clone)]
pub(crate) struct LoggingAchievementService;

impl AchievementService for LoggingAchievementService {
    fn check_and_award(&self, user: &UserId, score: i64) -> Result<(), AchievementError> {
        info!(user = %user.0, score, "achievement thresholds checked");
        Ok(())
    }
}

#[derive(Default, Clone)]
pub(crate) struct LoggingFeatureGate;

impl FeatureGate for LoggingFeatureGate {
    fn unlock(&self, user: &UserId, features: &[&str]) -> Result<(), GateError> {
        info!(user = %user.0, ?features, "features unlocked");
        Ok(())
    }

    fn restrict(&self, user: &UserId, features: &[&str]) -> Result<(), GateError> {
        warn!(user = %user.0, ?features, "features restricted");
        Ok(())
    }
}

#[derive(Default, Clone)]
pub(crate) struct LoggingMonitor;

impl PipelineMonitor for LoggingMonitor {
    fn critical(&self, user: Option<&UserId>, context: &str) {
        match user {
            Some(user) => error!(user = %user.0, context, "critical pipeline fault"),
            None => error!(context, "critical pipeline fault"),
        }
    }
}

pub(crate) fn default_pipeline_config() -> PipelineConfig {
    PipelineConfig::default()
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
