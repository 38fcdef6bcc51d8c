use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

use crate::pipeline::domain::{
    EventId, LeaderboardKind, ReputationEvent, ReputationEventKind, ReputationLeaderboard,
    UserId, UserReputationSummary, ViolationSeverity,
};
use crate::pipeline::processor::{Collaborators, EventProcessor, PipelineConfig};
use crate::pipeline::repository::{
    AchievementError, AchievementService, CacheStore, Clock, EscalationError, EventLog,
    FeatureGate, GateError, LeaderboardStore, ModerationEscalator, NotificationPublisher,
    NotifyError, PipelineMonitor, ReputationNotice, SnapshotRecord, SnapshotStore, StoreError,
    SummaryStore,
};
use crate::pipeline::sampling::{AlwaysSample, SamplingPolicy};

pub(super) fn at(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn midday() -> DateTime<Utc> {
    at(2026, 3, 10, 12, 0)
}

pub(super) fn test_date() -> NaiveDate {
    midday().date_naive()
}

/// Settable clock so staleness gates, TTLs, and breaker recovery windows are
/// deterministic.
pub(super) struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub(super) fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub(super) fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().expect("clock mutex poisoned") = to;
    }

    pub(super) fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().expect("clock mutex poisoned");
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

#[derive(Default)]
pub(super) struct MemoryEventLog {
    events: Mutex<Vec<ReputationEvent>>,
}

impl EventLog for MemoryEventLog {
    fn append(&self, event: ReputationEvent) -> Result<ReputationEvent, StoreError> {
        self.events
            .lock()
            .expect("event log mutex poisoned")
            .push(event.clone());
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

/// Event log that reports corruption on every read; exercises the critical
/// error path into the monitoring collaborator.
pub(super) struct CorruptedEventLog;

impl EventLog for CorruptedEventLog {
    fn append(&self, _event: ReputationEvent) -> Result<ReputationEvent, StoreError> {
        Err(StoreError::Corrupted("checksum mismatch".to_string()))
    }

    fn find(
        &self,
        _event_id: &EventId,
        _kind: ReputationEventKind,
    ) -> Result<Option<ReputationEvent>, StoreError> {
        Err(StoreError::Corrupted("checksum mismatch".to_string()))
    }

    fn events_for_user(&self, _user: &UserId) -> Result<Vec<ReputationEvent>, StoreError> {
        Err(StoreError::Corrupted("checksum mismatch".to_string()))
    }

    fn events_between(
        &self,
        _start: Option<DateTime<Utc>>,
        _end: Option<DateTime<Utc>>,
    ) -> Result<Vec<ReputationEvent>, StoreError> {
        Err(StoreError::Corrupted("checksum mismatch".to_string()))
    }

    fn latest_event_at(
        &self,
        _start: Option<DateTime<Utc>>,
        _end: Option<DateTime<Utc>>,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        Err(StoreError::Corrupted("checksum mismatch".to_string()))
    }
}

/// Event log that is always down; exercises transient failure propagation.
pub(super) struct UnavailableEventLog;

impl EventLog for UnavailableEventLog {
    fn append(&self, _event: ReputationEvent) -> Result<ReputationEvent, StoreError> {
        Err(StoreError::Unavailable("event log offline".to_string()))
    }

    fn find(
        &self,
        _event_id: &EventId,
        _kind: ReputationEventKind,
    ) -> Result<Option<ReputationEvent>, StoreError> {
        Err(StoreError::Unavailable("event log offline".to_string()))
    }

    fn events_for_user(&self, _user: &UserId) -> Result<Vec<ReputationEvent>, StoreError> {
        Err(StoreError::Unavailable("event log offline".to_string()))
    }

    fn events_between(
        &self,
        _start: Option<DateTime<Utc>>,
        _end: Option<DateTime<Utc>>,
    ) -> Result<Vec<ReputationEvent>, StoreError> {
        Err(StoreError::Unavailable("event log offline".to_string()))
    }

    fn latest_event_at(
        &self,
        _start: Option<DateTime<Utc>>,
        _end: Option<DateTime<Utc>>,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        Err(StoreError::Unavailable("event log offline".to_string()))
    }
}

#[derive(Default)]
pub(super) struct MemorySummaryStore {
    summaries: Mutex<HashMap<UserId, UserReputationSummary>>,
}

impl SummaryStore for MemorySummaryStore {
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

#[derive(Default)]
pub(super) struct MemoryLeaderboardStore {
    boards: Mutex<HashMap<(LeaderboardKind, Option<DateTime<Utc>>), ReputationLeaderboard>>,
}

impl LeaderboardStore for MemoryLeaderboardStore {
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

#[derive(Default)]
pub(super) struct MemorySnapshotStore {
    records: Mutex<BTreeMap<NaiveDate, SnapshotRecord>>,
}

impl SnapshotStore for MemorySnapshotStore {
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

#[derive(Default)]
pub(super) struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Duration)>>,
}

impl MemoryCache {
    pub(super) fn entry(&self, key: &str) -> Option<(String, Duration)> {
        self.entries
            .lock()
            .expect("cache mutex poisoned")
            .get(key)
            .cloned()
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        self.entry(key).map(|(value, _)| value)
    }

    fn set(&self, key: &str, value: String, ttl: Duration) {
        self.entries
            .lock()
            .expect("cache mutex poisoned")
            .insert(key.to_string(), (value, ttl));
    }

    fn invalidate(&self, key: &str) {
        self.entries
            .lock()
            .expect("cache mutex poisoned")
            .remove(key);
    }
}

#[derive(Default)]
pub(super) struct RecordingNotifications {
    notices: Mutex<Vec<ReputationNotice>>,
}

impl RecordingNotifications {
    pub(super) fn notices(&self) -> Vec<ReputationNotice> {
        self.notices.lock().expect("notice mutex poisoned").clone()
    }
}

impl NotificationPublisher for RecordingNotifications {
    fn publish(&self, notice: ReputationNotice) -> Result<(), NotifyError> {
        self.notices
            .lock()
            .expect("notice mutex poisoned")
            .push(notice);
        Ok(())
    }
}

/// Publisher that always fails, counting attempts; drives the breaker tests
/// and the fire-and-forget assertions.
#[derive(Default)]
pub(super) struct FailingNotifications {
    pub(super) attempts: AtomicU64,
}

impl FailingNotifications {
    pub(super) fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }
}

impl NotificationPublisher for FailingNotifications {
    fn publish(&self, _notice: ReputationNotice) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        Err(NotifyError::Transport("smtp offline".to_string()))
    }
}

/// Publisher that fails a scripted number of times before recovering.
#[derive(Default)]
pub(super) struct ScriptedNotifications {
    failures_remaining: AtomicU64,
    notices: Mutex<Vec<ReputationNotice>>,
}

impl ScriptedNotifications {
    pub(super) fn failing(times: u64) -> Self {
        Self {
            failures_remaining: AtomicU64::new(times),
            notices: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn notices(&self) -> Vec<ReputationNotice> {
        self.notices.lock().expect("notice mutex poisoned").clone()
    }
}

impl NotificationPublisher for ScriptedNotifications {
    fn publish(&self, notice: ReputationNotice) -> Result<(), NotifyError> {
        let remaining = self.failures_remaining.load(Ordering::Relaxed);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::Relaxed);
            return Err(NotifyError::Transport("webhook timeout".to_string()));
        }
        self.notices
            .lock()
            .expect("notice mutex poisoned")
            .push(notice);
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct RecordingModeration {
    tickets: Mutex<Vec<(UserId, ViolationSeverity, String)>>,
}

impl RecordingModeration {
    pub(super) fn tickets(&self) -> Vec<(UserId, ViolationSeverity, String)> {
        self.tickets.lock().expect("ticket mutex poisoned").clone()
    }
}

impl ModerationEscalator for RecordingModeration {
    fn open_ticket(
        &self,
        user: &UserId,
        severity: ViolationSeverity,
        context: &str,
    ) -> Result<(), EscalationError> {
        self.tickets
            .lock()
            .expect("ticket mutex poisoned")
            .push((user.clone(), severity, context.to_string()));
        Ok(())
    }
}

pub(super) struct FailingModeration;

impl ModerationEscalator for FailingModeration {
    fn open_ticket(
        &self,
        _user: &UserId,
        _severity: ViolationSeverity,
        _context: &str,
    ) -> Result<(), EscalationError> {
        Err(EscalationError::Transport("ticket queue offline".to_string()))
    }
}

#[derive(Default)]
pub(super) struct RecordingAchievements {
    checks: Mutex<Vec<(UserId, i64)>>,
}

impl RecordingAchievements {
    pub(super) fn checks(&self) -> Vec<(UserId, i64)> {
        self.checks.lock().expect("achievement mutex poisoned").clone()
    }
}

impl AchievementService for RecordingAchievements {
    fn check_and_award(&self, user: &UserId, score: i64) -> Result<(), AchievementError> {
        self.checks
            .lock()
            .expect("achievement mutex poisoned")
            .push((user.clone(), score));
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct RecordingGates {
    unlocks: Mutex<Vec<(UserId, Vec<String>)>>,
    restricts: Mutex<Vec<(UserId, Vec<String>)>>,
}

impl RecordingGates {
    pub(super) fn unlocks(&self) -> Vec<(UserId, Vec<String>)> {
        self.unlocks.lock().expect("gate mutex poisoned").clone()
    }

    pub(super) fn restricts(&self) -> Vec<(UserId, Vec<String>)> {
        self.restricts.lock().expect("gate mutex poisoned").clone()
    }
}

impl FeatureGate for RecordingGates {
    fn unlock(&self, user: &UserId, features: &[&str]) -> Result<(), GateError> {
        self.unlocks.lock().expect("gate mutex poisoned").push((
            user.clone(),
            features.iter().map(|f| f.to_string()).collect(),
        ));
        Ok(())
    }

    fn restrict(&self, user: &UserId, features: &[&str]) -> Result<(), GateError> {
        self.restricts.lock().expect("gate mutex poisoned").push((
            user.clone(),
            features.iter().map(|f| f.to_string()).collect(),
        ));
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct RecordingMonitor {
    incidents: Mutex<Vec<String>>,
}

impl RecordingMonitor {
    pub(super) fn incidents(&self) -> Vec<String> {
        self.incidents.lock().expect("monitor mutex poisoned").clone()
    }
}

impl PipelineMonitor for RecordingMonitor {
    fn critical(&self, user: Option<&UserId>, context: &str) {
        let entry = match user {
            Some(user) => format!("{}: {}", user.0, context),
            None => context.to_string(),
        };
        self.incidents
            .lock()
            .expect("monitor mutex poisoned")
            .push(entry);
    }
}

pub(super) fn event(
    id: &str,
    user: &str,
    kind: ReputationEventKind,
    points: i64,
    created_at: DateTime<Utc>,
) -> ReputationEvent {
    ReputationEvent {
        event_id: EventId(id.to_string()),
        user_id: UserId(user.to_string()),
        kind,
        points_change: points,
        reason: "seeded".to_string(),
        violation_type: None,
        severity: None,
        source_type: None,
        source_id: None,
        created_at,
    }
}

pub(super) fn gained(id: &str, user: &str, points: i64, created_at: DateTime<Utc>) -> ReputationEvent {
    event(id, user, ReputationEventKind::Gained, points, created_at)
}

pub(super) fn lost(
    id: &str,
    user: &str,
    points: i64,
    severity: ViolationSeverity,
    created_at: DateTime<Utc>,
) -> ReputationEvent {
    let mut event = event(id, user, ReputationEventKind::Lost, points, created_at);
    event.severity = Some(severity);
    event.violation_type = Some("conduct".to_string());
    event
}

pub(super) type TestProcessor =
    EventProcessor<MemoryEventLog, MemorySummaryStore, MemoryLeaderboardStore, MemorySnapshotStore>;

pub(super) struct Harness {
    pub(super) log: Arc<MemoryEventLog>,
    pub(super) summaries: Arc<MemorySummaryStore>,
    pub(super) boards: Arc<MemoryLeaderboardStore>,
    pub(super) snapshots: Arc<MemorySnapshotStore>,
    pub(super) cache: Arc<MemoryCache>,
    pub(super) clock: Arc<ManualClock>,
    pub(super) notifications: Arc<RecordingNotifications>,
    pub(super) moderation: Arc<RecordingModeration>,
    pub(super) achievements: Arc<RecordingAchievements>,
    pub(super) gates: Arc<RecordingGates>,
    pub(super) monitor: Arc<RecordingMonitor>,
    pub(super) processor: Arc<TestProcessor>,
}

pub(super) fn harness() -> Harness {
    harness_with(Arc::new(AlwaysSample), PipelineConfig::default())
}

pub(super) fn harness_with(
    sampling: Arc<dyn SamplingPolicy>,
    config: PipelineConfig,
) -> Harness {
    let log = Arc::new(MemoryEventLog::default());
    let summaries = Arc::new(MemorySummaryStore::default());
    let boards = Arc::new(MemoryLeaderboardStore::default());
    let snapshots = Arc::new(MemorySnapshotStore::default());
    let cache = Arc::new(MemoryCache::default());
    let clock = Arc::new(ManualClock::new(midday()));
    let notifications = Arc::new(RecordingNotifications::default());
    let moderation = Arc::new(RecordingModeration::default());
    let achievements = Arc::new(RecordingAchievements::default());
    let gates = Arc::new(RecordingGates::default());
    let monitor = Arc::new(RecordingMonitor::default());

    let processor = Arc::new(EventProcessor::new(
        log.clone(),
        summaries.clone(),
        boards.clone(),
        snapshots.clone(),
        cache.clone(),
        Collaborators {
            notifications: notifications.clone(),
            moderation: moderation.clone(),
            achievements: achievements.clone(),
            gates: gates.clone(),
            monitor: monitor.clone(),
        },
        sampling,
        clock.clone(),
        config,
    ));

    Harness {
        log,
        summaries,
        boards,
        snapshots,
        cache,
        clock,
        notifications,
        moderation,
        achievements,
        gates,
        monitor,
        processor,
    }
}

pub(super) fn no_metadata() -> BTreeMap<String, String> {
    BTreeMap::new()
}
