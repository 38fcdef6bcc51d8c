use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::domain::{
    LeaderboardKind, RankingEntry, ReputationLeaderboard, UserId,
};
use super::repository::{CacheStore, Clock, EventLog, LeaderboardStore, StoreError};

/// Tuning for the staleness gate and stored ranking size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardConfig {
    /// Rankings stored per leaderboard; `total_participants` still counts
    /// every distinct scorer.
    pub top_n: usize,
    pub daily_max_age_minutes: i64,
    pub weekly_max_age_minutes: i64,
    pub monthly_max_age_minutes: i64,
    pub all_time_max_age_minutes: i64,
    pub cache_ttl_minutes: i64,
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            top_n: 50,
            daily_max_age_minutes: 5,
            weekly_max_age_minutes: 15,
            monthly_max_age_minutes: 60,
            all_time_max_age_minutes: 360,
            cache_ttl_minutes: 15,
        }
    }
}

impl LeaderboardConfig {
    pub fn max_age(&self, kind: LeaderboardKind) -> Duration {
        let minutes = match kind {
            LeaderboardKind::Daily => self.daily_max_age_minutes,
            LeaderboardKind::Weekly => self.weekly_max_age_minutes,
            LeaderboardKind::Monthly => self.monthly_max_age_minutes,
            LeaderboardKind::AllTime => self.all_time_max_age_minutes,
        };
        Duration::minutes(minutes)
    }
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Resolve the half-open `[start, end)` window containing `date` for a
/// leaderboard kind. All-time is unbounded on both sides.
pub fn period_for(
    kind: LeaderboardKind,
    date: NaiveDate,
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    match kind {
        LeaderboardKind::Daily => (
            Some(day_start(date)),
            Some(day_start(date + Duration::days(1))),
        ),
        LeaderboardKind::Weekly => {
            let monday = date.week(Weekday::Mon).first_day();
            (
                Some(day_start(monday)),
                Some(day_start(monday + Duration::days(7))),
            )
        }
        LeaderboardKind::Monthly => {
            let first = date.with_day0(0).unwrap_or(date);
            let next = first
                .checked_add_months(Months::new(1))
                .unwrap_or(first);
            (Some(day_start(first)), Some(day_start(next)))
        }
        LeaderboardKind::AllTime => (None, None),
    }
}

pub fn cache_key(kind: LeaderboardKind, date: NaiveDate) -> String {
    format!("leaderboard:{}:{}", kind.label(), date)
}

#[derive(Debug, thiserror::Error)]
pub enum LeaderboardError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Ranks participants for a period, recomputing only when the stored board is
/// provably outdated. Bounds recomputation frequency under high event volume.
pub struct LeaderboardCalculator<E, L> {
    log: Arc<E>,
    boards: Arc<L>,
    cache: Arc<dyn CacheStore>,
    config: LeaderboardConfig,
    clock: Arc<dyn Clock>,
    recomputes: AtomicU64,
}

impl<E, L> LeaderboardCalculator<E, L>
where
    E: EventLog,
    L: LeaderboardStore,
{
    pub fn new(
        log: Arc<E>,
        boards: Arc<L>,
        cache: Arc<dyn CacheStore>,
        config: LeaderboardConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            log,
            boards,
            cache,
            config,
            clock,
            recomputes: AtomicU64::new(0),
        }
    }

    /// Resolve the leaderboard for the period containing `date`, recomputing
    /// only if the stored row is stale: older than the newest event in the
    /// period, or past the kind's max-age ceiling.
    pub fn get_or_calculate(
        &self,
        kind: LeaderboardKind,
        date: NaiveDate,
    ) -> Result<ReputationLeaderboard, LeaderboardError> {
        let (start, end) = period_for(kind, date);
        let now = self.clock.now();

        if let Some(board) = self.boards.fetch(kind, start)? {
            let aged =
                now.signed_duration_since(board.last_calculated_at) > self.config.max_age(kind);
            let outdated = if aged {
                true
            } else {
                match self.log.latest_event_at(start, end)? {
                    Some(newest) => newest > board.last_calculated_at,
                    None => false,
                }
            };
            if !outdated {
                return Ok(board);
            }
        }

        self.recalculate(kind, date, start, end, now)
    }

    /// Invalidate the cached top-N for the period containing `date`. Called
    /// when an event lands inside the period; the staleness gate decides
    /// whether the next read actually recomputes.
    pub fn mark_touched(&self, kind: LeaderboardKind, date: NaiveDate) {
        self.cache.invalidate(&cache_key(kind, date));
    }

    /// Number of full ranking passes performed. Health metric, and the hook
    /// the staleness tests assert against.
    pub fn recomputes(&self) -> u64 {
        self.recomputes.load(Ordering::Relaxed)
    }

    fn recalculate(
        &self,
        kind: LeaderboardKind,
        date: NaiveDate,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<ReputationLeaderboard, LeaderboardError> {
        let events = self.log.events_between(start, end)?;

        let mut totals: BTreeMap<UserId, i64> = BTreeMap::new();
        for event in &events {
            let entry = totals.entry(event.user_id.clone()).or_insert(0);
            *entry = entry.saturating_add(event.points_change);
        }

        let total_participants = totals.len();
        let mut ranked: Vec<(UserId, i64)> = totals.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let rankings: Vec<RankingEntry> = ranked
            .into_iter()
            .take(self.config.top_n)
            .enumerate()
            .map(|(index, (user_id, score))| RankingEntry {
                user_id,
                score,
                rank: index as u32 + 1,
            })
            .collect();

        let board = ReputationLeaderboard {
            kind,
            period_start: start,
            period_end: end,
            rankings,
            total_participants,
            last_calculated_at: now,
        };
        self.boards.upsert(board.clone())?;
        self.recomputes.fetch_add(1, Ordering::Relaxed);

        match serde_json::to_string(&board) {
            Ok(payload) => self.cache.set(
                &cache_key(kind, date),
                payload,
                Duration::minutes(self.config.cache_ttl_minutes),
            ),
            Err(err) => warn!(kind = kind.label(), %err, "skipping leaderboard cache write"),
        }

        debug!(
            kind = kind.label(),
            participants = total_participants,
            stored = board.rankings.len(),
            "leaderboard recalculated"
        );
        Ok(board)
    }
}
