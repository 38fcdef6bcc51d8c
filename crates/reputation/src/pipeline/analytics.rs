use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde_json::json;
use tracing::{debug, warn};

use super::domain::{
    AnalyticsSnapshot, DailyActivity, ReputationEvent, ReputationEventKind, ScoreBucket,
    TopPerformer, UserId,
};
use super::levels::LevelThresholds;
use super::repository::{
    CacheStore, Clock, EventLog, SnapshotRecord, SnapshotStore, StoreError, SummaryStore,
};
use super::sampling::SamplingPolicy;

pub fn user_analytics_key(user: &UserId) -> String {
    format!("user_analytics:{}", user.0)
}

#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Builds and maintains the global daily snapshot. A date rollover triggers a
/// full regenerate over the day's events; within a date only the changed
/// user's slice is recomputed and merged into the stored activity map.
pub struct AnalyticsSnapshotGenerator<E, SS, SM> {
    log: Arc<E>,
    snapshots: Arc<SS>,
    summaries: Arc<SM>,
    cache: Arc<dyn CacheStore>,
    sampling: Arc<dyn SamplingPolicy>,
    thresholds: LevelThresholds,
    clock: Arc<dyn Clock>,
    user_cache_ttl: Duration,
    // The one required serialization point in the pipeline: incremental
    // merges for the same date must not interleave their read-modify-write.
    date_locks: Mutex<HashMap<NaiveDate, Arc<Mutex<()>>>>,
}

impl<E, SS, SM> AnalyticsSnapshotGenerator<E, SS, SM>
where
    E: EventLog,
    SS: SnapshotStore,
    SM: SummaryStore,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        log: Arc<E>,
        snapshots: Arc<SS>,
        summaries: Arc<SM>,
        cache: Arc<dyn CacheStore>,
        sampling: Arc<dyn SamplingPolicy>,
        thresholds: LevelThresholds,
        clock: Arc<dyn Clock>,
        user_cache_ttl: Duration,
    ) -> Self {
        Self {
            log,
            snapshots,
            summaries,
            cache,
            sampling,
            thresholds,
            clock,
            user_cache_ttl,
            date_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Full regenerate of the snapshot for `date` (today when omitted).
    pub fn generate_daily(
        &self,
        date: Option<NaiveDate>,
    ) -> Result<AnalyticsSnapshot, AnalyticsError> {
        let date = date.unwrap_or_else(|| self.clock.now().date_naive());
        let lock = self.date_lock(date);
        let _serialized = lock_guard(&lock);
        self.regenerate(date)
    }

    /// Merge one user's delta into today's snapshot without rescanning the
    /// rest of the day. The user's daily slice is recomputed from the log and
    /// replaces the stored entry, which keeps the merge idempotent under
    /// at-least-once redelivery.
    pub fn update_incremental(&self, user: &UserId) -> Result<AnalyticsSnapshot, AnalyticsError> {
        let date = self.clock.now().date_naive();
        let lock = self.date_lock(date);
        let _serialized = lock_guard(&lock);

        let snapshot = match self.snapshots.fetch(date)? {
            // Date rollover (or first event of the day): fall back to the
            // full aggregation path.
            None => self.regenerate(date)?,
            Some(mut record) => {
                let fresh = self.daily_activity_for(user, date)?;
                match fresh {
                    Some(activity) => {
                        record.activity.insert(user.clone(), activity);
                    }
                    None => {
                        record.activity.remove(user);
                    }
                }
                record.snapshot = self.build(date, &record.activity)?;
                self.snapshots.upsert(record.clone())?;
                debug!(
                    user = %user.0,
                    %date,
                    total_users = record.snapshot.total_users,
                    "snapshot merged incrementally"
                );
                record.snapshot
            }
        };

        self.write_user_cache(user, date);
        Ok(snapshot)
    }

    /// Apply the sampling discipline and update if the event qualifies.
    /// Resets and level changes always update; gained/lost events go through
    /// the injected policy.
    pub fn maybe_update(
        &self,
        event: &ReputationEvent,
    ) -> Result<Option<AnalyticsSnapshot>, AnalyticsError> {
        let forced = matches!(
            event.kind,
            ReputationEventKind::Reset | ReputationEventKind::LevelChanged
        );
        if !forced && !self.sampling.should_sample(event) {
            return Ok(None);
        }
        self.update_incremental(&event.user_id).map(Some)
    }

    fn regenerate(&self, date: NaiveDate) -> Result<AnalyticsSnapshot, AnalyticsError> {
        let (start, end) = day_bounds(date);
        let events = self.log.events_between(Some(start), Some(end))?;

        let mut activity: BTreeMap<UserId, DailyActivity> = BTreeMap::new();
        for event in &events {
            activity
                .entry(event.user_id.clone())
                .or_default()
                .absorb(event.points_change);
        }

        let snapshot = self.build(date, &activity)?;
        self.snapshots.upsert(SnapshotRecord {
            snapshot: snapshot.clone(),
            activity,
        })?;
        debug!(
            %date,
            total_users = snapshot.total_users,
            events = events.len(),
            "snapshot regenerated"
        );
        Ok(snapshot)
    }

    fn daily_activity_for(
        &self,
        user: &UserId,
        date: NaiveDate,
    ) -> Result<Option<DailyActivity>, AnalyticsError> {
        let (start, end) = day_bounds(date);
        let mut activity: Option<DailyActivity> = None;
        for event in self.log.events_for_user(user)? {
            if event.created_at >= start && event.created_at < end {
                activity
                    .get_or_insert_with(DailyActivity::default)
                    .absorb(event.points_change);
            }
        }
        Ok(activity)
    }

    fn build(
        &self,
        date: NaiveDate,
        activity: &BTreeMap<UserId, DailyActivity>,
    ) -> Result<AnalyticsSnapshot, AnalyticsError> {
        let total_users = activity.len();
        let average_score = if total_users == 0 {
            0.0
        } else {
            activity.values().map(|a| a.net as f64).sum::<f64>() / total_users as f64
        };

        let mut score_buckets: Vec<ScoreBucket> = self
            .thresholds
            .buckets()
            .into_iter()
            .map(|bounds| ScoreBucket {
                level: bounds.level,
                floor: bounds.floor,
                ceiling: bounds.ceiling,
                count: 0,
            })
            .collect();
        let mut level_distribution: BTreeMap<_, usize> = BTreeMap::new();
        let mut total_points_awarded: i64 = 0;
        let mut total_points_deducted: i64 = 0;

        for (user, daily) in activity {
            for bucket in score_buckets.iter_mut() {
                let above_floor = bucket.floor.map_or(true, |floor| daily.net >= floor);
                let below_ceiling = bucket.ceiling.map_or(true, |ceiling| daily.net <= ceiling);
                if above_floor && below_ceiling {
                    bucket.count += 1;
                    break;
                }
            }

            // Distribution reflects where users currently stand; the daily
            // net is only a fallback for users without a stored summary yet.
            let level = match self.summaries.fetch(user)? {
                Some(summary) => summary.level,
                None => self.thresholds.classify(daily.net),
            };
            *level_distribution.entry(level).or_insert(0) += 1;

            total_points_awarded = total_points_awarded.saturating_add(daily.awarded);
            total_points_deducted = total_points_deducted.saturating_add(daily.deducted);
        }

        let mut performers: Vec<(UserId, i64)> = activity
            .iter()
            .map(|(user, daily)| (user.clone(), daily.net))
            .collect();
        performers.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let top_performers = performers
            .into_iter()
            .take(10)
            .map(|(user_id, score)| TopPerformer { user_id, score })
            .collect();

        Ok(AnalyticsSnapshot {
            snapshot_date: date,
            total_users,
            average_score,
            level_distribution,
            score_buckets,
            top_performers,
            total_points_awarded,
            total_points_deducted,
        })
    }

    fn write_user_cache(&self, user: &UserId, date: NaiveDate) {
        let daily = match self.daily_activity_for(user, date) {
            Ok(daily) => daily.unwrap_or_default(),
            Err(err) => {
                warn!(user = %user.0, %err, "skipping user analytics cache write");
                return;
            }
        };
        let payload = json!({
            "user_id": user.0,
            "snapshot_date": date,
            "daily_net": daily.net,
            "daily_awarded": daily.awarded,
            "daily_deducted": daily.deducted,
        });
        self.cache
            .set(&user_analytics_key(user), payload.to_string(), self.user_cache_ttl);
    }

    fn date_lock(&self, date: NaiveDate) -> Arc<Mutex<()>> {
        let mut locks = self
            .date_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(date)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(NaiveTime::MIN).and_utc();
    (start, start + Duration::days(1))
}

fn lock_guard(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
