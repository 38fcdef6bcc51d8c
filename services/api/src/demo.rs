use crate::infra::{
    default_pipeline_config, InMemoryCache, InMemoryEventLog, InMemoryLeaderboardStore,
    InMemorySnapshotStore, InMemorySummaryStore, LoggingAchievementService, LoggingFeatureGate,
    LoggingModerationEscalator, LoggingMonitor, LoggingNotificationPublisher,
};
use crate::routes::ApiProcessor;
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, Utc};
use clap::Args;
use reputation::error::AppError;
use reputation::pipeline::{
    AlwaysSample, Collaborators, EventId, EventLog, EventProcessor, LeaderboardKind,
    ReputationEvent, ReputationEventKind, ReputationLeaderboard, SystemClock, UserId,
    ViolationSeverity,
};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Date the seeded event stream is placed on (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) date: Option<NaiveDate>,
    /// Show every stored ranking instead of the daily board only.
    #[arg(long)]
    pub(crate) all_boards: bool,
}

#[derive(Args, Debug)]
pub(crate) struct LeaderboardReportArgs {
    /// Leaderboard type: daily, weekly, monthly, or all_time
    #[arg(long, default_value = "daily")]
    pub(crate) kind: String,
    /// Date inside the period to report on (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) date: Option<NaiveDate>,
}

fn build_processor() -> (Arc<ApiProcessor>, Arc<InMemoryEventLog>) {
    let log = Arc::new(InMemoryEventLog::default());
    let processor = Arc::new(EventProcessor::new(
        log.clone(),
        Arc::new(InMemorySummaryStore::default()),
        Arc::new(InMemoryLeaderboardStore::default()),
        Arc::new(InMemorySnapshotStore::default()),
        Arc::new(InMemoryCache::default()),
        Collaborators {
            notifications: Arc::new(LoggingNotificationPublisher),
            moderation: Arc::new(LoggingModerationEscalator),
            achievements: Arc::new(LoggingAchievementService),
            gates: Arc::new(LoggingFeatureGate),
            monitor: Arc::new(LoggingMonitor),
        },
        // The demo samples every event so the rendered snapshot is complete.
        Arc::new(AlwaysSample),
        Arc::new(SystemClock),
        default_pipeline_config(),
    ));
    (processor, log)
}

fn stamp(date: NaiveDate, hour: i64, minute: i64) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc() + Duration::hours(hour) + Duration::minutes(minute)
}

fn seeded_event(
    index: usize,
    user: &str,
    kind: ReputationEventKind,
    points: i64,
    reason: &str,
    created_at: DateTime<Utc>,
) -> ReputationEvent {
    ReputationEvent {
        event_id: EventId(format!("demo-{index:03}")),
        user_id: UserId(user.to_string()),
        kind,
        points_change: points,
        reason: reason.to_string(),
        violation_type: None,
        severity: None,
        source_type: None,
        source_id: None,
        created_at,
    }
}

/// A morning's worth of community activity: steady gains, one harsh loss, and
/// an administrative reset.
fn demo_stream(date: NaiveDate) -> Vec<ReputationEvent> {
    let mut events = vec![
        seeded_event(1, "ada", ReputationEventKind::Gained, 60, "answer accepted", stamp(date, 8, 10)),
        seeded_event(2, "bob", ReputationEventKind::Gained, 120, "bounty awarded", stamp(date, 8, 40)),
        seeded_event(3, "ada", ReputationEventKind::Gained, 50, "answer upvoted", stamp(date, 9, 5)),
        seeded_event(4, "cyd", ReputationEventKind::Gained, 15, "question upvoted", stamp(date, 9, 20)),
        seeded_event(5, "dee", ReputationEventKind::Gained, 320, "featured guide", stamp(date, 9, 45)),
        seeded_event(6, "ada", ReputationEventKind::Lost, -20, "answer retracted", stamp(date, 10, 15)),
        seeded_event(7, "eve", ReputationEventKind::Gained, 700, "migration marathon", stamp(date, 10, 30)),
        seeded_event(8, "cyd", ReputationEventKind::Lost, -90, "plagiarized answer", stamp(date, 11, 0)),
        seeded_event(9, "bob", ReputationEventKind::Gained, 10, "comment upvoted", stamp(date, 11, 25)),
    ];

    if let Some(event) = events.get_mut(7) {
        event.severity = Some(ViolationSeverity::High);
        event.violation_type = Some("plagiarism".to_string());
    }

    let mut reset = seeded_event(
        10,
        "dee",
        ReputationEventKind::Reset,
        -320,
        "score reset after appeal",
        stamp(date, 11, 50),
    );
    reset.source_type = Some("admin".to_string());
    reset.source_id = Some("admin-1".to_string());
    events.push(reset);

    events
}

fn seed_and_process(
    processor: &ApiProcessor,
    log: &InMemoryEventLog,
    date: NaiveDate,
) -> Result<usize, AppError> {
    let stream = demo_stream(date);
    let metadata = BTreeMap::new();
    for event in &stream {
        log.append(event.clone())
            .map_err(reputation::pipeline::ProcessingError::from)?;
        processor.process(&event.event_id, event.kind.label(), &event.user_id, &metadata)?;
    }
    Ok(stream.len())
}

fn render_board(board: &ReputationLeaderboard) {
    println!(
        "\n{} leaderboard ({} participants, calculated {})",
        board.kind.label(),
        board.total_participants,
        board.last_calculated_at.format("%Y-%m-%d %H:%M:%S"),
    );
    for entry in &board.rankings {
        println!("  #{:<3} {:<12} {:>6}", entry.rank, entry.user_id.0, entry.score);
    }
}

pub(crate) fn run_leaderboard_report(args: LeaderboardReportArgs) -> Result<(), AppError> {
    let Some(kind) = LeaderboardKind::from_label(&args.kind) else {
        eprintln!("unknown leaderboard type '{}'", args.kind);
        std::process::exit(2);
    };
    let date = args.date.unwrap_or_else(|| Local::now().date_naive());

    let (processor, log) = build_processor();
    let seeded = seed_and_process(&processor, &log, date)?;
    println!("Seeded {seeded} demo events on {date}");

    let board = processor
        .refresh_leaderboard(kind, Some(date))
        .map_err(|err| AppError::Pipeline(err.into()))?;
    render_board(&board);
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let date = args.date.unwrap_or_else(|| Local::now().date_naive());
    let (processor, log) = build_processor();

    println!("Reputation pipeline demo for {date}");
    let seeded = seed_and_process(&processor, &log, date)?;
    println!("Processed {seeded} events through the pipeline");

    println!("\nUser summaries");
    for user in ["ada", "bob", "cyd", "dee", "eve"] {
        let user = UserId(user.to_string());
        if let Ok(Some(summary)) = processor.summary(&user) {
            println!(
                "  {:<12} score {:>6}  level {}",
                summary.user_id.0,
                summary.total_score,
                summary.level.label()
            );
        }
    }

    let all_kinds = LeaderboardKind::ordered();
    let kinds: &[LeaderboardKind] = if args.all_boards {
        &all_kinds
    } else {
        &[LeaderboardKind::Daily]
    };
    for kind in kinds {
        let board = processor
            .refresh_leaderboard(*kind, Some(date))
            .map_err(|err| AppError::Pipeline(err.into()))?;
        render_board(&board);
    }

    let snapshot = processor
        .generate_daily_analytics(Some(date))
        .map_err(|err| AppError::Pipeline(err.into()))?;
    println!(
        "\nDaily snapshot: {} active users, average score {:.1}",
        snapshot.total_users, snapshot.average_score
    );
    println!(
        "  points awarded {} / deducted {}",
        snapshot.total_points_awarded, snapshot.total_points_deducted
    );
    println!("  score buckets:");
    for bucket in &snapshot.score_buckets {
        println!("    {:<12} {:>3}", bucket.level.label(), bucket.count);
    }
    println!("  top performers:");
    for performer in &snapshot.top_performers {
        println!("    {:<12} {:>6}", performer.user_id.0, performer.score);
    }

    let metrics = processor.health_metrics();
    println!(
        "\nPipeline health: {} processed, {} refreshes, {} leaderboard recomputes, {} snapshot updates",
        metrics.events_processed,
        metrics.summary_refreshes,
        metrics.leaderboard_recomputes,
        metrics.snapshot_updates
    );

    Ok(())
}
