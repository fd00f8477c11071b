//! Plan command implementation.

use chrono::{DateTime, Utc};
use pagesync_engine::{SyncCheckpoint, SyncSettings, SyncWindow, SyncWindowPolicy};
use pagesync_protocol::BatchFilter;

/// Runs the plan command.
pub fn run(
    settings: &SyncSettings,
    until: DateTime<Utc>,
    limit: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    for line in plan_lines(settings, until, limit)? {
        println!("{line}");
    }
    Ok(())
}

/// Describes each window a run would query, one line per window.
pub fn plan_lines(
    settings: &SyncSettings,
    until: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let start = settings.validate()?;
    let checkpoint = SyncCheckpoint::new(start, settings.sync_range)
        .with_min_sync_date(settings.min_sync_date);
    let policy = SyncWindowPolicy::new(settings.mode);

    let windows = policy.plan(&checkpoint, until, limit)?;
    Ok(windows
        .iter()
        .enumerate()
        .map(|(i, window)| {
            format!(
                "window {:>3}: {}",
                i + 1,
                describe(&policy, window, &settings.date_format)
            )
        })
        .collect())
}

fn describe(policy: &SyncWindowPolicy, window: &SyncWindow, format: &str) -> String {
    let mut filter = BatchFilter::new();
    policy.apply(window, &mut filter, format);
    filter.render().describe().join(" AND ")
}
