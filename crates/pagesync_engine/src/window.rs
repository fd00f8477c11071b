//! Sync checkpoints and the date-window policy.
//!
//! In update mode the window is a single advancing point: records updated
//! since `last_sync_date`, after which the checkpoint moves forward by one
//! range. In initial mode the window is `[last_sync_date - range,
//! last_sync_date)`, clamped to the minimum sync date, and is queried once.

use crate::config::{SyncMode, SyncRange};
use crate::error::SyncResult;
use chrono::{DateTime, Utc};
use pagesync_protocol::{BatchFilter, DateBound};
use serde::{Deserialize, Serialize};

/// How far a sync has progressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    last_sync_date: DateTime<Utc>,
    initial_checkpoint: DateTime<Utc>,
    min_sync_date: Option<DateTime<Utc>>,
    sync_range: SyncRange,
}

impl SyncCheckpoint {
    /// Creates a checkpoint at `start`.
    pub fn new(start: DateTime<Utc>, sync_range: SyncRange) -> Self {
        Self {
            last_sync_date: start,
            initial_checkpoint: start,
            min_sync_date: None,
            sync_range,
        }
    }

    /// Sets the floor for initial windows.
    pub fn with_min_sync_date(mut self, date: Option<DateTime<Utc>>) -> Self {
        self.min_sync_date = date;
        self
    }

    /// Current position.
    pub fn last_sync_date(&self) -> DateTime<Utc> {
        self.last_sync_date
    }

    /// Position restored on every rewind.
    pub fn initial_checkpoint(&self) -> DateTime<Utc> {
        self.initial_checkpoint
    }

    /// Floor for initial windows.
    pub fn min_sync_date(&self) -> Option<DateTime<Utc>> {
        self.min_sync_date
    }

    /// Window size.
    pub fn sync_range(&self) -> SyncRange {
        self.sync_range
    }

    /// Moves both the position and the rewind target to `date`.
    pub fn reset_to(&mut self, date: DateTime<Utc>) {
        self.last_sync_date = date;
        self.initial_checkpoint = date;
    }

    /// Sets the floor for initial windows.
    pub fn set_min_sync_date(&mut self, date: Option<DateTime<Utc>>) {
        self.min_sync_date = date;
    }

    /// Sets the window size.
    pub fn set_sync_range(&mut self, range: SyncRange) {
        self.sync_range = range;
    }

    /// Restores the position to the initial checkpoint.
    pub fn rewind(&mut self) {
        self.last_sync_date = self.initial_checkpoint;
    }
}

/// Date range of one discovery query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    /// Lower bound.
    pub from: DateTime<Utc>,
    /// Upper bound; `None` in update mode.
    pub to: Option<DateTime<Utc>>,
}

/// Computes discovery windows for a sync mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncWindowPolicy {
    mode: SyncMode,
}

impl SyncWindowPolicy {
    /// Creates a policy for `mode`.
    pub fn new(mode: SyncMode) -> Self {
        Self { mode }
    }

    /// Current mode.
    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    /// Changes the mode.
    pub fn set_mode(&mut self, mode: SyncMode) {
        self.mode = mode;
    }

    /// Returns true in initial mode.
    pub fn is_initial(&self) -> bool {
        self.mode == SyncMode::Initial
    }

    /// Computes the window of the next discovery query.
    pub fn next_window(&self, checkpoint: &SyncCheckpoint) -> SyncResult<SyncWindow> {
        let to = checkpoint.last_sync_date;
        match self.mode {
            SyncMode::Update => Ok(SyncWindow { from: to, to: None }),
            SyncMode::Initial => {
                let mut from = checkpoint.sync_range.sub_from(to)?;
                if let Some(min) = checkpoint.min_sync_date {
                    if from < min {
                        from = min;
                    }
                }
                Ok(SyncWindow { from, to: Some(to) })
            }
        }
    }

    /// Moves the checkpoint past a queried window. Initial mode never advances.
    pub fn advance(&self, checkpoint: &mut SyncCheckpoint) -> SyncResult<()> {
        if self.mode == SyncMode::Update {
            checkpoint.last_sync_date = checkpoint.sync_range.add_to(checkpoint.last_sync_date)?;
        }
        Ok(())
    }

    /// Returns true once the checkpoint has reached the server clock.
    pub fn is_caught_up(&self, checkpoint: &SyncCheckpoint, server_time: DateTime<Utc>) -> bool {
        checkpoint.last_sync_date >= server_time
    }

    /// Adds the date clauses of `window` to `filter`.
    pub fn apply(&self, window: &SyncWindow, filter: &mut BatchFilter, format: &str) {
        let field = self.mode.date_field();
        filter.add_date_filter(field, DateBound::From, window.from, format);
        if let Some(to) = window.to {
            filter.add_date_filter(field, DateBound::To, to, format);
        }
    }

    /// Lists the windows a run starting at `checkpoint` queries when every
    /// update page comes back empty, stopping once `server_time` is reached
    /// or after `limit` windows.
    pub fn plan(
        &self,
        checkpoint: &SyncCheckpoint,
        server_time: DateTime<Utc>,
        limit: usize,
    ) -> SyncResult<Vec<SyncWindow>> {
        let mut checkpoint = checkpoint.clone();
        let mut windows = Vec::new();
        while windows.len() < limit {
            windows.push(self.next_window(&checkpoint)?);
            if self.is_initial() {
                break;
            }
            self.advance(&mut checkpoint)?;
            if self.is_caught_up(&checkpoint, server_time) {
                break;
            }
        }
        Ok(windows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use pagesync_protocol::DEFAULT_DATE_FORMAT;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn update_window_is_open_ended() {
        let policy = SyncWindowPolicy::new(SyncMode::Update);
        let mut checkpoint = SyncCheckpoint::new(date(2024, 1, 1), SyncRange::months(1));

        let window = policy.next_window(&checkpoint).unwrap();
        assert_eq!(window.from, date(2024, 1, 1));
        assert_eq!(window.to, None);

        policy.advance(&mut checkpoint).unwrap();
        assert_eq!(checkpoint.last_sync_date(), date(2024, 2, 1));
        assert_eq!(checkpoint.initial_checkpoint(), date(2024, 1, 1));
    }

    #[test]
    fn initial_window_reaches_back_one_range() {
        let policy = SyncWindowPolicy::new(SyncMode::Initial);
        let mut checkpoint = SyncCheckpoint::new(date(2024, 3, 1), SyncRange::months(1));

        let window = policy.next_window(&checkpoint).unwrap();
        assert_eq!(window.from, date(2024, 2, 1));
        assert_eq!(window.to, Some(date(2024, 3, 1)));

        policy.advance(&mut checkpoint).unwrap();
        assert_eq!(checkpoint.last_sync_date(), date(2024, 3, 1));
    }

    #[test]
    fn initial_window_clamps_to_min_sync_date() {
        let policy = SyncWindowPolicy::new(SyncMode::Initial);
        let checkpoint = SyncCheckpoint::new(date(2024, 3, 1), SyncRange::months(1))
            .with_min_sync_date(Some(date(2024, 2, 20)));

        let window = policy.next_window(&checkpoint).unwrap();
        assert_eq!(window.from, date(2024, 2, 20));
    }

    #[test]
    fn rewind_restores_initial_checkpoint() {
        let policy = SyncWindowPolicy::new(SyncMode::Update);
        let mut checkpoint = SyncCheckpoint::new(date(2024, 1, 1), SyncRange::months(1));
        for _ in 0..5 {
            policy.advance(&mut checkpoint).unwrap();
        }
        checkpoint.rewind();
        assert_eq!(checkpoint.last_sync_date(), date(2024, 1, 1));
    }

    #[test]
    fn apply_adds_mode_specific_clauses() {
        let mut filter = BatchFilter::new();
        let window = SyncWindow {
            from: date(2024, 1, 1),
            to: Some(date(2024, 2, 1)),
        };
        SyncWindowPolicy::new(SyncMode::Initial).apply(&window, &mut filter, DEFAULT_DATE_FORMAT);
        assert_eq!(
            filter.render().describe(),
            vec![
                "created_at from 2024-01-01 00:00:00",
                "created_at to 2024-02-01 00:00:00",
            ]
        );

        filter.reset();
        SyncWindowPolicy::new(SyncMode::Update).apply(
            &SyncWindow {
                from: date(2024, 1, 1),
                to: None,
            },
            &mut filter,
            "%Y-%m-%d",
        );
        assert_eq!(filter.render().describe(), vec!["updated_at from 2024-01-01"]);
    }

    #[test]
    fn plan_stops_at_server_time() {
        let checkpoint = SyncCheckpoint::new(date(2024, 1, 1), SyncRange::months(1));

        let update = SyncWindowPolicy::new(SyncMode::Update)
            .plan(&checkpoint, date(2024, 3, 15), 100)
            .unwrap();
        let starts: Vec<_> = update.iter().map(|w| w.from).collect();
        assert_eq!(starts, vec![date(2024, 1, 1), date(2024, 2, 1), date(2024, 3, 1)]);

        let initial = SyncWindowPolicy::new(SyncMode::Initial)
            .plan(&checkpoint, date(2024, 3, 15), 100)
            .unwrap();
        assert_eq!(initial.len(), 1);
    }

    #[test]
    fn checkpoint_round_trips_through_json() {
        let checkpoint = SyncCheckpoint::new(date(2024, 1, 1), SyncRange::months(1))
            .with_min_sync_date(Some(date(2023, 1, 1)));
        let json = serde_json::to_string(&checkpoint).unwrap();
        let back: SyncCheckpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, checkpoint);
    }

    proptest! {
        #[test]
        fn initial_floor_never_precedes_min(
            start_days in 0i64..20_000,
            min_days in 0i64..20_000,
            range_days in 1i64..400,
        ) {
            let epoch = date(1990, 1, 1);
            let start = epoch + TimeDelta::days(start_days);
            let min = epoch + TimeDelta::days(min_days);
            let checkpoint = SyncCheckpoint::new(start, SyncRange::from_duration(TimeDelta::days(range_days)))
                .with_min_sync_date(Some(min));

            let window = SyncWindowPolicy::new(SyncMode::Initial).next_window(&checkpoint).unwrap();
            prop_assert!(window.from >= min);
            prop_assert_eq!(window.to, Some(start));
            let unclamped = start - TimeDelta::days(range_days);
            prop_assert_eq!(window.from, unclamped.max(min));
        }
    }
}
