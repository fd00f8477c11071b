//! Configuration for sync cursors.

use crate::error::{SyncError, SyncResult};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Months, TimeDelta, Utc};
use pagesync_protocol::DEFAULT_DATE_FORMAT;
use serde::{Deserialize, Serialize};

/// Website id meaning "all websites"; disables website and store clauses.
pub const ALL_WEBSITES: i64 = -1;

/// Import mode of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// First import: a single page of records created before the start date.
    Initial,
    /// Incremental import of records updated since the start date.
    #[default]
    Update,
}

impl SyncMode {
    /// Returns the entity field the date clauses apply to.
    pub fn date_field(&self) -> &'static str {
        match self {
            SyncMode::Initial => "created_at",
            SyncMode::Update => "updated_at",
        }
    }
}

/// Size of one sync window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRange {
    /// Calendar months; month ends are clamped (Jan 31 + 1 month = Feb 29).
    Months(u32),
    /// A fixed number of seconds.
    Seconds(i64),
}

impl SyncRange {
    /// Creates a range of whole calendar months.
    pub fn months(months: u32) -> Self {
        SyncRange::Months(months)
    }

    /// Creates a fixed-length range.
    pub fn from_duration(duration: TimeDelta) -> Self {
        SyncRange::Seconds(duration.num_seconds())
    }

    /// Fails unless the range moves a date forward.
    pub fn validate(&self) -> SyncResult<()> {
        let forward = match *self {
            SyncRange::Months(n) => n > 0,
            SyncRange::Seconds(s) => s > 0,
        };
        if !forward {
            return Err(SyncError::Configuration(format!(
                "sync range must be positive, got {self:?}"
            )));
        }
        Ok(())
    }

    /// Returns `date` moved forward by this range.
    pub fn add_to(&self, date: DateTime<Utc>) -> SyncResult<DateTime<Utc>> {
        match *self {
            SyncRange::Months(n) => date.checked_add_months(Months::new(n)),
            SyncRange::Seconds(s) => TimeDelta::try_seconds(s).and_then(|d| date.checked_add_signed(d)),
        }
        .ok_or(SyncError::DateOutOfRange)
    }

    /// Returns `date` moved backward by this range.
    pub fn sub_from(&self, date: DateTime<Utc>) -> SyncResult<DateTime<Utc>> {
        match *self {
            SyncRange::Months(n) => date.checked_sub_months(Months::new(n)),
            SyncRange::Seconds(s) => TimeDelta::try_seconds(s).and_then(|d| date.checked_sub_signed(d)),
        }
        .ok_or(SyncError::DateOutOfRange)
    }
}

impl Default for SyncRange {
    fn default() -> Self {
        SyncRange::Months(1)
    }
}

/// Settings a cursor is constructed from.
///
/// `start_sync_date` is mandatory; it is optional here only so that
/// settings loaded from external sources can be validated by the cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Website to import, or [`ALL_WEBSITES`].
    pub website_id: i64,
    /// Checkpoint the sync starts from.
    pub start_sync_date: Option<DateTime<Utc>>,
    /// Import mode.
    pub mode: SyncMode,
    /// Earliest date an initial window may reach back to.
    pub min_sync_date: Option<DateTime<Utc>>,
    /// Window size.
    pub sync_range: SyncRange,
    /// `chrono` format used when rendering date clauses.
    pub date_format: String,
}

impl SyncSettings {
    /// Creates settings for a website, starting at `start_sync_date`.
    pub fn new(website_id: i64, start_sync_date: DateTime<Utc>) -> Self {
        Self {
            website_id,
            start_sync_date: Some(start_sync_date),
            ..Self::default()
        }
    }

    /// Sets the import mode.
    pub fn with_mode(mut self, mode: SyncMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the minimum sync date.
    pub fn with_min_sync_date(mut self, date: DateTime<Utc>) -> Self {
        self.min_sync_date = Some(date);
        self
    }

    /// Sets the window size.
    pub fn with_sync_range(mut self, range: SyncRange) -> Self {
        self.sync_range = range;
        self
    }

    /// Sets the date format for rendered clauses.
    pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = format.into();
        self
    }

    /// Returns true if website and store clauses apply.
    pub fn is_website_scoped(&self) -> bool {
        self.website_id != ALL_WEBSITES
    }

    /// Returns the start date, failing if it is missing.
    pub fn require_start_date(&self) -> SyncResult<DateTime<Utc>> {
        self.start_sync_date
            .ok_or_else(|| SyncError::Configuration("start sync date can't be empty".into()))
    }

    /// Checks the settings and returns the start date.
    pub fn validate(&self) -> SyncResult<DateTime<Utc>> {
        let start = self.require_start_date()?;
        self.sync_range.validate()?;
        validate_date_format(&self.date_format)?;
        Ok(start)
    }
}

/// Fails if `format` contains a specifier `chrono` cannot render.
fn validate_date_format(format: &str) -> SyncResult<()> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(SyncError::Configuration(format!(
            "invalid date format: {format:?}"
        )));
    }
    Ok(())
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            website_id: ALL_WEBSITES,
            start_sync_date: None,
            mode: SyncMode::default(),
            min_sync_date: None,
            sync_range: SyncRange::default(),
            date_format: DEFAULT_DATE_FORMAT.to_owned(),
        }
    }
}
