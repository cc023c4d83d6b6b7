//! Split decisions and the date/stamp keys used in file and folder names.

use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

/// Length of a `YYYY_MM_DD` date key.
pub const DATE_KEY_LEN: usize = 10;
/// Length of a `YYYY_MM_DD_HHMMSS` stamp key.
pub const STAMP_KEY_LEN: usize = 17;

/// Active rotation trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitMode {
    /// One file (or file pair) for the lifetime of the process.
    None,
    /// A new folder and file each day.
    Date,
    /// A new file once the accumulated size reaches `max_size` bytes.
    Size { max_size: u64 },
}

/// Outcome of a split check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitDecision {
    None,
    /// The day changed; carries the new date key.
    ByDate(String),
    BySize,
}

/// Pure rotation decision logic.
#[derive(Debug, Clone, Copy)]
pub struct SplitPolicy {
    mode: SplitMode,
}

impl SplitPolicy {
    pub fn new(mode: SplitMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> SplitMode {
        self.mode
    }

    /// Decide whether the entry about to be written (`incoming` bytes) needs a new file.
    ///
    /// Under size splitting the entry that would push the file to the threshold opens the
    /// next file. An empty file never splits, so an oversized entry cannot rotate forever.
    pub fn should_split(
        &self,
        file_date: &str,
        accumulated: u64,
        incoming: u64,
        now: OffsetDateTime,
    ) -> SplitDecision {
        match self.mode {
            SplitMode::None => SplitDecision::None,
            SplitMode::Date => {
                let today = date_key(now);
                if today != file_date {
                    SplitDecision::ByDate(today)
                } else {
                    SplitDecision::None
                }
            }
            SplitMode::Size { max_size } => {
                if accumulated > 0 && accumulated.saturating_add(incoming) >= max_size {
                    SplitDecision::BySize
                } else {
                    SplitDecision::None
                }
            }
        }
    }
}

/// `2026_01_09`
pub fn date_key(now: OffsetDateTime) -> String {
    format!(
        "{:04}_{:02}_{:02}",
        now.year(),
        u8::from(now.month()),
        now.day()
    )
}

/// `2026_01_09_150405`
pub fn stamp_key(now: OffsetDateTime) -> String {
    format!(
        "{}_{:02}{:02}{:02}",
        date_key(now),
        now.hour(),
        now.minute(),
        now.second()
    )
}

/// Parse the leading `YYYY_MM_DD` of a file or folder name.
pub fn parse_date_prefix(name: &str) -> Option<Date> {
    let prefix = name.get(..DATE_KEY_LEN)?;
    Date::parse(prefix, format_description!("[year]_[month]_[day]")).ok()
}

/// Parse the leading `YYYY_MM_DD_HHMMSS` of a size-split file name.
pub fn parse_stamp_prefix(name: &str) -> Option<PrimitiveDateTime> {
    let prefix = name.get(..STAMP_KEY_LEN)?;
    PrimitiveDateTime::parse(
        prefix,
        format_description!("[year]_[month]_[day]_[hour][minute][second]"),
    )
    .ok()
}
