//! Chat export parser.
//!
//! Reads a line-oriented chat export (`<date> <time> - <user>: <text>`) and rebuilds
//! logical messages: lines that do not start with a timestamp header are continuations
//! of the previous message. Timestamps use whatever date order the exporting phone's
//! locale picked, so the order is inferred once per transcript from the digits alone.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ChatNetError, Result};

// =============================================================================
// Constants
// =============================================================================

/// Metadata lines at the top of every export.
pub const HEADER_LINES: usize = 3;

/// User label the exporter writes for broken records.
pub const ERROR_MARKER: &str = "ERROR";

/// `a/b/c h:mm`; either outer field may be the year.
const TIMESTAMP_PATTERN: &str = r"(\d{1,4})/(\d{1,2})/(\d{1,4}) (\d{1,2}):(\d{2})";

/// Two-digit years below this are 20xx, the rest 19xx (same pivot as `%y`).
const TWO_DIGIT_YEAR_PIVOT: i32 = 69;

/// Start of a logical message: timestamp, dash, user label up to the first `": "`
static MESSAGE_START_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"^{} - ([^\n]+?):(?: |$)", TIMESTAMP_PATTERN)).unwrap());

/// A whole grouped message; group 6 is the user, group 7 the text
static MESSAGE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?s)^{} - ([^\n]+?):(?:[ \n]|$)(.*)$", TIMESTAMP_PATTERN)).unwrap());

// =============================================================================
// Data structures
// =============================================================================

/// Day/month ordering of `a/b/c` timestamps whose first field is not a year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateOrder {
    #[default]
    Auto,
    DayFirst,
    MonthFirst,
}

impl DateOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            DateOrder::Auto => "auto",
            DateOrder::DayFirst => "day_first",
            DateOrder::MonthFirst => "month_first",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(DateOrder::Auto),
            "day_first" => Some(DateOrder::DayFirst),
            "month_first" => Some(DateOrder::MonthFirst),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub header_lines: usize,
    /// Merge runs of messages from the same user into one record.
    pub collapse_consecutive: bool,
    pub date_order: DateOrder,
    pub error_marker: String,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            header_lines: HEADER_LINES,
            collapse_consecutive: true,
            date_order: DateOrder::Auto,
            error_marker: ERROR_MARKER.to_string(),
        }
    }
}

/// One logical message.
///
/// `index` is the ordinal of the message in the uncollapsed stream, so after
/// collapsing the indices keep gaps where repeated messages were merged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageRecord {
    pub index: usize,
    pub timestamp: NaiveDateTime,
    pub user: String,
    pub text: String,
}

/// Parsed transcript in original order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Transcript {
    pub records: Vec<MessageRecord>,
}

impl Transcript {
    pub fn new(records: Vec<MessageRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct users in order of first appearance.
    pub fn users(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.records
            .iter()
            .filter(|r| seen.insert(r.user.as_str()))
            .map(|r| r.user.clone())
            .collect()
    }
}

/// Raw `a/b/c h:mm` fields before the date order is known.
#[derive(Debug, Clone)]
struct RawStamp {
    first: String,
    second: u32,
    third: String,
    hour: u32,
    minute: u32,
}

impl RawStamp {
    fn from_captures(caps: &Captures) -> Self {
        let num = |i: usize| caps[i].parse::<u32>().unwrap_or(u32::MAX);
        RawStamp {
            first: caps[1].to_string(),
            second: num(2),
            third: caps[3].to_string(),
            hour: num(4),
            minute: num(5),
        }
    }

    /// Years are told apart by digit count alone.
    fn is_year_first(&self) -> bool {
        self.first.len() >= 3
    }

    fn is_year_last(&self) -> bool {
        self.third.len() >= 3
    }

    fn first_value(&self) -> u32 {
        self.first.parse().unwrap_or(u32::MAX)
    }

    fn third_value(&self) -> u32 {
        self.third.parse().unwrap_or(u32::MAX)
    }

    fn text(&self) -> String {
        format!("{}/{}/{} {}:{:02}", self.first, self.second, self.third, self.hour, self.minute)
    }

    fn resolve(&self, order: DateOrder) -> Option<NaiveDateTime> {
        if self.is_year_first() && self.is_year_last() {
            return None;
        }
        let (year, month, day) = if self.is_year_first() {
            (self.first_value() as i32, self.second, self.third_value())
        } else {
            let year = if self.is_year_last() {
                self.third_value() as i32
            } else {
                expand_year(self.third_value() as i32)
            };
            match order {
                DateOrder::MonthFirst => (year, self.first_value(), self.second),
                DateOrder::DayFirst | DateOrder::Auto => (year, self.second, self.first_value()),
            }
        };
        NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(self.hour, self.minute, 0)
    }
}

/// Message reconstructed from its grouped raw lines, before conversion.
struct RawMessage {
    line: usize,
    stamp: RawStamp,
    user: String,
    text: String,
}

// =============================================================================
// Parsing
// =============================================================================

/// Read and parse an export file (UTF-8).
pub fn read_chat(path: &Path, options: &ParseOptions) -> Result<Transcript> {
    let content = fs::read_to_string(path).map_err(|source| ChatNetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_chat(&content, options)
}

/// Parse export text into records.
pub fn parse_chat(content: &str, options: &ParseOptions) -> Result<Transcript> {
    let groups = group_message_lines(content, options.header_lines)?;

    let mut raw_messages = Vec::with_capacity(groups.len());
    for (line, raw) in groups {
        let caps = MESSAGE_REGEX.captures(&raw).ok_or_else(|| ChatNetError::OrphanLine {
            line,
            content: raw.clone(),
        })?;
        raw_messages.push(RawMessage {
            line,
            stamp: RawStamp::from_captures(&caps),
            user: caps[6].to_string(),
            text: caps[7].to_string(),
        });
    }

    let order = match options.date_order {
        DateOrder::Auto => infer_date_order(raw_messages.iter().map(|m| &m.stamp)),
        forced => forced,
    };
    debug!("[Parser] {} raw messages, date order {}", raw_messages.len(), order.as_str());

    let mut records = Vec::with_capacity(raw_messages.len());
    let mut dropped = 0usize;
    for (index, msg) in raw_messages.into_iter().enumerate() {
        let timestamp = msg.stamp.resolve(order).ok_or_else(|| ChatNetError::InvalidTimestamp {
            line: msg.line,
            value: msg.stamp.text(),
        })?;
        if msg.user == options.error_marker {
            dropped += 1;
            continue;
        }
        records.push(MessageRecord {
            index,
            timestamp,
            user: msg.user,
            text: msg.text.trim().to_string(),
        });
    }
    if dropped > 0 {
        debug!("[Parser] Dropped {} records marked {:?}", dropped, options.error_marker);
    }

    if options.collapse_consecutive {
        records = collapse_consecutive(records);
    }

    Ok(Transcript::new(records))
}

/// Split the body of an export into one string per logical message.
///
/// Returns `(line_number, text)` pairs where the line number (1-based, counting the
/// header) is that of the message-start line and the text is the start line followed
/// by its continuation lines, joined with `\n`.
fn group_message_lines(content: &str, header_lines: usize) -> Result<Vec<(usize, String)>> {
    let mut groups: Vec<(usize, String)> = Vec::new();
    let mut skipped_blank = 0usize;

    for (i, line) in content.lines().enumerate().skip(header_lines) {
        let line_no = i + 1;
        if MESSAGE_START_REGEX.is_match(line) {
            groups.push((line_no, line.to_string()));
        } else if let Some((_, text)) = groups.last_mut() {
            text.push('\n');
            text.push_str(line);
        } else if line.trim().is_empty() {
            skipped_blank += 1;
        } else {
            return Err(ChatNetError::OrphanLine {
                line: line_no,
                content: line.to_string(),
            });
        }
    }

    if skipped_blank > 0 {
        warn!("[Parser] Skipped {} blank line(s) before the first message", skipped_blank);
    }
    Ok(groups)
}

/// Pick day-first or month-first from the values seen across the whole transcript.
fn infer_date_order<'a>(stamps: impl Iterator<Item = &'a RawStamp>) -> DateOrder {
    let mut first_over_12 = false;
    let mut second_over_12 = false;
    for stamp in stamps.filter(|s| !s.is_year_first()) {
        first_over_12 |= stamp.first_value() > 12;
        second_over_12 |= stamp.second > 12;
    }
    if !first_over_12 && second_over_12 {
        DateOrder::MonthFirst
    } else {
        DateOrder::DayFirst
    }
}

fn expand_year(year: i32) -> i32 {
    match year {
        y if y >= 100 => y,
        y if y < TWO_DIGIT_YEAR_PIVOT => 2000 + y,
        y => 1900 + y,
    }
}

/// Merge consecutive records of the same user. The merged record keeps the first
/// record's index and timestamp; texts are joined with `\n`.
pub fn collapse_consecutive(records: Vec<MessageRecord>) -> Vec<MessageRecord> {
    let mut collapsed: Vec<MessageRecord> = Vec::with_capacity(records.len());
    for record in records {
        match collapsed.last_mut() {
            Some(prev) if prev.user == record.user => {
                prev.text.push('\n');
                prev.text.push_str(&record.text);
            }
            _ => collapsed.push(record),
        }
    }
    collapsed
}
