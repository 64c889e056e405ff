//! Export-transcript parser.
//!
//! A transcript is a plain-text file where each message starts with a header
//! line in one of three formats:
//!
//! - `[1/15/24, 10:30:15 AM] John Doe: Hello!` (month/day/year, 12-hour
//!   clock, bracket delimiters);
//! - `15/1/24, 22:30 - John Doe: Hello` (day/month/year, 24-hour clock,
//!   dash delimiter);
//! - `[2024-01-15 10:30:15] John Doe: Hello` (ISO date, bracket delimiters).
//!
//! A hand-written line classifier tags each line as `Header`, `Continuation`
//! or `Blank`, and a two-state accumulator (awaiting a header / accumulating
//! a body) folds continuation lines into the open message, newline-joined.
//! After the scan, messages matching the configured system/membership
//! patterns are dropped. Message ids are synthesized deterministically from
//! (chat name, unix timestamp, sender), so re-importing the same file is
//! idempotent.

use {
    chrono::{DateTime, NaiveDate, NaiveTime, Utc},
    tracing::debug,
};

use recall_common::{CanonicalMessage, MessageKind, SourceType, synthetic_id};

/// Notices produced by the chat service itself rather than a participant.
/// Matched as substrings of a parsed message body.
const DEFAULT_SYSTEM_PATTERNS: &[&str] = &[
    "Messages and calls are end-to-end encrypted",
    "created group",
    "created this group",
    "joined using this group's invite link",
    "changed the subject",
    "changed this group's icon",
    "changed the group description",
    "was added",
    "was removed",
    "left the group",
    "security code changed",
];

#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Human-readable chat name; becomes the chat id and feeds the
    /// synthesized message id.
    pub chat_name: String,
    /// Sender name identifying the owner's messages; those are marked
    /// outbound.
    pub self_name: Option<String>,
    /// Messages whose body contains any of these are dropped after the scan.
    pub system_patterns: Vec<String>,
}

impl ExportConfig {
    pub fn new(chat_name: impl Into<String>) -> Self {
        Self {
            chat_name: chat_name.into(),
            self_name: None,
            system_patterns: DEFAULT_SYSTEM_PATTERNS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }

    pub fn with_self_name(mut self, name: impl Into<String>) -> Self {
        self.self_name = Some(name.into());
        self
    }
}

/// Header fields of a message-opening line.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportHeader {
    pub timestamp: DateTime<Utc>,
    pub sender: String,
    pub body: String,
}

/// Classification of one physical transcript line.
#[derive(Debug, Clone, PartialEq)]
pub enum LineClass {
    Header(ExportHeader),
    Continuation,
    Blank,
}

/// One fully accumulated message before filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportMessage {
    pub timestamp: DateTime<Utc>,
    pub sender: String,
    pub body: String,
}

/// Parse outcome: retained messages plus counts for the report.
#[derive(Debug, Default)]
pub struct ParsedExport {
    pub messages: Vec<ExportMessage>,
    /// Messages dropped by the system-pattern filter.
    pub dropped_system: usize,
    /// Continuation lines seen while no message was open; discarded.
    pub orphan_lines: usize,
}

/// Classify a single line. Anything that is not blank and matches none of
/// the three header grammars is a continuation of the currently open
/// message.
pub fn classify_line(line: &str) -> LineClass {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return LineClass::Blank;
    }
    if let Some(header) = parse_bracket_header(line).or_else(|| parse_dash_header(line)) {
        return LineClass::Header(header);
    }
    LineClass::Continuation
}

/// Formats (a) and (c): `[<stamp>] Sender: body`.
fn parse_bracket_header(line: &str) -> Option<ExportHeader> {
    let inner = line.strip_prefix('[')?;
    let (stamp, rest) = inner.split_once(']')?;
    let (sender, body) = parse_sender_body(rest)?;

    let parsed = parse_stamp_12h(stamp).or_else(|| parse_stamp_iso(stamp))?;
    Some(ExportHeader {
        timestamp: resolve_stamp(parsed, line),
        sender,
        body,
    })
}

/// Format (b): `D/M/YY, HH:MM - Sender: body`.
fn parse_dash_header(line: &str) -> Option<ExportHeader> {
    let (date_part, rest) = line.split_once(", ")?;
    if !looks_like_slash_date(date_part) {
        return None;
    }
    let (time_part, rest) = rest.split_once(" - ")?;
    if !looks_like_clock(time_part) {
        return None;
    }
    let (sender, body) = parse_sender_body(rest)?;

    let stamp = parse_slash_date(date_part, DayMonthOrder::DayFirst)
        .zip(parse_time_24h(time_part))
        .map(|(d, t)| d.and_time(t));
    Some(ExportHeader {
        timestamp: resolve_stamp(stamp, line),
        sender,
        body,
    })
}

/// `Sender: body` after the timestamp. The sender must be non-empty; the
/// body may be (e.g. an omitted attachment).
fn parse_sender_body(rest: &str) -> Option<(String, String)> {
    let rest = rest.strip_prefix(' ').unwrap_or(rest);
    let (sender, body) = rest.split_once(':')?;
    let sender = sender.trim();
    if sender.is_empty() {
        return None;
    }
    Some((
        sender.to_string(),
        body.strip_prefix(' ').unwrap_or(body).to_string(),
    ))
}

/// Outer `Option`: did the stamp match the grammar's shape at all (decides
/// header vs continuation). Inner `Option`: did the digits form a real
/// date/time; when they do not, the timestamp falls back to now(), a
/// documented approximation rather than an error.
type StampParse = Option<Option<chrono::NaiveDateTime>>;

fn resolve_stamp(parsed: Option<chrono::NaiveDateTime>, line: &str) -> DateTime<Utc> {
    match parsed {
        Some(naive) => naive.and_utc(),
        None => {
            debug!(line, "unparseable export timestamp, falling back to now");
            Utc::now()
        },
    }
}

/// `1/15/24, 10:30:15 AM`: month/day/year with a 12-hour clock.
fn parse_stamp_12h(stamp: &str) -> StampParse {
    let (date_part, time_part) = stamp.split_once(", ")?;
    if !looks_like_slash_date(date_part) {
        return None;
    }
    let (clock, meridiem) = time_part.trim().rsplit_once(' ')?;
    let meridiem = match meridiem {
        "AM" | "am" => Meridiem::Am,
        "PM" | "pm" => Meridiem::Pm,
        _ => return None,
    };
    if !looks_like_clock(clock) {
        return None;
    }
    Some(
        parse_slash_date(date_part, DayMonthOrder::MonthFirst)
            .zip(parse_time_12h(clock, meridiem))
            .map(|(d, t)| d.and_time(t)),
    )
}

/// `2024-01-15 10:30:15`: ISO date with a 24-hour clock.
fn parse_stamp_iso(stamp: &str) -> StampParse {
    let (date_part, time_part) = stamp.trim().split_once(' ')?;
    let mut parts = date_part.split('-');
    let (y, m, d) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() || !all_digits(&[y, m, d]) || !looks_like_clock(time_part) {
        return None;
    }
    let date = NaiveDate::from_ymd_opt(
        y.parse().ok()?,
        m.parse().ok()?,
        d.parse().ok()?,
    );
    Some(
        date.zip(parse_time_24h(time_part))
            .map(|(d, t)| d.and_time(t)),
    )
}

enum Meridiem {
    Am,
    Pm,
}

#[derive(Clone, Copy)]
enum DayMonthOrder {
    MonthFirst,
    DayFirst,
}

fn looks_like_slash_date(s: &str) -> bool {
    let parts: Vec<&str> = s.split('/').collect();
    parts.len() == 3 && all_digits(&parts)
}

fn looks_like_clock(s: &str) -> bool {
    let parts: Vec<&str> = s.split(':').collect();
    (2..=3).contains(&parts.len()) && all_digits(&parts)
}

fn all_digits(parts: &[&str]) -> bool {
    parts
        .iter()
        .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
}

fn parse_slash_date(s: &str, order: DayMonthOrder) -> Option<NaiveDate> {
    let mut parts = s.split('/');
    let a: u32 = parts.next()?.parse().ok()?;
    let b: u32 = parts.next()?.parse().ok()?;
    let year: i32 = parts.next()?.parse().ok()?;
    // Two-digit years are interpreted as 2000+.
    let year = if year < 100 { year + 2000 } else { year };
    let (month, day) = match order {
        DayMonthOrder::MonthFirst => (a, b),
        DayMonthOrder::DayFirst => (b, a),
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

fn parse_time_24h(s: &str) -> Option<NaiveTime> {
    let (h, m, sec) = split_clock(s)?;
    NaiveTime::from_hms_opt(h, m, sec)
}

/// 12-hour to 24-hour: 12 AM → 0, 12 PM → 12, other AM unchanged,
/// other PM +12.
fn parse_time_12h(s: &str, meridiem: Meridiem) -> Option<NaiveTime> {
    let (h, m, sec) = split_clock(s)?;
    let hour = match (meridiem, h) {
        (Meridiem::Am, 12) => 0,
        (Meridiem::Am, h) => h,
        (Meridiem::Pm, 12) => 12,
        (Meridiem::Pm, h) => h + 12,
    };
    NaiveTime::from_hms_opt(hour, m, sec)
}

fn split_clock(s: &str) -> Option<(u32, u32, u32)> {
    let mut parts = s.split(':');
    let h: u32 = parts.next()?.parse().ok()?;
    let m: u32 = parts.next()?.parse().ok()?;
    let sec: u32 = match parts.next() {
        Some(sec) => sec.parse().ok()?,
        None => 0,
    };
    if parts.next().is_some() {
        return None;
    }
    Some((h, m, sec))
}

/// Two-state accumulator over classified lines.
#[derive(Default)]
struct Accumulator {
    open: Option<ExportMessage>,
    messages: Vec<ExportMessage>,
    orphan_lines: usize,
}

impl Accumulator {
    fn feed(&mut self, line: &str) {
        match classify_line(line) {
            LineClass::Header(header) => {
                self.flush();
                self.open = Some(ExportMessage {
                    timestamp: header.timestamp,
                    sender: header.sender,
                    body: header.body,
                });
            },
            LineClass::Continuation => match self.open.as_mut() {
                Some(message) => {
                    message.body.push('\n');
                    message.body.push_str(line.trim_end_matches(['\r', '\n']));
                },
                // No message open yet: the line belongs to nothing.
                None => self.orphan_lines += 1,
            },
            LineClass::Blank => {},
        }
    }

    fn flush(&mut self) {
        if let Some(message) = self.open.take() {
            self.messages.push(message);
        }
    }
}

/// Scan a whole transcript and drop system messages.
pub fn parse_export_messages(text: &str, config: &ExportConfig) -> ParsedExport {
    let mut acc = Accumulator::default();
    for line in text.lines() {
        acc.feed(line);
    }
    acc.flush();

    let mut parsed = ParsedExport {
        orphan_lines: acc.orphan_lines,
        ..ParsedExport::default()
    };
    for message in acc.messages {
        let is_system = config
            .system_patterns
            .iter()
            .any(|p| message.body.contains(p.as_str()));
        if is_system {
            parsed.dropped_system += 1;
        } else {
            parsed.messages.push(message);
        }
    }
    parsed
}

/// Parse a transcript into canonical messages.
pub fn parse_export(text: &str, config: &ExportConfig) -> (Vec<CanonicalMessage>, ParsedExport) {
    let parsed = parse_export_messages(text, config);
    let messages = parsed
        .messages
        .iter()
        .map(|m| to_canonical(m, config))
        .collect();
    let counts = ParsedExport {
        messages: Vec::new(),
        dropped_system: parsed.dropped_system,
        orphan_lines: parsed.orphan_lines,
    };
    (messages, counts)
}

fn to_canonical(message: &ExportMessage, config: &ExportConfig) -> CanonicalMessage {
    // Deterministic id over (chat, unix timestamp, sender): re-importing the
    // same file produces the same ids and the store dedups them away.
    let message_id = synthetic_id(&[
        &config.chat_name,
        &message.timestamp.timestamp().to_string(),
        &message.sender,
    ]);
    CanonicalMessage {
        source: SourceType::Export,
        message_id,
        chat_id: config.chat_name.clone(),
        sender_id: message.sender.clone(),
        sender_name: Some(message.sender.clone()),
        body: message.body.clone(),
        kind: MessageKind::Text,
        is_outbound: config.self_name.as_deref() == Some(message.sender.as_str()),
        is_group: false,
        timestamp: message.timestamp,
        quoted_id: None,
        raw: serde_json::json!({
            "chat_name": config.chat_name,
            "sender": message.sender,
        }),
    }
}
