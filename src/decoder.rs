//! Incremental decoding of monitor output into [`Record`]s.
//!
//! `dbus-monitor` prints one header line per message followed by one indented
//! line per argument:
//!
//! ```text
//! method call time=1700000000.1 sender=:1.85 -> destination=org.freedesktop.ScreenSaver serial=7 path=/org/freedesktop/ScreenSaver; interface=org.freedesktop.ScreenSaver; member=Inhibit
//!    string "firefox"
//!    string "video-playing"
//! ```
//!
//! Each line is classified into a [`Line`] and pushed through a [`Decoder`],
//! which accumulates the arguments under the latest header and yields the
//! record once it is complete.

use crate::record::{Member, Record};

const HEADER_KINDS: [&str; 3] = ["signal", "method call", "method return"];
const ADDRESSING_KEYS: [&str; 4] = [" sender=", " -> destination=", " serial=", " path="];

/// Classification of a single monitor line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Line {
    Header { interface: String, member: Member },
    Parameter(String),
    Unrecognized,
}

impl Line {
    pub fn parse(line: &str) -> Self {
        let line = line.trim_end();
        if let Some(line) = parse_header(line) {
            return line;
        }
        match parse_parameter(line) {
            Some(value) => Self::Parameter(value),
            None => Self::Unrecognized,
        }
    }

    pub fn header(interface: impl Into<String>, member: &str) -> Self {
        Self::Header {
            interface: interface.into(),
            member: Member::parse(member),
        }
    }
}

fn parse_header(line: &str) -> Option<Line> {
    let fields = HEADER_KINDS
        .iter()
        .find_map(|kind| line.strip_prefix(kind)?.strip_prefix(" time="))?;

    // "(null destination)" contains spaces, so only the key order is checked.
    let (addressing, rest) = fields.split_once("; interface=")?;
    let mut cursor = addressing;
    for key in ADDRESSING_KEYS {
        let at = cursor.find(key)?;
        cursor = &cursor[at + key.len()..];
    }

    let (interface, member) = rest.split_once("; member=")?;
    let member = member.split_whitespace().next()?;
    if interface.is_empty() {
        return None;
    }
    Some(Line::header(interface, member))
}

fn parse_parameter(line: &str) -> Option<String> {
    let quoted = line.trim_start().strip_prefix("string \"")?;
    // dbus-monitor does not escape embedded quotes; the last one closes.
    let end = quoted.rfind('"')?;
    Some(quoted[..end].to_string())
}

/// Accumulator for the record under construction.
#[derive(Debug, Default)]
pub struct Decoder {
    pending: Option<Record>,
    dispatched: bool,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one classified line. Returns the record the first time it
    /// becomes complete.
    pub fn push(&mut self, line: Line) -> Option<Record> {
        match line {
            Line::Header { interface, member } => {
                self.pending = Some(Record::new(interface, member));
                self.dispatched = false;
            }
            Line::Parameter(value) => match self.pending.as_mut() {
                Some(record) if !self.dispatched => record.push_param(value),
                _ => return None,
            },
            Line::Unrecognized => return None,
        }
        self.take_completed()
    }

    pub fn push_str(&mut self, line: &str) -> Option<Record> {
        self.push(Line::parse(line))
    }

    /// Clears the accumulator after the record was handled.
    pub fn reset(&mut self) {
        self.pending = None;
        self.dispatched = false;
    }

    pub fn pending(&self) -> Option<&Record> {
        self.pending.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_none()
    }

    fn take_completed(&mut self) -> Option<Record> {
        let record = self.pending.as_ref()?;
        if self.dispatched || !record.is_complete() {
            return None;
        }
        self.dispatched = true;
        Some(record.clone())
    }
}

/// Lazy sequence of completed records over raw lines. Every completion is
/// treated as handled.
pub struct Records<I> {
    lines: I,
    decoder: Decoder,
}

impl<I> Records<I> {
    pub fn new(lines: I) -> Self {
        Self {
            lines,
            decoder: Decoder::new(),
        }
    }
}

impl<I, S> Iterator for Records<I>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        for line in self.lines.by_ref() {
            if let Some(record) = self.decoder.push_str(line.as_ref()) {
                self.decoder.reset();
                return Some(record);
            }
        }
        None
    }
}

pub fn records<I>(lines: I) -> Records<I::IntoIter>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    Records::new(lines.into_iter())
}
