//! Path queries over the session metadata text.
//!
//! The metadata block is indentation-structured `key: value` text with `-`
//! list items. Rather than building a document, [`query`] scans it once,
//! line by line, and stops as soon as the answer is found or the scan leaves
//! the subtree the path points into.
//!
//! Paths are colon-separated keys. A segment may begin with a `{literal}`
//! that constrains the key before it:
//!
//! - `DriverInfo:Drivers:CarIdx:{3}UserName` matches the `CarIdx: 3` line,
//!   then looks for `UserName` among its siblings in the same list item.
//! - `Drivers:{3}UserName` applies the literal to the block key `Drivers:`
//!   and selects the list item whose first line's value is `3`.
//!
//! Only one literal is supported per path.
//!
//! ```rust
//! use ira_telemetry::session::query::{parse_string, query_str};
//!
//! let text = "WeekendInfo:\n  TrackName: Texas\n";
//! assert_eq!(query_str(text, "WeekendInfo:TrackName"), Some("Texas"));
//! assert_eq!(parse_string(text, "WeekendInfo:TrackID"), "");
//! ```

/// Byte range of a value within the metadata text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub len: usize,
}

impl Span {
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The spanned text, if the span lies on character boundaries of `text`.
    pub fn slice<'a>(&self, text: &'a str) -> Option<&'a str> {
        text.get(self.start..self.end())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PathStep<'p> {
    key: &'p str,
    literal: Option<&'p str>,
}

fn parse_path(path: &str) -> Option<Vec<PathStep<'_>>> {
    let path = path.strip_suffix(':').unwrap_or(path);
    let mut steps: Vec<PathStep<'_>> = Vec::new();
    let mut literals = 0;

    for segment in path.split(':') {
        let mut key = segment;
        if let Some(rest) = segment.strip_prefix('{') {
            let close = rest.find('}')?;
            let literal = &rest[..close];
            literals += 1;
            let previous = steps.last_mut()?;
            previous.literal = Some(literal);
            key = &rest[close + 1..];
            if key.is_empty() {
                continue;
            }
        }
        if key.is_empty() || key.contains(['{', '}']) {
            return None;
        }
        steps.push(PathStep { key, literal: None });
    }

    if steps.is_empty() || literals > 1 {
        return None;
    }
    Some(steps)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Indent,
    Key,
    AfterColon,
    Value,
    Newline,
}

/// One scanned line. Ranges are byte offsets into the text.
#[derive(Debug, Clone, Copy, Default)]
struct Line {
    depth: usize,
    dash: bool,
    key: Option<(usize, usize)>,
    value: (usize, usize),
}

impl Line {
    fn is_blank(&self) -> bool {
        self.key.is_none() && self.value.0 == self.value.1
    }

    fn value_span(&self) -> Span {
        Span { start: self.value.0, len: self.value.1 - self.value.0 }
    }
}

#[derive(Debug, Clone, Copy)]
struct Scope {
    min_depth: usize,
    level: Option<usize>,
    item_bounded: bool,
}

impl Scope {
    const ROOT: Scope = Scope { min_depth: 0, level: Some(0), item_bounded: false };

    fn children_of(depth: usize) -> Self {
        Scope { min_depth: depth + 1, level: None, item_bounded: false }
    }

    fn siblings_in_item(depth: usize) -> Self {
        Scope { min_depth: depth, level: Some(depth), item_bounded: true }
    }
}

enum Mode<'p> {
    Keys,
    /// Looking for the list item under a block key whose head value equals the literal.
    /// Heads of nested sub-lists sit deeper than `item_depth` and are skipped.
    Item { parent_depth: usize, item_depth: Option<usize>, literal: &'p str },
}

enum Verdict {
    Continue,
    Found(Span),
    Miss,
}

struct Matcher<'t, 'p> {
    text: &'t [u8],
    steps: Vec<PathStep<'p>>,
    cursor: usize,
    scope: Scope,
    mode: Mode<'p>,
}

impl<'t, 'p> Matcher<'t, 'p> {
    fn key_is(&self, line: &Line, key: &str) -> bool {
        line.key.is_some_and(|(start, end)| &self.text[start..end] == key.as_bytes())
    }

    fn value_is(&self, line: &Line, literal: &str) -> bool {
        &self.text[line.value.0..line.value.1] == literal.as_bytes()
    }

    fn is_last(&self) -> bool {
        self.cursor + 1 == self.steps.len()
    }

    /// `line` matched the current step's key (and literal, if any).
    fn advance(&mut self, line: &Line, scope: Scope) -> Verdict {
        if self.is_last() {
            return Verdict::Found(line.value_span());
        }
        self.cursor += 1;
        self.scope = scope;
        Verdict::Continue
    }

    fn line(&mut self, line: &Line) -> Verdict {
        if let Mode::Item { parent_depth, item_depth, literal } = self.mode {
            if line.depth <= parent_depth {
                return Verdict::Miss;
            }
            if !line.dash {
                return Verdict::Continue;
            }
            let item_depth = item_depth.unwrap_or(line.depth);
            self.mode = Mode::Item { parent_depth, item_depth: Some(item_depth), literal };
            if line.depth != item_depth || !self.value_is(line, literal) {
                return Verdict::Continue;
            }
            self.mode = Mode::Keys;
            if self.is_last() {
                return Verdict::Found(line.value_span());
            }
            self.cursor += 1;
            self.scope = Scope::siblings_in_item(line.depth);
            let step = self.steps[self.cursor];
            if self.key_is(line, step.key) {
                return self.advance(line, Scope::children_of(line.depth));
            }
            return Verdict::Continue;
        }

        let floor = self.scope.level.unwrap_or(self.scope.min_depth);
        if line.depth < floor {
            return Verdict::Miss;
        }
        let level = *self.scope.level.get_or_insert(line.depth);
        if line.depth > level {
            return Verdict::Continue;
        }
        if self.scope.item_bounded && line.dash {
            return Verdict::Miss;
        }

        let step = self.steps[self.cursor];
        if !self.key_is(line, step.key) {
            return Verdict::Continue;
        }

        match step.literal {
            None => self.advance(line, Scope::children_of(line.depth)),
            Some(literal) if line.value_span().is_empty() => {
                self.mode = Mode::Item { parent_depth: line.depth, item_depth: None, literal };
                Verdict::Continue
            }
            Some(literal) if self.value_is(line, literal) => {
                self.advance(line, Scope::siblings_in_item(line.depth))
            }
            Some(_) => Verdict::Continue,
        }
    }
}

/// Find the value at `path`, returning its byte span and the number of
/// non-blank lines examined.
pub fn query_traced(text: &str, path: &str) -> (Option<Span>, usize) {
    let Some(steps) = parse_path(path) else {
        return (None, 0);
    };

    let bytes = text.as_bytes();
    let mut matcher =
        Matcher { text: bytes, steps, cursor: 0, scope: Scope::ROOT, mode: Mode::Keys };
    let mut scanned = 0usize;
    let mut state = ScanState::Newline;
    let mut line = Line::default();

    let mut finish = |line: &Line, scanned: &mut usize| -> Option<Verdict> {
        if line.is_blank() {
            return None;
        }
        *scanned += 1;
        Some(matcher.line(line))
    };

    for (i, &byte) in bytes.iter().enumerate() {
        if byte == b'\n' || byte == b'\r' {
            if state != ScanState::Newline {
                match finish(&line, &mut scanned) {
                    Some(Verdict::Found(span)) => return (Some(span), scanned),
                    Some(Verdict::Miss) => return (None, scanned),
                    _ => {}
                }
            }
            state = ScanState::Newline;
            line = Line::default();
            continue;
        }

        match state {
            ScanState::Newline | ScanState::Indent => {
                state = ScanState::Indent;
                match byte {
                    b' ' | b'\t' => line.depth += 1,
                    b'-' => {
                        line.depth += 1;
                        line.dash = true;
                    }
                    _ => {
                        state = ScanState::Key;
                        line.value = (i, i + 1);
                    }
                }
            }
            ScanState::Key => {
                if byte == b':' {
                    line.key = Some((line.value.0, line.value.1));
                    line.value = (i + 1, i + 1);
                    state = ScanState::AfterColon;
                } else if !byte.is_ascii_whitespace() {
                    line.value.1 = i + 1;
                }
            }
            ScanState::AfterColon => {
                if !byte.is_ascii_whitespace() {
                    line.value = (i, i + 1);
                    state = ScanState::Value;
                }
            }
            ScanState::Value => {
                if !byte.is_ascii_whitespace() {
                    line.value.1 = i + 1;
                }
            }
        }
    }

    if state != ScanState::Newline {
        if let Some(Verdict::Found(span)) = finish(&line, &mut scanned) {
            return (Some(span), scanned);
        }
    }
    (None, scanned)
}

/// Byte span of the value at `path`, or `None` when the path is absent or invalid.
pub fn query(text: &str, path: &str) -> Option<Span> {
    query_traced(text, path).0
}

/// The value at `path` as a string slice. `Some("")` means the key exists with no value.
pub fn query_str<'a>(text: &'a str, path: &str) -> Option<&'a str> {
    query(text, path)?.slice(text)
}

/// The value at `path`, or an empty string.
pub fn parse_string(text: &str, path: &str) -> String {
    query_str(text, path).unwrap_or_default().to_string()
}

/// The leading integer of the value at `path`, or 0.
pub fn parse_int(text: &str, path: &str) -> i32 {
    query_str(text, path).map(leading_int).unwrap_or(0)
}

/// The leading number of the value at `path` as `f32`, or 0.
pub fn parse_float(text: &str, path: &str) -> f32 {
    parse_double(text, path) as f32
}

/// The leading number of the value at `path` as `f64`, or 0.
pub fn parse_double(text: &str, path: &str) -> f64 {
    query_str(text, path).map(leading_float).unwrap_or(0.0)
}

fn digits_end(bytes: &[u8], from: usize) -> usize {
    bytes[from..].iter().position(|b| !b.is_ascii_digit()).map_or(bytes.len(), |n| from + n)
}

fn sign_end(bytes: &[u8], from: usize) -> usize {
    match bytes.get(from) {
        Some(b'+' | b'-') => from + 1,
        _ => from,
    }
}

pub(crate) fn leading_int(value: &str) -> i32 {
    let value = value.trim_start();
    let bytes = value.as_bytes();
    let end = digits_end(bytes, sign_end(bytes, 0));
    let prefix = &value[..end];
    match prefix.parse::<i64>() {
        Ok(n) => n.clamp(i32::MIN as i64, i32::MAX as i64) as i32,
        Err(_) if prefix.len() > 1 => {
            if prefix.starts_with('-') { i32::MIN } else { i32::MAX }
        }
        Err(_) => 0,
    }
}

pub(crate) fn leading_float(value: &str) -> f64 {
    let value = value.trim_start();
    let bytes = value.as_bytes();
    let int_end = digits_end(bytes, sign_end(bytes, 0));
    let mut end = int_end;
    if bytes.get(end) == Some(&b'.') {
        end = digits_end(bytes, end + 1);
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let exp_digits = sign_end(bytes, end + 1);
        let exp_end = digits_end(bytes, exp_digits);
        if exp_end > exp_digits {
            end = exp_end;
        }
    }
    value[..end].parse().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const DRIVERS: &str = "\
WeekendInfo:
 TrackName: texas
 TrackDisplayName: Texas Motor Speedway
 TrackLength: 2.38 km
 TrackID: 40
DriverInfo:
 DriverCarIdx: 1
 Drivers:
 - CarIdx: 0
   UserName: Alice Adams
   CarNumber: \"7\"
 - CarIdx: 1
   UserName: Bob Brown
   CarScreenName: Mazda MX-5
 - CarIdx: 12
   UserName: Carol
SplitTimeInfo:
 Sectors:
 - SectorNum: 0
   SectorStartPct: 0.000000
";

    #[test]
    fn finds_nested_value() {
        let text = "WeekendInfo:\n  TrackName: Texas\n";
        let span = query(text, "WeekendInfo:TrackName").unwrap();
        assert_eq!(&text[span.start..span.end()], "Texas");
        assert_eq!(query_str(text, "WeekendInfo:TrackName:"), Some("Texas"));
    }

    #[test]
    fn sibling_literal_selects_list_item() {
        assert_eq!(query_str(DRIVERS, "DriverInfo:Drivers:CarIdx:{1}UserName"), Some("Bob Brown"));
        assert_eq!(query_str(DRIVERS, "DriverInfo:Drivers:CarIdx:{0}UserName"), Some("Alice Adams"));
        assert_eq!(query_str(DRIVERS, "DriverInfo:Drivers:CarIdx:{12}UserName"), Some("Carol"));
    }

    #[test]
    fn block_literal_selects_item_by_head_value() {
        assert_eq!(query_str(DRIVERS, "DriverInfo:Drivers:{1}UserName"), Some("Bob Brown"));
        assert_eq!(query_str(DRIVERS, "DriverInfo:Drivers:{1}CarIdx"), Some("1"));
        assert_eq!(query_str(DRIVERS, "DriverInfo:Drivers:{12}"), Some("12"));
    }

    #[test]
    fn block_literal_skips_heads_of_nested_lists() {
        let text = "\
SessionInfo:
 Sessions:
 - SessionNum: 0
   SessionType: Practice
   ResultsPositions:
   - Position: 1
     CarIdx: 4
   - Position: 2
     CarIdx: 7
 - SessionNum: 1
   SessionType: Qualify
 - SessionNum: 2
   SessionType: Race
";
        assert_eq!(query_str(text, "SessionInfo:Sessions:{0}SessionType"), Some("Practice"));
        assert_eq!(query_str(text, "SessionInfo:Sessions:{1}SessionType"), Some("Qualify"));
        assert_eq!(query_str(text, "SessionInfo:Sessions:{2}SessionType"), Some("Race"));
        assert_eq!(query(text, "SessionInfo:Sessions:{3}SessionType"), None);
    }

    #[test]
    fn literal_without_matching_item_is_not_found() {
        assert_eq!(query(DRIVERS, "DriverInfo:Drivers:CarIdx:{5}UserName"), None);
        assert_eq!(query(DRIVERS, "DriverInfo:Drivers:{5}UserName"), None);
    }

    #[test]
    fn field_missing_from_selected_item_does_not_leak_into_next() {
        assert_eq!(query(DRIVERS, "DriverInfo:Drivers:CarIdx:{0}CarScreenName"), None);
        assert_eq!(query(DRIVERS, "DriverInfo:Drivers:{12}CarScreenName"), None);
    }

    #[test]
    fn values_keep_inner_spaces_and_colons() {
        let text = "A:\n B: 12:30:00  \n C:   \n";
        assert_eq!(query_str(text, "A:B"), Some("12:30:00"));
        assert_eq!(query_str(text, "A:C"), Some(""));
        assert_eq!(query_str(text, "A"), Some(""));
    }

    #[test]
    fn crlf_and_blank_lines_are_tolerated() {
        let text = "A:\r\n\r\n  B: x\r\n";
        assert_eq!(query_str(text, "A:B"), Some("x"));
    }

    #[test]
    fn keys_match_only_at_the_scoped_level() {
        let text = "A:\n B:\n  C: deep\n C: shallow\n";
        assert_eq!(query_str(text, "A:C"), Some("shallow"));
        assert_eq!(query_str(text, "C"), None);
        assert_eq!(query_str(text, "A:B:C"), Some("deep"));
    }

    #[test]
    fn leaving_the_subtree_stops_the_scan() {
        let text = "A:\n B: 1\nC: 2\n D: 3\nE: 4\nF: 5\n";
        let (span, scanned) = query_traced(text, "A:D");
        assert_eq!(span, None);
        assert_eq!(scanned, 3);

        let (span, scanned) = query_traced(text, "F");
        assert!(span.is_some());
        assert_eq!(scanned, 6);
    }

    #[test]
    fn invalid_paths_are_rejected() {
        assert_eq!(query(DRIVERS, ""), None);
        assert_eq!(query(DRIVERS, "{1}DriverInfo"), None);
        assert_eq!(query(DRIVERS, "DriverInfo::Drivers"), None);
        assert_eq!(query(DRIVERS, "DriverInfo:Drivers:{1}CarIdx:{1}UserName"), None);
        assert_eq!(query(DRIVERS, "DriverInfo:Drivers:{1UserName"), None);
    }

    #[test]
    fn typed_wrappers_default_when_missing() {
        assert_eq!(parse_string(DRIVERS, "WeekendInfo:TrackDisplayName"), "Texas Motor Speedway");
        assert_eq!(parse_int(DRIVERS, "WeekendInfo:TrackID"), 40);
        assert_eq!(parse_float(DRIVERS, "WeekendInfo:TrackLength"), 2.38);
        assert_eq!(parse_double(DRIVERS, "SplitTimeInfo:Sectors:{0}SectorStartPct"), 0.0);

        assert_eq!(parse_string(DRIVERS, "WeekendInfo:Nope"), "");
        assert_eq!(parse_int(DRIVERS, "WeekendInfo:Nope"), 0);
        assert_eq!(parse_float(DRIVERS, "WeekendInfo:Nope"), 0.0);
        assert_eq!(parse_double(DRIVERS, "WeekendInfo:TrackName"), 0.0);
    }

    #[test]
    fn numeric_prefixes() {
        assert_eq!(leading_int("  -42 laps"), -42);
        assert_eq!(leading_int("+7"), 7);
        assert_eq!(leading_int("abc"), 0);
        assert_eq!(leading_int("99999999999"), i32::MAX);
        assert_eq!(leading_float("7.20 km"), 7.2);
        assert_eq!(leading_float("1e3x"), 1000.0);
        assert_eq!(leading_float("2.5e"), 2.5);
        assert_eq!(leading_float(".5"), 0.5);
        assert_eq!(leading_float("-"), 0.0);
    }

    proptest! {
        #[test]
        fn query_is_idempotent_and_round_trips(
            value in "[A-Za-z0-9][A-Za-z0-9 .]{0,20}[A-Za-z0-9]",
            other in "[A-Za-z0-9]{1,10}",
        ) {
            let text = format!("Root:\n Other: {other}\n Target: {value}\nNext:\n Target: x\n");
            let first = query(&text, "Root:Target");
            prop_assert_eq!(first, query(&text, "Root:Target"));

            let copied = parse_string(&text, "Root:Target");
            prop_assert_eq!(&copied, &value);
            let requeried = format!("Root:\n Target: {copied}\n");
            prop_assert_eq!(query_str(&requeried, "Root:Target"), Some(value.as_str()));
        }

        #[test]
        fn arbitrary_text_never_panics(text in "[ -~\n\r-]{0,200}", path in "[A-Za-z:{}0-9]{0,20}") {
            let _ = query_traced(&text, &path);
        }
    }
}
