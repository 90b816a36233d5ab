//! Restricted header parser.
//!
//! Supports a single leading `---` block of flat `key: value` lines plus one
//! list field (the tool declaration), which may be written inline
//! (`allowed-tools: Read, Write` or `[Read, Write]`) or as an indented block
//! list terminated by a blank line or the next top-level key.
//!
//! Parsing never fails: malformed lines are ignored, and stray lines inside
//! a tool block are reported as [`ParseAnomaly`] values for the caller to log.

use std::sync::LazyLock;

use regex::Regex;

use promptgen_shared::{HeaderFields, ToolDeclaration};

/// Header delimiter line.
pub const DELIMITER: &str = "---";

/// Keys accepted for the tool declaration. The first one present wins.
pub const TOOL_KEYS: &[&str] = &["allowed-tools", "tools"];

static KEY_VALUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z0-9_-]+)\s*:\s*(.*?)\s*$").expect("valid regex"));

static NEW_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+\s*:").expect("valid regex"));

static LIST_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s+-\s+(.+?)\s*$").expect("valid regex"));

/// A line inside a tool block that was neither an item nor a terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAnomaly {
    /// 1-based line number within the whole document.
    pub line: usize,
    pub text: String,
}

/// Header fields plus the residual body.
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    pub header: HeaderFields,
    /// Text after the closing delimiter, leading whitespace removed. Line
    /// endings are left as found.
    pub body: String,
    pub anomalies: Vec<ParseAnomaly>,
}

/// Parse the leading header block of `text`.
///
/// Text without a header (no leading delimiter, or no closing delimiter)
/// yields empty fields and the full text as body.
pub fn parse(text: &str) -> ParsedDocument {
    let Some((header_lines, body_start)) = split_header(text) else {
        return ParsedDocument {
            body: text.to_string(),
            ..Default::default()
        };
    };

    let mut parser = HeaderParser::default();
    for (offset, line) in header_lines.iter().enumerate() {
        // Line 1 is the opening delimiter.
        parser.feed(offset + 2, line);
    }
    let (header, anomalies) = parser.finish();

    ParsedDocument {
        header,
        body: text[body_start..].trim_start().to_string(),
        anomalies,
    }
}

/// Locate the header block. Returns its inner lines (line endings stripped)
/// and the byte offset where the body begins.
fn split_header(text: &str) -> Option<(Vec<&str>, usize)> {
    if !text.starts_with(DELIMITER) {
        return None;
    }

    let mut lines = text.split_inclusive('\n');
    let first = lines.next()?;
    if first.trim_end() != DELIMITER {
        return None;
    }

    let mut offset = first.len();
    let mut inner = Vec::new();
    for line in lines {
        offset += line.len();
        let content = line.trim_end_matches(['\n', '\r']);
        if content.trim_end() == DELIMITER {
            return Some((inner, offset));
        }
        inner.push(content);
    }

    None
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
enum State {
    #[default]
    Scanning,
    Collecting(Vec<String>),
}

#[derive(Debug, Default)]
struct HeaderParser {
    state: State,
    header: HeaderFields,
    anomalies: Vec<ParseAnomaly>,
}

impl HeaderParser {
    fn feed(&mut self, line_no: usize, line: &str) {
        if let State::Collecting(items) = &mut self.state {
            if !line.trim().is_empty() && !NEW_KEY_RE.is_match(line) {
                match LIST_ITEM_RE.captures(line) {
                    Some(caps) => {
                        let item = strip_quotes(caps[1].trim());
                        if !item.is_empty() {
                            items.push(item.to_string());
                        }
                    }
                    None => self.anomalies.push(ParseAnomaly {
                        line: line_no,
                        text: line.to_string(),
                    }),
                }
                return;
            }
            self.close_block();
        }

        let Some(caps) = KEY_VALUE_RE.captures(line) else {
            return;
        };
        let key = &caps[1];
        let value = &caps[2];

        if TOOL_KEYS.contains(&key) && self.header.tools.is_none() {
            if value.is_empty() {
                self.state = State::Collecting(Vec::new());
            } else {
                self.header.tools = Some(ToolDeclaration::new(split_inline_list(value)));
            }
            return;
        }

        self.header
            .values
            .insert(key.to_string(), strip_quotes(value).to_string());
    }

    fn close_block(&mut self) {
        if let State::Collecting(items) = std::mem::take(&mut self.state) {
            self.header.tools = Some(ToolDeclaration::new(items));
        }
    }

    fn finish(mut self) -> (HeaderFields, Vec<ParseAnomaly>) {
        self.close_block();
        (self.header, self.anomalies)
    }
}

/// `Read, Write` and `[Read, Write]` are equivalent.
fn split_inline_list(value: &str) -> Vec<String> {
    let value = value.strip_prefix('[').unwrap_or(value);
    let value = value.strip_suffix(']').unwrap_or(value);
    value
        .split(',')
        .map(|item| strip_quotes(item.trim()))
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

/// Strip one layer of matching single or double quotes.
fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
