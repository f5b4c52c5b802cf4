//! Fenced-code splitting for streamed prose.
//!
//! The accumulated prose is re-scanned from the start on every update, so
//! `split` is a pure function of its input. Segments alternate
//! plain / code / plain / ... / plain, with an optional trailing open code
//! segment when the last fence has no partner yet.

use std::fmt;

/// Triple-backtick delimiter.
pub const FENCE: &str = "```";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    PlainText,
    CodeBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    pub kind: SegmentKind,
    pub content: &'a str,
    /// True only for a trailing code block whose closing fence has not arrived.
    pub is_open: bool,
    /// Byte offset in the source where this segment's raw text starts
    /// (the opening fence for code blocks).
    pub offset: usize,
}

impl<'a> Segment<'a> {
    fn plain(content: &'a str, offset: usize) -> Self {
        Self {
            kind: SegmentKind::PlainText,
            content,
            is_open: false,
            offset,
        }
    }

    fn code(content: &'a str, offset: usize, is_open: bool) -> Self {
        Self {
            kind: SegmentKind::CodeBlock,
            content,
            is_open,
            offset,
        }
    }

    /// Key that stays the same for this segment across re-scans of a growing
    /// string, until the segment itself changes shape.
    pub fn key(&self) -> String {
        match (self.kind, self.is_open) {
            (SegmentKind::PlainText, _) => format!("text-{}", self.offset),
            (SegmentKind::CodeBlock, false) => format!("code-{}", self.offset),
            (SegmentKind::CodeBlock, true) => format!("code-{}-ongoing", self.offset),
        }
    }

    /// Length of the segment's raw text in the source, fences included.
    pub fn raw_len(&self) -> usize {
        match (self.kind, self.is_open) {
            (SegmentKind::PlainText, _) => self.content.len(),
            (SegmentKind::CodeBlock, true) => FENCE.len() + self.content.len(),
            (SegmentKind::CodeBlock, false) => 2 * FENCE.len() + self.content.len(),
        }
    }
}

impl fmt::Display for Segment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, self.is_open) {
            (SegmentKind::PlainText, _) => f.write_str(self.content),
            (SegmentKind::CodeBlock, true) => write!(f, "{FENCE}{}", self.content),
            (SegmentKind::CodeBlock, false) => write!(f, "{FENCE}{}{FENCE}", self.content),
        }
    }
}

/// Split `text` into plain and fenced-code segments.
pub fn split(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut pos = 0;

    loop {
        let rest = &text[pos..];
        let Some(open_rel) = rest.find(FENCE) else {
            segments.push(Segment::plain(rest, pos));
            break;
        };

        let open = pos + open_rel;
        let body_start = open + FENCE.len();
        segments.push(Segment::plain(&text[pos..open], pos));

        match text[body_start..].find(FENCE) {
            Some(close_rel) => {
                let close = body_start + close_rel;
                segments.push(Segment::code(&text[body_start..close], open, false));
                pos = close + FENCE.len();
            }
            None => {
                segments.push(Segment::code(&text[body_start..], open, true));
                break;
            }
        }
    }

    segments
}

/// Re-insert fences and concatenate; inverse of [`split`].
pub fn reconstruct(segments: &[Segment<'_>]) -> String {
    let mut out = String::with_capacity(segments.iter().map(Segment::raw_len).sum());
    for seg in segments {
        out.push_str(&seg.to_string());
    }
    out
}

/// Lines of a plain segment; each `\n` becomes an explicit break.
pub fn plain_lines(content: &str) -> impl Iterator<Item = &str> {
    content.split('\n')
}

/// Peel a language tag off the first line of a fenced body.
///
/// ```
/// use fastgpt_stream::splitter::split_language;
///
/// assert_eq!(split_language("js\nconsole.log(1)\n"), (Some("js"), "console.log(1)\n"));
/// assert_eq!(split_language("print(1)"), (None, "print(1)"));
/// ```
pub fn split_language(code: &str) -> (Option<&str>, &str) {
    let Some((first, body)) = code.split_once('\n') else {
        return (None, code);
    };
    let tag = first.trim_end_matches('\r');
    let looks_like_tag = !tag.is_empty()
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '#' | '_' | '.'));
    if looks_like_tag {
        (Some(tag), body)
    } else {
        (None, code)
    }
}
