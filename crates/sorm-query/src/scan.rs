//! Quote-aware placeholder scanner.
//!
//! Splits query text into literal runs and `%{...}` placeholders. Text inside
//! single-quoted, double-quoted or backtick-quoted literals is never scanned
//! for placeholders. A literal ends at the next matching quote. A quote
//! preceded by a backslash does not open one.

/// A piece of scanned query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Literal text, copied through unchanged
    Text(&'a str),
    /// A `%{...}` token; `body` is the text between the braces
    Placeholder { raw: &'a str, body: &'a str },
}

/// Scan query text into segments, left to right.
pub fn scan(sql: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut quote: Option<char> = None;
    let mut prev: Option<char> = None;
    let mut text_start = 0;
    let mut chars = sql.char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        let escaped = prev == Some('\\');
        prev = Some(ch);
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') if !escaped => quote = Some(ch),
            (None, '%') if matches!(chars.peek(), Some((_, '{'))) => {
                let Some(close) = sql[i..].find('}') else {
                    continue;
                };
                let end = i + close + 1;
                if text_start < i {
                    segments.push(Segment::Text(&sql[text_start..i]));
                }
                segments.push(Segment::Placeholder {
                    raw: &sql[i..end],
                    body: &sql[i + 2..end - 1],
                });
                text_start = end;
                while chars.peek().is_some_and(|(j, _)| *j < end) {
                    chars.next();
                }
                prev = Some('}');
            }
            (None, _) => {}
        }
    }

    if text_start < sql.len() {
        segments.push(Segment::Text(&sql[text_start..]));
    }
    segments
}
