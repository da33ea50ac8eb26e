//! Ordered pattern tables.

use regex::bytes::Regex;

use crate::error::Result;

/// One way of recognizing a condition in process output.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Exact byte sequence.
    Literal(Vec<u8>),
    /// Regular expression over raw bytes.
    Regex(Regex),
    /// The output stream reached end of file.
    Eof,
    /// The wait deadline passed.
    Timeout,
}

impl Matcher {
    /// Creates a literal matcher.
    pub fn literal(text: impl AsRef<str>) -> Self {
        Self::Literal(text.as_ref().as_bytes().to_vec())
    }

    /// Compiles a regular expression matcher.
    pub fn regex(pattern: &str) -> Result<Self> {
        Ok(Self::Regex(Regex::new(pattern)?))
    }

    /// Finds the leftmost occurrence in `haystack` as `(start, end, captures)`.
    fn find(&self, haystack: &[u8]) -> Option<(usize, usize, Vec<String>)> {
        match self {
            Matcher::Literal(needle) => find_literal(haystack, needle)
                .map(|start| (start, start + needle.len(), Vec::new())),
            Matcher::Regex(regex) => regex.captures(haystack).and_then(|caps| {
                let whole = caps.get(0)?;
                let groups = caps
                    .iter()
                    .skip(1) // Skip the full match
                    .map(|m| {
                        m.map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
                            .unwrap_or_default()
                    })
                    .collect();
                Some((whole.start(), whole.end(), groups))
            }),
            Matcher::Eof | Matcher::Timeout => None,
        }
    }
}

fn find_literal(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// A match located in a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Found<K> {
    /// Kind of the entry that matched.
    pub kind: K,
    /// Offset of the first matched byte.
    pub start: usize,
    /// Offset just past the last matched byte.
    pub end: usize,
    /// Capture groups (regex entries only).
    pub captures: Vec<String>,
}

/// Priority-ordered list of `(kind, matcher)` entries.
#[derive(Debug, Clone)]
pub struct PatternTable<K> {
    entries: Vec<(K, Matcher)>,
}

impl<K> Default for PatternTable<K> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<K: Clone> PatternTable<K> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn with(mut self, kind: K, matcher: Matcher) -> Self {
        self.entries.push((kind, matcher));
        self
    }

    /// Appends a literal entry.
    pub fn literal(self, kind: K, text: &str) -> Self {
        self.with(kind, Matcher::literal(text))
    }

    /// Appends a regular expression entry.
    pub fn regex(self, kind: K, pattern: &str) -> Result<Self> {
        Ok(self.with(kind, Matcher::regex(pattern)?))
    }

    /// Maps end of file to `kind`.
    pub fn eof(self, kind: K) -> Self {
        self.with(kind, Matcher::Eof)
    }

    /// Maps an expired deadline to `kind`.
    pub fn timeout(self, kind: K) -> Self {
        self.with(kind, Matcher::Timeout)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the entries in priority order.
    pub fn entries(&self) -> impl Iterator<Item = &(K, Matcher)> {
        self.entries.iter()
    }

    /// Finds the leftmost match of any text entry; ties go to the earlier entry.
    pub fn find(&self, haystack: &[u8]) -> Option<Found<K>> {
        let mut best: Option<Found<K>> = None;
        for (kind, matcher) in &self.entries {
            let Some((start, end, captures)) = matcher.find(haystack) else {
                continue;
            };
            if best.as_ref().map_or(true, |b| start < b.start) {
                best = Some(Found {
                    kind: kind.clone(),
                    start,
                    end,
                    captures,
                });
            }
        }
        best
    }

    /// Kind mapped to end of file, if any.
    pub fn eof_kind(&self) -> Option<K> {
        self.entries
            .iter()
            .find(|(_, m)| matches!(m, Matcher::Eof))
            .map(|(k, _)| k.clone())
    }

    /// Kind mapped to an expired deadline, if any.
    pub fn timeout_kind(&self) -> Option<K> {
        self.entries
            .iter()
            .find(|(_, m)| matches!(m, Matcher::Timeout))
            .map(|(k, _)| k.clone())
    }
}
