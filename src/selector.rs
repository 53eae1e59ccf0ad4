// src/selector.rs
//! Incremental Selector: which candidates are newer than what the database
//! already holds for their source.
//!
//! Timestamps are `YYYY-MM-DD HH:MM` strings in one fixed offset, so plain
//! string comparison is chronological.

use std::collections::BTreeMap;

use crate::ingest::types::NewsItem;

/// Latest persisted `published_time` per source. Read fresh each run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceCursors {
    latest: BTreeMap<String, String>,
}

impl SourceCursors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, source: &str) -> Option<&str> {
        self.latest.get(source).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.latest.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Later timestamps win when a source appears more than once.
    fn observe(&mut self, source: String, published_time: String) {
        match self.latest.get_mut(&source) {
            Some(cur) if *cur >= published_time => {}
            Some(cur) => *cur = published_time,
            None => {
                self.latest.insert(source, published_time);
            }
        }
    }
}

impl<S: Into<String>, T: Into<String>> FromIterator<(S, T)> for SourceCursors {
    fn from_iter<I: IntoIterator<Item = (S, T)>>(iter: I) -> Self {
        let mut out = Self::new();
        for (s, t) in iter {
            out.observe(s.into(), t.into());
        }
        out
    }
}

/// Keep the items strictly newer than their source's cursor, sorted ascending.
///
/// A source without a cursor has never been seen, so all of its items pass.
/// With no cursors at all (first run) every item passes unfiltered.
pub fn select_unpublished(items: Vec<NewsItem>, cursors: &SourceCursors) -> Vec<NewsItem> {
    let mut out: Vec<NewsItem> = if cursors.is_empty() {
        items
    } else {
        items
            .into_iter()
            .filter(|it| match cursors.get(&it.source) {
                Some(cursor) => it.published_time.as_str() > cursor,
                None => true,
            })
            .collect()
    };
    out.sort_by(|a, b| a.published_time.cmp(&b.published_time));
    out
}
