//! Bounded history of dispatched requests.

use crate::error::MatchError;
use crate::match_result::RequestMatchResult;
use crate::request::{RequestMatcher, RequestMessage};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// Default cap on retained entries.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: Uuid,
    pub request: RequestMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_title: Option<String>,
    /// Result of the selected (or best partial) mapping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_result: Option<RequestMatchResult>,
    /// Answered by a below-threshold candidate
    #[serde(default)]
    pub partial: bool,
    pub timestamp: DateTime<Utc>,
}

/// FIFO bounded by count and, optionally, by age.
#[derive(Debug)]
pub struct RequestLog {
    entries: RwLock<VecDeque<LogEntry>>,
    max_entries: usize,
    max_age: Option<Duration>,
}

impl Default for RequestLog {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, None)
    }
}

impl RequestLog {
    pub fn new(max_entries: usize, max_age: Option<Duration>) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            max_entries,
            max_age,
        }
    }

    /// Entries older than this are expired.
    fn cutoff(&self) -> Option<DateTime<Utc>> {
        self.max_age.map(|max_age| Utc::now() - max_age)
    }

    fn is_live(entry: &LogEntry, cutoff: Option<DateTime<Utc>>) -> bool {
        cutoff.map_or(true, |cutoff| entry.timestamp >= cutoff)
    }

    pub fn append(&self, entry: LogEntry) {
        let mut entries = self.entries.write();
        entries.push_back(entry);
        while entries.len() > self.max_entries {
            entries.pop_front();
        }
        if let Some(cutoff) = self.cutoff() {
            while entries.front().is_some_and(|e| e.timestamp < cutoff) {
                entries.pop_front();
            }
        }
    }

    /// Live entries, oldest first. Expiry also applies between appends.
    pub fn entries(&self) -> Vec<LogEntry> {
        let cutoff = self.cutoff();
        self.entries
            .read()
            .iter()
            .filter(|e| Self::is_live(e, cutoff))
            .cloned()
            .collect()
    }

    pub fn get(&self, id: Uuid) -> Option<LogEntry> {
        let cutoff = self.cutoff();
        self.entries
            .read()
            .iter()
            .find(|e| e.id == id && Self::is_live(e, cutoff))
            .cloned()
    }

    pub fn len(&self) -> usize {
        let cutoff = self.cutoff();
        self.entries
            .read()
            .iter()
            .filter(|e| Self::is_live(e, cutoff))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn reset(&self) {
        self.entries.write().clear();
    }

    /// Live entries whose request the matcher accepts above the match
    /// threshold.
    pub fn find(&self, matcher: &RequestMatcher) -> Result<Vec<LogEntry>, MatchError> {
        let cutoff = self.cutoff();
        let entries = self.entries.read();
        let mut found = Vec::new();
        for entry in entries.iter().filter(|e| Self::is_live(e, cutoff)) {
            if matcher.evaluate(&entry.request)?.is_match() {
                found.push(entry.clone());
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matchers::Matcher;

    fn entry(path: &str) -> LogEntry {
        LogEntry {
            id: Uuid::new_v4(),
            request: RequestMessage::new("GET", path),
            mapping_id: None,
            mapping_title: None,
            match_result: None,
            partial: false,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_bounded_by_count() {
        let log = RequestLog::new(2, None);
        log.append(entry("/1"));
        log.append(entry("/2"));
        log.append(entry("/3"));
        let paths: Vec<_> = log.entries().into_iter().map(|e| e.request.path).collect();
        assert_eq!(paths, vec!["/2", "/3"]);
    }

    #[test]
    fn test_expired_entries_dropped() {
        let log = RequestLog::new(10, Some(Duration::seconds(60)));
        let mut old = entry("/old");
        old.timestamp = Utc::now() - Duration::seconds(120);
        log.append(old);
        log.append(entry("/new"));
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].request.path, "/new");
    }

    #[test]
    fn test_entries_expire_without_new_traffic() {
        let log = RequestLog::new(10, Some(Duration::milliseconds(50)));
        let e = entry("/users/1");
        let id = e.id;
        log.append(e);
        assert_eq!(log.len(), 1);

        std::thread::sleep(std::time::Duration::from_millis(120));
        assert!(log.entries().is_empty());
        assert!(log.is_empty());
        assert!(log.get(id).is_none());
        let matcher = RequestMatcher::new().with_path(Matcher::wildcard("/users/*"));
        assert!(log.find(&matcher).unwrap().is_empty());
    }

    #[test]
    fn test_find_uses_match_threshold() {
        let log = RequestLog::default();
        log.append(entry("/users/1"));
        log.append(entry("/orders/1"));

        let matcher = RequestMatcher::new()
            .with_path(Matcher::wildcard("/users/*"))
            .using_get();
        let found = log.find(&matcher).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].request.path, "/users/1");
    }

    #[test]
    fn test_get_and_reset() {
        let log = RequestLog::default();
        let e = entry("/x");
        let id = e.id;
        log.append(e);
        assert!(log.get(id).is_some());
        log.reset();
        assert!(log.is_empty());
    }
}
