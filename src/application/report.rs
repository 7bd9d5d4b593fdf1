//! Per-run outcome buckets and the summary printed at the end of a run.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::cache::CacheEntry;
use crate::domain::posts::PostRecord;

/// Why a post ended the run without a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The existence query failed, so the post's state is unknown.
    QueryError,
    /// The thread could not be created.
    InitError,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::QueryError => "query error",
            Self::InitError => "init error",
        })
    }
}

/// Terminal state of one post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    CachedInitialized,
    RemoteInitialized,
    Created,
    Failed {
        reason: FailureReason,
        detail: String,
    },
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::CachedInitialized => "cached_initialized",
            Self::RemoteInitialized => "remote_initialized",
            Self::Created => "created",
            Self::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedPost {
    #[serde(flatten)]
    pub post: PostRecord,
    pub id: String,
    pub reason: FailureReason,
    pub detail: String,
}

/// What happened to the cache snapshot at the end of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CacheWrite {
    /// Caching is turned off; nothing was read or written.
    Disabled,
    Written { path: String, entries: usize },
    Failed { path: String, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub errors: Vec<FailedPost>,
    pub initialized: Vec<CacheEntry>,
    pub created: Vec<CacheEntry>,
    pub cache: CacheWrite,
}

impl Default for RunReport {
    fn default() -> Self {
        Self {
            errors: Vec::new(),
            initialized: Vec::new(),
            created: Vec::new(),
            cache: CacheWrite::Disabled,
        }
    }
}

impl RunReport {
    pub fn record(&mut self, post: &PostRecord, id: String, outcome: Outcome) {
        match outcome {
            Outcome::CachedInitialized | Outcome::RemoteInitialized => {
                self.initialized.push(CacheEntry::new(id));
            }
            Outcome::Created => self.created.push(CacheEntry::new(id)),
            Outcome::Failed { reason, detail } => self.errors.push(FailedPost {
                post: post.clone(),
                id,
                reason,
                detail,
            }),
        }
    }

    /// The next cache snapshot: already-initialized ids followed by newly
    /// created ones, each id once.
    pub fn snapshot(&self) -> Vec<CacheEntry> {
        let mut seen = HashSet::new();
        self.initialized
            .iter()
            .chain(&self.created)
            .filter(|entry| seen.insert(entry.id.as_str()))
            .cloned()
            .collect()
    }

    pub fn summary(&self) -> RunSummary<'_> {
        RunSummary {
            errored: self.errors.len(),
            created: self.created.len(),
            initialized: self.initialized.len(),
            cache: &self.cache,
            errors: &self.errors,
        }
    }
}

/// Serializable view of a [`RunReport`], printed on stdout.
#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
    pub errored: usize,
    pub created: usize,
    pub initialized: usize,
    pub cache: &'a CacheWrite,
    pub errors: &'a [FailedPost],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::posts::PostDate;

    fn post(pathname: &str) -> PostRecord {
        PostRecord {
            pathname: pathname.to_string(),
            title: "T".to_string(),
            desc: "D".to_string(),
            date: PostDate::parse("2024-01-01 10").expect("date"),
        }
    }

    #[test]
    fn snapshot_excludes_failures_and_dedupes() {
        let mut report = RunReport::default();
        report.record(&post("/a/"), "/a/".into(), Outcome::CachedInitialized);
        report.record(&post("/b/"), "/b/".into(), Outcome::Created);
        report.record(&post("/a/"), "/a/".into(), Outcome::RemoteInitialized);
        report.record(
            &post("/c/"),
            "/c/".into(),
            Outcome::Failed {
                reason: FailureReason::InitError,
                detail: "Validation Failed".into(),
            },
        );

        assert_eq!(
            report.snapshot(),
            vec![CacheEntry::new("/a/"), CacheEntry::new("/b/")]
        );
    }

    #[test]
    fn summary_serializes_counts_and_failures() {
        let mut report = RunReport::default();
        report.record(&post("/b/"), "/b/".into(), Outcome::Created);
        report.record(
            &post("/c/"),
            "/c/".into(),
            Outcome::Failed {
                reason: FailureReason::QueryError,
                detail: "timeout".into(),
            },
        );
        report.cache = CacheWrite::Written {
            path: "public/gitalk-init-cache.json".into(),
            entries: 1,
        };

        let value = serde_json::to_value(report.summary()).expect("serialize");
        assert_eq!(value["errored"], 1);
        assert_eq!(value["created"], 1);
        assert_eq!(value["initialized"], 0);
        assert_eq!(value["cache"]["status"], "written");
        assert_eq!(value["errors"][0]["pathname"], "/c/");
        assert_eq!(value["errors"][0]["reason"], "query_error");
        assert_eq!(value["errors"][0]["date"], "2024-01-01 10");
    }

    #[test]
    fn failure_reasons_read_like_the_log() {
        assert_eq!(FailureReason::QueryError.to_string(), "query error");
        assert_eq!(FailureReason::InitError.to_string(), "init error");
    }
}
