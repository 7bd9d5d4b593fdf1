//! The idempotent initialization run.
//!
//! Posts are settled strictly one after another: every request is awaited
//! before the next post starts, which keeps the run inside GitHub's rate
//! limits and lets the cache snapshot be assembled once, after the loop.
//!
//! Each post ends in exactly one of four states:
//!
//! * cached-initialized: the cache lists the id; GitHub is not asked.
//! * remote-initialized: GitHub already has a thread labelled with the id.
//! * created: a thread was opened during this run.
//! * failed: the query or the creation failed; the next post is unaffected.
//!
//! A positive cache answer is final. A thread deleted by hand while its id
//! stays cached is not recreated until the cache file is edited or dropped.

use metrics::counter;
use tracing::{debug, error, info, instrument, warn};

use crate::application::authority::{IssueAuthority, NewThread};
use crate::application::report::{CacheWrite, FailureReason, Outcome, RunReport};
use crate::cache::InitCache;
use crate::domain::identifier::{IdentifierStrategy, identify};
use crate::domain::posts::PostRecord;

const SOURCE: &str = "application::init";

pub struct InitRun<A> {
    authority: A,
    identifiers: Box<dyn IdentifierStrategy>,
    cache: Option<InitCache>,
}

impl<A> InitRun<A>
where
    A: IssueAuthority,
{
    /// `cache` is `None` when caching is disabled; every decision then goes
    /// to the authority and no snapshot is written.
    pub fn new(
        authority: A,
        identifiers: Box<dyn IdentifierStrategy>,
        cache: Option<InitCache>,
    ) -> Self {
        Self {
            authority,
            identifiers,
            cache,
        }
    }

    /// The id a post is tracked under, capped to the label limit whatever the
    /// strategy returns.
    pub fn identify(&self, post: &PostRecord) -> String {
        identify(self.identifiers.as_ref(), post)
    }

    /// Settle every post in order, then persist the snapshot when caching is
    /// enabled. Per-post failures are recorded, never propagated.
    #[instrument(skip_all, fields(posts = posts.len()))]
    pub async fn execute(mut self, posts: &[PostRecord]) -> RunReport {
        if let Some(cache) = self.cache.as_mut() {
            cache.load().await;
        }

        let mut report = RunReport::default();
        for post in posts {
            let id = self.identify(post);
            let outcome = self.settle(post, &id).await;
            counter!("gitalk_init_posts_total", "outcome" => outcome.label()).increment(1);
            report.record(post, id, outcome);
        }

        info!(
            target_module = SOURCE,
            errored = report.errors.len(),
            created = report.created.len(),
            initialized = report.initialized.len(),
            "Run finished"
        );

        report.cache = self.persist(&report).await;
        report
    }

    async fn settle(&self, post: &PostRecord, id: &str) -> Outcome {
        if let Some(cache) = self.cache.as_ref() {
            if cache.contains(id) {
                info!(target_module = SOURCE, id, title = %post.title, "Already initialized (cache)");
                return Outcome::CachedInitialized;
            }
            debug!(target_module = SOURCE, id, "Not cached; asking GitHub");
        }

        match self.authority.exists(id).await {
            Ok(true) => {
                info!(target_module = SOURCE, id, title = %post.title, "Already initialized (GitHub)");
                return Outcome::RemoteInitialized;
            }
            Ok(false) => {}
            Err(err) => {
                warn!(
                    target_module = SOURCE,
                    id,
                    title = %post.title,
                    error = %err,
                    "Existence query failed"
                );
                return Outcome::Failed {
                    reason: FailureReason::QueryError,
                    detail: err.to_string(),
                };
            }
        }

        info!(target_module = SOURCE, id, title = %post.title, "Creating thread");
        let thread = NewThread {
            id,
            pathname: &post.pathname,
            title: &post.title,
            desc: &post.desc,
        };
        match self.authority.create(thread).await {
            Ok(()) => {
                info!(target_module = SOURCE, id, title = %post.title, "Thread created");
                Outcome::Created
            }
            Err(err) => {
                warn!(
                    target_module = SOURCE,
                    id,
                    title = %post.title,
                    error = %err,
                    "Thread creation failed"
                );
                Outcome::Failed {
                    reason: FailureReason::InitError,
                    detail: err.to_string(),
                }
            }
        }
    }

    async fn persist(&self, report: &RunReport) -> CacheWrite {
        let Some(cache) = self.cache.as_ref() else {
            return CacheWrite::Disabled;
        };

        let entries = report.snapshot();
        let path = cache.file().display().to_string();
        match cache.persist(&entries).await {
            Ok(()) => CacheWrite::Written {
                path,
                entries: entries.len(),
            },
            Err(err) => {
                error!(target_module = SOURCE, path = %path, error = %err, "Cache snapshot not written");
                CacheWrite::Failed {
                    path,
                    error: err.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use reqwest::Client;
    use tempfile::TempDir;

    use super::*;
    use crate::application::authority::AuthorityError;
    use crate::cache::CacheEntry;
    use crate::domain::identifier::{MAX_LABEL_CHARS, PathnameIdentifier};
    use crate::domain::posts::PostDate;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Exists(String),
        Create { id: String, pathname: String },
    }

    #[derive(Default)]
    struct FakeAuthority {
        existing: HashSet<String>,
        failing_queries: HashSet<String>,
        failing_creates: HashSet<String>,
        calls: Mutex<Vec<Call>>,
    }

    impl FakeAuthority {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().expect("calls lock").clone()
        }

        fn creates(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    Call::Create { id, .. } => Some(id),
                    Call::Exists(_) => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl IssueAuthority for FakeAuthority {
        async fn exists(&self, id: &str) -> Result<bool, AuthorityError> {
            self.calls
                .lock()
                .expect("calls lock")
                .push(Call::Exists(id.to_string()));
            if self.failing_queries.contains(id) {
                return Err(AuthorityError::transport("connection reset"));
            }
            Ok(self.existing.contains(id))
        }

        async fn create(&self, thread: NewThread<'_>) -> Result<(), AuthorityError> {
            self.calls.lock().expect("calls lock").push(Call::Create {
                id: thread.id.to_string(),
                pathname: thread.pathname.to_string(),
            });
            if self.failing_creates.contains(thread.id) {
                return Err(AuthorityError::Status {
                    status: 422,
                    message: "Validation Failed".into(),
                });
            }
            Ok(())
        }
    }

    fn post(pathname: &str, title: &str) -> PostRecord {
        PostRecord {
            pathname: pathname.to_string(),
            title: title.to_string(),
            desc: title.to_string(),
            date: PostDate::parse("2024-01-01 10").expect("date"),
        }
    }

    fn hello() -> PostRecord {
        post("/2024/01/01/hello/", "Hello")
    }

    fn cache_in(dir: &TempDir) -> InitCache {
        InitCache::new(dir.path().join("cache.json"), None, Client::new())
    }

    fn run_with(authority: &Arc<FakeAuthority>, cache: Option<InitCache>) -> InitRun<Arc<FakeAuthority>> {
        InitRun::new(Arc::clone(authority), Box::new(PathnameIdentifier), cache)
    }

    fn read_snapshot(dir: &TempDir) -> Vec<CacheEntry> {
        let raw = std::fs::read_to_string(dir.path().join("cache.json")).expect("snapshot");
        serde_json::from_str(&raw).expect("snapshot json")
    }

    #[tokio::test]
    async fn new_post_is_created_and_cached() {
        let dir = TempDir::new().expect("tmp dir");
        let authority = Arc::new(FakeAuthority::default());

        let report = run_with(&authority, Some(cache_in(&dir)))
            .execute(&[hello()])
            .await;

        assert_eq!(
            authority.calls(),
            vec![
                Call::Exists("/2024/01/01/hello/".into()),
                Call::Create {
                    id: "/2024/01/01/hello/".into(),
                    pathname: "/2024/01/01/hello/".into(),
                },
            ]
        );
        assert_eq!(report.created, vec![CacheEntry::new("/2024/01/01/hello/")]);
        assert!(matches!(report.cache, CacheWrite::Written { entries: 1, .. }));
        assert_eq!(read_snapshot(&dir), vec![CacheEntry::new("/2024/01/01/hello/")]);
    }

    #[tokio::test]
    async fn cached_post_makes_no_authority_calls() {
        let dir = TempDir::new().expect("tmp dir");
        std::fs::write(
            dir.path().join("cache.json"),
            r#"[{"id": "/2024/01/01/hello/"}]"#,
        )
        .expect("seed cache");
        let authority = Arc::new(FakeAuthority::default());

        let report = run_with(&authority, Some(cache_in(&dir)))
            .execute(&[hello()])
            .await;

        assert!(authority.calls().is_empty());
        assert_eq!(report.initialized, vec![CacheEntry::new("/2024/01/01/hello/")]);
        assert!(report.created.is_empty());
    }

    #[tokio::test]
    async fn remote_thread_is_recorded_as_initialized() {
        let dir = TempDir::new().expect("tmp dir");
        let authority = Arc::new(FakeAuthority {
            existing: HashSet::from(["/2024/01/01/hello/".to_string()]),
            ..Default::default()
        });

        let report = run_with(&authority, Some(cache_in(&dir)))
            .execute(&[hello()])
            .await;

        assert!(authority.creates().is_empty());
        assert_eq!(report.initialized, vec![CacheEntry::new("/2024/01/01/hello/")]);
        assert_eq!(read_snapshot(&dir), vec![CacheEntry::new("/2024/01/01/hello/")]);
    }

    #[tokio::test]
    async fn failed_creation_is_an_init_error_and_not_cached() {
        let dir = TempDir::new().expect("tmp dir");
        let authority = Arc::new(FakeAuthority {
            failing_creates: HashSet::from(["/2024/01/01/hello/".to_string()]),
            ..Default::default()
        });

        let report = run_with(&authority, Some(cache_in(&dir)))
            .execute(&[hello()])
            .await;

        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].reason, FailureReason::InitError);
        assert_eq!(report.errors[0].post, hello());
        assert!(report.errors[0].detail.contains("Validation Failed"));
        assert!(read_snapshot(&dir).is_empty());
    }

    #[tokio::test]
    async fn failed_query_is_a_query_error_without_creation() {
        let authority = Arc::new(FakeAuthority {
            failing_queries: HashSet::from(["/2024/01/01/hello/".to_string()]),
            ..Default::default()
        });

        let report = run_with(&authority, None).execute(&[hello()]).await;

        assert_eq!(report.errors[0].reason, FailureReason::QueryError);
        assert!(authority.creates().is_empty());
    }

    #[tokio::test]
    async fn one_failure_does_not_block_later_posts() {
        let dir = TempDir::new().expect("tmp dir");
        let a = post("/2024/01/01/a/", "A");
        let b = post("/2024/01/02/b/", "B");
        let authority = Arc::new(FakeAuthority {
            failing_creates: HashSet::from([a.pathname.clone()]),
            ..Default::default()
        });

        let report = run_with(&authority, Some(cache_in(&dir)))
            .execute(&[a.clone(), b.clone()])
            .await;

        assert_eq!(authority.creates(), vec![a.pathname.clone(), b.pathname.clone()]);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].id, a.pathname);
        assert_eq!(report.created, vec![CacheEntry::new(b.pathname.clone())]);
        assert_eq!(read_snapshot(&dir), vec![CacheEntry::new(b.pathname)]);
    }

    #[tokio::test]
    async fn disabled_cache_is_never_read_or_written() {
        let dir = TempDir::new().expect("tmp dir");
        std::fs::write(
            dir.path().join("cache.json"),
            r#"[{"id": "/2024/01/01/hello/"}]"#,
        )
        .expect("seed cache");
        let authority = Arc::new(FakeAuthority::default());

        let report = run_with(&authority, None).execute(&[hello()]).await;

        assert_eq!(authority.creates(), vec!["/2024/01/01/hello/".to_string()]);
        assert_eq!(report.cache, CacheWrite::Disabled);
        assert_eq!(read_snapshot(&dir), vec![CacheEntry::new("/2024/01/01/hello/")]);
    }

    #[tokio::test]
    async fn second_run_skips_everything_the_first_run_created() {
        let dir = TempDir::new().expect("tmp dir");
        let posts = [hello(), post("/2024/01/02/world/", "World")];

        let first = Arc::new(FakeAuthority::default());
        run_with(&first, Some(cache_in(&dir))).execute(&posts).await;
        assert_eq!(first.creates().len(), 2);

        let second = Arc::new(FakeAuthority::default());
        let report = run_with(&second, Some(cache_in(&dir))).execute(&posts).await;

        assert!(second.calls().is_empty());
        assert_eq!(report.initialized.len(), 2);
        assert!(report.created.is_empty());
    }

    #[tokio::test]
    async fn overlong_ids_from_custom_strategies_are_capped() {
        struct Verbose;
        impl IdentifierStrategy for Verbose {
            fn derive(&self, pathname: &str, title: &str, _desc: &str, date: &str) -> String {
                format!("{date}|{title}|{pathname}")
            }
        }

        let authority = Arc::new(FakeAuthority::default());
        let run = InitRun::new(Arc::clone(&authority), Box::new(Verbose), None);
        let long = post("/2024/01/01/a-very-long-pathname-for-a-post/", "A Long Title");

        let id = run.identify(&long);
        assert_eq!(id.chars().count(), MAX_LABEL_CHARS);
        assert!(id.ends_with("..."));

        run.execute(&[long]).await;
        assert_eq!(authority.creates(), vec![id]);
    }
}
