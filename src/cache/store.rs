//! The initialized-id snapshot and its local/remote loading.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use metrics::counter;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

const SOURCE: &str = "cache::store";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to read cache file `{path}`: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write cache file `{path}`: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cache content is not a list of `{{\"id\": ...}}` entries: {0}")]
    Format(#[from] serde_json::Error),
    #[error("failed to fetch remote cache: {0}")]
    Http(#[from] reqwest::Error),
    #[error("remote cache `{url}` answered with status {status}")]
    Status { url: String, status: u16 },
}

/// One persisted record: an id whose thread is known to exist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheEntry {
    pub id: String,
}

impl CacheEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Where a loaded snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOrigin {
    Local,
    Remote,
}

impl CacheOrigin {
    fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheStatus {
    /// `load` has not run yet.
    Unloaded,
    Loaded {
        origin: CacheOrigin,
        ids: HashSet<String>,
    },
    /// Neither the local file nor the remote copy could be read.
    Unavailable,
}

/// Snapshot of already-initialized ids, read once and written once per run.
///
/// The local file always wins; the remote URL is only fetched when the local
/// file is missing or unreadable. Failing both leaves the cache
/// [`CacheStatus::Unavailable`], which answers "not found" for every id.
#[derive(Debug)]
pub struct InitCache {
    file: PathBuf,
    remote: Option<Url>,
    client: Client,
    status: CacheStatus,
}

impl InitCache {
    pub fn new(file: PathBuf, remote: Option<Url>, client: Client) -> Self {
        Self {
            file,
            remote,
            client,
            status: CacheStatus::Unloaded,
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn status(&self) -> &CacheStatus {
        &self.status
    }

    /// Resolve the snapshot. Only the first call does any I/O.
    pub async fn load(&mut self) -> &CacheStatus {
        if !matches!(self.status, CacheStatus::Unloaded) {
            return &self.status;
        }

        let path = self.file.display().to_string();
        self.status = match self.read_local().await {
            Ok(entries) => loaded(CacheOrigin::Local, &path, entries),
            Err(err) => {
                warn!(
                    target_module = SOURCE,
                    path = %path,
                    error = %err,
                    "Local cache unreadable"
                );
                self.load_remote().await
            }
        };

        &self.status
    }

    async fn load_remote(&self) -> CacheStatus {
        let Some(url) = self.remote.as_ref() else {
            return unavailable();
        };

        info!(target_module = SOURCE, url = %url, "Fetching remote cache");
        match self.fetch_remote(url).await {
            Ok(entries) => loaded(CacheOrigin::Remote, url.as_str(), entries),
            Err(err) => {
                warn!(
                    target_module = SOURCE,
                    url = %url,
                    error = %err,
                    "Remote cache unavailable; every id will be checked against GitHub"
                );
                unavailable()
            }
        }
    }

    async fn read_local(&self) -> Result<Vec<CacheEntry>, CacheError> {
        let bytes = tokio::fs::read(&self.file)
            .await
            .map_err(|source| CacheError::Read {
                path: self.file.display().to_string(),
                source,
            })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn fetch_remote(&self, url: &Url) -> Result<Vec<CacheEntry>, CacheError> {
        let resp = self.client.get(url.clone()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CacheError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Whether `id` is recorded as initialized. Never fails; an unloaded or
    /// unavailable cache simply knows nothing.
    pub fn contains(&self, id: &str) -> bool {
        match &self.status {
            CacheStatus::Loaded { ids, .. } => ids.contains(id),
            CacheStatus::Unloaded | CacheStatus::Unavailable => false,
        }
    }

    /// Replace the local cache file with `entries`, pretty-printed.
    pub async fn persist(&self, entries: &[CacheEntry]) -> Result<(), CacheError> {
        let path = self.file.display().to_string();
        let body = serde_json::to_vec_pretty(entries)?;

        if let Some(parent) = self.file.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| CacheError::Write {
                    path: path.clone(),
                    source,
                })?;
        }

        tokio::fs::write(&self.file, body)
            .await
            .map_err(|source| CacheError::Write { path, source })?;

        info!(
            target_module = SOURCE,
            path = %self.file.display(),
            entries = entries.len(),
            "Cache snapshot written"
        );
        Ok(())
    }
}

fn loaded(origin: CacheOrigin, location: &str, entries: Vec<CacheEntry>) -> CacheStatus {
    let ids: HashSet<String> = entries.into_iter().map(|entry| entry.id).collect();
    info!(
        target_module = SOURCE,
        origin = origin.as_str(),
        location,
        entries = ids.len(),
        "Cache loaded"
    );
    counter!("gitalk_init_cache_loads_total", "source" => origin.as_str()).increment(1);
    CacheStatus::Loaded { origin, ids }
}

fn unavailable() -> CacheStatus {
    counter!("gitalk_init_cache_loads_total", "source" => "none").increment(1);
    CacheStatus::Unavailable
}
