//! The remote issue tracker as seen by the initialization run.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthorityError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed response: {0}")]
    Decode(String),
}

impl AuthorityError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Everything needed to open one discussion thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NewThread<'a> {
    pub id: &'a str,
    pub pathname: &'a str,
    pub title: &'a str,
    pub desc: &'a str,
}

/// Source of truth for which threads exist, and the only way to create one.
///
/// Implementations make exactly one request per call and never retry.
#[async_trait]
pub trait IssueAuthority: Send + Sync {
    /// Whether at least one thread carries the run label and `id`.
    async fn exists(&self, id: &str) -> Result<bool, AuthorityError>;

    /// Open a thread labelled with the run label and `thread.id`.
    async fn create(&self, thread: NewThread<'_>) -> Result<(), AuthorityError>;
}

#[async_trait]
impl<T> IssueAuthority for Arc<T>
where
    T: IssueAuthority + ?Sized,
{
    async fn exists(&self, id: &str) -> Result<bool, AuthorityError> {
        (**self).exists(id).await
    }

    async fn create(&self, thread: NewThread<'_>) -> Result<(), AuthorityError> {
        (**self).create(thread).await
    }
}
