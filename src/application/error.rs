use thiserror::Error;

use crate::{
    config::LoadError,
    infra::{error::InfraError, site::SiteError, source::SourceError},
};

/// Errors that stop a run before any post is processed.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("cannot resolve permalink: {0}")]
    Site(#[from] SiteError),
    #[error("cannot read posts: {0}")]
    Source(#[from] SourceError),
    #[error("precondition failed: {0}")]
    Precondition(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
