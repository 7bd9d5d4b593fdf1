//! Discovers eligible posts in the blog's content directory.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::domain::permalink::Permalink;
use crate::domain::posts::{FrontMatter, PostError, PostRecord};

const SOURCE: &str = "infra::source";
const MARKDOWN_EXTENSION: &str = "md";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("posts directory `{path}` does not exist or is not a directory")]
    MissingDirectory { path: String },
    #[error("failed to walk posts directory `{path}`: {source}")]
    Walk {
        path: String,
        #[source]
        source: walkdir::Error,
    },
}

/// Markdown posts under one directory, rendered with one permalink template.
#[derive(Debug, Clone)]
pub struct PostSource {
    dir: PathBuf,
    permalink: Permalink,
}

impl PostSource {
    pub fn new(dir: impl Into<PathBuf>, permalink: Permalink) -> Self {
        Self {
            dir: dir.into(),
            permalink,
        }
    }

    /// Every eligible post, ordered by path.
    ///
    /// Ineligible or unreadable files are logged and skipped; only a missing
    /// or unwalkable directory is an error.
    pub async fn collect(&self) -> Result<Vec<PostRecord>, SourceError> {
        let files = self.markdown_files()?;
        let mut posts = Vec::with_capacity(files.len());

        for file in files {
            match self.read_post(&file).await {
                Ok(Some(post)) => posts.push(post),
                Ok(None) => {}
                Err(err) => warn!(
                    target_module = SOURCE,
                    path = %file.display(),
                    error = %err,
                    "Skipping unreadable post"
                ),
            }
        }

        info!(
            target_module = SOURCE,
            dir = %self.dir.display(),
            posts = posts.len(),
            "Posts collected"
        );
        Ok(posts)
    }

    fn markdown_files(&self) -> Result<Vec<PathBuf>, SourceError> {
        if !self.dir.is_dir() {
            return Err(SourceError::MissingDirectory {
                path: self.dir.display().to_string(),
            });
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.dir).sort_by_file_name() {
            let entry = entry.map_err(|source| SourceError::Walk {
                path: self.dir.display().to_string(),
                source,
            })?;
            let is_markdown = entry
                .path()
                .extension()
                .is_some_and(|ext| ext == MARKDOWN_EXTENSION);
            if entry.file_type().is_file() && is_markdown {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    async fn read_post(&self, file: &Path) -> Result<Option<PostRecord>, std::io::Error> {
        let document = tokio::fs::read_to_string(file).await?;
        let stem = file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        match PostRecord::from_front_matter(FrontMatter::parse(&document), &stem, &self.permalink)
        {
            Ok(post) => {
                debug!(
                    target_module = SOURCE,
                    path = %file.display(),
                    pathname = %post.pathname,
                    "Post eligible"
                );
                Ok(Some(post))
            }
            Err(reason @ PostError::EmptyFrontMatter) => {
                warn!(target_module = SOURCE, path = %file.display(), reason = %reason, "Post ignored");
                Ok(None)
            }
            Err(reason) => {
                info!(target_module = SOURCE, path = %file.display(), reason = %reason, "Post ignored");
                Ok(None)
            }
        }
    }
}
