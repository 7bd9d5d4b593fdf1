//! Reads the permalink template from the blog's site configuration.

use std::path::Path;

use thiserror::Error;

use crate::domain::permalink::{Permalink, PermalinkError};

const PERMALINK_KEY: &str = "permalink:";

#[derive(Debug, Error)]
pub enum SiteError {
    #[error("failed to read site config `{path}`: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("site config `{path}` has no top-level `permalink` entry")]
    MissingPermalink { path: String },
    #[error("site config `{path}`: {source}")]
    InvalidPermalink {
        path: String,
        #[source]
        source: PermalinkError,
    },
}

/// Load the `permalink:` entry of a Hexo-style `_config.yml`.
///
/// Only the top-level line is considered; a trailing `# comment` is dropped.
pub async fn load_permalink(path: &Path) -> Result<Permalink, SiteError> {
    let display = path.display().to_string();
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SiteError::Read {
            path: display.clone(),
            source,
        })?;

    let raw = find_permalink(&content).ok_or_else(|| SiteError::MissingPermalink {
        path: display.clone(),
    })?;

    Permalink::parse(raw).map_err(|source| SiteError::InvalidPermalink {
        path: display,
        source,
    })
}

fn find_permalink(content: &str) -> Option<&str> {
    content.lines().find_map(|line| {
        let value = line.strip_prefix(PERMALINK_KEY)?;
        let value = value.split('#').next().unwrap_or(value).trim();
        Some(unquote(value))
    })
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    const CONFIG: &str = "\
title: My Blog
url: https://octo.github.io
# permalink: ignored/:title/
permalink: :year/:month/:day/:title/ # default
permalink_defaults:
  lang: en
";

    #[test]
    fn finds_top_level_permalink_and_drops_comment() {
        assert_eq!(find_permalink(CONFIG), Some(":year/:month/:day/:title/"));
    }

    #[test]
    fn quoted_permalink_is_unquoted() {
        assert_eq!(
            find_permalink("permalink: \":year/:post_title.html\"\n"),
            Some(":year/:post_title.html")
        );
    }

    #[test]
    fn indented_permalink_is_not_top_level() {
        assert_eq!(find_permalink("post:\n  permalink: :title/\n"), None);
    }

    #[tokio::test]
    async fn loads_permalink_from_file() {
        let dir = TempDir::new().expect("tmp dir");
        let path = dir.path().join("_config.yml");
        std::fs::write(&path, CONFIG).expect("write config");

        let permalink = load_permalink(&path).await.expect("permalink");
        assert_eq!(permalink.template(), ":year/:month/:day/:title/");
    }

    #[tokio::test]
    async fn missing_file_is_a_read_error() {
        let dir = TempDir::new().expect("tmp dir");
        let err = load_permalink(&dir.path().join("_config.yml"))
            .await
            .expect_err("no file");
        assert!(matches!(err, SiteError::Read { .. }));
    }

    #[tokio::test]
    async fn config_without_permalink_is_rejected() {
        let dir = TempDir::new().expect("tmp dir");
        let path = dir.path().join("_config.yml");
        std::fs::write(&path, "title: My Blog\n").expect("write config");

        let err = load_permalink(&path).await.expect_err("no permalink");
        assert!(matches!(err, SiteError::MissingPermalink { .. }));
    }

    #[tokio::test]
    async fn empty_permalink_is_rejected() {
        let dir = TempDir::new().expect("tmp dir");
        let path = dir.path().join("_config.yml");
        std::fs::write(&path, "permalink: # none\n").expect("write config");

        let err = load_permalink(&path).await.expect_err("empty permalink");
        assert!(matches!(err, SiteError::InvalidPermalink { .. }));
    }
}
