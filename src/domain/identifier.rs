//! Stable identifiers correlating a post with its remote discussion thread.
//!
//! The identifier doubles as a GitHub issue label, so every strategy's output
//! is capped at [`MAX_LABEL_CHARS`] before it leaves this module. Strategies
//! are plain values selected when the application is composed; the
//! orchestrator only ever sees `dyn IdentifierStrategy`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::posts::PostRecord;

/// GitHub rejects labels longer than this many characters.
pub const MAX_LABEL_CHARS: usize = 50;

const ELLIPSIS: &str = "...";
const DIGEST_HEX_CHARS: usize = 40;

/// Maps a post to the identifier used as its thread label.
///
/// Implementations must be pure and deterministic: identical inputs always
/// yield the identical identifier, across runs and processes.
pub trait IdentifierStrategy: Send + Sync {
    fn derive(&self, pathname: &str, title: &str, desc: &str, date: &str) -> String;
}

/// Uses the post pathname itself, truncated to the label limit.
#[derive(Debug, Default, Clone, Copy)]
pub struct PathnameIdentifier;

impl IdentifierStrategy for PathnameIdentifier {
    fn derive(&self, pathname: &str, _title: &str, _desc: &str, _date: &str) -> String {
        cap_label(pathname)
    }
}

/// Uses a hex SHA-256 prefix of the pathname, for sites whose pathnames carry
/// long or non-ASCII titles that would otherwise collide after truncation.
#[derive(Debug, Default, Clone, Copy)]
pub struct DigestIdentifier;

impl IdentifierStrategy for DigestIdentifier {
    fn derive(&self, pathname: &str, _title: &str, _desc: &str, _date: &str) -> String {
        let digest = Sha256::digest(pathname.as_bytes());
        let mut encoded = hex::encode(digest.as_slice());
        encoded.truncate(DIGEST_HEX_CHARS);
        encoded
    }
}

/// Built-in strategies selectable from configuration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierKind {
    #[default]
    Pathname,
    Sha256,
}

impl IdentifierKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pathname => "pathname",
            Self::Sha256 => "sha256",
        }
    }

    pub fn strategy(self) -> Box<dyn IdentifierStrategy> {
        match self {
            Self::Pathname => Box::new(PathnameIdentifier),
            Self::Sha256 => Box::new(DigestIdentifier),
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentifierKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pathname" => Ok(Self::Pathname),
            "sha256" => Ok(Self::Sha256),
            other => Err(format!(
                "unknown identifier strategy `{other}` (expected `pathname` or `sha256`)"
            )),
        }
    }
}

/// The label a post is tracked under, capped whatever the strategy returns.
pub fn identify(strategy: &dyn IdentifierStrategy, post: &PostRecord) -> String {
    cap_label(&strategy.derive(
        &post.pathname,
        &post.title,
        &post.desc,
        post.date.as_str(),
    ))
}

/// Enforce the label limit, replacing the tail with `...` when truncating.
///
/// Length is counted in characters so multi-byte titles are never split.
pub fn cap_label(raw: &str) -> String {
    if raw.chars().count() <= MAX_LABEL_CHARS {
        return raw.to_string();
    }

    let keep = MAX_LABEL_CHARS - ELLIPSIS.len();
    let mut capped: String = raw.chars().take(keep).collect();
    capped.push_str(ELLIPSIS);
    capped
}
