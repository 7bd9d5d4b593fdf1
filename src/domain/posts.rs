//! Post records and the frontmatter rules that decide which posts get a thread.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::permalink::Permalink;

const FENCE: &str = "---";
const DATE_LEN: usize = "YYYY-MM-DD HH".len();

/// Why a content file does not produce a [`PostRecord`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PostError {
    #[error("frontmatter is empty or has no recognised keys")]
    EmptyFrontMatter,
    #[error("comments disabled by `comment: {0}`")]
    CommentsDisabled(String),
    #[error("title is missing")]
    MissingTitle,
    #[error("date is missing")]
    MissingDate,
    #[error("date `{0}` does not match `YYYY-MM-DD HH`")]
    InvalidDate(String),
}

/// A post date at hour precision, e.g. `2024-01-01 10`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PostDate(String);

impl PostDate {
    pub fn parse(value: &str) -> Result<Self, PostError> {
        let bytes = value.as_bytes();
        let shaped = bytes.len() == DATE_LEN
            && bytes.iter().enumerate().all(|(idx, byte)| match idx {
                4 | 7 => *byte == b'-',
                10 => *byte == b' ',
                _ => byte.is_ascii_digit(),
            });

        if shaped {
            Ok(Self(value.to_string()))
        } else {
            Err(PostError::InvalidDate(value.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn year(&self) -> &str {
        &self.0[0..4]
    }

    pub fn month(&self) -> &str {
        &self.0[5..7]
    }

    pub fn day(&self) -> &str {
        &self.0[8..10]
    }

    pub fn hour(&self) -> &str {
        &self.0[11..13]
    }
}

impl TryFrom<String> for PostDate {
    type Error = PostError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PostDate> for String {
    fn from(value: PostDate) -> Self {
        value.0
    }
}

/// The recognised keys of a post's leading `---` block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontMatter {
    pub title: Option<String>,
    pub desc: Option<String>,
    pub date: Option<String>,
    pub comment: Option<String>,
}

impl FrontMatter {
    /// Parse the first `---` fenced block of a Markdown document.
    ///
    /// Values run from the first `:` to the end of the line, except `date`,
    /// which stops at the next `:` so `2024-01-01 10:30:00` reads as
    /// `2024-01-01 10`.
    pub fn parse(document: &str) -> Self {
        let mut front = Self::default();
        let mut lines = document.lines().skip_while(|line| line.trim() != FENCE);
        if lines.next().is_none() {
            return front;
        }

        for line in lines {
            if line.trim() == FENCE {
                break;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let slot = match key.trim() {
                "title" => &mut front.title,
                "desc" => &mut front.desc,
                "comment" => &mut front.comment,
                "date" => {
                    let value = unquote(value);
                    let hour_precision = value.split(':').next().unwrap_or(value);
                    front.date = Some(hour_precision.trim().to_string());
                    continue;
                }
                _ => continue,
            };
            *slot = Some(unquote(value).to_string());
        }

        front
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.desc.is_none() && self.date.is_none() && self.comment.is_none()
    }
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// One eligible post, as handed to the initialization run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub pathname: String,
    pub title: String,
    pub desc: String,
    pub date: PostDate,
}

impl PostRecord {
    /// Apply the eligibility rules and build the record's pathname.
    ///
    /// `desc` falls back to the title when the frontmatter has none.
    pub fn from_front_matter(
        front: FrontMatter,
        file_stem: &str,
        permalink: &Permalink,
    ) -> Result<Self, PostError> {
        if front.is_empty() {
            return Err(PostError::EmptyFrontMatter);
        }
        if let Some(comment) = front.comment.as_deref()
            && comment.eq_ignore_ascii_case("false")
        {
            return Err(PostError::CommentsDisabled(comment.to_string()));
        }

        let title = front
            .title
            .filter(|title| !title.is_empty())
            .ok_or(PostError::MissingTitle)?;
        let date = front
            .date
            .filter(|date| !date.is_empty())
            .ok_or(PostError::MissingDate)?;
        let date = PostDate::parse(&date)?;

        let pathname = permalink.render(&date, &title, file_stem);
        let desc = front
            .desc
            .filter(|desc| !desc.is_empty())
            .unwrap_or_else(|| title.clone());

        Ok(Self {
            pathname,
            title,
            desc,
            date,
        })
    }
}
