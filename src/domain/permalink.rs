//! Permalink templates in the Hexo `:token` style.

use thiserror::Error;

use crate::domain::posts::PostDate;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PermalinkError {
    #[error("permalink template is empty")]
    Empty,
}

/// A permalink template such as `:year/:month/:day/:title/`.
///
/// Supported tokens are `:year`, `:month`, `:day`, `:hour`, `:title` (the
/// source file stem) and `:post_title` (the frontmatter title). Anything else
/// is emitted verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permalink {
    template: String,
}

impl Permalink {
    pub fn parse(template: &str) -> Result<Self, PermalinkError> {
        let template = template.trim().trim_start_matches('/');
        if template.is_empty() {
            return Err(PermalinkError::Empty);
        }
        Ok(Self {
            template: template.to_string(),
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Build the site-absolute pathname for a post.
    pub fn render(&self, date: &PostDate, title: &str, file_stem: &str) -> String {
        let mut out = String::with_capacity(self.template.len() + title.len() + 1);
        out.push('/');

        let mut rest = self.template.as_str();
        while let Some(pos) = rest.find(':') {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];
            let token_len = after
                .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
                .unwrap_or(after.len());
            let token = &after[..token_len];

            match token {
                "year" => out.push_str(date.year()),
                "month" => out.push_str(date.month()),
                "day" => out.push_str(date.day()),
                "hour" => out.push_str(date.hour()),
                "title" => out.push_str(file_stem),
                "post_title" => out.push_str(title),
                _ => {
                    out.push(':');
                    out.push_str(token);
                }
            }

            rest = &after[token_len..];
        }
        out.push_str(rest);

        out
    }
}
