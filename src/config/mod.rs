//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{fmt, path::PathBuf, str::FromStr};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::domain::identifier::IdentifierKind;

const LOCAL_CONFIG_BASENAME: &str = "gitalk_init";
const ENV_PREFIX: &str = "GITALK_INIT";
const DEFAULT_API_URL: &str = "https://api.github.com";
const DEFAULT_LABEL: &str = "Gitalk";
const DEFAULT_SITE_CONFIG: &str = "_config.yml";
const DEFAULT_POSTS_DIR: &str = "source/_posts";
const DEFAULT_CACHE_FILE: &str = "public/gitalk-init-cache.json";
const REMOTE_CACHE_NAME: &str = "gitalk-init-cache.json";

/// Command-line arguments for the gitalk-init binary.
#[derive(Debug, Parser)]
#[command(
    name = "gitalk-init",
    version,
    about = "Create a Gitalk comment thread for every blog post, exactly once"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "GITALK_INIT_CONFIG_FILE",
        value_name = "PATH",
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Create the missing threads and refresh the cache (default).
    Run,
    /// List eligible posts with their ids as JSON, without touching GitHub.
    Posts,
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Owner of the repository holding the threads.
    #[arg(
        long,
        env = "GITHUB_REPOSITORY_OWNER",
        value_name = "OWNER",
        global = true
    )]
    pub owner: Option<String>,

    /// Repository holding the threads; defaults to `{owner}.github.io`.
    #[arg(long, env = "GITALK_INIT_REPO", value_name = "REPO", global = true)]
    pub repo: Option<String>,

    /// Personal access token with issue write access.
    #[arg(
        long,
        env = "GITALK_TOKEN",
        hide = true,
        hide_env_values = true,
        global = true
    )]
    pub token: Option<String>,

    /// Toggle the initialization cache.
    #[arg(
        long,
        env = "GITALK_INIT_CACHE",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub cache: Option<bool>,

    /// Override the local cache file.
    #[arg(
        long = "cache-file",
        env = "GITALK_INIT_CACHE_FILE",
        value_name = "PATH",
        global = true
    )]
    pub cache_file: Option<String>,

    /// Override the remote cache URL; an empty value disables the fallback.
    #[arg(
        long = "cache-remote",
        env = "GITALK_INIT_CACHE_REMOTE",
        value_name = "URL",
        global = true
    )]
    pub cache_remote: Option<String>,

    /// Override the posts directory.
    #[arg(
        long = "posts-dir",
        env = "GITALK_INIT_POSTS_DIR",
        value_name = "PATH",
        global = true
    )]
    pub posts_dir: Option<String>,

    /// Override the site config holding the permalink template.
    #[arg(long = "site-config", value_name = "PATH", global = true)]
    pub site_config: Option<String>,

    /// Override the public site URL that threads link back to.
    #[arg(long = "site-url", value_name = "URL", global = true)]
    pub site_url: Option<String>,

    /// Override the GitHub API base URL.
    #[arg(long = "github-api-url", value_name = "URL", global = true)]
    pub github_api_url: Option<String>,

    /// Override the label shared by every thread.
    #[arg(long, value_name = "LABEL", global = true)]
    pub label: Option<String>,

    /// Identifier strategy (pathname|sha256).
    #[arg(long = "id-strategy", value_name = "STRATEGY", global = true)]
    pub id_strategy: Option<String>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub github: GithubSettings,
    pub site: SiteSettings,
    pub cache: CacheSettings,
    pub identifier: IdentifierKind,
    pub logging: LoggingSettings,
}

#[derive(Clone)]
pub struct GithubSettings {
    pub api_url: Url,
    pub owner: String,
    pub repo: String,
    pub token: Option<String>,
    pub label: String,
}

impl fmt::Debug for GithubSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubSettings")
            .field("api_url", &self.api_url.as_str())
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("label", &self.label)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SiteSettings {
    pub url: Url,
    pub config_file: PathBuf,
    pub posts_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub file: PathBuf,
    pub remote: Option<Url>,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder =
        Config::builder().add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    github: RawGithubSettings,
    site: RawSiteSettings,
    cache: RawCacheSettings,
    identifier: RawIdentifierSettings,
    logging: RawLoggingSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(owner) = overrides.owner.as_ref() {
            self.github.owner = Some(owner.clone());
        }
        if let Some(repo) = overrides.repo.as_ref() {
            self.github.repo = Some(repo.clone());
        }
        if let Some(token) = overrides.token.as_ref() {
            self.github.token = Some(token.clone());
        }
        if let Some(url) = overrides.github_api_url.as_ref() {
            self.github.api_url = Some(url.clone());
        }
        if let Some(label) = overrides.label.as_ref() {
            self.github.label = Some(label.clone());
        }
        if let Some(url) = overrides.site_url.as_ref() {
            self.site.url = Some(url.clone());
        }
        if let Some(path) = overrides.site_config.as_ref() {
            self.site.config_file = Some(path.clone());
        }
        if let Some(path) = overrides.posts_dir.as_ref() {
            self.site.posts_dir = Some(path.clone());
        }
        if let Some(enabled) = overrides.cache {
            self.cache.enabled = Some(enabled);
        }
        if let Some(path) = overrides.cache_file.as_ref() {
            self.cache.file = Some(path.clone());
        }
        if let Some(url) = overrides.cache_remote.as_ref() {
            self.cache.remote = Some(url.clone());
        }
        if let Some(strategy) = overrides.id_strategy.as_ref() {
            self.identifier.strategy = Some(strategy.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            github,
            site,
            cache,
            identifier,
            logging,
        } = raw;

        let github = build_github_settings(github)?;
        let site = build_site_settings(site, &github)?;
        let cache = build_cache_settings(cache, &site)?;
        let identifier = build_identifier(identifier)?;
        let logging = build_logging_settings(logging)?;

        Ok(Self {
            github,
            site,
            cache,
            identifier,
            logging,
        })
    }
}

fn build_github_settings(github: RawGithubSettings) -> Result<GithubSettings, LoadError> {
    let owner = present(resolve("github.owner", github.owner)?)
        .ok_or_else(|| LoadError::invalid("github.owner", "an owner is required"))?;

    let repo = present(resolve("github.repo", github.repo)?)
        .unwrap_or_else(|| format!("{owner}.github.io"));

    let token = present(resolve("github.token", github.token)?);

    let label = present(resolve("github.label", github.label)?)
        .unwrap_or_else(|| DEFAULT_LABEL.to_string());
    if label.contains(',') {
        return Err(LoadError::invalid(
            "github.label",
            "label must not contain a comma",
        ));
    }

    let api_url = present(resolve("github.api_url", github.api_url)?)
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());
    let api_url = parse_url("github.api_url", &api_url)?;

    Ok(GithubSettings {
        api_url,
        owner,
        repo,
        token,
        label,
    })
}

fn build_site_settings(
    site: RawSiteSettings,
    github: &GithubSettings,
) -> Result<SiteSettings, LoadError> {
    let url = present(resolve("site.url", site.url)?)
        .unwrap_or_else(|| format!("https://{}", github.repo));
    let url = parse_url("site.url", &url)?;

    let config_file = present(resolve("site.config_file", site.config_file)?)
        .unwrap_or_else(|| DEFAULT_SITE_CONFIG.to_string());
    let posts_dir = present(resolve("site.posts_dir", site.posts_dir)?)
        .unwrap_or_else(|| DEFAULT_POSTS_DIR.to_string());

    Ok(SiteSettings {
        url,
        config_file: PathBuf::from(config_file),
        posts_dir: PathBuf::from(posts_dir),
    })
}

fn build_cache_settings(
    cache: RawCacheSettings,
    site: &SiteSettings,
) -> Result<CacheSettings, LoadError> {
    let enabled = cache.enabled.unwrap_or(true);

    let file = present(resolve("cache.file", cache.file)?)
        .unwrap_or_else(|| DEFAULT_CACHE_FILE.to_string());

    let remote = match resolve("cache.remote", cache.remote)? {
        Some(value) => present(Some(value))
            .map(|url| parse_url("cache.remote", &url))
            .transpose()?,
        None => Some(default_remote(&site.url)?),
    };

    Ok(CacheSettings {
        enabled,
        file: PathBuf::from(file),
        remote,
    })
}

fn build_identifier(identifier: RawIdentifierSettings) -> Result<IdentifierKind, LoadError> {
    match present(identifier.strategy) {
        Some(value) => IdentifierKind::from_str(&value)
            .map_err(|reason| LoadError::invalid("identifier.strategy", reason)),
        None => Ok(IdentifierKind::default()),
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawGithubSettings {
    api_url: Option<String>,
    owner: Option<String>,
    repo: Option<String>,
    token: Option<String>,
    label: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    url: Option<String>,
    config_file: Option<String>,
    posts_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    file: Option<String>,
    remote: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawIdentifierSettings {
    strategy: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

fn resolve(key: &'static str, value: Option<String>) -> Result<Option<String>, LoadError> {
    value.map(|value| expand_env(key, &value)).transpose()
}

fn present(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// Expand `${NAME}` placeholders from the process environment.
fn expand_env(key: &'static str, value: &str) -> Result<String, LoadError> {
    let mut expanded = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        expanded.push_str(&rest[..start]);
        let tail = &rest[start + 2..];
        let end = tail
            .find('}')
            .ok_or_else(|| LoadError::invalid(key, "unterminated `${` placeholder"))?;
        let name = &tail[..end];
        let resolved = std::env::var(name).map_err(|_| {
            LoadError::invalid(key, format!("environment variable `{name}` is not set"))
        })?;
        expanded.push_str(&resolved);
        rest = &tail[end + 1..];
    }

    expanded.push_str(rest);
    Ok(expanded)
}

fn parse_url(key: &'static str, value: &str) -> Result<Url, LoadError> {
    Url::parse(value).map_err(|err| LoadError::invalid(key, format!("invalid URL `{value}`: {err}")))
}

fn default_remote(site: &Url) -> Result<Url, LoadError> {
    let base = site.as_str().trim_end_matches('/');
    parse_url("cache.remote", &format!("{base}/{REMOTE_CACHE_NAME}"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
