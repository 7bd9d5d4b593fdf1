use std::process;

use gitalk_init::{
    application::{error::AppError, init::InitRun},
    cache::InitCache,
    config::{self, Command, Settings},
    domain::{identifier::identify, posts::PostRecord},
    infra::{
        github::{GithubAuthority, http_client},
        site,
        source::PostSource,
        telemetry,
    },
};
use serde::Serialize;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

mod print;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    let command = cli_args.command.unwrap_or(Command::Run);

    telemetry::init(&settings.logging)?;

    match command {
        Command::Run => run_init(settings).await,
        Command::Posts => run_posts(settings).await,
    }
}

async fn run_init(settings: Settings) -> Result<(), AppError> {
    let token = settings
        .github
        .token
        .clone()
        .ok_or_else(|| AppError::precondition("a GitHub token is required (set GITALK_TOKEN)"))?;

    let posts = collect_posts(&settings).await?;

    let client = http_client()?;
    let authority = GithubAuthority::new(
        client.clone(),
        &settings.github.api_url,
        &settings.github.owner,
        &settings.github.repo,
        token,
        settings.github.label.clone(),
        settings.site.url.clone(),
    )?;
    let cache = settings.cache.enabled.then(|| {
        InitCache::new(
            settings.cache.file.clone(),
            settings.cache.remote.clone(),
            client,
        )
    });

    info!(
        owner = %settings.github.owner,
        repo = %settings.github.repo,
        strategy = %settings.identifier,
        cache = settings.cache.enabled,
        "Initializing threads"
    );

    let report = InitRun::new(authority, settings.identifier.strategy(), cache)
        .execute(&posts)
        .await;

    print::print_json(&report.summary())
}

#[derive(Serialize)]
struct ListedPost<'a> {
    id: String,
    #[serde(flatten)]
    post: &'a PostRecord,
}

async fn run_posts(settings: Settings) -> Result<(), AppError> {
    let posts = collect_posts(&settings).await?;
    let strategy = settings.identifier.strategy();

    let listed: Vec<ListedPost<'_>> = posts
        .iter()
        .map(|post| ListedPost {
            id: identify(strategy.as_ref(), post),
            post,
        })
        .collect();

    print::print_json(&listed)
}

async fn collect_posts(settings: &Settings) -> Result<Vec<PostRecord>, AppError> {
    let permalink = site::load_permalink(&settings.site.config_file).await?;
    let source = PostSource::new(settings.site.posts_dir.clone(), permalink);
    Ok(source.collect().await?)
}
