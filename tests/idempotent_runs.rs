use gitalk_init::{
    application::{init::InitRun, report::CacheWrite},
    cache::InitCache,
    domain::{
        identifier::IdentifierKind,
        permalink::Permalink,
        posts::{FrontMatter, PostRecord},
    },
    infra::github::{GithubAuthority, http_client},
};
use httpmock::MockServer;
use reqwest::Url;
use serde_json::json;
use tempfile::TempDir;

const ISSUES_PATH: &str = "/repos/octo/octo.github.io/issues";

fn posts() -> Vec<PostRecord> {
    let permalink = Permalink::parse(":year/:month/:day/:title/").expect("template");
    [
        ("hello", "---\ntitle: Hello\ndate: 2024-01-01 10\n---\n"),
        ("world", "---\ntitle: World\ndesc: Second\ndate: 2024-02-03 04\n---\n"),
    ]
    .into_iter()
    .map(|(stem, doc)| {
        PostRecord::from_front_matter(FrontMatter::parse(doc), stem, &permalink).expect("post")
    })
    .collect()
}

fn authority(server: &MockServer) -> GithubAuthority {
    GithubAuthority::new(
        http_client().expect("client"),
        &Url::parse(&server.base_url()).expect("base url"),
        "octo",
        "octo.github.io",
        "t0ken".into(),
        "Gitalk".into(),
        Url::parse("https://octo.github.io").expect("site url"),
    )
    .expect("authority")
}

fn cache(dir: &TempDir) -> InitCache {
    InitCache::new(
        dir.path().join("public/gitalk-init-cache.json"),
        None,
        http_client().expect("client"),
    )
}

#[tokio::test]
async fn second_run_makes_no_requests() {
    let dir = TempDir::new().expect("tmp dir");
    let posts = posts();

    let first_server = MockServer::start();
    first_server.mock(|when, then| {
        when.method("GET").path(ISSUES_PATH);
        then.status(200).json_body(json!([]));
    });
    first_server.mock(|when, then| {
        when.method("POST").path(ISSUES_PATH);
        then.status(201).json_body(json!({ "number": 1 }));
    });

    let first = InitRun::new(
        authority(&first_server),
        IdentifierKind::Pathname.strategy(),
        Some(cache(&dir)),
    )
    .execute(&posts)
    .await;

    assert_eq!(first.created.len(), 2);
    assert!(first.errors.is_empty());
    assert!(matches!(first.cache, CacheWrite::Written { entries: 2, .. }));

    // Nothing is mocked: any request would fail and land in `errors`.
    let second_server = MockServer::start();
    let second = InitRun::new(
        authority(&second_server),
        IdentifierKind::Pathname.strategy(),
        Some(cache(&dir)),
    )
    .execute(&posts)
    .await;

    assert!(second.errors.is_empty());
    assert!(second.created.is_empty());
    assert_eq!(second.initialized.len(), 2);
    assert_eq!(second.snapshot(), first.snapshot());
}

#[tokio::test]
async fn remote_threads_are_adopted_into_the_cache() {
    let dir = TempDir::new().expect("tmp dir");
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method("GET").path(ISSUES_PATH);
        then.status(200).json_body(json!([{ "number": 9 }]));
    });

    let report = InitRun::new(
        authority(&server),
        IdentifierKind::Sha256.strategy(),
        Some(cache(&dir)),
    )
    .execute(&posts())
    .await;

    assert_eq!(report.initialized.len(), 2);
    assert!(report.created.is_empty());
    assert!(report.initialized.iter().all(|entry| entry.id.len() == 40));

    let written = std::fs::read_to_string(dir.path().join("public/gitalk-init-cache.json"))
        .expect("cache file");
    for entry in &report.initialized {
        assert!(written.contains(&entry.id));
    }
}
