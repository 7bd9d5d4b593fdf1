//! GitHub issues as the thread authority.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::{Deserialize, Serialize, de::IgnoredAny};

use crate::application::authority::{AuthorityError, IssueAuthority, NewThread};
use crate::infra::error::InfraError;

const GITHUB_ACCEPT: &str = "application/vnd.github+json";
const GITHUB_API_VERSION: &str = "2022-11-28";

/// User agent sent with every request; GitHub rejects requests without one.
pub fn user_agent() -> &'static str {
    concat!("gitalk-init/", env!("CARGO_PKG_VERSION"))
}

/// The shared HTTP client for GitHub and remote cache requests.
pub fn http_client() -> Result<Client, InfraError> {
    Client::builder()
        .user_agent(user_agent())
        .build()
        .map_err(|err| InfraError::http_client(err.to_string()))
}

#[derive(Debug, Serialize)]
struct CreateIssueRequest<'a> {
    title: &'a str,
    labels: [&'a str; 2],
    body: String,
}

#[derive(Debug, Deserialize)]
struct GithubErrorBody {
    message: String,
}

/// Issues of one repository, scoped by a fixed label.
#[derive(Clone, Debug)]
pub struct GithubAuthority {
    client: Client,
    issues: Url,
    token: String,
    label: String,
    site: Url,
}

impl GithubAuthority {
    /// `site` is the public blog URL that thread bodies link back to.
    pub fn new(
        client: Client,
        api_base: &Url,
        owner: &str,
        repo: &str,
        token: String,
        label: String,
        site: Url,
    ) -> Result<Self, InfraError> {
        let mut base = api_base.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        let issues = base
            .join(&format!("repos/{owner}/{repo}/issues"))
            .map_err(|err| InfraError::http_client(format!("invalid issues URL: {err}")))?;

        Ok(Self {
            client,
            issues,
            token,
            label,
            site,
        })
    }

    pub fn issues_url(&self) -> &Url {
        &self.issues
    }

    fn auth_header(&self) -> Result<HeaderValue, AuthorityError> {
        HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|err| AuthorityError::transport(format!("invalid token header: {err}")))
    }

    fn request(&self, method: Method, url: Url) -> Result<RequestBuilder, AuthorityError> {
        Ok(self
            .client
            .request(method, url)
            .header(AUTHORIZATION, self.auth_header()?)
            .header(ACCEPT, GITHUB_ACCEPT)
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION))
    }

    /// Markdown body: a link back to the post, a blank line, the description.
    pub fn thread_body(&self, pathname: &str, desc: &str) -> String {
        let link = format!("{}{pathname}", self.site.as_str().trim_end_matches('/'));
        format!("[{link}]({link})\r\n\r\n{desc}")
    }
}

#[async_trait]
impl IssueAuthority for GithubAuthority {
    async fn exists(&self, id: &str) -> Result<bool, AuthorityError> {
        let mut url = self.issues.clone();
        url.query_pairs_mut()
            .append_pair("labels", &format!("{},{id}", self.label))
            .append_pair("state", "all");

        let resp = self
            .request(Method::GET, url)?
            .send()
            .await
            .map_err(AuthorityError::transport)?;
        let status = resp.status();
        let bytes = resp.bytes().await.map_err(AuthorityError::transport)?;
        if !status.is_success() {
            return Err(AuthorityError::Status {
                status: status.as_u16(),
                message: error_message(&bytes),
            });
        }

        let issues: Vec<IgnoredAny> =
            serde_json::from_slice(&bytes).map_err(AuthorityError::decode)?;
        Ok(!issues.is_empty())
    }

    async fn create(&self, thread: NewThread<'_>) -> Result<(), AuthorityError> {
        let payload = CreateIssueRequest {
            title: thread.title,
            labels: [self.label.as_str(), thread.id],
            body: self.thread_body(thread.pathname, thread.desc),
        };

        let resp = self
            .request(Method::POST, self.issues.clone())?
            .json(&payload)
            .send()
            .await
            .map_err(AuthorityError::transport)?;
        let status = resp.status();
        if status == StatusCode::CREATED {
            return Ok(());
        }

        let bytes = resp.bytes().await.map_err(AuthorityError::transport)?;
        Err(AuthorityError::Status {
            status: status.as_u16(),
            message: error_message(&bytes),
        })
    }
}

fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<GithubErrorBody>(body)
        .map(|err| err.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned())
}
