use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;

/// Thin authenticated client for the Cloud Controller API.
#[derive(Clone)]
pub struct CcHttp {
    client: Client,
    base_url: Arc<str>,
    token: Arc<str>,
}

impl CcHttp {
    pub fn new(
        base_url: impl Into<Arc<str>>,
        token: impl Into<Arc<str>>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: normalize_base_url(base_url),
            token: token.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for `path`. Cloud Controller `next_url` values are
    /// root-relative, so they resolve here as well.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let req = self.client.request(method, self.url(path));
        if self.token.is_empty() {
            req
        } else {
            req.bearer_auth(&*self.token)
        }
    }

    pub async fn send_expect(
        &self,
        req: reqwest::RequestBuilder,
        context: &'static str,
        ok: impl FnOnce(StatusCode) -> bool,
    ) -> Result<Response> {
        let resp = req.send().await.context(context)?;
        let status = resp.status();
        if ok(status) {
            return Ok(resp);
        }

        let text = resp.text().await.unwrap_or_default();
        anyhow::bail!(
            "{} status={} body_sample={}",
            context,
            status,
            truncate_body_snippet(&text, 500)
        );
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        context: &'static str,
    ) -> Result<T> {
        let resp = self
            .send_expect(self.request(Method::GET, path), context, |s| s.is_success())
            .await?;
        resp.json().await.context(context)
    }

    /// GET that maps 404 to `None`.
    pub async fn get_json_opt<T: DeserializeOwned>(
        &self,
        path: &str,
        context: &'static str,
    ) -> Result<Option<T>> {
        let resp = self
            .send_expect(self.request(Method::GET, path), context, |s| {
                s.is_success() || s == StatusCode::NOT_FOUND
            })
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        resp.json().await.context(context).map(Some)
    }
}

pub fn normalize_base_url(base_url: impl Into<Arc<str>>) -> Arc<str> {
    let base_url: Arc<str> = base_url.into();
    if base_url.ends_with('/') {
        Arc::<str>::from(base_url.trim_end_matches('/').to_string())
    } else {
        base_url
    }
}

fn truncate_body_snippet(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}
