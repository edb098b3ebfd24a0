//! Concrete `SearchProvider` for the gateway: plain HTTP fetch, no search
//! API credentials required. A real deployment registers keyed search
//! providers ahead of this one in the fallback chain; this one keeps
//! `web_fetch` working out of the box.

use async_trait::async_trait;

use agentcore_middleware::SearchProvider;

/// Responses beyond this are cut off before being handed to the model.
const MAX_FETCH_CHARS: usize = 100_000;

pub struct HttpFetchProvider {
    client: reqwest::Client,
}

impl HttpFetchProvider {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for HttpFetchProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchProvider for HttpFetchProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn search(&self, _query: &str) -> Result<String, String> {
        Err("no search API configured for the http provider".to_string())
    }

    async fn fetch(&self, url: &str) -> Result<String, String> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(format!("not an http(s) url: {url}"));
        }
        let resp = self.client.get(url).send().await.map_err(|e| e.to_string())?;
        if !resp.status().is_success() {
            return Err(format!("{} returned {}", url, resp.status()));
        }
        let mut text = resp.text().await.map_err(|e| e.to_string())?;
        if text.len() > MAX_FETCH_CHARS {
            let boundary = (0..=MAX_FETCH_CHARS).rev().find(|i| text.is_char_boundary(*i)).unwrap_or(0);
            text.truncate(boundary);
            text.push_str("\n[truncated]");
        }
        Ok(text)
    }
}
