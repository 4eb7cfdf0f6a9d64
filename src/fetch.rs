use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE};
use reqwest::Client;
use tracing::debug;

use crate::error::FetchError;
use crate::settings::FetchSettings;

/// Raw page markup plus the URL it was served from.
#[derive(Debug, Clone)]
pub struct PageContent {
    pub url: String,
    pub body: String,
}

/// Retrieves pages. Implementations do not retry; that is the caller's job.
#[allow(async_fn_in_trait)]
pub trait Fetcher {
    async fn fetch(&mut self, url: &str, timeout: Duration) -> Result<PageContent, FetchError>;

    async fn fetch_bytes(&mut self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError>;
}

/// HTTP fetcher holding one cookie-carrying session for the whole run.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(settings: &FetchSettings) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&settings.accept_language)?,
        );

        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .default_headers(headers)
            .cookie_store(true)
            .build()?;

        Ok(HttpFetcher { client })
    }

    async fn get(&self, url: &str, timeout: Duration) -> Result<reqwest::Response, FetchError> {
        debug!("GET {}", url);
        self.client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FetchError::from_reqwest(url, e))
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&mut self, url: &str, timeout: Duration) -> Result<PageContent, FetchError> {
        let response = self.get(url, timeout).await?;
        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        Ok(PageContent {
            url: final_url,
            body,
        })
    }

    async fn fetch_bytes(&mut self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError> {
        let response = self.get(url, timeout).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        Ok(bytes.to_vec())
    }
}
