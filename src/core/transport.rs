use crate::config::Config;
use crate::core::{Result, Tv5Error};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tracing::debug;

/// HTTP access used by the resolver chain and the segment fetcher.
///
/// Anything other than HTTP 200 is a failure.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get_bytes(&self, url: &str) -> Result<Bytes>;

    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<String>;

    async fn get_text(&self, url: &str) -> Result<String> {
        let body = self.get_bytes(url).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.timeout))
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| Tv5Error::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .header("Accept", "*/*")
            .header("Accept-Language", "en-US,en;q=0.9")
            .header("Cache-Control", "no-cache")
            .send()
            .await
            .map_err(|e| map_reqwest(url, e))?;
        Self::finish(url, response).await
    }

    async fn finish(url: &str, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        debug!("{} -> {}", url, status);
        if status != reqwest::StatusCode::OK {
            return Err(Tv5Error::transport(
                url,
                Some(status.as_u16()),
                format!("HTTP {status}"),
            ));
        }
        Ok(response)
    }
}

fn map_reqwest(url: &str, err: reqwest::Error) -> Tv5Error {
    let message = if err.is_timeout() {
        format!("timed out: {err}")
    } else {
        err.to_string()
    };
    Tv5Error::transport(url, err.status().map(|s| s.as_u16()), message)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_bytes(&self, url: &str) -> Result<Bytes> {
        let response = self.get(url).await?;
        response.bytes().await.map_err(|e| map_reqwest(url, e))
    }

    // Decoded with the charset the server declares.
    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.get(url).await?;
        response.text().await.map_err(|e| map_reqwest(url, e))
    }

    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<String> {
        let response = self
            .client
            .post(url)
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header("Cache-Control", "no-cache")
            .form(form)
            .send()
            .await
            .map_err(|e| map_reqwest(url, e))?;

        let response = Self::finish(url, response).await?;
        response.text().await.map_err(|e| map_reqwest(url, e))
    }
}
