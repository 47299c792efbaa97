use anyhow::{Context, Result};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::error::ErrorResponse;

#[derive(Clone)]
pub struct Client {
    base_url: Url,
    http: reqwest::Client,
    user_agent: String,
    retries: u32,
}

impl Client {
    pub fn new(base_url: &str, timeout: Duration, retries: u32) -> Result<Self> {
        let base_url = Url::parse(base_url).context("Invalid base URL")?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url,
            http,
            user_agent: format!("ipamctl/{}", env!("CARGO_PKG_VERSION")),
            retries,
        })
    }

    pub fn build_url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).with_context(|| {
            format!(
                "Failed to join base_url={} with path={}",
                self.base_url, path
            )
        })
    }

    /// Send a request and pretty-print the JSON response to stdout.
    pub async fn send_json(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<()> {
        let url = self.build_url(path)?;
        let bytes = self.request_bytes(method, url, body).await?;
        print_bytes(&bytes)?;
        Ok(())
    }

    /// Like `send_json`, with query parameters encoded into the URL.
    pub async fn send_json_query(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<()> {
        let mut url = self.build_url(path)?;
        url.query_pairs_mut().extend_pairs(query);
        let bytes = self.request_bytes(method, url, None).await?;
        print_bytes(&bytes)?;
        Ok(())
    }

    /// Send a request and deserialize the response body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.build_url(path)?;
        let bytes = self.request_bytes(Method::GET, url, None).await?;
        serde_json::from_slice(&bytes).context("Failed to parse response")
    }

    async fn request_bytes(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> Result<Vec<u8>> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let req_id = Uuid::new_v4().to_string();
            let mut req = self.http.request(method.clone(), url.clone());
            req = req.header("user-agent", &self.user_agent);
            req = req.header("x-request-id", &req_id);

            if let Some(b) = &body {
                req = req.json(b);
            }

            debug!("HTTP {} {} (attempt {})", method, url, attempt);
            let resp = req.send().await.context("Request failed")?;
            let status = resp.status();

            if status.is_success() {
                let bytes = resp.bytes().await.unwrap_or_default().to_vec();
                return Ok(bytes);
            }

            // Try structured error, fallback to raw.
            let bytes = resp.bytes().await.unwrap_or_default();
            let err = serde_json::from_slice::<ErrorResponse>(&bytes).ok();
            let body_text = if bytes.is_empty() {
                String::new()
            } else {
                String::from_utf8_lossy(&bytes).to_string()
            };

            // Retry handling: 429 always, GET/DELETE on 5xx.
            if attempt <= self.retries && should_retry(&method, status) {
                tokio::time::sleep(retry_sleep(status)).await;
                continue;
            }

            // Final error render
            if let Some(e) = err {
                let mut rendered = format!(
                    "HTTP {} {} failed: status={} error={} message={}",
                    method,
                    url,
                    status.as_u16(),
                    e.error.as_deref().unwrap_or("unknown"),
                    e.message.as_deref().unwrap_or(""),
                );
                if let Some(suggested) = &e.suggested_cidr {
                    rendered.push_str(&format!("\n  suggested CIDR: {}", suggested));
                }
                if let Some(conflicts) = &e.conflicts {
                    for c in conflicts {
                        rendered.push_str(&format!(
                            "\n  conflicts with: {} ({})",
                            c.name.as_deref().unwrap_or(&c.id),
                            c.cidr
                        ));
                    }
                }
                if let Some(counts) = &e.counts {
                    rendered.push_str(&format!("\n  current pool: {}", counts));
                }
                anyhow::bail!(rendered);
            } else {
                anyhow::bail!(
                    "HTTP {} {} failed: status={} body={}",
                    method,
                    url,
                    status.as_u16(),
                    body_text
                );
            }
        }
    }
}

fn should_retry(method: &Method, status: StatusCode) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    if status.is_server_error() {
        return matches!(*method, Method::GET | Method::DELETE);
    }
    false
}

fn retry_sleep(status: StatusCode) -> Duration {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Duration::from_secs(1);
    }
    Duration::from_millis(300)
}

fn print_bytes(bytes: &[u8]) -> Result<()> {
    if bytes.is_empty() {
        println!("{}", r#"{"success":true}"#);
        return Ok(());
    }
    if let Ok(v) = serde_json::from_slice::<serde_json::Value>(bytes) {
        println!("{}", serde_json::to_string_pretty(&v)?);
    } else {
        println!("{}", String::from_utf8_lossy(bytes));
    }
    Ok(())
}
