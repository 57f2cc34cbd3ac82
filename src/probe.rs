//! Existence probes for candidate frame URLs.
//!
//! The image host offers no directory listing, so discovery asks "does this
//! URL resolve?" one candidate at a time. Any transport or status failure
//! reads as "does not exist"; there are no retries at this layer.

use async_trait::async_trait;

/// Answers whether a candidate resource currently exists.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn exists(&self, url: &str) -> bool;
}

/// Probe backed by a plain HTTP GET against the image host.
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn exists(&self, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("Probe failed for {}: {}", url, e);
                false
            }
        }
    }
}
