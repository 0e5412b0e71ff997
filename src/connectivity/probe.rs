use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{header::CACHE_CONTROL, Client};

/// Active reachability check run on every monitor tick.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn check(&self) -> Result<()>;
}

/// HEAD request against a same-origin resource. A query parameter with the
/// current time defeats intermediary caches.
pub struct HttpProbe {
    client: Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build probe HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    fn cache_busted_url(&self, millis: i64) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}_={}", self.url, separator, millis)
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn check(&self) -> Result<()> {
        let url = self.cache_busted_url(Utc::now().timestamp_millis());
        let response = self
            .client
            .head(&url)
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .with_context(|| format!("probe request to {} failed", self.url))?;
        let status = response.status();
        if !status.is_success() {
            bail!("probe returned {status}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_buster_respects_existing_query() {
        let probe = HttpProbe::new("http://localhost/ping", Duration::from_secs(3)).unwrap();
        assert_eq!(probe.cache_busted_url(42), "http://localhost/ping?_=42");

        let probe = HttpProbe::new("http://localhost/ping?v=1", Duration::from_secs(3)).unwrap();
        assert_eq!(probe.cache_busted_url(42), "http://localhost/ping?v=1&_=42");
    }
}
