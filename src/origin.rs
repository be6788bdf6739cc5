//! Origin Loader
//!
//! Fetches values from an upstream HTTP service on a cache miss.

use anyhow::Context;
use reqwest::StatusCode;
use tokio::runtime::Handle;
use tracing::debug;

use crate::cache::CacheLoader;

/// Loads `GET {base_url}/{key}` bodies as cache values.
///
/// Loaders run on blocking threads, so requests are driven with
/// `Handle::block_on`; never call [`load`](CacheLoader::load) from inside an
/// async task.
#[derive(Debug, Clone)]
pub struct OriginLoader {
    client: reqwest::Client,
    base_url: String,
    runtime: Handle,
}

impl OriginLoader {
    pub fn new(base_url: impl Into<String>, runtime: Handle) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            runtime,
        }
    }

    pub fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    async fn fetch(&self, key: &str) -> anyhow::Result<Option<String>> {
        let url = self.url_for(key);
        debug!("Fetching {} from origin", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?;

        // A missing upstream object is "no value", not a failure.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = response
            .error_for_status()
            .with_context(|| format!("origin rejected {}", url))?
            .text()
            .await
            .with_context(|| format!("reading body of {}", url))?;
        Ok(Some(body))
    }
}

impl CacheLoader<String> for OriginLoader {
    fn load(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.runtime.block_on(self.fetch(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_url_for_trims_trailing_slash() {
        let loader = OriginLoader::new("http://origin.local/", Handle::current());
        assert_eq!(loader.url_for("a/b"), "http://origin.local/a/b");
    }
}
