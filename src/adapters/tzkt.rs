//! TzKT blockchain index client.
//!
//! Endpoints: GET /tokens, GET /tokens/balances
//! Results are paginated with `limit`/`offset`; a page shorter than
//! requested (or empty) ends the listing.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::config::TzktSettings;
use crate::domain::{parse_tokens, Token};

use super::TokenIndex;

/// Only tokens that carry an artifact are interesting
const HAS_ARTIFACT: (&str, &str) = ("metadata.artifactUri.null", "false");

/// TzKT REST client
pub struct TzktClient {
    base_url: String,
    page_max: usize,
    request_delay: Duration,
    client: reqwest::Client,
}

impl TzktClient {
    /// Create a client from settings
    pub fn new(settings: &TzktSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .user_agent(concat!("tzarchiver/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build TzKT HTTP client")?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            page_max: settings.page_max,
            request_delay: settings.request_delay(),
            client,
        })
    }

    /// Fetch one raw page
    async fn fetch_page(
        &self,
        path: &str,
        filters: &[(&str, String)],
        limit: usize,
        offset: u64,
    ) -> Result<Vec<Value>> {
        tokio::time::sleep(self.request_delay).await;

        let url = format!("{}/{}", self.base_url, path);
        debug!(%url, limit, offset, "Querying index");

        let response = self
            .client
            .get(&url)
            .query(filters)
            .query(&[("limit", limit.to_string()), ("offset", offset.to_string())])
            .send()
            .await
            .with_context(|| format!("Failed to query {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("TzKT error ({}): {}", status, text);
        }

        response
            .json::<Vec<Value>>()
            .await
            .context("Failed to parse TzKT response")
    }

    async fn fetch_tokens(
        &self,
        path: &str,
        filters: Vec<(&str, String)>,
        limit: usize,
        offset: u64,
    ) -> Result<Vec<Token>> {
        let filters = filters.as_slice();
        collect_pages(limit, offset, self.page_max, |page_limit, page_offset| {
            self.fetch_page(path, filters, page_limit, page_offset)
        })
        .await
    }
}

/// Walk pages until `limit` records are collected or the listing ends.
///
/// Each page asks for `min(page_max, remaining)` records. The offset advances
/// by the raw page length, so records that fail to parse still move the
/// window forward.
pub async fn collect_pages<F, Fut>(
    limit: usize,
    offset: u64,
    page_max: usize,
    mut fetch: F,
) -> Result<Vec<Token>>
where
    F: FnMut(usize, u64) -> Fut,
    Fut: Future<Output = Result<Vec<Value>>>,
{
    let mut results = Vec::new();
    let mut current_offset = offset;
    let mut remaining = limit;

    while remaining > 0 {
        let page_limit = page_max.min(remaining);
        let page = fetch(page_limit, current_offset).await?;
        let page_len = page.len();

        if page_len == 0 {
            break;
        }

        results.extend(parse_tokens(page));

        if page_len < page_limit {
            break;
        }

        current_offset += page_len as u64;
        remaining = remaining.saturating_sub(page_len);
    }

    Ok(results)
}

#[async_trait]
impl TokenIndex for TzktClient {
    async fn minted_by(&self, creator: &str, limit: usize) -> Result<Vec<Token>> {
        let filters = vec![
            ("firstMinter", creator.to_string()),
            (HAS_ARTIFACT.0, HAS_ARTIFACT.1.to_string()),
        ];
        self.fetch_tokens("tokens", filters, limit, 0).await
    }

    async fn held_by(&self, holder: &str, limit: usize) -> Result<Vec<Token>> {
        let filters = vec![
            ("account", holder.to_string()),
            ("balance.ne", "0".to_string()),
            ("select", "token".to_string()),
        ];
        self.fetch_tokens("tokens/balances", filters, limit, 0).await
    }

    async fn in_contract(&self, contract: &str, limit: usize) -> Result<Vec<Token>> {
        let filters = vec![
            ("contract", contract.to_string()),
            (HAS_ARTIFACT.0, HAS_ARTIFACT.1.to_string()),
        ];
        self.fetch_tokens("tokens", filters, limit, 0).await
    }

    async fn tokens_at(&self, offset: u64, limit: usize) -> Result<Vec<Token>> {
        let filters = vec![(HAS_ARTIFACT.0, HAS_ARTIFACT.1.to_string())];
        self.fetch_tokens("tokens", filters, limit, offset).await
    }
}
