//! Parts catalog client (Rebrickable API v3)
//!
//! Every call goes through the shared [`RateLimiter`] and then
//! [`fetch_with_retry`]. 404 maps to [`SourceError::NotFound`], which callers
//! treat as a terminal invalid id.

use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::http_retry::{fetch_with_retry, RetryOptions};
use super::rate_limiter::RateLimiter;
use super::sources::{MinifigDetails, PartColors, PartsCatalog, SetSummary, SourceError, SourceResult};
use crate::models::ColorEntry;

#[derive(Debug, Deserialize)]
struct Page<T> {
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct RbPart {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RbPartColor {
    color_id: i64,
    color_name: String,
    #[serde(default)]
    part_img_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RbMinifig {
    set_num: String,
    name: String,
    #[serde(default)]
    set_img_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RbSet {
    set_num: String,
    name: String,
}

pub struct RebrickableClient {
    http_client: Client,
    base_url: String,
    api_key: String,
    rate_limiter: Arc<RateLimiter>,
    retry: RetryOptions,
}

impl RebrickableClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        rate_limiter: Arc<RateLimiter>,
        retry: RetryOptions,
    ) -> SourceResult<Self> {
        let http_client = Client::builder()
            .user_agent(brickvault_common::config::get_user_agent())
            .build()
            .map_err(|e| SourceError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            rate_limiter,
            retry,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, id: &str) -> SourceResult<T> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(url = %url, "Querying parts catalog");

        let request = self
            .http_client
            .get(&url)
            .header("Authorization", format!("key {}", self.api_key))
            .header("Accept", "application/json");

        let response = self
            .rate_limiter
            .enqueue(|| fetch_with_retry(request, self.retry, None))
            .await?;

        let response = check_status(response, id).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| SourceError::Malformed(e.to_string()))
    }
}

/// Map upstream status codes onto [`SourceError`]
pub(crate) async fn check_status(response: Response, id: &str) -> SourceResult<Response> {
    let status = response.status();

    if status == StatusCode::NOT_FOUND {
        return Err(SourceError::NotFound(id.to_string()));
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(SourceError::RateLimited { retry_after });
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SourceError::Api(status.as_u16(), body));
    }

    Ok(response)
}

#[async_trait]
impl PartsCatalog for RebrickableClient {
    async fn part_colors(&self, element_id: &str) -> SourceResult<PartColors> {
        let part: RbPart = self.get_json(&format!("/parts/{}/", element_id), element_id).await?;
        let page: Page<RbPartColor> = self
            .get_json(&format!("/parts/{}/colors/?page_size=1000", element_id), element_id)
            .await?;

        let colors = page
            .results
            .into_iter()
            .map(|c| ColorEntry::new(c.color_id.to_string(), c.color_name, c.part_img_url))
            .collect::<Vec<_>>();

        tracing::debug!(element_id = %element_id, colors = colors.len(), "Retrieved part colors");

        Ok(PartColors {
            element_name: part.name,
            colors,
        })
    }

    async fn minifig(&self, minifig_id: &str) -> SourceResult<MinifigDetails> {
        let fig: RbMinifig = self.get_json(&format!("/minifigs/{}/", minifig_id), minifig_id).await?;

        Ok(MinifigDetails {
            minifig_id: fig.set_num,
            name: fig.name,
            image_url: fig.set_img_url,
        })
    }

    async fn minifig_sets(&self, minifig_id: &str) -> SourceResult<Vec<SetSummary>> {
        let page: Page<RbSet> = self
            .get_json(&format!("/minifigs/{}/sets/?page_size=1000", minifig_id), minifig_id)
            .await?;

        Ok(page
            .results
            .into_iter()
            .map(|s| SetSummary {
                set_num: s.set_num,
                name: s.name,
            })
            .collect())
    }
}
