//! Marketplace client (BrickLink)
//!
//! Prices come from the catalog search endpoint, which reports min/max
//! price strings such as `"US $12.34"` per condition. Set inventories are
//! scraped from the HTML inventory page and parsed by
//! [`parse_inventory_rows`](super::inventory_parser::parse_inventory_rows).

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::http_retry::{fetch_with_retry, RetryOptions};
use super::inventory_parser::parse_inventory_rows;
use super::rebrickable_client::check_status;
use super::sources::{InventoryRow, Marketplace, PriceLookup, SourceError, SourceResult};
use crate::models::PriceData;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: SearchResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResult {
    #[serde(default)]
    type_list: Vec<SearchTypeGroup>,
}

#[derive(Debug, Deserialize)]
struct SearchTypeGroup {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItem {
    str_item_no: String,
    #[serde(default)]
    m_new_min_price: Option<String>,
    #[serde(default)]
    m_new_max_price: Option<String>,
    #[serde(default)]
    m_used_min_price: Option<String>,
    #[serde(default)]
    m_used_max_price: Option<String>,
}

pub struct BrickLinkClient {
    http_client: Client,
    base_url: String,
    retry: RetryOptions,
}

impl BrickLinkClient {
    /// Price lookups surface 429 immediately; the orchestrator owns the
    /// long cooldown. `retry.rate_limited_retry` is forced off.
    pub fn new(base_url: impl Into<String>, retry: RetryOptions) -> SourceResult<Self> {
        let http_client = Client::builder()
            .user_agent(brickvault_common::config::get_user_agent())
            .build()
            .map_err(|e| SourceError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry: RetryOptions {
                rate_limited_retry: false,
                ..retry
            },
        })
    }
}

#[async_trait]
impl Marketplace for BrickLinkClient {
    async fn price_by_id(&self, marketplace_id: &str) -> SourceResult<PriceLookup> {
        let url = format!("{}/ajax/clone/search/searchproduct.ajax", self.base_url);
        let request = self
            .http_client
            .get(&url)
            .query(&[("q", marketplace_id), ("st", "0"), ("type", "M")]);

        let response = fetch_with_retry(request, self.retry, None).await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!(marketplace_id = %marketplace_id, "Marketplace price search rate limited");
            return Ok(PriceLookup::RateLimited);
        }

        let response = check_status(response, marketplace_id).await?;
        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Malformed(e.to_string()))?;

        let item = exact_item(body.result, marketplace_id).ok_or_else(|| {
            tracing::debug!(marketplace_id = %marketplace_id, "No exact item number in price search results");
            SourceError::NotFound(marketplace_id.to_string())
        })?;

        Ok(PriceLookup::Found(price_data_from_item(&item)))
    }

    async fn set_inventory(&self, set_num: &str) -> SourceResult<Vec<InventoryRow>> {
        let url = format!("{}/catalogItemInv.asp", self.base_url);
        let request = self
            .http_client
            .get(&url)
            .query(&[("S", set_num), ("viewItemType", "M")]);

        let response = fetch_with_retry(request, self.retry, None).await?;
        let response = check_status(response, set_num).await?;
        let html = response
            .text()
            .await
            .map_err(|e| SourceError::Malformed(e.to_string()))?;

        let rows = parse_inventory_rows(&html);
        tracing::debug!(set_num = %set_num, rows = rows.len(), "Parsed set inventory");
        Ok(rows)
    }
}

/// Search hit whose item number is exactly `marketplace_id`
///
/// The search is fuzzy; other items are never used as a stand-in.
fn exact_item(result: SearchResult, marketplace_id: &str) -> Option<SearchItem> {
    result
        .type_list
        .into_iter()
        .flat_map(|g| g.items)
        .find(|i| i.str_item_no.eq_ignore_ascii_case(marketplace_id))
}

fn price_data_from_item(item: &SearchItem) -> PriceData {
    let (currency_code, currency_symbol) = [
        &item.m_new_min_price,
        &item.m_new_max_price,
        &item.m_used_min_price,
        &item.m_used_max_price,
    ]
    .into_iter()
    .flatten()
    .find_map(|s| detect_currency(s))
    .unwrap_or(("USD", "$"));

    PriceData::from_ranges(
        item.m_new_min_price.as_deref().and_then(parse_price),
        item.m_new_max_price.as_deref().and_then(parse_price),
        item.m_used_min_price.as_deref().and_then(parse_price),
        item.m_used_max_price.as_deref().and_then(parse_price),
        currency_code,
        currency_symbol,
    )
}

/// Numeric value of a price string; `None` for non-numeric text
pub(crate) fn parse_price(raw: &str) -> Option<f64> {
    let start = raw.find(|c: char| c.is_ascii_digit())?;
    let number: String = raw[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .filter(|c| *c != ',')
        .collect();

    number.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn detect_currency(raw: &str) -> Option<(&'static str, &'static str)> {
    let prefix = raw.split(|c: char| c.is_ascii_digit()).next()?.trim();
    if prefix.is_empty() {
        return None;
    }

    let known = match prefix {
        "US $" | "$" => ("USD", "$"),
        "CA $" => ("CAD", "$"),
        "AU $" => ("AUD", "$"),
        "EUR" | "€" | "EUR €" => ("EUR", "€"),
        "GBP" | "£" | "GBP £" => ("GBP", "£"),
        _ => return None,
    };
    Some(known)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_price_strings() {
        assert_eq!(parse_price("US $12.34"), Some(12.34));
        assert_eq!(parse_price("US $1,234.50"), Some(1234.5));
        assert_eq!(parse_price("EUR 3.00"), Some(3.0));
        assert_eq!(parse_price("(no data)"), None);
        assert_eq!(parse_price(""), None);
    }

    #[test]
    fn test_detect_currency() {
        assert_eq!(detect_currency("US $1.00"), Some(("USD", "$")));
        assert_eq!(detect_currency("GBP 1.00"), Some(("GBP", "£")));
        assert_eq!(detect_currency("1.00"), None);
    }

    #[test]
    fn test_price_data_from_item_averages_and_nulls() {
        let item = SearchItem {
            str_item_no: "sw0001a".to_string(),
            m_new_min_price: Some("US $10.00".to_string()),
            m_new_max_price: Some("US $15.00".to_string()),
            m_used_min_price: Some("(none)".to_string()),
            m_used_max_price: Some("US $4.00".to_string()),
        };

        let data = price_data_from_item(&item);
        assert_eq!(data.new_avg, Some(12.5));
        assert_eq!(data.used_min, None);
        assert_eq!(data.used_avg, None);
        assert_eq!(data.currency_code, "USD");
    }

    #[test]
    fn test_search_response_shape() {
        let json = r#"{"result":{"typeList":[{"type":"M","items":[
            {"strItemNo":"sw0001a","mNewMinPrice":"US $1.00","mNewMaxPrice":"US $3.00"}
        ]}]}}"#;
        let parsed: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.result.type_list[0].items[0].str_item_no, "sw0001a");
        assert_eq!(parsed.result.type_list[0].items[0].m_used_min_price, None);
    }

    #[test]
    fn test_exact_item_ignores_other_results() {
        let json = r#"{"result":{"typeList":[{"type":"M","items":[
            {"strItemNo":"sw0001","mNewMinPrice":"US $50.00"},
            {"strItemNo":"SW0002","mNewMinPrice":"US $7.00"}
        ]}]}}"#;

        let parsed: SearchResponse = serde_json::from_str(json).unwrap();
        assert!(exact_item(parsed.result, "sw9999").is_none());

        let parsed: SearchResponse = serde_json::from_str(json).unwrap();
        let item = exact_item(parsed.result, "sw0002").unwrap();
        assert_eq!(item.str_item_no, "SW0002");
    }
}
