//! Binance REST kline client
//!
//! Fetches one-minute klines from `GET /api/v3/klines`
//! (https://developers.binance.com/docs/binance-spot-api-docs/rest-api).
//!
//! The client makes exactly one HTTP request per page and never retries:
//! pacing between pages belongs to the sync engine, and a failed page
//! aborts the run so the next scheduled invocation starts over.

use crate::constants::KLINE_INTERVAL;
use crate::error::{AppError, Result};
use crate::models::{Candle, SyncConfig};
use crate::services::fetcher::{parse_kline_rows, CandleFetcher};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

/// Header carrying the optional API key
const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// Binance spot REST client implementing [`CandleFetcher`]
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    page_limit: usize,
}

impl BinanceClient {
    /// Create a client from sync configuration
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| AppError::Network(format!("Failed to create HTTP client: {}", e)))?;

        debug!(
            base_url = %config.base_url,
            page_limit = config.page_limit,
            authenticated = config.api_key.is_some(),
            "Created Binance client"
        );

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            page_limit: config.page_limit,
        })
    }

    /// Build the klines URL for one page
    fn klines_url(&self, symbol: &str, start: DateTime<Utc>) -> String {
        format!(
            "{}/api/v3/klines?symbol={}&interval={}&startTime={}&limit={}",
            self.base_url,
            symbol,
            KLINE_INTERVAL,
            start.timestamp_millis(),
            self.page_limit
        )
    }
}

#[async_trait]
impl CandleFetcher for BinanceClient {
    async fn fetch_page(&self, symbol: &str, start: DateTime<Utc>) -> Result<Vec<Candle>> {
        let url = self.klines_url(symbol, start);
        debug!(symbol, start = %start, "Fetching kline page");

        let mut request = self.client.get(&url);
        if let Some(ref api_key) = self.api_key {
            request = request.header(API_KEY_HEADER, api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Network(format!("Kline request failed for {}: {}", symbol, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, symbol, &body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::Network(format!("Failed to read kline response for {}: {}", symbol, e)))?;

        let rows: Vec<Value> = serde_json::from_str(&body)
            .map_err(|e| AppError::Parse(format!("Failed to parse kline response for {}: {}", symbol, e)))?;

        parse_kline_rows(&rows)
    }
}

/// Map a non-success HTTP status to the error taxonomy
///
/// 429 is the request-weight limit and 418 the follow-up IP ban; both are
/// rate limiting from the caller's point of view.
fn classify_status(status: StatusCode, symbol: &str, body: &str) -> AppError {
    let body_preview: String = body.chars().take(300).collect();

    if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::IM_A_TEAPOT {
        warn!(symbol, status = status.as_u16(), "Binance rate limit hit");
        return AppError::RateLimit;
    }

    AppError::Network(format!(
        "Binance returned {} for {}: {}",
        status, symbol, body_preview
    ))
}
