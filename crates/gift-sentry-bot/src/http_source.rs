//! reqwest-backed [`PageSource`] for public gift pages.

use crate::catalog::label_from_url;
use crate::extract::parse_gift_page;
use crate::price::PriceSource;
use async_trait::async_trait;
use gift_sentry::{FetchError, GiftRecord, PageSource};
use rand::seq::SliceRandom;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Edge/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Shared client with browser-like default headers.
pub fn build_client() -> reqwest::Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9,ru;q=0.8"),
    );
    headers.insert(header::DNT, HeaderValue::from_static("1"));
    headers.insert(
        header::UPGRADE_INSECURE_REQUESTS,
        HeaderValue::from_static("1"),
    );

    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .default_headers(headers)
        .build()
}

pub struct HttpGiftSource {
    client: reqwest::Client,
    prices: Option<Arc<PriceSource>>,
}

impl HttpGiftSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            prices: None,
        }
    }

    pub fn with_prices(mut self, prices: Arc<PriceSource>) -> Self {
        self.prices = Some(prices);
        self
    }
}

#[async_trait]
impl PageSource for HttpGiftSource {
    async fn fetch(&self, url: &str) -> Result<Option<GiftRecord>, FetchError> {
        let response = self
            .client
            .get(url)
            .header(header::USER_AGENT, random_user_agent())
            .send()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;
        let Some(mut record) = parse_gift_page(url, &body) else {
            return Ok(None);
        };

        if let Some(prices) = &self.prices {
            let base = url.trim_end_matches(|c: char| c.is_ascii_digit());
            record.price = prices.lookup(&label_from_url(base)).await;
        }
        Ok(Some(record))
    }
}
