//! Market price lookup on telegifter.

use gift_sentry::{slug, PriceInfo, TtlCache};
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::Mutex;

pub const DEFAULT_PRICE_BASE: &str = "https://telegifter.ru/gifts/";

const PRICE_TTL: Duration = Duration::from_secs(300);
const PRICE_CACHE_ENTRIES: usize = 512;
const PRICE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct PriceSource {
    client: reqwest::Client,
    base_url: String,
    cache: Mutex<TtlCache<String, PriceInfo>>,
}

impl PriceSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, DEFAULT_PRICE_BASE)
    }

    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            client,
            base_url,
            cache: Mutex::new(TtlCache::new(PRICE_TTL, PRICE_CACHE_ENTRIES)),
        }
    }

    /// Public price page for `gift_name`.
    pub fn page_url(&self, gift_name: &str) -> String {
        format!("{}{}/", self.base_url, slug(gift_name))
    }

    /// Current prices for `gift_name`. Any failure yields `None`.
    pub async fn lookup(&self, gift_name: &str) -> Option<PriceInfo> {
        let key = gift_name.to_lowercase();
        if let Some(hit) = self.cache.lock().await.get(&key) {
            return Some(hit);
        }

        let url = self.page_url(gift_name);
        let response = match self.client.get(&url).timeout(PRICE_TIMEOUT).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::debug!("price page {url} returned {}", r.status());
                return None;
            }
            Err(e) => {
                tracing::debug!("price lookup for {gift_name} failed: {e}");
                return None;
            }
        };
        let body = response.text().await.ok()?;

        let mut info = parse_prices(&body);
        if info.is_empty() {
            return None;
        }
        info.source_url = url;
        self.cache.lock().await.insert(key, info.clone());
        Some(info)
    }
}

fn amount_pattern(cell: &'static OnceLock<Option<Regex>>, currency: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(&format!(r"(?i)([\d.,]+)\s*{currency}\b")).ok())
        .as_ref()
}

fn parse_amount(raw: &str) -> Option<f64> {
    raw.replace(',', "").trim_end_matches('.').parse().ok()
}

struct Currencies {
    ton: Option<&'static Regex>,
    usdt: Option<&'static Regex>,
    rub: Option<&'static Regex>,
}

fn currencies() -> Currencies {
    static TON: OnceLock<Option<Regex>> = OnceLock::new();
    static USDT: OnceLock<Option<Regex>> = OnceLock::new();
    static RUB: OnceLock<Option<Regex>> = OnceLock::new();
    Currencies {
        ton: amount_pattern(&TON, "TON"),
        usdt: amount_pattern(&USDT, "USDT"),
        rub: amount_pattern(&RUB, "RUB"),
    }
}

fn first_amount(re: Option<&Regex>, text: &str) -> Option<f64> {
    re?.captures_iter(text)
        .find_map(|caps| parse_amount(caps.get(1)?.as_str()))
}

fn last_amount(re: Option<&Regex>, text: &str) -> Option<f64> {
    re?.captures_iter(text)
        .filter_map(|caps| parse_amount(caps.get(1)?.as_str()))
        .last()
}

/// Amounts from elements whose class mentions "price", else the last
/// amount of each currency in the page text.
pub fn parse_prices(body: &str) -> PriceInfo {
    let document = Html::parse_document(body);
    let patterns = currencies();
    let mut info = PriceInfo::default();

    if let Ok(sel) = Selector::parse(r#"[class*="price"], [class*="Price"]"#) {
        for element in document.select(&sel) {
            let text = element.text().collect::<Vec<_>>().join(" ");
            if let Some(v) = first_amount(patterns.ton, &text) {
                info.ton = Some(v);
            }
            if let Some(v) = first_amount(patterns.usdt, &text) {
                info.usdt = Some(v);
            }
            if let Some(v) = first_amount(patterns.rub, &text) {
                info.rub = Some(v);
            }
        }
    }

    if info.is_empty() {
        let text = document.root_element().text().collect::<Vec<_>>().join(" ");
        info.ton = last_amount(patterns.ton, &text);
        info.usdt = last_amount(patterns.usdt, &text);
        info.rub = last_amount(patterns.rub, &text);
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prices_from_price_elements() {
        let body = r#"<html><body>
            <div class="gift-price">Floor: 12.5 TON</div>
            <div class="gift-price usd">1,250.75 USDT</div>
            <span class="priceRub">98,000 RUB</span>
            <p>Old listing 1 TON</p>
        </body></html>"#;
        let info = parse_prices(body);
        assert_eq!(info.ton, Some(12.5));
        assert_eq!(info.usdt, Some(1250.75));
        assert_eq!(info.rub, Some(98_000.0));
    }

    #[test]
    fn test_prices_fall_back_to_last_text_match() {
        let body = "<html><body><p>was 3 TON</p><p>now 4.2 TON</p></body></html>";
        let info = parse_prices(body);
        assert_eq!(info.ton, Some(4.2));
        assert_eq!(info.usdt, None);
    }

    #[test]
    fn test_no_prices() {
        assert!(parse_prices("<html><body>Coming soon</body></html>").is_empty());
    }

    #[test]
    fn test_page_url_uses_slug() {
        let source = PriceSource::with_base_url(reqwest::Client::new(), "http://localhost/gifts");
        assert_eq!(source.page_url("Plush Pepe"), "http://localhost/gifts/plush-pepe/");
    }
}
