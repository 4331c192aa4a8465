//! Gift page extraction from raw HTML.
//!
//! Everything here is synchronous: `scraper::Html` is not `Send`, so a
//! document must never live across an `.await`.

use gift_sentry::{Attribute, GiftRecord, IssuedCount, Owner};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;

/// Link captions that never name an owner.
const GENERIC_LINK_TEXT: &[&str] = &[
    "Telegram",
    "Share",
    "Open",
    "Forward",
    "Preview",
    "View in Telegram",
];

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn cached_regex(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

/// One `th` → `td` row of the gift table.
#[derive(Debug, Clone)]
struct TableRow {
    header: String,
    text: String,
    links: Vec<(String, String)>,
}

/// Parse a fetched page. `None` when the page is not a gift page.
pub fn parse_gift_page(url: &str, body: &str) -> Option<GiftRecord> {
    let document = Html::parse_document(body);

    let title = page_title(&document)?;
    if !title.to_lowercase().contains("gift") {
        return None;
    }

    let rows = gift_table_rows(&document);
    let mut record = GiftRecord {
        url: url.to_string(),
        title,
        ..GiftRecord::default()
    };

    for row in &rows {
        match row.header.as_str() {
            "owner" => record.owner = owner_from_row(row),
            header if is_issued_header(header) => {
                record.issued = record.issued.or_else(|| parse_issued_cell(&row.text));
            }
            _ => {
                if let Some(attribute) = attribute_from_row(row) {
                    record.attributes.push(attribute);
                }
            }
        }
    }

    if record.owner.is_none() {
        record.owner = owner_from_page_links(&document);
    }
    if record.issued.is_none() {
        record.issued = parse_issued_text(&page_text(&document));
    }
    Some(record)
}

fn page_title(document: &Html) -> Option<String> {
    let sel = selector("title")?;
    let title = document
        .select(&sel)
        .next()?
        .text()
        .collect::<String>()
        .trim()
        .to_string();
    (!title.is_empty()).then_some(title)
}

fn page_text(document: &Html) -> String {
    document.root_element().text().collect::<Vec<_>>().join(" ")
}

fn element_text(element: &ElementRef) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn gift_table_rows(document: &Html) -> Vec<TableRow> {
    let (Some(table_sel), Some(row_sel), Some(th_sel), Some(td_sel), Some(a_sel)) = (
        selector("table.tgme_gift_table"),
        selector("tr"),
        selector("th"),
        selector("td"),
        selector("a[href]"),
    ) else {
        return Vec::new();
    };
    let Some(table) = document.select(&table_sel).next() else {
        return Vec::new();
    };

    let mut rows = Vec::new();
    for tr in table.select(&row_sel) {
        let (Some(th), Some(td)) = (tr.select(&th_sel).next(), tr.select(&td_sel).next()) else {
            continue;
        };
        let links = td
            .select(&a_sel)
            .filter_map(|a| {
                let href = a.value().attr("href")?.to_string();
                Some((href, element_text(&a)))
            })
            .collect();
        rows.push(TableRow {
            header: element_text(&th).to_lowercase(),
            text: element_text(&td),
            links,
        });
    }
    rows
}

fn is_issued_header(header: &str) -> bool {
    header.contains("quantity") || header.contains("issued")
}

/// Clean an owner display name down to word characters and `@-.`.
fn clean_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || matches!(*c, '_' | '@' | '-' | '.'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// `(username, user_id)` from a profile link.
pub fn parse_owner_link(href: &str) -> Option<(Option<String>, Option<String>)> {
    static TME: OnceLock<Option<Regex>> = OnceLock::new();
    static TG: OnceLock<Option<Regex>> = OnceLock::new();

    if href.contains("t.me/") {
        let re = cached_regex(&TME, r"t\.me/([A-Za-z0-9_]+)")?;
        let handle = re.captures(href)?.get(1)?.as_str();
        return match handle.strip_prefix("id") {
            Some(id) if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) => {
                Some((None, Some(id.to_string())))
            }
            _ => Some((Some(handle.to_string()), None)),
        };
    }
    if href.starts_with("tg://") {
        let re = cached_regex(&TG, r"tg://(?:user|openmessage)\?id=(\d+)")?;
        let id = re.captures(href)?.get(1)?.as_str();
        return Some((None, Some(id.to_string())));
    }
    None
}

fn owner_from_link(href: &str, caption: &str) -> Option<Owner> {
    let name = clean_name(caption);
    if name.is_empty() || GENERIC_LINK_TEXT.contains(&caption.trim()) {
        return None;
    }
    let (username, user_id) = parse_owner_link(href)?;
    Some(Owner {
        name,
        username,
        user_id,
        href: href.to_string(),
    })
}

fn owner_from_row(row: &TableRow) -> Option<Owner> {
    let linked = row
        .links
        .iter()
        .find_map(|(href, caption)| {
            let caption = if caption.is_empty() { &row.text } else { caption };
            owner_from_link(href, caption)
        });
    if linked.is_some() {
        return linked;
    }

    let name = clean_name(&row.text);
    (!name.is_empty()).then(|| Owner {
        name,
        username: None,
        user_id: None,
        href: String::new(),
    })
}

fn owner_from_page_links(document: &Html) -> Option<Owner> {
    let sel = selector("a[href]")?;
    document.select(&sel).find_map(|a| {
        let href = a.value().attr("href")?;
        if href.contains("/nft/") {
            return None;
        }
        owner_from_link(href, &element_text(&a))
    })
}

fn attribute_from_row(row: &TableRow) -> Option<Attribute> {
    static PERCENT: OnceLock<Option<Regex>> = OnceLock::new();

    if row.text.is_empty() || row.header.is_empty() {
        return None;
    }
    let mut value = row.text.clone();
    let mut rarity_percent = None;
    if let Some(re) = cached_regex(&PERCENT, r"\s*([0-9]+(?:\.[0-9]+)?)\s*%") {
        if let Some(caps) = re.captures(&row.text) {
            rarity_percent = caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok());
            value = re.replace(&row.text, "").trim().to_string();
        }
    }
    if value.is_empty() {
        return None;
    }
    Some(Attribute {
        kind: capitalize(&row.header),
        value,
        rarity_percent,
    })
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn digits(raw: &str) -> Option<u64> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// `"12 345/100 000 issued"` → 12345 of 100000.
pub fn parse_issued_cell(text: &str) -> Option<IssuedCount> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    let re = cached_regex(&CELL, r"(\d[\d\s,]*)\s*/\s*(\d[\d\s,]*)")?;
    let caps = re.captures(text)?;
    Some(IssuedCount {
        issued: digits(caps.get(1)?.as_str())?,
        total: digits(caps.get(2)?.as_str())?,
    })
}

/// Issued counter anywhere in free page text.
pub fn parse_issued_text(text: &str) -> Option<IssuedCount> {
    static SLASH: OnceLock<Option<Regex>> = OnceLock::new();
    static OF: OnceLock<Option<Regex>> = OnceLock::new();

    let patterns = [
        cached_regex(&SLASH, r"(?i)(\d[\d\s,]*)\s*/\s*(\d[\d\s,]*)\s*issued"),
        cached_regex(&OF, r"(?i)issued\s*(\d[\d\s,]*)\s*of\s*(\d[\d\s,]*)"),
    ];
    patterns.into_iter().flatten().find_map(|re| {
        let caps = re.captures(text)?;
        Some(IssuedCount {
            issued: digits(caps.get(1)?.as_str())?,
            total: digits(caps.get(2)?.as_str())?,
        })
    })
}
