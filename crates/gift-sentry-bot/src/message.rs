//! Notification text and inline keyboard for a discovery.

use gift_sentry::{Attribute, Discovery, Owner, PriceInfo};
use serde_json::{json, Value};

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// `12345` → `"12 345"`.
pub fn thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(' ');
        }
        out.push(c);
    }
    out
}

fn rarity_markers(attribute: &Attribute) -> String {
    let mut markers = String::new();
    if let Some(percent) = attribute.rarity_percent {
        if percent < 0.5 {
            markers.push_str(" 🔥🔥🔥");
        } else if percent < 1.0 {
            markers.push_str(" 💍");
        }
    }
    let value = attribute.value.to_lowercase();
    if attribute.kind.eq_ignore_ascii_case("backdrop") && (value == "onyx black" || value == "black") {
        markers.push_str(" 🔥");
    }
    markers
}

fn format_amount(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}

fn price_lines(price: Option<&PriceInfo>) -> Vec<String> {
    let Some(price) = price.filter(|p| !p.is_empty()) else {
        return vec!["<b>Price:</b> not found".to_string()];
    };
    [("TON", price.ton), ("USDT", price.usdt), ("RUB", price.rub)]
        .into_iter()
        .filter_map(|(currency, amount)| {
            amount.map(|v| format!("<b>Price:</b> {} {currency}", format_amount(v)))
        })
        .collect()
}

fn owner_line(owner: Option<&Owner>) -> String {
    match owner {
        Some(owner) if !owner.name.is_empty() => {
            let name = escape_html(&owner.name);
            match owner.profile_url() {
                Some(url) => format!("<b>Owner:</b> {name} (<a href=\"{url}\">{url}</a>)"),
                None => format!("<b>Owner:</b> {name}"),
            }
        }
        _ => "<b>Owner:</b> not specified".to_string(),
    }
}

/// Profile links that keep working after a username change.
fn permanent_links(owner: &Owner) -> Vec<String> {
    let handle = match (&owner.user_id, &owner.username) {
        (Some(id), _) => format!("id{id}"),
        (None, Some(username)) => username.clone(),
        (None, None) => return Vec::new(),
    };
    let url = format!("https://t.me/{}", escape_html(&handle));
    let resolve = owner
        .user_id
        .as_ref()
        .or(owner.username.as_ref())
        .map(|v| escape_html(v))
        .unwrap_or_default();
    vec![
        format!("(<a href=\"{url}\">{url}</a>)"),
        format!("🤖 Android (tg://resolve?domain={resolve})"),
        format!("🍎 Apple (<a href=\"{url}\">{url}</a>)"),
    ]
}

/// HTML message body for `discovery`.
pub fn format_discovery(discovery: &Discovery) -> String {
    let record = &discovery.record;
    let link = escape_html(&record.url);
    let mut lines = vec![
        format!(
            "🎁 {} ({link}) - #{}",
            escape_html(&discovery.label),
            discovery.index
        ),
        String::new(),
    ];

    if !record.attributes.is_empty() {
        lines.push("<b>ATTRIBUTES:</b>".to_string());
        for attribute in &record.attributes {
            let value = match attribute.rarity_percent {
                Some(percent) => format!("{} <i>{percent}%</i>", escape_html(&attribute.value)),
                None => escape_html(&attribute.value),
            };
            lines.push(format!(
                "- <b>{}:</b> {value}{}",
                escape_html(&attribute.kind),
                rarity_markers(attribute)
            ));
        }
    }

    if let Some(issued) = record.issued {
        lines.push(String::new());
        lines.push(format!(
            "<b>Issued:</b> {}/{} issued",
            thousands(issued.issued),
            thousands(issued.total)
        ));
    }

    lines.extend(price_lines(record.price.as_ref()));
    lines.push(String::new());
    lines.push(owner_line(record.owner.as_ref()));
    lines.push(format!("<b>Link:</b> {link}"));

    if let Some(owner) = &record.owner {
        let permanent = permanent_links(owner);
        if !permanent.is_empty() {
            lines.push(String::new());
            lines.push("<b>Permanent links:</b>".to_string());
            lines.extend(permanent);
        }
    }

    lines.join("\n")
}

/// Inline keyboard: the gift, the owner's profile and the price page.
pub fn keyboard(discovery: &Discovery) -> Value {
    let record = &discovery.record;
    let mut rows = vec![json!([{ "text": "🎁 Show gift", "url": record.url }])];
    if let Some(profile) = record.owner.as_ref().and_then(Owner::profile_url) {
        rows.push(json!([{ "text": "👤 Owner profile", "url": profile }]));
    }
    if let Some(price) = record.price.as_ref().filter(|p| !p.source_url.is_empty()) {
        rows.push(json!([{ "text": "💰 Prices on Telegifter", "url": price.source_url }]));
    }
    json!({ "inline_keyboard": rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gift_sentry::{GiftRecord, IssuedCount, Sequence, SequenceId};

    fn discovery(record: GiftRecord) -> Discovery {
        let seq = Sequence::new(SequenceId(1), "https://t.me/nft/plushpepe-", "Plush Pepe");
        Discovery::new(&seq, 42, record)
    }

    fn full_record() -> GiftRecord {
        GiftRecord {
            url: "https://t.me/nft/plushpepe-42".to_string(),
            title: "Plush Pepe gift".to_string(),
            attributes: vec![
                Attribute {
                    kind: "Model".to_string(),
                    value: "Amalgam".to_string(),
                    rarity_percent: Some(0.3),
                },
                Attribute {
                    kind: "Backdrop".to_string(),
                    value: "Onyx Black".to_string(),
                    rarity_percent: Some(0.8),
                },
                Attribute {
                    kind: "Symbol".to_string(),
                    value: "<Star>".to_string(),
                    rarity_percent: None,
                },
            ],
            issued: Some(IssuedCount {
                issued: 12_345,
                total: 100_000,
            }),
            owner: Some(Owner {
                name: "Tom & Jerry".to_string(),
                username: None,
                user_id: Some("777".to_string()),
                href: "https://t.me/id777".to_string(),
            }),
            price: Some(PriceInfo {
                ton: Some(12.5),
                usdt: None,
                rub: Some(98_000.0),
                source_url: "https://telegifter.ru/gifts/plush-pepe/".to_string(),
            }),
        }
    }

    #[test]
    fn test_thousands() {
        assert_eq!(thousands(0), "0");
        assert_eq!(thousands(999), "999");
        assert_eq!(thousands(12_345), "12 345");
        assert_eq!(thousands(1_000_000), "1 000 000");
    }

    #[test]
    fn test_format_full_discovery() {
        let text = format_discovery(&discovery(full_record()));
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "🎁 Plush Pepe (https://t.me/nft/plushpepe-42) - #42"
        );
        assert!(text.contains("- <b>Model:</b> Amalgam <i>0.3%</i> 🔥🔥🔥"));
        assert!(text.contains("- <b>Backdrop:</b> Onyx Black <i>0.8%</i> 💍 🔥"));
        assert!(text.contains("- <b>Symbol:</b> &lt;Star&gt;"));
        assert!(text.contains("<b>Issued:</b> 12 345/100 000 issued"));
        assert!(text.contains("<b>Price:</b> 12.5 TON"));
        assert!(text.contains("<b>Price:</b> 98000 RUB"));
        assert!(!text.contains("USDT"));
        assert!(text.contains(
            "<b>Owner:</b> Tom &amp; Jerry (<a href=\"https://t.me/id777\">https://t.me/id777</a>)"
        ));
        assert!(text.contains("🤖 Android (tg://resolve?domain=777)"));
    }

    #[test]
    fn test_format_sparse_discovery() {
        let record = GiftRecord {
            url: "https://t.me/nft/plushpepe-42".to_string(),
            ..GiftRecord::default()
        };
        let text = format_discovery(&discovery(record));
        assert!(text.contains("<b>Price:</b> not found"));
        assert!(text.contains("<b>Owner:</b> not specified"));
        assert!(!text.contains("ATTRIBUTES"));
        assert!(!text.contains("Permanent links"));
    }

    #[test]
    fn test_keyboard() {
        let keyboard = keyboard(&discovery(full_record()));
        let rows = keyboard["inline_keyboard"].as_array().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0]["url"], "https://t.me/nft/plushpepe-42");
        assert_eq!(rows[1][0]["url"], "https://t.me/id777");
        assert_eq!(rows[2][0]["url"], "https://telegifter.ru/gifts/plush-pepe/");

        let bare = super::keyboard(&discovery(GiftRecord::default()));
        assert_eq!(bare["inline_keyboard"].as_array().unwrap().len(), 1);
    }
}
