//! Gift catalog file.
//!
//! ```json
//! {
//!   "gifts": { "1": ["https://t.me/nft/plushpepe-", 0] },
//!   "premarket": ["Swag Bag"]
//! }
//! ```
//!
//! The second element of each gift entry is reserved and ignored.

use gift_sentry::{Sequence, SequenceId};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("cannot read catalog {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid catalog JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("catalog key {0:?} is not a positive integer id")]
    BadId(String),

    #[error("catalog entry {0} has an empty URL")]
    EmptyUrl(String),

    #[error("catalog has neither gifts nor premarket names")]
    Empty,
}

#[derive(Deserialize)]
struct RawCatalog {
    #[serde(default)]
    gifts: BTreeMap<String, RawEntry>,
    #[serde(default)]
    premarket: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Tuple(String, #[allow(dead_code)] serde_json::Value),
    Url(String),
}

impl RawEntry {
    fn url(&self) -> &str {
        match self {
            Self::Tuple(url, _) | Self::Url(url) => url,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    pub sequences: Vec<Sequence>,
    pub premarket: Vec<String>,
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, CatalogError> {
        let raw: RawCatalog = serde_json::from_str(raw)?;

        let mut sequences = Vec::with_capacity(raw.gifts.len());
        for (key, entry) in &raw.gifts {
            let id = key
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|id| *id > 0)
                .ok_or_else(|| CatalogError::BadId(key.clone()))?;
            let url = entry.url().trim();
            if url.is_empty() {
                return Err(CatalogError::EmptyUrl(key.clone()));
            }
            sequences.push(Sequence::new(SequenceId(id), url, label_from_url(url)));
        }
        sequences.sort_by_key(|s| s.id);

        let premarket: Vec<String> = raw
            .premarket
            .into_iter()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();

        if sequences.is_empty() && premarket.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(Self {
            sequences,
            premarket,
        })
    }

    /// Premarket names not already walked under a catalog label.
    pub fn pending_premarket(&self) -> Vec<String> {
        self.premarket
            .iter()
            .filter(|name| {
                !self
                    .sequences
                    .iter()
                    .any(|s| s.label.eq_ignore_ascii_case(name))
            })
            .cloned()
            .collect()
    }
}

/// Names whose URL slug has no separators, keyed by the squashed form.
const SPECIAL_LABELS: &[(&str, &str)] = &[
    ("artisanbrick", "Artisan Brick"),
    ("astralshard", "Astral Shard"),
    ("bdaycandle", "B-day Candle"),
    ("blingbinky", "Bling Binky"),
    ("bondedring", "Bonded Ring"),
    ("bunnymuffin", "Bunny Muffin"),
    ("candycane", "Candy Cane"),
    ("cloverpin", "Clover Pin"),
    ("cookieheart", "Cookie Heart"),
    ("crystalball", "Crystal Ball"),
    ("cupidcharm", "Cupid Charm"),
    ("deskcalendar", "Desk Calendar"),
    ("diamondring", "Diamond Ring"),
    ("durovscap", "Durov's Cap"),
    ("electricskull", "Electric Skull"),
    ("eternalcandle", "Eternal Candle"),
    ("eternalrose", "Eternal Rose"),
    ("evileye", "Evil Eye"),
    ("faithamulet", "Faith Amulet"),
    ("flyingbroom", "Flying Broom"),
    ("freshsocks", "Fresh Socks"),
    ("gemsignet", "Gem Signet"),
    ("genielamp", "Genie Lamp"),
    ("gingercookie", "Ginger Cookie"),
    ("hangingstar", "Hanging Star"),
    ("happybrownie", "Happy Brownie"),
    ("heartlocket", "Heart Locket"),
    ("heroichelmet", "Heroic Helmet"),
    ("hexpot", "Hex Pot"),
    ("holidaydrink", "Holiday Drink"),
    ("homemadecake", "Homemade Cake"),
    ("hypnolollipop", "Hypno Lollipop"),
    ("icecream", "Ice Cream"),
    ("inputkey", "Input Key"),
    ("instantramen", "Instant Ramen"),
    ("iongem", "Ion Gem"),
    ("ionicdryer", "Ionic Dryer"),
    ("jackinthebox", "Jack in the Box"),
    ("jellybunny", "Jelly Bunny"),
    ("jesterhat", "Jester Hat"),
    ("jinglebells", "Jingle Bells"),
    ("jollychimp", "Jolly Chimp"),
    ("joyfulbundle", "Joyful Bundle"),
    ("kissedfrog", "Kissed Frog"),
    ("lightsword", "Light Sword"),
    ("lolpop", "Lol Pop"),
    ("lootbag", "Loot Bag"),
    ("lovecandle", "Love Candle"),
    ("lovepotion", "Love Potion"),
    ("lowrider", "Low Rider"),
    ("lunarsnake", "Lunar Snake"),
    ("lushbouquet", "Lush Bouquet"),
    ("madpumpkin", "Mad Pumpkin"),
    ("magicpotion", "Magic Potion"),
    ("mightyarm", "Mighty Arm"),
    ("minioscar", "Mini Oscar"),
    ("moneypot", "Money Pot"),
    ("moonpendant", "Moon Pendant"),
    ("moussecake", "Mousse Cake"),
    ("nailbracelet", "Nail Bracelet"),
    ("nekobucket", "Neko Bucket"),
    ("nekohelmet", "Neko Helmet"),
    ("partysparkler", "Party Sparkler"),
    ("perfumebottle", "Perfume Bottle"),
    ("petsnake", "Pet Snake"),
    ("plushpepe", "Plush Pepe"),
    ("preciouspeach", "Precious Peach"),
    ("prettyposy", "Pretty Posy"),
    ("recordplayer", "Record Player"),
    ("restlessbar", "Restless Bar"),
    ("sakuraflower", "Sakura Flower"),
    ("santahat", "Santa Hat"),
    ("scaredcat", "Scared Cat"),
    ("sharptongue", "Sharp Tongue"),
    ("signetring", "Signet Ring"),
    ("skullflower", "Skull Flower"),
    ("skystilettos", "Sky Stilettos"),
    ("sleighbell", "Sleigh Bell"),
    ("snakebox", "Snake Box"),
    ("snoopcigar", "Snoop Cigar"),
    ("snoopdogg", "Snoop Dogg"),
    ("snowglobe", "Snow Globe"),
    ("snowmittens", "Snow Mittens"),
    ("spicedwine", "Spiced Wine"),
    ("springbasket", "Spring Basket"),
    ("spyagaric", "Spy Agaric"),
    ("starnotepad", "Star Notepad"),
    ("swagbag", "Swag Bag"),
    ("swisswatch", "Swiss Watch"),
    ("tamagadget", "Tama Gadget"),
    ("tophat", "Top Hat"),
    ("toybear", "Toy Bear"),
    ("trappedheart", "Trapped Heart"),
    ("valentinebox", "Valentine Box"),
    ("victorymedal", "Victory Medal"),
    ("vintagecigar", "Vintage Cigar"),
    ("voodoodoll", "Voodoo Doll"),
    ("westside", "Westside Sign"),
    ("whipcupcake", "Whip Cupcake"),
    ("winterwreath", "Winter Wreath"),
    ("witchhat", "Witch Hat"),
    ("xmasstocking", "Xmas Stocking"),
];

/// Human-readable label for a base URL like `https://t.me/nft/plushpepe-`.
pub fn label_from_url(url: &str) -> String {
    let slug = url
        .trim_end_matches('-')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    let words: Vec<&str> = slug.split('-').filter(|w| !w.is_empty()).collect();
    if words.is_empty() {
        return "Unknown".to_string();
    }

    let squashed = words.concat().to_lowercase();
    if let Some((_, label)) = SPECIAL_LABELS.iter().find(|(key, _)| *key == squashed) {
        return (*label).to_string();
    }

    words
        .iter()
        .map(|word| capitalize(word))
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
