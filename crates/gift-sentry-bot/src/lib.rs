//! Telegram front end for the gift-sentry engine: page fetching and
//! extraction, price lookup, message formatting and Bot API delivery.

pub mod catalog;
pub mod config;
pub mod extract;
pub mod http_source;
pub mod logging;
pub mod message;
pub mod price;
pub mod telegram;

pub use catalog::{Catalog, CatalogError};
pub use config::{BotConfig, ConfigError};
pub use http_source::{build_client, HttpGiftSource};
pub use price::PriceSource;
pub use telegram::{senders_from_tokens, TelegramSender};
