//! Telegram Bot API sender.

use crate::message::{format_discovery, keyboard};
use async_trait::async_trait;
use gift_sentry::{DeliveryError, Discovery, Sender};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    description: Option<String>,
}

/// One bot token delivering into one chat.
pub struct TelegramSender {
    client: reqwest::Client,
    name: String,
    endpoint: String,
    chat_id: String,
}

impl TelegramSender {
    pub fn new(
        client: reqwest::Client,
        name: impl Into<String>,
        api_url: &str,
        token: &str,
        chat_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            name: name.into(),
            endpoint: format!("{}/bot{token}", api_url.trim_end_matches('/')),
            chat_id: chat_id.into(),
        }
    }

    async fn call(&self, method: &str, payload: &Value) -> Result<Value, DeliveryError> {
        let response = self
            .client
            .post(format!("{}/{method}", self.endpoint))
            .json(payload)
            .send()
            .await
            // reqwest errors embed the URL, which carries the token
            .map_err(|e| DeliveryError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        let body: ApiResponse = match response.json().await {
            Ok(body) => body,
            Err(_) if !status.is_success() => {
                return Err(DeliveryError::Rejected(format!("{method}: HTTP {status}")));
            }
            Err(e) => return Err(DeliveryError::Transport(e.without_url().to_string())),
        };

        if !status.is_success() || !body.ok {
            let reason = body
                .description
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(DeliveryError::Rejected(format!("{method}: {reason}")));
        }
        Ok(body.result)
    }

    async fn send_text(&self, text: &str, extra: Value) -> Result<(), DeliveryError> {
        let mut payload = json!({
            "chat_id": self.chat_id,
            "text": text,
        });
        if let (Some(target), Value::Object(extra)) = (payload.as_object_mut(), extra) {
            target.extend(extra);
        }
        self.call("sendMessage", &payload).await.map(|_| ())
    }
}

#[async_trait]
impl Sender for TelegramSender {
    fn name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self) -> Result<String, DeliveryError> {
        let me = self.call("getMe", &json!({})).await?;
        match me.get("username").and_then(Value::as_str) {
            Some(username) => Ok(format!("@{username}")),
            None => Ok(self.name.clone()),
        }
    }

    async fn deliver(&self, discovery: &Discovery) -> Result<(), DeliveryError> {
        self.send_text(
            &format_discovery(discovery),
            json!({
                "parse_mode": "HTML",
                "disable_web_page_preview": true,
                "reply_markup": keyboard(discovery),
            }),
        )
        .await
    }

    async fn announce(&self, text: &str) -> Result<(), DeliveryError> {
        self.send_text(text, Value::Null).await
    }
}

/// One sender per configured token, named `bot#1`, `bot#2`, ...
pub fn senders_from_tokens(
    client: &reqwest::Client,
    api_url: &str,
    tokens: &[String],
    chat_id: &str,
) -> Vec<TelegramSender> {
    tokens
        .iter()
        .enumerate()
        .map(|(i, token)| {
            TelegramSender::new(client.clone(), format!("bot#{}", i + 1), api_url, token, chat_id)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_layout() {
        let sender = TelegramSender::new(
            reqwest::Client::new(),
            "bot#1",
            "https://api.telegram.org/",
            "123:abc",
            "-100",
        );
        assert_eq!(sender.endpoint, "https://api.telegram.org/bot123:abc");
        assert_eq!(sender.name(), "bot#1");
    }

    #[test]
    fn test_senders_are_numbered() {
        let client = reqwest::Client::new();
        let senders = senders_from_tokens(
            &client,
            "http://localhost",
            &["1:a".to_string(), "2:b".to_string()],
            "42",
        );
        let names: Vec<&str> = senders.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["bot#1", "bot#2"]);
    }
}
