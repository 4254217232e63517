// In crates/notifier/src/telegram.rs

use std::time::Duration;

use app_config::TelegramSettings;
use async_trait::async_trait;
use serde::Serialize;

use crate::{Error, Notifier, Result};

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
}

/// Sends messages through the Telegram Bot API `sendMessage` method.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    http_client: reqwest::Client,
    url: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(settings: &TelegramSettings, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::ClientBuildError(e.to_string()))?;
        Ok(Self {
            http_client,
            url: send_message_url(&settings.api_base_url, &settings.token),
            chat_id: settings.chat_id.clone(),
        })
    }

    async fn deliver(&self, message: &str) -> Result<()> {
        let body = SendMessage {
            chat_id: &self.chat_id,
            text: message,
            parse_mode: "HTML",
        };
        let response = self.http_client.post(&self.url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Delivery {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

fn send_message_url(base: &str, token: &str) -> String {
    format!("{}/bot{}/sendMessage", base.trim_end_matches('/'), token)
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, message: &str) {
        match self.deliver(message).await {
            Ok(()) => tracing::info!("Message sent to Telegram."),
            Err(e) => tracing::error!(error = %e, "Failed to send Telegram message."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_embeds_token() {
        assert_eq!(
            send_message_url("https://api.telegram.org/", "123:abc"),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn payload_uses_html_parse_mode() {
        let body = SendMessage {
            chat_id: "42",
            text: "<b>hi</b>",
            parse_mode: "HTML",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["chat_id"], "42");
        assert_eq!(json["parse_mode"], "HTML");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_swallowed() {
        let settings = TelegramSettings {
            token: "t".into(),
            chat_id: "1".into(),
            api_base_url: "http://127.0.0.1:9".into(),
        };
        let notifier = TelegramNotifier::new(&settings, Duration::from_millis(200)).unwrap();
        notifier.send("ping").await;
        assert!(notifier.deliver("ping").await.is_err());
    }
}
