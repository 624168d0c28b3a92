use async_trait::async_trait;
use metrics::counter;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{none_found_message, render_batch, Notifier};
use crate::config::TelegramConfig;
use crate::error::DeliveryError;
use crate::posting::AdmittedPosting;
use crate::relevance::truncate_chars;

const CHANNEL: &str = "telegram";
const BACKOFF_BASE_MS: u64 = 500;
const BACKOFF_MAX_EXP: u32 = 6;

/// Delay before retrying after `attempt` (1-based); doubles per attempt, capped at 32s.
fn backoff_for(attempt: u8) -> Duration {
    let exp = u32::from(attempt.saturating_sub(1)).min(BACKOFF_MAX_EXP);
    Duration::from_millis(BACKOFF_BASE_MS << exp)
}

#[derive(Clone)]
pub struct TelegramNotifier {
    api_base: String,
    bot_token: String,
    chat_id: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
    pacing: Duration,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Deserialize)]
struct ApiReply {
    ok: bool,
    description: Option<String>,
}

impl TelegramNotifier {
    pub fn new(cfg: &TelegramConfig) -> Self {
        Self {
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            bot_token: cfg.bot_token.clone(),
            chat_id: cfg.chat_id.clone(),
            client: Client::new(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
            pacing: Duration::from_millis(500),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    /// Delay between messages of one batch.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }

    /// One `sendMessage` with retry + exponential backoff on transport errors, 429
    /// and 5xx. Other client errors fail immediately.
    pub async fn send_message(&self, text: &str) -> Result<(), DeliveryError> {
        let payload = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: "Markdown",
            disable_web_page_preview: false,
        };
        let url = self.endpoint();

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let backoff = backoff_for(attempt);
            let res = self
                .client
                .post(&url)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            match res {
                Ok(rsp) => {
                    let status = rsp.status();
                    if status.is_success() {
                        let reply: ApiReply = rsp.json().await.map_err(|source| {
                            DeliveryError::Transport {
                                channel: CHANNEL,
                                source,
                            }
                        })?;
                        if reply.ok {
                            counter!("notify_messages_total").increment(1);
                            return Ok(());
                        }
                        counter!("notify_failures_total").increment(1);
                        return Err(DeliveryError::Rejected {
                            channel: CHANNEL,
                            description: reply.description.unwrap_or_default(),
                        });
                    }
                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    if retryable && attempt < self.max_retries {
                        tracing::warn!(target: "notify", status = status.as_u16(), attempt, "telegram retry");
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    let body = rsp.text().await.unwrap_or_default();
                    counter!("notify_failures_total").increment(1);
                    return Err(DeliveryError::Status {
                        channel: CHANNEL,
                        status: status.as_u16(),
                        body: truncate_chars(&body, 300),
                    });
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        tracing::warn!(target: "notify", error = %e, attempt, "telegram request failed; retrying");
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    counter!("notify_failures_total").increment(1);
                    return Err(DeliveryError::Transport {
                        channel: CHANNEL,
                        source: e,
                    });
                }
            }
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn deliver(&self, postings: &[AdmittedPosting]) -> Result<(), DeliveryError> {
        if postings.is_empty() {
            return self.notify_none_found().await;
        }
        tracing::info!(target: "notify", count = postings.len(), chat = %self.chat_id, "sending postings");
        let messages = render_batch(postings);
        let total = messages.len();
        for (i, msg) in messages.iter().enumerate() {
            self.send_message(msg).await?;
            if i + 1 < total {
                tokio::time::sleep(self.pacing).await;
            }
        }
        tracing::info!(target: "notify", count = postings.len(), "all postings sent");
        Ok(())
    }

    async fn notify_none_found(&self) -> Result<(), DeliveryError> {
        tracing::info!(target: "notify", "sending no-postings message");
        self.send_message(&none_found_message()).await
    }

    async fn notify_text(&self, text: &str) -> Result<(), DeliveryError> {
        self.send_message(text).await
    }

    fn name(&self) -> &'static str {
        CHANNEL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_uses_token_path() {
        let n = TelegramNotifier::new(&TelegramConfig {
            bot_token: "123:abc".into(),
            chat_id: "42".into(),
            api_base: "http://127.0.0.1:9/".into(),
        });
        assert_eq!(n.endpoint(), "http://127.0.0.1:9/bot123:abc/sendMessage");
    }

    #[test]
    fn payload_shape() {
        let p = SendMessage {
            chat_id: "42",
            text: "hi",
            parse_mode: "Markdown",
            disable_web_page_preview: false,
        };
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["chat_id"], "42");
        assert_eq!(v["parse_mode"], "Markdown");
    }

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(backoff_for(1), Duration::from_millis(500));
        assert_eq!(backoff_for(2), Duration::from_millis(1000));
        assert_eq!(backoff_for(7), Duration::from_secs(32));
        assert_eq!(backoff_for(65), Duration::from_secs(32));
        assert_eq!(backoff_for(u8::MAX), Duration::from_secs(32));
    }
}
