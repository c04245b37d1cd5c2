//! Discord webhook notifier

use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::time::Duration;

use super::Notifier;

/// Discord rejects message content longer than this many characters
const MAX_CONTENT_CHARS: usize = 2000;

const TRUNCATION_MARKER: &str = "\n…(truncated)";

#[derive(Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
}

/// Posts alerts to a Discord channel through an incoming webhook
pub struct DiscordNotifier {
    agent: ureq::Agent,
    webhook_url: String,
}

impl DiscordNotifier {
    pub fn new(webhook_url: impl Into<String>, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            agent,
            webhook_url: webhook_url.into(),
        }
    }
}

impl Notifier for DiscordNotifier {
    fn notify(&self, message: &str) -> Result<()> {
        let content = truncate_content(message);

        let mut response = self
            .agent
            .post(&self.webhook_url)
            .send_json(WebhookPayload { content: &content })
            .context("Failed to send message to Discord")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.body_mut().read_to_string().unwrap_or_default();
            bail!("Failed to send message to Discord ({}): {}", status, body);
        }
        Ok(())
    }
}

/// Shorten a message to fit Discord's content limit
fn truncate_content(message: &str) -> String {
    if message.chars().count() <= MAX_CONTENT_CHARS {
        return message.to_string();
    }
    let keep = MAX_CONTENT_CHARS - TRUNCATION_MARKER.chars().count();
    let mut truncated: String = message.chars().take(keep).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}
