use crate::fetcher::snippet;
use crate::traits::{DeliveryOutcome, NotificationSink};
use crate::types::{Destination, NotifierError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://discord.com";

/// Discord's per-message content limit, in characters.
pub const MESSAGE_LIMIT: usize = 2000;

/// Posts notifications to Discord text channels through the bot REST API.
/// Destinations are channel IDs.
pub struct DiscordSink {
    client: Client,
    base_url: Url,
    token: String,
}

#[derive(Debug, Deserialize)]
struct CurrentUser {
    username: String,
}

#[derive(Debug, Deserialize)]
struct DiscordError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: u64,
}

impl DiscordSink {
    pub fn new(base_url: &str, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(NotifierError::Config("Discord bot token is empty".to_string()));
        }

        let client = Client::builder()
            .user_agent(concat!(
                "DiscordBot (https://github.com/upload-notifier, ",
                env!("CARGO_PKG_VERSION"),
                ")"
            ))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: Url::parse(base_url)?,
            token,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(&format!("api/v10/{}", path))?)
    }

    fn authorization(&self) -> String {
        format!("Bot {}", self.token)
    }
}

/// Classify a non-success response from the create-message endpoint.
pub fn classify_failure(status: StatusCode, body: &str) -> DeliveryOutcome {
    let reason = match serde_json::from_str::<DiscordError>(body) {
        Ok(err) if !err.message.is_empty() => format!("HTTP {}: {} (code {})", status.as_u16(), err.message, err.code),
        _ => format!("HTTP {}: {}", status.as_u16(), snippet(body)),
    };

    match status {
        // Missing access / missing permissions, unknown channel, or a payload
        // the channel will never accept.
        StatusCode::FORBIDDEN | StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => {
            DeliveryOutcome::PermissionDenied(reason)
        }
        // A bad token is not specific to this item; keep the item for later.
        _ => DeliveryOutcome::TransientFailure(reason),
    }
}

/// Cut `text` to the message limit, marking the cut with an ellipsis.
pub fn fit_message(text: &str) -> String {
    if text.chars().count() <= MESSAGE_LIMIT {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(MESSAGE_LIMIT - 1).collect();
    cut.push('…');
    cut
}

fn is_channel_id(destination: &Destination) -> bool {
    !destination.0.is_empty() && destination.0.chars().all(|c| c.is_ascii_digit())
}

#[async_trait]
impl NotificationSink for DiscordSink {
    fn name(&self) -> &str {
        "discord"
    }

    async fn ready(&self) -> Result<()> {
        let url = self.endpoint("users/@me")?;
        let response = self
            .client
            .get(url)
            .header("Authorization", self.authorization())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifierError::Status {
                status: status.as_u16(),
                endpoint: "discord users/@me".to_string(),
                message: snippet(&body),
            });
        }

        let user: CurrentUser = response.json().await?;
        info!("{} has connected to Discord!", user.username);
        Ok(())
    }

    async fn deliver(&self, destination: &Destination, text: &str) -> DeliveryOutcome {
        if !is_channel_id(destination) {
            return DeliveryOutcome::PermissionDenied(format!("'{}' is not a Discord channel ID", destination));
        }

        let url = match self.endpoint(&format!("channels/{}/messages", destination)) {
            Ok(url) => url,
            Err(e) => return DeliveryOutcome::PermissionDenied(e.to_string()),
        };

        let result = self
            .client
            .post(url)
            .header("Authorization", self.authorization())
            .json(&json!({ "content": fit_message(text) }))
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => return DeliveryOutcome::TransientFailure(format!("request failed: {}", e)),
        };

        let status = response.status();
        if status.is_success() {
            debug!("Posted message to channel {}", destination);
            return DeliveryOutcome::Delivered;
        }

        let body = response.text().await.unwrap_or_default();
        classify_failure(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_errors_are_permanent() {
        let outcome = classify_failure(StatusCode::FORBIDDEN, r#"{"message":"Missing Permissions","code":50013}"#);
        assert_eq!(
            outcome,
            DeliveryOutcome::PermissionDenied("HTTP 403: Missing Permissions (code 50013)".to_string())
        );
        assert!(matches!(
            classify_failure(StatusCode::NOT_FOUND, r#"{"message":"Unknown Channel","code":10003}"#),
            DeliveryOutcome::PermissionDenied(_)
        ));
    }

    #[test]
    fn server_and_rate_errors_are_transient() {
        for status in [
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::UNAUTHORIZED,
        ] {
            assert!(
                matches!(classify_failure(status, ""), DeliveryOutcome::TransientFailure(_)),
                "{} should be transient",
                status
            );
        }
    }

    #[test]
    fn long_messages_are_cut_to_the_limit() {
        let text = "a".repeat(MESSAGE_LIMIT + 50);
        let fitted = fit_message(&text);
        assert_eq!(fitted.chars().count(), MESSAGE_LIMIT);
        assert!(fitted.ends_with('…'));
        assert_eq!(fit_message("short"), "short");
    }

    #[tokio::test]
    async fn non_numeric_destination_is_rejected_without_a_request() {
        let sink = DiscordSink::new("http://127.0.0.1:9", "token", Duration::from_secs(1)).unwrap();
        let outcome = sink.deliver(&Destination::from("general"), "hi").await;
        assert!(matches!(outcome, DeliveryOutcome::PermissionDenied(_)));
    }
}
