//! Chat-platform seam and its Discord REST implementation.
//!
//! The pipeline talks to the platform only through the `Surface` trait so
//! rendering and publishing can be tested against a recording fake.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::config;
use crate::types::DisplayPayload;

/// One custom emoji usable as an inline item badge.
#[derive(Debug, Clone)]
pub struct Badge {
    pub id: u64,
    pub name: String,
}

impl Badge {
    /// Inline chat markup for this badge.
    pub fn mention(&self) -> String {
        format!("<:{}:{}>", self.name, self.id)
    }
}

/// Outbound chat-platform operations the pipeline needs.
#[async_trait]
pub trait Surface: Send + Sync {
    /// All badges currently hosted on a surface (guild).
    async fn list_badges(&self, surface_id: u64) -> Result<Vec<Badge>>;

    /// Upload a new badge image; returns the created badge.
    async fn create_badge(&self, surface_id: u64, name: &str, image: &[u8]) -> Result<Badge>;

    async fn delete_badge(&self, surface_id: u64, badge_id: u64) -> Result<()>;

    /// Post a rendered payload; returns the new message id.
    async fn post_message(&self, channel_id: u64, payload: &DisplayPayload) -> Result<u64>;

    /// Replace the content of an existing message in place.
    async fn edit_message(
        &self,
        channel_id: u64,
        message_id: u64,
        payload: &DisplayPayload,
    ) -> Result<()>;

    /// Out-of-band failure notification to the operator (direct message).
    async fn notify_operator(&self, text: &str) -> Result<()>;
}

// === Discord implementation ===

#[derive(Debug, Deserialize)]
struct EmojiResponse {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ChannelResponse {
    id: String,
}

pub struct DiscordSurface {
    client: reqwest::Client,
    token: String,
}

impl DiscordSurface {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config::HTTP_TIMEOUT_SECS))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            token: config::discord_token()?,
        })
    }

    fn auth(&self) -> String {
        format!("Bot {}", self.token)
    }

    fn embed_json(payload: &DisplayPayload) -> serde_json::Value {
        json!({
            "embeds": [{
                "title": payload.title,
                "description": payload.description,
                "thumbnail": payload.thumbnail_url.as_ref().map(|url| json!({ "url": url })),
                "image": payload.image_url.as_ref().map(|url| json!({ "url": url })),
                "fields": payload.fields.iter().map(|f| json!({
                    "name": f.name,
                    "value": f.value,
                    "inline": f.inline,
                })).collect::<Vec<_>>(),
                "footer": { "text": payload.footer },
            }]
        })
    }
}

#[async_trait]
impl Surface for DiscordSurface {
    async fn list_badges(&self, surface_id: u64) -> Result<Vec<Badge>> {
        let url = format!("{}/guilds/{}/emojis", config::DISCORD_API_BASE, surface_id);
        let resp = self
            .client
            .get(&url)
            .header("Authorization", self.auth())
            .send()
            .await
            .context("emoji list request failed")?;
        if !resp.status().is_success() {
            bail!("emoji list returned {}", resp.status());
        }
        let emojis: Vec<EmojiResponse> = resp.json().await?;
        emojis
            .into_iter()
            .map(|e| {
                Ok(Badge {
                    id: e.id.parse().context("non-numeric emoji id")?,
                    name: e.name,
                })
            })
            .collect()
    }

    async fn create_badge(&self, surface_id: u64, name: &str, image: &[u8]) -> Result<Badge> {
        let url = format!("{}/guilds/{}/emojis", config::DISCORD_API_BASE, surface_id);
        let data_uri = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(image)
        );
        let resp = self
            .client
            .post(&url)
            .header("Authorization", self.auth())
            .json(&json!({ "name": name, "image": data_uri }))
            .send()
            .await
            .context("emoji create request failed")?;
        if !resp.status().is_success() {
            bail!("emoji create for {} returned {}", name, resp.status());
        }
        let emoji: EmojiResponse = resp.json().await?;
        info!("[SURFACE] Created badge {} on {}", emoji.name, surface_id);
        Ok(Badge {
            id: emoji.id.parse().context("non-numeric emoji id")?,
            name: emoji.name,
        })
    }

    async fn delete_badge(&self, surface_id: u64, badge_id: u64) -> Result<()> {
        let url = format!(
            "{}/guilds/{}/emojis/{}",
            config::DISCORD_API_BASE,
            surface_id,
            badge_id
        );
        let resp = self
            .client
            .delete(&url)
            .header("Authorization", self.auth())
            .send()
            .await
            .context("emoji delete request failed")?;
        if !resp.status().is_success() {
            bail!("emoji delete returned {}", resp.status());
        }
        Ok(())
    }

    async fn post_message(&self, channel_id: u64, payload: &DisplayPayload) -> Result<u64> {
        let url = format!("{}/channels/{}/messages", config::DISCORD_API_BASE, channel_id);
        let resp = self
            .client
            .post(&url)
            .header("Authorization", self.auth())
            .json(&Self::embed_json(payload))
            .send()
            .await
            .context("message post failed")?;
        if !resp.status().is_success() {
            bail!("message post returned {}", resp.status());
        }
        let message: MessageResponse = resp.json().await?;
        message.id.parse().context("non-numeric message id")
    }

    async fn edit_message(
        &self,
        channel_id: u64,
        message_id: u64,
        payload: &DisplayPayload,
    ) -> Result<()> {
        let url = format!(
            "{}/channels/{}/messages/{}",
            config::DISCORD_API_BASE,
            channel_id,
            message_id
        );
        let resp = self
            .client
            .patch(&url)
            .header("Authorization", self.auth())
            .json(&Self::embed_json(payload))
            .send()
            .await
            .context("message edit failed")?;
        if !resp.status().is_success() {
            bail!("message edit returned {}", resp.status());
        }
        Ok(())
    }

    async fn notify_operator(&self, text: &str) -> Result<()> {
        let url = format!("{}/users/@me/channels", config::DISCORD_API_BASE);
        let resp = self
            .client
            .post(&url)
            .header("Authorization", self.auth())
            .json(&json!({ "recipient_id": config::admin_discord_id().to_string() }))
            .send()
            .await
            .context("DM channel open failed")?;
        if !resp.status().is_success() {
            bail!("DM channel open returned {}", resp.status());
        }
        let channel: ChannelResponse = resp.json().await?;
        let channel_id: u64 = channel.id.parse().context("non-numeric channel id")?;

        let url = format!("{}/channels/{}/messages", config::DISCORD_API_BASE, channel_id);
        let resp = self
            .client
            .post(&url)
            .header("Authorization", self.auth())
            .json(&json!({ "content": text }))
            .send()
            .await
            .context("DM send failed")?;
        if !resp.status().is_success() {
            bail!("DM send returned {}", resp.status());
        }
        Ok(())
    }
}

/// Delete every badge hosted on a surface. Operator action only; renders
/// never purge.
pub async fn purge_badges(surface: &dyn Surface, surface_id: u64) -> Result<usize> {
    let badges = surface.list_badges(surface_id).await?;
    let mut deleted = 0;
    for badge in &badges {
        match surface.delete_badge(surface_id, badge.id).await {
            Ok(()) => deleted += 1,
            Err(err) => warn!("[SURFACE] Failed to delete badge {}: {:#}", badge.name, err),
        }
    }
    info!("[SURFACE] Purged {} badges from {}", deleted, surface_id);
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_badge_mention_markup() {
        let badge = Badge {
            id: 112233445566778899,
            name: "gun_name".to_string(),
        };
        assert_eq!(badge.mention(), "<:gun_name:112233445566778899>");
    }

    #[test]
    fn test_embed_json_shape() {
        let payload = DisplayPayload {
            title: "Banshee-44".to_string(),
            description: "desc".to_string(),
            thumbnail_url: Some("https://example.com/t.png".to_string()),
            image_url: None,
            fields: vec![crate::types::DisplayField {
                name: "Weapons".to_string(),
                value: "list".to_string(),
                inline: false,
            }],
            footer: "Last updated: today".to_string(),
        };

        let body = DiscordSurface::embed_json(&payload);
        let embed = &body["embeds"][0];
        assert_eq!(embed["title"], "Banshee-44");
        assert_eq!(embed["thumbnail"]["url"], "https://example.com/t.png");
        assert!(embed["image"].is_null());
        assert_eq!(embed["fields"][0]["name"], "Weapons");
        assert_eq!(embed["footer"]["text"], "Last updated: today");
    }
}
