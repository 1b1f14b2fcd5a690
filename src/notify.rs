use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::types::{Listing, Reputation};

/// Number of stars in a full rating.
pub const MAX_STARS: u32 = 5;

/// Webhook request body: a single-embed chat message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookMessage {
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    pub url: String,
    pub description: String,
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedImage>,
    pub footer: EmbedFooter,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedImage {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

/// Seller score on a 0–5 scale: share of positive reviews among positive + negative.
///
/// Neutral reviews are ignored. No reviews at all scores 0.
pub fn overall_score(positive: u64, negative: u64) -> f64 {
    if positive == 0 && negative == 0 {
        return 0.0;
    }
    let total = positive as f64 + negative as f64;
    positive as f64 / total * MAX_STARS as f64
}

/// Render a score as filled/empty star glyphs, e.g. `★★★★☆`.
pub fn star_display(score: f64) -> String {
    let filled = score.round().clamp(0.0, MAX_STARS as f64) as usize;
    let empty = MAX_STARS as usize - filled;
    format!("{}{}", "★".repeat(filled), "☆".repeat(empty))
}

/// Build the notification for one listing.
pub fn format_message(
    listing: &Listing,
    reputation: &Reputation,
    footer: &str,
    timestamp: DateTime<Utc>,
) -> WebhookMessage {
    let score = overall_score(reputation.positive, reputation.negative);
    let stars = star_display(score);

    let price = match listing.service_fee {
        Some(fee) => format!("💶 Price: `{}` (+ fee: `{fee}`)", listing.price_label()),
        None => format!("💶 Price: `{}`", listing.price_label()),
    };
    let description = [
        price,
        format!("📏 Size: `{}`", listing.size.as_deref().unwrap_or("-")),
        format!(
            "🧼 Condition: `{}`",
            listing.condition.as_deref().unwrap_or("-")
        ),
        format!("🙋 User: `{}`", listing.seller),
        format!("⭐ Feedback: {stars} ({score:.2}/5)"),
    ]
    .join("\n");

    let embed = Embed {
        title: format!("📦 {}", listing.headline()),
        url: listing.url.clone(),
        description,
        fields: vec![
            EmbedField {
                name: "👍 Positive".to_string(),
                value: reputation.positive.to_string(),
                inline: true,
            },
            EmbedField {
                name: "👎 Negative".to_string(),
                value: reputation.negative.to_string(),
                inline: true,
            },
        ],
        image: listing
            .image_url
            .as_ref()
            .map(|url| EmbedImage { url: url.clone() }),
        footer: EmbedFooter {
            text: footer.to_string(),
        },
        timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
    };

    WebhookMessage {
        embeds: vec![embed],
    }
}
