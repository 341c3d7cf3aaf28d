//! Discord Webhook に送る埋め込みメッセージの組み立てと送信。

use std::future::Future;
use std::time::Duration;

use anyhow::{Context as _, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone};
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::dreamhack::Challenge;
use crate::version::user_agent;

pub const NEW_CHALLENGE_COLOR: u32 = 0x12FF34;
pub const DAILY_SUMMARY_COLOR: u32 = 0x34FF12;

/// Discord の埋め込みオブジェクト。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedThumbnail>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl EmbedField {
    fn inline(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
            inline: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedThumbnail {
    pub url: String,
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    embeds: [&'a Embed; 1],
}

/// 1 tick の中で生成され、そのまま送信される通知イベント。
#[derive(Debug, Clone)]
pub enum Notification<'a> {
    NewChallenge {
        challenge: &'a Challenge,
        link: String,
        published_at_local: Option<String>,
    },
    DailySummary {
        date_local: NaiveDate,
        solved_count: u64,
        earned_points: u64,
    },
}

impl Notification<'_> {
    pub fn into_embed<Tz: TimeZone>(self, sent_at: &DateTime<Tz>) -> Embed
    where
        Tz::Offset: std::fmt::Display,
    {
        match self {
            Notification::NewChallenge {
                challenge,
                link,
                published_at_local,
            } => new_challenge_embed(challenge, &link, published_at_local.as_deref(), sent_at),
            Notification::DailySummary {
                date_local,
                solved_count,
                earned_points,
            } => daily_summary_embed(date_local, solved_count, earned_points, sent_at),
        }
    }
}

/// 新着チャレンジの埋め込みを組み立てる。
///
/// フィールドは ID, (Published At), Author, Tags の順に並ぶ。
pub fn new_challenge_embed<Tz: TimeZone>(
    challenge: &Challenge,
    link: &str,
    published_at_local: Option<&str>,
    sent_at: &DateTime<Tz>,
) -> Embed
where
    Tz::Offset: std::fmt::Display,
{
    let mut fields = vec![EmbedField::inline("ID", challenge.id.to_string())];
    if let Some(published_at) = published_at_local {
        fields.push(EmbedField::inline("Published At", published_at));
    }
    fields.push(EmbedField::inline("Author", challenge.author.nickname.as_str()));
    fields.push(EmbedField::inline("Tags", format_tags(&challenge.tags)));

    let thumbnail = challenge
        .author
        .profile_image
        .as_deref()
        .filter(|url| !url.is_empty())
        .map(|url| EmbedThumbnail {
            url: url.to_string(),
        });

    Embed {
        title: format!("🆕 New Challenge: {}", challenge.title),
        url: Some(link.to_string()),
        color: NEW_CHALLENGE_COLOR,
        timestamp: Some(sent_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
        fields,
        thumbnail,
        ..Default::default()
    }
}

/// 日次集計の埋め込みを組み立てる。
pub fn daily_summary_embed<Tz: TimeZone>(
    date_local: NaiveDate,
    solved_count: u64,
    earned_points: u64,
    sent_at: &DateTime<Tz>,
) -> Embed
where
    Tz::Offset: std::fmt::Display,
{
    Embed {
        title: "Daily Stats Update".to_string(),
        description: Some(format!("**{}**", date_local.format("%Y-%m-%d"))),
        color: DAILY_SUMMARY_COLOR,
        timestamp: Some(sent_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
        fields: vec![
            EmbedField::inline("Solved Challenges", solved_count.to_string()),
            EmbedField::inline("Earned Points", earned_points.to_string()),
        ],
        ..Default::default()
    }
}

fn format_tags(tags: &[String]) -> String {
    if tags.is_empty() {
        "No Tags".to_string()
    } else {
        tags.join(", ")
    }
}

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("webhook returned HTTP {0}")]
    Status(StatusCode),
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// 埋め込みメッセージの送信先。
pub trait Notifier {
    fn send(&self, embed: &Embed) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

/// Discord Webhook への送信クライアント。再送は行わない。
pub struct DiscordWebhook {
    http_client: reqwest::Client,
    url: String,
}

impl DiscordWebhook {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent())
            .build()
            .context("Failed to create HTTP client for Discord webhook")?;

        Ok(Self::with_client(http_client, url))
    }

    /// 構築済みの HTTP クライアントを使う。
    pub fn with_client(http_client: reqwest::Client, url: &str) -> Self {
        Self {
            http_client,
            url: url.to_string(),
        }
    }
}

impl Notifier for DiscordWebhook {
    async fn send(&self, embed: &Embed) -> Result<(), DeliveryError> {
        let payload = WebhookPayload { embeds: [embed] };
        let response = self.http_client.post(&self.url).json(&payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Status(status));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenges::tests::challenge;
    use crate::test_server::{local_client, serve_once};
    use chrono::Utc;
    use serde_json::json;

    fn sent_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn field_names(embed: &Embed) -> Vec<&str> {
        embed.fields.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn new_challenge_without_publish_time() {
        let mut ch = challenge(1234);
        ch.title = "baby-rev".to_string();
        ch.author.nickname = "alice".to_string();

        let embed = new_challenge_embed(
            &ch,
            "https://dreamhack.io/wargame/challenges/1234/",
            None,
            &sent_at(),
        );

        assert_eq!(embed.title, "🆕 New Challenge: baby-rev");
        assert_eq!(
            embed.url.as_deref(),
            Some("https://dreamhack.io/wargame/challenges/1234/")
        );
        assert_eq!(embed.color, NEW_CHALLENGE_COLOR);
        assert_eq!(field_names(&embed), vec!["ID", "Author", "Tags"]);
        assert_eq!(embed.fields[0].value, "1234");
        assert_eq!(embed.fields[1].value, "alice");
        assert_eq!(embed.fields[2].value, "No Tags");
        assert!(embed.fields.iter().all(|f| f.inline));
        assert_eq!(embed.thumbnail, None);
    }

    #[test]
    fn published_at_is_second_field() {
        let mut ch = challenge(1);
        ch.tags = vec!["web".to_string(), "sqli".to_string()];

        let embed = new_challenge_embed(&ch, "link", Some("2024-05-01 09:00 JST"), &sent_at());

        assert_eq!(
            field_names(&embed),
            vec!["ID", "Published At", "Author", "Tags"]
        );
        assert_eq!(embed.fields[1].value, "2024-05-01 09:00 JST");
        assert_eq!(embed.fields[3].value, "web, sqli");
    }

    #[test]
    fn thumbnail_from_profile_image() {
        let mut ch = challenge(1);
        ch.author.profile_image = Some("https://img.example/a.png".to_string());
        let embed = new_challenge_embed(&ch, "link", None, &sent_at());
        assert_eq!(
            embed.thumbnail,
            Some(EmbedThumbnail {
                url: "https://img.example/a.png".to_string()
            })
        );

        ch.author.profile_image = Some(String::new());
        let embed = new_challenge_embed(&ch, "link", None, &sent_at());
        assert_eq!(embed.thumbnail, None);
    }

    #[test]
    fn daily_summary_fields() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let local = sent_at().with_timezone(&chrono_tz::Asia::Tokyo);

        let embed = daily_summary_embed(date, 3, 250, &local);

        assert_eq!(embed.title, "Daily Stats Update");
        assert_eq!(embed.description.as_deref(), Some("**2024-05-02**"));
        assert_eq!(embed.color, DAILY_SUMMARY_COLOR);
        assert_eq!(field_names(&embed), vec!["Solved Challenges", "Earned Points"]);
        assert_eq!(embed.fields[0].value, "3");
        assert_eq!(embed.fields[1].value, "250");
        assert_eq!(embed.timestamp.as_deref(), Some("2024-05-01T21:00:00+09:00"));
    }

    #[test]
    fn notification_dispatches_to_builder() {
        let embed = Notification::DailySummary {
            date_local: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            solved_count: 0,
            earned_points: 0,
        }
        .into_embed(&sent_at());

        assert_eq!(embed.fields[0].value, "0");
        assert_eq!(embed.timestamp.as_deref(), Some("2024-05-01T12:00:00Z"));
    }

    #[test]
    fn payload_json_shape() {
        let ch = challenge(7);
        let embed = new_challenge_embed(&ch, "https://example/7/", None, &sent_at());
        let payload = WebhookPayload { embeds: [&embed] };

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["embeds"].as_array().unwrap().len(), 1);
        assert_eq!(value["embeds"][0]["color"], json!(NEW_CHALLENGE_COLOR));
        assert_eq!(value["embeds"][0]["url"], json!("https://example/7/"));
        assert_eq!(
            value["embeds"][0]["fields"][0],
            json!({"name": "ID", "value": "7", "inline": true})
        );
        assert!(value["embeds"][0].get("thumbnail").is_none());
        assert!(value["embeds"][0].get("description").is_none());
    }

    #[tokio::test]
    async fn webhook_posts_embed_payload() {
        let (base, server) = serve_once("204 No Content", "").await;
        let webhook = DiscordWebhook::with_client(local_client(), &format!("{base}/api/webhooks/1/abc"));
        let embed = new_challenge_embed(&challenge(7), "https://example/7/", None, &sent_at());

        webhook.send(&embed).await.unwrap();

        let request = server.await.unwrap();
        assert_eq!(request.request_line, "POST /api/webhooks/1/abc HTTP/1.1");
        let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
        assert_eq!(body["embeds"][0]["title"], json!("🆕 New Challenge: challenge-7"));
    }

    #[tokio::test]
    async fn webhook_error_status_is_delivery_error() {
        let (base, server) = serve_once("500 Internal Server Error", "").await;
        let webhook = DiscordWebhook::with_client(local_client(), &base);
        let embed = daily_summary_embed(
            NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            1,
            50,
            &sent_at(),
        );

        let result = webhook.send(&embed).await;

        assert!(matches!(
            result,
            Err(DeliveryError::Status(status)) if status == StatusCode::INTERNAL_SERVER_ERROR
        ));
        server.await.unwrap();
    }
}
