//! Dreamhack の公開 API クライアントとレスポンスモデル。

use std::future::Future;
use std::time::Duration;

use anyhow::{Context as _, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use serde_with::{DefaultOnNull, serde_as};
use thiserror::Error;

use crate::version::user_agent;

/// 1 回の取得で読むチャレンジ数（1 ページ目のみ）。
pub const CHALLENGE_PAGE_SIZE: u32 = 20;
/// 1 回の取得で読む解答履歴の件数。
pub const SOLVE_HISTORY_LIMIT: u32 = 100;

pub type ChallengeId = u64;

/// チャレンジ一覧の 1 要素。
///
/// スナップショットとしてそのまま保存するため、未知のフィールドも `extra` に保持する。
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: ChallengeId,
    #[serde(default = "default_title", deserialize_with = "title_or_default")]
    pub title: String,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub author: Author,
    /// 公開日時（UTC, 小数秒付き）。パースは `datetime::parse_instant` で行う。
    #[serde(default)]
    pub public_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    #[serde(default = "default_nickname", deserialize_with = "nickname_or_default")]
    pub nickname: String,
    #[serde(default)]
    pub profile_image: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Author {
    fn default() -> Self {
        Self {
            nickname: default_nickname(),
            profile_image: None,
            extra: Map::new(),
        }
    }
}

fn default_title() -> String {
    "Unknown Challenge".to_string()
}

fn default_nickname() -> String {
    "Unknown Author".to_string()
}

/// `null` のタイトルはキー欠落と同じく既定値にする。
fn title_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_title))
}

/// 退会済みユーザーなどで `null` になるニックネームを既定値にする。
fn nickname_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_nickname))
}

/// 解答履歴の 1 要素。
#[serde_as]
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SolveEntry {
    #[serde(default)]
    pub solved_at: Option<String>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub earned_points: u64,
}

/// 一覧 API 共通のレスポンス形式。
#[derive(Debug, Deserialize)]
struct Listing<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{endpoint} returned HTTP {status}")]
    Status {
        endpoint: &'static str,
        status: StatusCode,
    },
    #[error("{endpoint} request failed: {source}")]
    Request {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

/// 監視対象となる外部 API。
pub trait WargameApi {
    /// 最新のチャレンジ一覧（1 ページ目）を取得する。
    fn fetch_challenges(&self) -> impl Future<Output = Result<Vec<Challenge>, ApiError>> + Send;

    /// 指定ユーザーの解答履歴を新しい順に取得する。
    fn fetch_solves(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Vec<SolveEntry>, ApiError>> + Send;
}

/// reqwest を使った Dreamhack API クライアント。
pub struct DreamhackClient {
    http_client: reqwest::Client,
    api_base: String,
}

impl DreamhackClient {
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent())
            .build()
            .context("Failed to create HTTP client for Dreamhack API")?;

        Ok(Self::with_client(http_client, api_base))
    }

    /// 構築済みの HTTP クライアントを使う。
    pub fn with_client(http_client: reqwest::Client, api_base: &str) -> Self {
        Self {
            http_client,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    async fn get_listing<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, ApiError> {
        let url = format!("{}/{}/", self.api_base, endpoint);
        let request_error = |source| ApiError::Request { endpoint, source };

        let response = self
            .http_client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status { endpoint, status });
        }

        let listing: Listing<T> = response.json().await.map_err(request_error)?;
        Ok(listing.results)
    }
}

impl WargameApi for DreamhackClient {
    async fn fetch_challenges(&self) -> Result<Vec<Challenge>, ApiError> {
        self.get_listing(
            "challenges",
            &[
                ("page", "1".to_string()),
                ("page_size", CHALLENGE_PAGE_SIZE.to_string()),
            ],
        )
        .await
    }

    async fn fetch_solves(&self, user_id: &str) -> Result<Vec<SolveEntry>, ApiError> {
        self.get_listing(
            "stats",
            &[
                ("limit", SOLVE_HISTORY_LIMIT.to_string()),
                ("offset", "0".to_string()),
                ("ordering", "-solved_at".to_string()),
                ("user_id", user_id.to_string()),
            ],
        )
        .await
    }
}
