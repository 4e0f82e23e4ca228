//! IGDB API client
//!
//! Authenticates with Twitch client credentials and posts Apicalypse
//! queries to the IGDB v4 endpoints.

use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

const TWITCH_AUTH_URL: &str = "https://id.twitch.tv/oauth2/token";
const IGDB_BASE_URL: &str = "https://api.igdb.com/v4";

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Refresh the token this long before Twitch says it expires
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Artwork types IGDB uses for logos
pub const LOGO_WHITE: u32 = 5;
pub const LOGO_BLACK: u32 = 6;
pub const LOGO_COLOR: u32 = 7;

const GAME_FIELDS: &str =
    "fields id, name, summary, first_release_date, genres, cover, screenshots, artworks;";

#[derive(Debug, Clone, Deserialize)]
pub struct IgdbGame {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub first_release_date: Option<i64>,
    #[serde(default)]
    pub genres: Vec<u64>,
    #[serde(default)]
    pub cover: Option<u64>,
    #[serde(default)]
    pub screenshots: Vec<u64>,
    #[serde(default)]
    pub artworks: Vec<u64>,
}

/// A cover, screenshot or artwork record.
#[derive(Debug, Clone, Deserialize)]
pub struct IgdbImage {
    pub id: u64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub artwork_type: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IgdbGenre {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

pub struct IgdbClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<AccessToken>>,
}

impl IgdbClient {
    pub fn new(client_id: String, client_secret: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            http,
            client_id,
            client_secret,
            token: Mutex::new(None),
        })
    }

    /// A valid bearer token, fetching a new one when the cached one is stale.
    async fn access_token(&self) -> Result<String> {
        let mut token = self.token.lock().await;
        if let Some(t) = token.as_ref()
            && Instant::now() < t.expires_at
        {
            return Ok(t.value.clone());
        }

        tracing::debug!("Requesting Twitch access token");
        let response = self
            .http
            .post(TWITCH_AUTH_URL)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .context("Failed to authenticate with Twitch")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Authentication failed: {} (status {})", body, status);
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .context("Failed to decode auth response")?;
        let lifetime = Duration::from_secs(parsed.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        let value = parsed.access_token.clone();
        *token = Some(AccessToken {
            value: parsed.access_token,
            expires_at: Instant::now() + lifetime,
        });
        Ok(value)
    }

    async fn query<T: DeserializeOwned>(&self, endpoint: &str, body: String) -> Result<Vec<T>> {
        let token = self.access_token().await?;
        let url = format!("{}/{}", IGDB_BASE_URL, endpoint);

        let response = self
            .http
            .post(&url)
            .header("Client-ID", &self.client_id)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed to query {}", endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Query to {} failed: {} (status {})", endpoint, body, status);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to decode {} response", endpoint))
    }

    /// Best match for `name` on an IGDB platform.
    pub async fn search_game(&self, name: &str, platform_id: u32) -> Result<IgdbGame> {
        let games: Vec<IgdbGame> = self
            .query("games", search_query(name, platform_id))
            .await?;
        games
            .into_iter()
            .next()
            .with_context(|| format!("No game found for '{}' on platform {}", name, platform_id))
    }

    pub async fn genres(&self, ids: &[u64]) -> Result<Vec<IgdbGenre>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.query("genres", format!("fields id, name; where id = ({});", join_ids(ids)))
            .await
    }

    pub async fn cover(&self, cover_id: u64) -> Result<Option<IgdbImage>> {
        let covers: Vec<IgdbImage> = self
            .query("covers", format!("fields id, url; where id = {};", cover_id))
            .await?;
        Ok(covers.into_iter().next())
    }

    pub async fn screenshots(&self, game_id: u64) -> Result<Vec<IgdbImage>> {
        self.query(
            "screenshots",
            format!("fields id, url; where game = {};", game_id),
        )
        .await
    }

    pub async fn artworks(&self, game_id: u64) -> Result<Vec<IgdbImage>> {
        self.query(
            "artworks",
            format!("fields id, url, artwork_type; where game = {};", game_id),
        )
        .await
    }

    pub async fn logos(&self, game_id: u64) -> Result<Vec<IgdbImage>> {
        self.query(
            "artworks",
            format!(
                "fields id, url, artwork_type; where game = {} & artwork_type = ({},{},{});",
                game_id, LOGO_WHITE, LOGO_BLACK, LOGO_COLOR
            ),
        )
        .await
    }
}

fn search_query(name: &str, platform_id: u32) -> String {
    format!(
        "{} where name ~ \"{}\" & platforms = ({}); limit 1;",
        GAME_FIELDS,
        escape_query(name),
        platform_id
    )
}

/// Drop characters that would end the quoted search term.
pub fn escape_query(s: &str) -> String {
    s.chars().filter(|c| !matches!(c, '"' | '\\')).collect()
}

fn join_ids(ids: &[u64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
