//! TheTVDB v4 API client
//!
//! Every v4 endpoint wraps its payload in `{"status": ..., "data": ...}` and requires
//! a bearer token obtained from POST /login.
//! Base URL: https://api4.thetvdb.com/v4

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::services::catalog::{Catalog, CatalogSession, MediaKind, MovieDetails, SearchHit};

/// Unauthenticated TheTVDB client; `login` opens an authenticated session
pub struct TvdbClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    pin: Option<String>,
}

/// Authenticated TheTVDB session carrying the bearer token for its lifetime
pub struct TvdbSession {
    client: Client,
    base_url: String,
    token: String,
}

/// Envelope shared by every v4 response
#[derive(Debug, Deserialize)]
struct TvdbResponse<T> {
    #[allow(dead_code)]
    status: Option<String>,
    data: T,
}

#[derive(Debug, Deserialize)]
struct TvdbToken {
    token: String,
}

#[derive(Debug, Deserialize)]
struct TvdbEpisodePage {
    episodes: Option<Vec<TvdbEpisode>>,
}

/// Episode entry from the series episodes endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TvdbEpisode {
    pub id: u32,
    pub name: Option<String>,
    #[serde(rename = "seasonNumber")]
    pub season_number: u32,
    pub number: u32,
    pub aired: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TvdbMovie {
    name: String,
    year: Option<String>,
}

impl TvdbClient {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        pin: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build TheTVDB HTTP client")?;

        Ok(Self {
            client,
            base_url,
            api_key,
            pin,
        })
    }

    /// Exchange the API key (and optional subscriber PIN) for a bearer token
    pub async fn login(&self) -> Result<TvdbSession> {
        let api_key = self
            .api_key
            .as_deref()
            .context("TVDB_API_KEY is not configured")?;

        info!("Authenticating with TheTVDB");

        let url = format!("{}/login", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "apikey": api_key, "pin": self.pin }))
            .send()
            .await
            .context("Failed to reach TheTVDB login")?;

        if !response.status().is_success() {
            anyhow::bail!("TheTVDB login failed with status: {}", response.status());
        }

        let payload: TvdbResponse<TvdbToken> = response
            .json()
            .await
            .context("Failed to parse TheTVDB login response")?;

        Ok(TvdbSession {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: payload.data.token,
        })
    }
}

#[async_trait]
impl Catalog for TvdbClient {
    async fn connect(&self) -> Result<Box<dyn CatalogSession>> {
        Ok(Box::new(self.login().await?))
    }
}

#[async_trait]
impl CatalogSession for TvdbSession {
    async fn search(
        &self,
        query: &str,
        kind: Option<MediaKind>,
        year: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        info!(query = %query, kind = ?kind, "Searching TheTVDB");

        let url = format!("{}/search", self.base_url);
        let mut request = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("query", query)]);
        if let Some(kind) = kind {
            request = request.query(&[("type", kind.as_query_param())]);
        }
        if let Some(year) = year {
            request = request.query(&[("year", year)]);
        }

        let response = request.send().await.context("Failed to search TheTVDB")?;

        if !response.status().is_success() {
            anyhow::bail!("TheTVDB search failed with status: {}", response.status());
        }

        let payload: TvdbResponse<Option<Vec<SearchHit>>> = response
            .json()
            .await
            .context("Failed to parse TheTVDB search results")?;

        let hits = payload.data.unwrap_or_default();
        debug!(count = hits.len(), "TheTVDB search returned results");
        Ok(hits)
    }

    async fn episode_by_number(
        &self,
        series_id: u32,
        season: u32,
        episode: u32,
    ) -> Result<Option<String>> {
        info!(series_id, season, episode, "Fetching episode from TheTVDB");

        let url = format!("{}/series/{}/episodes/default", self.base_url, series_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("page", 0u32), ("season", season), ("episodeNumber", episode)])
            .send()
            .await
            .context("Failed to fetch episode from TheTVDB")?;

        // The episodes endpoint 404s when the series has no such season
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            anyhow::bail!(
                "TheTVDB episode lookup failed with status: {}",
                response.status()
            );
        }

        let payload: TvdbResponse<Option<TvdbEpisodePage>> = response
            .json()
            .await
            .context("Failed to parse TheTVDB episode response")?;

        let name = payload
            .data
            .and_then(|page| page.episodes)
            .unwrap_or_default()
            .into_iter()
            .find(|ep| ep.season_number == season && ep.number == episode)
            .and_then(|ep| ep.name);

        if name.is_none() {
            debug!(series_id, season, episode, "Episode not present in TheTVDB response");
        }
        Ok(name)
    }

    async fn movie_by_id(&self, movie_id: u32) -> Result<MovieDetails> {
        info!(movie_id, "Fetching movie from TheTVDB");

        let url = format!("{}/movies/{}", self.base_url, movie_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .context("Failed to fetch movie from TheTVDB")?;

        if !response.status().is_success() {
            anyhow::bail!(
                "TheTVDB movie lookup failed with status: {}",
                response.status()
            );
        }

        let payload: TvdbResponse<TvdbMovie> = response
            .json()
            .await
            .context("Failed to parse TheTVDB movie response")?;

        Ok(MovieDetails {
            name: payload.data.name,
            year: payload.data.year,
        })
    }
}
