//! External metadata catalog capability
//!
//! The resolver only sees these traits: a [`Catalog`] that can authenticate and hand
//! out a [`CatalogSession`], and the session's three read operations. Production wires
//! in TheTVDB client; tests wire in mocks.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Query-context discriminator for catalog searches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Movie,
    Series,
}

impl MediaKind {
    pub fn as_query_param(self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Series => "series",
        }
    }
}

/// One search result from the catalog.
///
/// The `id` field arrives provider-prefixed (`"series-379934"`, `"movie-136"`);
/// `numeric_id` strips that down to the number the detail endpoints expect.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: Option<String>,
    pub tvdb_id: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub year: Option<String>,
}

impl SearchHit {
    pub fn numeric_id(&self) -> Option<u32> {
        if let Some(raw) = &self.tvdb_id
            && let Ok(id) = raw.parse()
        {
            return Some(id);
        }

        self.id
            .as_deref()
            .and_then(|raw| raw.rsplit('-').next())
            .and_then(|tail| tail.parse().ok())
    }
}

/// Movie detail payload: the two fields a rename needs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovieDetails {
    pub name: String,
    pub year: Option<String>,
}

/// An unauthenticated catalog able to open an authenticated session
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn CatalogSession>>;
}

/// Read operations available once authenticated. All are idempotent lookups.
#[async_trait]
pub trait CatalogSession: Send + Sync {
    /// Title search, optionally narrowed by kind and release year
    async fn search(
        &self,
        query: &str,
        kind: Option<MediaKind>,
        year: Option<&str>,
    ) -> Result<Vec<SearchHit>>;

    /// Episode title for a season/episode number, `None` when the catalog has
    /// no such episode
    async fn episode_by_number(
        &self,
        series_id: u32,
        season: u32,
        episode: u32,
    ) -> Result<Option<String>>;

    async fn movie_by_id(&self, movie_id: u32) -> Result<MovieDetails>;
}
