//! Metadata resolution for classified filename guesses
//!
//! One resolver lives per pipeline run. The catalog session is opened lazily on the
//! first lookup and reused for the rest of the run; a failed authentication sticks,
//! so later files degrade to `Unresolved` instead of retrying.

use tokio::sync::OnceCell;
use tracing::warn;

use crate::config::TitleOverrides;
use crate::services::catalog::{Catalog, CatalogSession, MediaKind};
use crate::services::filename_parser::MediaGuess;

/// Catalog-backed metadata for one file, or `Unresolved` when lookups failed.
/// Which variant to expect is decided by the classification that drove the
/// lookup, never by sniffing response shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedMetadata {
    Movie {
        name: String,
        year: Option<String>,
    },
    Episode {
        series: String,
        season: u32,
        episode: u32,
        title: String,
    },
    Unresolved,
}

pub struct Resolver<'a> {
    catalog: &'a dyn Catalog,
    overrides: &'a TitleOverrides,
    session: OnceCell<Option<Box<dyn CatalogSession>>>,
}

impl<'a> Resolver<'a> {
    pub fn new(catalog: &'a dyn Catalog, overrides: &'a TitleOverrides) -> Self {
        Self {
            catalog,
            overrides,
            session: OnceCell::new(),
        }
    }

    /// Resolve a classified guess against the catalog. Failures are logged and
    /// folded into `Unresolved`; a single file never aborts the run.
    pub async fn resolve(&self, guess: &MediaGuess) -> ResolvedMetadata {
        match guess {
            MediaGuess::Movie { title, year } => self.resolve_movie(title, year).await,
            MediaGuess::Episode {
                series,
                season,
                episode,
            } => self.resolve_episode(series, *season, *episode).await,
            MediaGuess::Unknown { .. } => ResolvedMetadata::Unresolved,
        }
    }

    /// Authenticated session for this run, opened at most once. `None` after a
    /// failed acquisition.
    async fn session(&self) -> Option<&dyn CatalogSession> {
        self.session
            .get_or_init(|| async {
                match self.catalog.connect().await {
                    Ok(session) => Some(session),
                    Err(e) => {
                        warn!(error = %e, "Catalog authentication failed; resolution disabled for this run");
                        None
                    }
                }
            })
            .await
            .as_deref()
    }

    async fn resolve_movie(&self, title: &str, year: &str) -> ResolvedMetadata {
        let Some(session) = self.session().await else {
            return ResolvedMetadata::Unresolved;
        };

        let query = self.overrides.apply(title);
        let hits = match session.search(query, Some(MediaKind::Movie), Some(year)).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(title = query, error = %e, "Movie search failed");
                return ResolvedMetadata::Unresolved;
            }
        };

        let Some(movie_id) = hits.first().and_then(|hit| hit.numeric_id()) else {
            warn!(title = query, "No catalog match for movie");
            return ResolvedMetadata::Unresolved;
        };

        match session.movie_by_id(movie_id).await {
            Ok(details) => ResolvedMetadata::Movie {
                name: details.name,
                year: details.year.or_else(|| Some(year.to_string())),
            },
            Err(e) => {
                warn!(movie_id, error = %e, "Movie detail lookup failed");
                ResolvedMetadata::Unresolved
            }
        }
    }

    async fn resolve_episode(&self, series: &str, season: u32, episode: u32) -> ResolvedMetadata {
        let Some(session) = self.session().await else {
            return ResolvedMetadata::Unresolved;
        };

        let query = self.overrides.apply(series);
        let mut hits = match session.search(query, Some(MediaKind::Series), None).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(series = query, error = %e, "Series search failed");
                return ResolvedMetadata::Unresolved;
            }
        };

        // Trailing noise in the guess can blank the search; retry on the first word
        if hits.is_empty()
            && let Some(first_token) = query.split_whitespace().next()
            && first_token != query
        {
            hits = match session.search(first_token, Some(MediaKind::Series), None).await {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(series = first_token, error = %e, "Series search retry failed");
                    return ResolvedMetadata::Unresolved;
                }
            };
        }

        let Some(hit) = hits.first() else {
            warn!(series = query, "No catalog match for series");
            return ResolvedMetadata::Unresolved;
        };
        let Some(series_id) = hit.numeric_id() else {
            warn!(series = query, "Catalog hit carried no usable id");
            return ResolvedMetadata::Unresolved;
        };
        let series_name = hit.name.clone().unwrap_or_else(|| query.to_string());

        match session.episode_by_number(series_id, season, episode).await {
            Ok(Some(title)) => ResolvedMetadata::Episode {
                series: series_name,
                season,
                episode,
                title,
            },
            Ok(None) => {
                warn!(series = %series_name, season, episode, "Episode not found in catalog");
                ResolvedMetadata::Unresolved
            }
            Err(e) => {
                warn!(series = %series_name, season, episode, error = %e, "Episode lookup failed");
                ResolvedMetadata::Unresolved
            }
        }
    }
}
