//! Application configuration management

use std::collections::HashMap;
use std::env;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub host: String,

    /// Server port
    pub port: u16,

    /// TheTVDB v4 API base URL
    pub tvdb_base_url: String,

    /// TheTVDB API key
    pub tvdb_api_key: Option<String>,

    /// TheTVDB subscriber PIN (user-supported keys only)
    pub tvdb_pin: Option<String>,

    /// Timeout applied to every outbound HTTP request, in seconds
    pub http_timeout_secs: u64,

    /// Preferred subtitle language (ISO 639-1)
    pub subtitle_language: String,

    /// OpenSubtitles API base URL
    pub opensubtitles_base_url: String,

    /// OpenSubtitles API key
    pub opensubtitles_api_key: Option<String>,

    /// OpenSubtitles account username
    pub opensubtitles_username: Option<String>,

    /// OpenSubtitles account password
    pub opensubtitles_password: Option<String>,

    /// Path to the mkvmerge binary used for track identification
    pub mkvmerge_path: String,

    /// Path to the mkvextract binary used for subtitle extraction
    pub mkvextract_path: String,

    /// Title-guess overrides applied before catalog search
    pub title_overrides: TitleOverrides,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from a string-keyed lookup; tests inject closures
    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let title_overrides = match get("TITLE_OVERRIDES_PATH") {
            Some(path) => TitleOverrides::load(&path)?,
            None => TitleOverrides::default(),
        };

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),

            port: get("PORT")
                .unwrap_or_else(|| "3090".to_string())
                .parse()
                .context("Invalid PORT")?,

            tvdb_base_url: get("TVDB_BASE_URL")
                .unwrap_or_else(|| "https://api4.thetvdb.com/v4".to_string()),

            tvdb_api_key: get("TVDB_API_KEY"),

            tvdb_pin: get("TVDB_PIN"),

            http_timeout_secs: get("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|| "10".to_string())
                .parse()
                .context("Invalid HTTP_TIMEOUT_SECS")?,

            subtitle_language: get("SUBTITLE_LANGUAGE").unwrap_or_else(|| "en".to_string()),

            opensubtitles_base_url: get("OPENSUBTITLES_BASE_URL")
                .unwrap_or_else(|| "https://api.opensubtitles.com/api/v1".to_string()),

            opensubtitles_api_key: get("OPENSUBTITLES_API_KEY"),

            opensubtitles_username: get("OPENSUBTITLES_USERNAME"),

            opensubtitles_password: get("OPENSUBTITLES_PASSWORD"),

            mkvmerge_path: get("MKVMERGE_PATH").unwrap_or_else(|| "mkvmerge".to_string()),

            mkvextract_path: get("MKVEXTRACT_PATH").unwrap_or_else(|| "mkvextract".to_string()),

            title_overrides,
        })
    }
}

/// Title-guess overrides keyed by lowercased guess text.
///
/// Some releases abbreviate or mangle a show's name badly enough that no catalog
/// search will find it. Operators can map those guesses to a canonical query via a
/// JSON object file instead of patching the parser.
#[derive(Debug, Clone, Default)]
pub struct TitleOverrides {
    entries: HashMap<String, String>,
}

impl TitleOverrides {
    /// Load overrides from a JSON object file (`{"bb": "Breaking Bad"}`)
    pub fn load(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read title overrides from '{path}'"))?;
        let entries: HashMap<String, String> = serde_json::from_str(&raw)
            .with_context(|| format!("Title overrides in '{path}' must be a JSON object"))?;

        Ok(Self::from_entries(entries))
    }

    pub fn from_entries(entries: HashMap<String, String>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(key, value)| (key.to_lowercase(), value))
                .collect(),
        }
    }

    /// Map a title guess to its override, or return it unchanged
    pub fn apply<'a>(&'a self, title: &'a str) -> &'a str {
        self.entries
            .get(&title.to_lowercase())
            .map(String::as_str)
            .unwrap_or(title)
    }
}
