//! Subtitle acquisition services
//!
//! Two independent capabilities used after a video has been renamed:
//! - OpenSubtitles REST client for finding and downloading sidecar subtitles
//! - mkvmerge/mkvextract wrappers for pulling embedded subtitle tracks out
//!   of Matroska files
//!
//! Both are best-effort; callers log failures and move on.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info};

const CLIENT_USER_AGENT: &str = "renamarr/0.1.0";

/// OpenSubtitles REST API client. Login happens lazily on the first
/// download and the token is cached for the lifetime of the client.
pub struct OpenSubtitlesClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    username: String,
    password: String,
    token: OnceCell<String>,
}

impl OpenSubtitlesClient {
    pub fn new(
        base_url: String,
        api_key: String,
        username: String,
        password: String,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build OpenSubtitles HTTP client")?;

        Ok(Self {
            client,
            base_url,
            api_key,
            username,
            password,
            token: OnceCell::new(),
        })
    }

    /// Search for the strongest candidate and download it to `dest`.
    /// Returns whether a subtitle file was written.
    pub async fn fetch(&self, query: &str, language: &str, dest: &Path) -> Result<bool> {
        let Some(file_id) = self.search(query, language).await? else {
            return Ok(false);
        };
        self.download(file_id, dest).await?;
        Ok(true)
    }

    async fn token(&self) -> Result<&str> {
        let token = self.token.get_or_try_init(|| self.login()).await?;
        Ok(token.as_str())
    }

    async fn login(&self) -> Result<String> {
        info!(username = %self.username, "Logging in to OpenSubtitles");

        let url = format!("{}/login", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .header(reqwest::header::USER_AGENT, CLIENT_USER_AGENT)
            .json(&json!({ "username": self.username, "password": self.password }))
            .send()
            .await
            .context("Failed to send OpenSubtitles login request")?;

        if !response.status().is_success() {
            anyhow::bail!(
                "OpenSubtitles login failed with status: {}",
                response.status()
            );
        }

        let login: LoginResponse = response
            .json()
            .await
            .context("Failed to parse OpenSubtitles login response")?;

        Ok(login.token)
    }

    async fn search(&self, query: &str, language: &str) -> Result<Option<u64>> {
        debug!(query = %query, language = %language, "Searching OpenSubtitles");

        let url = format!("{}/subtitles", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Api-Key", &self.api_key)
            .header(reqwest::header::USER_AGENT, CLIENT_USER_AGENT)
            .query(&[("languages", language), ("query", query)])
            .send()
            .await
            .context("Failed to send OpenSubtitles search request")?;

        if !response.status().is_success() {
            anyhow::bail!(
                "OpenSubtitles search failed with status: {}",
                response.status()
            );
        }

        let results: SearchResponse = response
            .json()
            .await
            .context("Failed to parse OpenSubtitles search response")?;

        Ok(best_file_id(results.data.unwrap_or_default()))
    }

    async fn download(&self, file_id: u64, dest: &Path) -> Result<()> {
        let token = self.token().await?;

        debug!(file_id = file_id, "Requesting OpenSubtitles download link");

        let url = format!("{}/download", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .header(reqwest::header::USER_AGENT, CLIENT_USER_AGENT)
            .bearer_auth(token)
            .json(&json!({ "file_id": file_id }))
            .send()
            .await
            .context("Failed to request OpenSubtitles download link")?;

        if !response.status().is_success() {
            anyhow::bail!(
                "OpenSubtitles download request failed with status: {}",
                response.status()
            );
        }

        let grant: DownloadResponse = response
            .json()
            .await
            .context("Failed to parse OpenSubtitles download response")?;

        let file = self
            .client
            .get(&grant.link)
            .send()
            .await
            .context("Failed to fetch subtitle file")?;

        if !file.status().is_success() {
            anyhow::bail!(
                "Subtitle file download failed with status: {}",
                file.status()
            );
        }

        let bytes = file
            .bytes()
            .await
            .context("Failed to read subtitle file body")?;

        tokio::fs::write(dest, &bytes)
            .await
            .with_context(|| format!("Failed to write subtitle to '{}'", dest.display()))?;

        Ok(())
    }
}

/// Pick the strongest candidate: trusted uploads first, more downloads
/// within the same trust level, first entry that actually carries a file.
fn best_file_id(mut entries: Vec<SubtitleEntry>) -> Option<u64> {
    entries.sort_by(|a, b| {
        b.from_trusted()
            .cmp(&a.from_trusted())
            .then(b.download_count().cmp(&a.download_count()))
    });
    entries.iter().find_map(SubtitleEntry::file_id)
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    data: Option<Vec<SubtitleEntry>>,
}

#[derive(Debug, Deserialize)]
struct SubtitleEntry {
    attributes: Option<SubtitleAttributes>,
}

#[derive(Debug, Deserialize)]
struct SubtitleAttributes {
    from_trusted: Option<bool>,
    download_count: Option<i64>,
    files: Option<Vec<SubtitleFile>>,
}

#[derive(Debug, Deserialize)]
struct SubtitleFile {
    file_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct DownloadResponse {
    link: String,
}

impl SubtitleEntry {
    fn from_trusted(&self) -> bool {
        self.attributes
            .as_ref()
            .and_then(|a| a.from_trusted)
            .unwrap_or(false)
    }

    fn download_count(&self) -> i64 {
        self.attributes
            .as_ref()
            .and_then(|a| a.download_count)
            .unwrap_or(0)
    }

    fn file_id(&self) -> Option<u64> {
        self.attributes
            .as_ref()
            .and_then(|a| a.files.as_ref())
            .and_then(|files| files.first())
            .and_then(|file| file.file_id)
    }
}

/// mkvmerge/mkvextract wrapper for embedded subtitle tracks
pub struct MkvToolset {
    mkvmerge_path: String,
    mkvextract_path: String,
}

impl MkvToolset {
    pub fn new(mkvmerge_path: String, mkvextract_path: String) -> Self {
        Self {
            mkvmerge_path,
            mkvextract_path,
        }
    }

    /// Check if mkvmerge is available
    pub async fn is_available(&self) -> bool {
        Command::new(&self.mkvmerge_path)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Extract the best matching embedded subtitle track to `dest`.
    /// Returns `Ok(false)` when the file has no track in the requested
    /// language.
    pub async fn extract_subtitle(
        &self,
        video: &Path,
        dest: &Path,
        language: &str,
    ) -> Result<bool> {
        let output = Command::new(&self.mkvmerge_path)
            .arg("-J")
            .arg(video)
            .output()
            .await
            .with_context(|| format!("Failed to run mkvmerge for '{}'", video.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "mkvmerge identify failed for '{}' ({}): {}",
                video.display(),
                output.status,
                stderr.trim()
            );
        }

        let identify: mkvmerge::Identify = serde_json::from_slice(&output.stdout)
            .context("Failed to parse mkvmerge JSON output")?;

        let tracks = identify.tracks.unwrap_or_default();
        let Some(track_id) = select_subtitle_track(&tracks, language) else {
            return Ok(false);
        };

        debug!(
            video = %video.display(),
            track = track_id,
            "Extracting embedded subtitle track"
        );

        let output = Command::new(&self.mkvextract_path)
            .arg(video)
            .arg("tracks")
            .arg(format!("{}:{}", track_id, dest.display()))
            .output()
            .await
            .with_context(|| format!("Failed to run mkvextract for '{}'", video.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "mkvextract failed for '{}' ({}): {}",
                video.display(),
                output.status,
                stderr.trim()
            );
        }

        Ok(true)
    }
}

/// Prefer a regular subtitle track in the requested language, falling back
/// to a forced one. Returns the mkvmerge track id.
fn select_subtitle_track(tracks: &[mkvmerge::Track], language: &str) -> Option<i64> {
    let matching: Vec<&mkvmerge::Track> = tracks
        .iter()
        .filter(|t| t.is_subtitles() && t.matches_language(language))
        .collect();

    matching
        .iter()
        .find(|t| !t.is_forced())
        .or_else(|| matching.first())
        .map(|t| t.id)
}

/// mkvmerge `-J` output structures
mod mkvmerge {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct Identify {
        pub tracks: Option<Vec<Track>>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Track {
        pub id: i64,
        #[serde(rename = "type")]
        pub track_type: Option<String>,
        pub properties: Option<Properties>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Properties {
        pub language: Option<String>,
        pub language_ietf: Option<String>,
        pub forced_track: Option<bool>,
    }

    impl Track {
        pub fn is_subtitles(&self) -> bool {
            self.track_type.as_deref() == Some("subtitles")
        }

        pub fn is_forced(&self) -> bool {
            self.properties
                .as_ref()
                .and_then(|p| p.forced_track)
                .unwrap_or(false)
        }

        /// Accepts two-letter config codes against the ISO 639-2 codes
        /// mkvmerge reports ("en" matches "eng").
        pub fn matches_language(&self, language: &str) -> bool {
            let Some(properties) = self.properties.as_ref() else {
                return false;
            };
            let wanted = language.to_ascii_lowercase();
            if let Some(ietf) = &properties.language_ietf
                && ietf.to_ascii_lowercase() == wanted
            {
                return true;
            }
            properties
                .language
                .as_ref()
                .map(|l| l.to_ascii_lowercase().starts_with(&wanted))
                .unwrap_or(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entries(value: serde_json::Value) -> Vec<SubtitleEntry> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn prefers_trusted_uploads_over_popular_untrusted_ones() {
        let entries = entries(json!([
            {
                "attributes": {
                    "from_trusted": false,
                    "download_count": 9000,
                    "files": [{ "file_id": 1 }]
                }
            },
            {
                "attributes": {
                    "from_trusted": true,
                    "download_count": 12,
                    "files": [{ "file_id": 2 }]
                }
            }
        ]));

        assert_eq!(best_file_id(entries), Some(2));
    }

    #[test]
    fn ranks_by_download_count_within_the_same_trust_level() {
        let entries = entries(json!([
            {
                "attributes": {
                    "from_trusted": true,
                    "download_count": 5,
                    "files": [{ "file_id": 1 }]
                }
            },
            {
                "attributes": {
                    "from_trusted": true,
                    "download_count": 50,
                    "files": [{ "file_id": 2 }]
                }
            }
        ]));

        assert_eq!(best_file_id(entries), Some(2));
    }

    #[test]
    fn skips_candidates_without_downloadable_files() {
        let entries = entries(json!([
            {
                "attributes": {
                    "from_trusted": true,
                    "download_count": 100,
                    "files": []
                }
            },
            {
                "attributes": {
                    "from_trusted": false,
                    "download_count": 3,
                    "files": [{ "file_id": 7 }]
                }
            }
        ]));

        assert_eq!(best_file_id(entries), Some(7));
    }

    #[test]
    fn tolerates_entries_with_missing_attributes() {
        let entries = entries(json!([{}, { "attributes": null }]));

        assert_eq!(best_file_id(entries), None);
    }

    fn tracks(raw: &str) -> Vec<mkvmerge::Track> {
        let identify: mkvmerge::Identify = serde_json::from_str(raw).unwrap();
        identify.tracks.unwrap()
    }

    #[test]
    fn selects_a_regular_track_over_a_forced_one() {
        let tracks = tracks(
            r#"{
                "tracks": [
                    { "id": 0, "type": "video", "properties": { "language": "und" } },
                    { "id": 1, "type": "audio", "properties": { "language": "eng" } },
                    { "id": 2, "type": "subtitles", "properties": { "language": "eng", "forced_track": true } },
                    { "id": 3, "type": "subtitles", "properties": { "language": "eng", "forced_track": false } }
                ]
            }"#,
        );

        assert_eq!(select_subtitle_track(&tracks, "en"), Some(3));
    }

    #[test]
    fn falls_back_to_a_forced_track_when_nothing_else_matches() {
        let tracks = tracks(
            r#"{
                "tracks": [
                    { "id": 2, "type": "subtitles", "properties": { "language": "eng", "forced_track": true } }
                ]
            }"#,
        );

        assert_eq!(select_subtitle_track(&tracks, "en"), Some(2));
    }

    #[test]
    fn ignores_subtitle_tracks_in_other_languages() {
        let tracks = tracks(
            r#"{
                "tracks": [
                    { "id": 1, "type": "subtitles", "properties": { "language": "ger" } },
                    { "id": 2, "type": "subtitles", "properties": { "language": "fre" } }
                ]
            }"#,
        );

        assert_eq!(select_subtitle_track(&tracks, "en"), None);
    }

    #[test]
    fn matches_ietf_language_tags() {
        let tracks = tracks(
            r#"{
                "tracks": [
                    { "id": 4, "type": "subtitles", "properties": { "language_ietf": "en" } }
                ]
            }"#,
        );

        assert_eq!(select_subtitle_track(&tracks, "en"), Some(4));
    }
}
