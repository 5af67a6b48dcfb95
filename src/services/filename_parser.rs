//! Filename parser for scene-style release names
//!
//! Extracts a title guess plus year or season/episode tokens from names like:
//! - "Show.Name.S01E02.1080p.WEBRip.x264.mkv"
//! - "Movie.Name.2019.1080p.mkv"
//! - "Show Name 1x02 Pilot.mp4"

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Tokens that never belong to a title (source/codec/group tags and container
/// extensions embedded mid-name). Matched case-insensitively against whole segments.
const NOISE_TOKENS: &[&str] = &[
    "webrip", "web-dl", "webdl", "bluray", "brrip", "hdtv", "x264", "x265", "h264",
    "h265", "hevc", "aac", "ac3", "dts", "yts", "yify", "rarbg", "mx", "xvid", "divx",
    "proper", "repack", "remux", "internal", "extended", "unrated", "mp4", "avi", "mkv",
];

/// Season/episode patterns tried in order; the first match wins
static EPISODE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)\bs(\d{1,2})e(\d{1,2})\b").unwrap(),
        Regex::new(r"(?i)\bs(\d{1,2})\s?\.?\s?e(\d{1,2})\b").unwrap(),
        Regex::new(r"(?i)\b(\d{1,2})x(\d{2})\b").unwrap(),
    ]
});

static YEAR_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19|20)\d{2}\b").unwrap());

static RESOLUTION_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\d{3,4}p$").unwrap());

/// Canonical episode codes are strictly two digits each (`S01E02`, not `S1E2`)
static CANONICAL_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bs\d{2}e\d{2}\b").unwrap());

/// Tokens extracted from one filename, prior to classification
#[derive(Debug, Clone, Default)]
pub struct ParsedFilename {
    /// File name stem, extension removed
    pub raw_name: String,
    /// Title text accumulated before the first year/episode/noise token
    pub title_guess: String,
    /// First `(19|20)\d\d` token, as written
    pub year_token: Option<String>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    /// Stem text after the episode code (or after the year when no code matched)
    pub remainder: String,
    /// Byte offset of the year token in the stem, for classification ordering
    pub year_offset: Option<usize>,
    /// Byte offset of the episode code in the stem, for classification ordering
    pub episode_offset: Option<usize>,
}

/// What a normalized filename most likely refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaGuess {
    Movie { title: String, year: String },
    Episode { series: String, season: u32, episode: u32 },
    Unknown { cleaned: String },
}

/// Split a file name into (stem, extension-with-dot)
pub fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => (&file_name[..idx], &file_name[idx..]),
        _ => (file_name, ""),
    }
}

/// Extract title/year/episode tokens from a raw file name
pub fn normalize(raw_file_name: &str) -> ParsedFilename {
    let (stem, _ext) = split_extension(raw_file_name);

    let year_match = YEAR_TOKEN.find(stem);
    let episode_match = EPISODE_PATTERNS.iter().find_map(|re| re.captures(stem));

    let (season, episode, episode_span) = match &episode_match {
        Some(caps) => {
            let whole = caps.get(0).map(|m| (m.start(), m.end()));
            (
                caps.get(1).and_then(|m| m.as_str().parse().ok()),
                caps.get(2).and_then(|m| m.as_str().parse().ok()),
                whole,
            )
        }
        None => (None, None, None),
    };

    let year_offset = year_match.map(|m| m.start());
    let episode_offset = episode_span.map(|(start, _)| start);

    // Title accumulation stops at the first year/episode token or noise segment
    let stop_at = match (year_offset, episode_offset) {
        (Some(y), Some(e)) => Some(y.min(e)),
        (Some(y), None) => Some(y),
        (None, Some(e)) => Some(e),
        (None, None) => None,
    };

    let mut title_parts: Vec<&str> = Vec::new();
    for (seg_start, segment) in segments(stem) {
        let token = segment.trim();
        if token.is_empty() {
            continue;
        }
        // A segment containing the stop token terminates accumulation too
        if let Some(stop) = stop_at
            && stop < seg_start + segment.len()
        {
            break;
        }
        if is_noise_token(token) {
            break;
        }
        title_parts.push(token);
    }

    let remainder_start = episode_span.map(|(_, end)| end).or(year_match.map(|m| m.end()));
    let remainder = remainder_start
        .map(|idx| stem[idx..].replace('.', " ").trim().to_string())
        .unwrap_or_default();

    // Space-split stems can still carry dots inside a segment
    let title_guess = title_parts
        .join(" ")
        .replace('.', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let parsed = ParsedFilename {
        raw_name: stem.to_string(),
        title_guess,
        year_token: year_match.map(|m| m.as_str().to_string()),
        season,
        episode,
        remainder,
        year_offset,
        episode_offset,
    };

    debug!(
        file = raw_file_name,
        title = %parsed.title_guess,
        year = ?parsed.year_token,
        season = ?parsed.season,
        episode = ?parsed.episode,
        "Normalized filename"
    );

    parsed
}

/// Decide whether a parsed name is a movie, an episode, or unrecognized.
///
/// A year token positioned before any episode code wins: `Title.2024.S01E01` stays a
/// movie whose name carries an episode-like suffix, while `Show.S01E02.2019.remux`
/// stays an episode with a year in the release noise.
pub fn classify(parsed: &ParsedFilename) -> MediaGuess {
    let year_first = match (parsed.year_offset, parsed.episode_offset) {
        (Some(y), Some(e)) => y < e,
        (Some(_), None) => true,
        _ => false,
    };

    if year_first && let Some(year) = &parsed.year_token {
        return MediaGuess::Movie {
            title: parsed.title_guess.clone(),
            year: year.clone(),
        };
    }

    if let (Some(season), Some(episode)) = (parsed.season, parsed.episode) {
        return MediaGuess::Episode {
            series: parsed.title_guess.clone(),
            season,
            episode,
        };
    }

    MediaGuess::Unknown {
        cleaned: cleaned_fallback(&parsed.raw_name),
    }
}

/// True when a stem is already in canonical episode form: a two-digit `sNNeNN` code,
/// space-separated text, and no release noise. Such names skip catalog resolution.
pub fn is_canonical_episode_name(stem: &str) -> bool {
    !stem.contains('.')
        && CANONICAL_CODE.is_match(stem)
        && !stem.split_whitespace().any(is_noise_token)
}

/// Best-effort display text for names that resist classification: dots become
/// spaces and noise tokens drop out
pub fn cleaned_fallback(stem: &str) -> String {
    stem.replace('.', " ")
        .split_whitespace()
        .filter(|token| !is_noise_token(token))
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_noise_token(token: &str) -> bool {
    let lowered = token.to_lowercase();
    NOISE_TOKENS.contains(&lowered.as_str()) || RESOLUTION_TOKEN.is_match(&lowered)
}

/// Iterate (byte offset, segment) pairs: dot-delimited when the name has at least
/// three dot-segments, whitespace-delimited otherwise
fn segments(stem: &str) -> Vec<(usize, &str)> {
    let delimiter = if stem.split('.').count() >= 3 { '.' } else { ' ' };

    let mut parts = Vec::new();
    let mut offset = 0;
    for segment in stem.split(delimiter) {
        parts.push((offset, segment));
        offset += segment.len() + 1;
    }
    parts
}
