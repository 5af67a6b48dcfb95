//! Proposed filename construction
//!
//! Composes the canonical name from resolved metadata, then sanitizes the whole
//! composed stem so punctuation inside a legitimate title survives unless the
//! filesystem disallows it. The original extension is appended after sanitization.

use crate::services::resolver::ResolvedMetadata;

/// Build the canonical filename for resolved metadata, `None` when unresolved
pub fn build_proposed_name(resolved: &ResolvedMetadata, extension: &str) -> Option<String> {
    let stem = match resolved {
        ResolvedMetadata::Movie { name, year } => match year {
            Some(year) => format!("{name} ({year})"),
            None => name.clone(),
        },
        ResolvedMetadata::Episode {
            series,
            season,
            episode,
            title,
        } => format!("{series} S{season:02}E{episode:02} {title}"),
        ResolvedMetadata::Unresolved => return None,
    };

    Some(compose(&stem, extension))
}

/// Name for files that stay unclassified or unresolved: the cleaned stem as-is
pub fn fallback_name(cleaned: &str, extension: &str) -> String {
    compose(cleaned, extension)
}

/// Name for already-canonical episode files: collapse whitespace, lowercase the
/// extension, touch nothing else
pub fn canonical_name(stem: &str, extension: &str) -> String {
    let collapsed = stem.split_whitespace().collect::<Vec<_>>().join(" ");
    compose(&collapsed, &extension.to_lowercase())
}

fn compose(stem: &str, extension: &str) -> String {
    let sanitized = sanitize_filename::sanitize(stem);
    format!("{}{}", sanitized.trim(), extension)
}
