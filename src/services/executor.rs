//! Batch rename execution service
//!
//! Applies confirmed rename changes sequentially:
//! - Re-checks the extension allowlist before touching anything
//! - Skips collisions and sources that vanished since the scan
//! - Moves files with a copy+remove fallback across filesystems
//! - Carries `.srt` sidecars along, falling back to embedded-track
//!   extraction or subtitle download when no sidecar exists

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, error, info, warn};

use super::scanner::has_allowed_extension;
use super::subtitles::{MkvToolset, OpenSubtitlesClient};

/// A rename the caller has confirmed. The path fields are directories;
/// the name fields are joined onto them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmedChange {
    pub original_file_path: String,
    pub original_file_name: String,
    pub new_file_path: String,
    pub new_file_name: String,
}

/// Outcome of applying a single confirmed change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOutcome {
    Moved,
    SkippedExtension,
    SkippedCollision,
    SkippedMissingSource,
    Failed { error: String },
}

#[derive(Debug)]
pub struct ChangeReport {
    pub original_file_name: String,
    pub outcome: ChangeOutcome,
}

/// Per-change outcomes for one batch. Skips do not count against the
/// batch; only a failed move does.
#[derive(Debug)]
pub struct ExecutionReport {
    pub outcomes: Vec<ChangeReport>,
}

impl ExecutionReport {
    pub fn succeeded(&self) -> bool {
        self.outcomes
            .iter()
            .all(|report| !matches!(report.outcome, ChangeOutcome::Failed { .. }))
    }
}

/// Applies confirmed rename batches to the filesystem
pub struct ExecutorService {
    extractor: MkvToolset,
    provider: Option<OpenSubtitlesClient>,
    subtitle_language: String,
}

impl ExecutorService {
    pub fn new(
        extractor: MkvToolset,
        provider: Option<OpenSubtitlesClient>,
        subtitle_language: String,
    ) -> Self {
        Self {
            extractor,
            provider,
            subtitle_language,
        }
    }

    /// Apply every change in order. A failed move marks that change and the
    /// batch as failed but never stops the remaining changes.
    pub async fn execute(&self, changes: &[ConfirmedChange]) -> ExecutionReport {
        let mut outcomes = Vec::with_capacity(changes.len());

        for change in changes {
            let outcome = self.apply_change(change).await;
            outcomes.push(ChangeReport {
                original_file_name: change.original_file_name.clone(),
                outcome,
            });
        }

        let moved = outcomes
            .iter()
            .filter(|r| matches!(r.outcome, ChangeOutcome::Moved))
            .count();
        let failed = outcomes
            .iter()
            .filter(|r| matches!(r.outcome, ChangeOutcome::Failed { .. }))
            .count();
        let skipped = outcomes.len() - moved - failed;
        info!(
            total = outcomes.len(),
            moved = moved,
            skipped = skipped,
            failed = failed,
            "Finished rename batch"
        );

        ExecutionReport { outcomes }
    }

    async fn apply_change(&self, change: &ConfirmedChange) -> ChangeOutcome {
        if !has_allowed_extension(&change.original_file_name) {
            debug!(
                file = %change.original_file_name,
                "Extension not in the allowlist; skipping change"
            );
            return ChangeOutcome::SkippedExtension;
        }

        // The confirmed name crossed the wire since it was proposed, so
        // sanitize it again before it touches the filesystem.
        let new_name = sanitize_filename::sanitize(change.new_file_name.trim());
        if new_name.is_empty() {
            error!(
                proposed = %change.new_file_name,
                "Proposed file name is empty after sanitization"
            );
            return ChangeOutcome::Failed {
                error: "proposed file name is empty after sanitization".to_string(),
            };
        }

        let source = Path::new(&change.original_file_path).join(&change.original_file_name);
        let destination = Path::new(&change.new_file_path).join(&new_name);

        if destination.exists() {
            warn!(
                target = %destination.display(),
                "Destination already exists; skipping change"
            );
            return ChangeOutcome::SkippedCollision;
        }

        // The scan result may be stale; re-verify right before moving.
        if !source.exists() {
            warn!(
                source = %source.display(),
                "Source file no longer exists; skipping change"
            );
            return ChangeOutcome::SkippedMissingSource;
        }

        if let Err(error) = move_file(&source, &destination).await {
            error!(
                source = %source.display(),
                target = %destination.display(),
                error = %error,
                "Failed to move file"
            );
            return ChangeOutcome::Failed {
                error: error.to_string(),
            };
        }

        info!(
            from = %source.display(),
            to = %destination.display(),
            "Renamed file"
        );

        let sidecar_present = self.relocate_sidecar(&source, &destination).await;
        if !sidecar_present {
            self.acquire_subtitle(&destination).await;
        }

        ChangeOutcome::Moved
    }

    /// Move a `.srt` sidecar sharing the source base name so it keeps
    /// matching its video. Returns whether a sidecar existed at all.
    async fn relocate_sidecar(&self, source: &Path, destination: &Path) -> bool {
        let sidecar = source.with_extension("srt");
        if !sidecar.exists() {
            return false;
        }

        let target = destination.with_extension("srt");
        if target.exists() {
            warn!(
                target = %target.display(),
                "Subtitle already present at destination; leaving sidecar behind"
            );
            return true;
        }

        match move_file(&sidecar, &target).await {
            Ok(()) => {
                info!(
                    from = %sidecar.display(),
                    to = %target.display(),
                    "Moved subtitle sidecar"
                );
            }
            Err(error) => {
                warn!(
                    sidecar = %sidecar.display(),
                    error = %error,
                    "Failed to move subtitle sidecar"
                );
            }
        }
        true
    }

    /// Best-effort subtitle acquisition for a freshly moved video without a
    /// sidecar. Failures are logged and never affect the batch.
    async fn acquire_subtitle(&self, video: &Path) {
        let target = video.with_extension("srt");
        if target.exists() {
            return;
        }

        let is_mkv = video
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("mkv"))
            .unwrap_or(false);

        if is_mkv {
            match self
                .extractor
                .extract_subtitle(video, &target, &self.subtitle_language)
                .await
            {
                Ok(true) => {
                    info!(subtitle = %target.display(), "Extracted embedded subtitle");
                    return;
                }
                Ok(false) => {
                    debug!(
                        video = %video.display(),
                        language = %self.subtitle_language,
                        "No embedded subtitle track matches the configured language"
                    );
                }
                Err(error) => {
                    warn!(
                        video = %video.display(),
                        error = %error,
                        "Embedded subtitle extraction failed"
                    );
                }
            }
        }

        let Some(provider) = &self.provider else {
            return;
        };
        let Some(query) = video.file_stem().and_then(|s| s.to_str()) else {
            return;
        };

        match provider.fetch(query, &self.subtitle_language, &target).await {
            Ok(true) => info!(subtitle = %target.display(), "Downloaded subtitle"),
            Ok(false) => debug!(query = %query, "No subtitle available for download"),
            Err(error) => {
                warn!(query = %query, error = %error, "Subtitle download failed");
            }
        }
    }
}

/// Rename within a filesystem, copy-then-remove across filesystems. The
/// source is only removed once the copy has fully succeeded.
async fn move_file(source: &Path, destination: &Path) -> Result<()> {
    match tokio::fs::rename(source, destination).await {
        Ok(()) => Ok(()),
        Err(_) => {
            tokio::fs::copy(source, destination)
                .await
                .context("Failed to copy file to destination")?;
            tokio::fs::remove_file(source)
                .await
                .context("Failed to remove source file after copy")?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    #[test]
    fn move_file_relocates_contents() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.mp4");
        let destination = dir.path().join("b.mp4");
        fs::write(&source, b"payload").unwrap();

        tokio_test::block_on(move_file(&source, &destination)).unwrap();

        assert!(!source.exists());
        assert_eq!(fs::read(&destination).unwrap(), b"payload");
    }

    #[test]
    fn move_file_reports_a_vanished_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("gone.mp4");
        let destination = dir.path().join("b.mp4");

        let result = tokio_test::block_on(move_file(&source, &destination));

        assert!(result.is_err());
        assert!(!destination.exists());
    }
}
