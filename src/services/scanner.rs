//! Directory scan and rename proposal pipeline
//!
//! Lists video files one level deep in the source directory, runs each through
//! normalize → classify → resolve → build, and returns the ordered proposal list.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::TitleOverrides;
use crate::services::catalog::Catalog;
use crate::services::filename_parser::{self, MediaGuess};
use crate::services::naming;
use crate::services::resolver::Resolver;

/// Video file extensions eligible for renaming
pub const ALLOWED_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi"];

/// Scope of one proposal request: where files live now and where renamed files go
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenamingTask {
    pub source_directory: PathBuf,
    pub destination_directory: PathBuf,
}

/// A suggested rename for one scanned file. `original_file_path` is the directory
/// holding `original_file_name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedChange {
    pub original_file_path: String,
    pub original_file_name: String,
    pub proposed_file_name: String,
    pub file_type: String,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

/// Fatal scan preconditions. Everything past this point degrades per file.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("directory not found: {}", path.display())]
    DirectoryNotFound { path: PathBuf },
}

pub fn has_allowed_extension(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Proposal pipeline over one source directory
pub struct ProposalService {
    catalog: Arc<dyn Catalog>,
    overrides: TitleOverrides,
}

impl ProposalService {
    pub fn new(catalog: Arc<dyn Catalog>, overrides: TitleOverrides) -> Self {
        Self { catalog, overrides }
    }

    /// Scan the task's source directory and propose a rename for every eligible
    /// file. Returns an empty list when nothing qualifies.
    pub async fn propose(&self, task: &RenamingTask) -> Result<Vec<ProposedChange>, ScanError> {
        for dir in [&task.source_directory, &task.destination_directory] {
            if !dir.is_dir() {
                return Err(ScanError::DirectoryNotFound { path: dir.clone() });
            }
        }

        let file_names = list_video_files(&task.source_directory);
        info!(
            path = %task.source_directory.display(),
            total = file_names.len(),
            "Found video files to examine"
        );

        // One resolver per run: the catalog session is acquired on first use and
        // shared by every file in this scan
        let resolver = Resolver::new(self.catalog.as_ref(), &self.overrides);
        let source_dir = task.source_directory.to_string_lossy().to_string();

        let mut proposals = Vec::with_capacity(file_names.len());
        for file_name in &file_names {
            if let Some(proposal) = self.propose_one(&resolver, &source_dir, file_name).await {
                proposals.push(proposal);
            }
        }

        info!(count = proposals.len(), "Prepared rename proposals");
        Ok(proposals)
    }

    async fn propose_one(
        &self,
        resolver: &Resolver<'_>,
        source_dir: &str,
        file_name: &str,
    ) -> Option<ProposedChange> {
        let (stem, extension) = filename_parser::split_extension(file_name);
        let parsed = filename_parser::normalize(file_name);
        let guess = filename_parser::classify(&parsed);

        let change = |proposed: String, file_type: String, season: Option<u32>, episode: Option<u32>| {
            ProposedChange {
                original_file_path: source_dir.to_string(),
                original_file_name: file_name.to_string(),
                proposed_file_name: proposed,
                file_type,
                season,
                episode,
            }
        };

        match &guess {
            MediaGuess::Episode { season, episode, .. } => {
                if filename_parser::is_canonical_episode_name(stem) {
                    debug!(file = file_name, "Name already canonical; skipping resolution");
                    return Some(change(
                        naming::canonical_name(stem, extension),
                        "series".to_string(),
                        Some(*season),
                        Some(*episode),
                    ));
                }

                let resolved = resolver.resolve(&guess).await;
                match naming::build_proposed_name(&resolved, extension) {
                    Some(name) => Some(change(
                        name,
                        "series".to_string(),
                        Some(*season),
                        Some(*episode),
                    )),
                    None => {
                        warn!(file = file_name, "Episode could not be resolved; no proposal");
                        None
                    }
                }
            }
            MediaGuess::Movie { .. } => {
                let resolved = resolver.resolve(&guess).await;
                match naming::build_proposed_name(&resolved, extension) {
                    Some(name) => Some(change(name, "movie".to_string(), None, None)),
                    None => {
                        // Unresolved movies still surface, as cleaned unknown text
                        let cleaned = filename_parser::cleaned_fallback(stem);
                        Some(change(
                            naming::fallback_name(&cleaned, extension),
                            extension.to_string(),
                            None,
                            None,
                        ))
                    }
                }
            }
            MediaGuess::Unknown { cleaned } => Some(change(
                naming::fallback_name(cleaned, extension),
                extension.to_string(),
                None,
                None,
            )),
        }
    }
}

/// Allowlisted video files directly inside `dir`, sorted by name for deterministic
/// proposal ordering
fn list_video_files(dir: &Path) -> Vec<String> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.file_name().to_str().map(String::from))
        .filter(|name| has_allowed_extension(name))
        .collect()
}
