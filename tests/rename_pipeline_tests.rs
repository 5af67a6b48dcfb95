//! Integration tests for the rename pipeline
//!
//! These tests verify the complete flow of rename handling:
//! - Proposal scans against a scripted catalog (resolution, fallbacks, ordering)
//! - Degraded behavior when the catalog rejects authentication
//! - Execution of confirmed changes on real temp directories

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use assert_matches::assert_matches;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use renamarr::config::TitleOverrides;
use renamarr::services::{
    Catalog, CatalogSession, ChangeOutcome, ConfirmedChange, ExecutorService, MediaKind,
    MkvToolset, MovieDetails, ProposalService, RenamingTask, ScanError, SearchHit,
};

// ============================================================================
// Scripted catalog
// ============================================================================

/// Session answering from fixed tables. Search hits are keyed by exact query text.
#[derive(Clone, Default)]
struct StubSession {
    hits: HashMap<String, Vec<SearchHit>>,
    episodes: HashMap<(u32, u32, u32), String>,
    movies: HashMap<u32, MovieDetails>,
}

#[async_trait]
impl CatalogSession for StubSession {
    async fn search(
        &self,
        query: &str,
        _kind: Option<MediaKind>,
        _year: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        Ok(self.hits.get(query).cloned().unwrap_or_default())
    }

    async fn episode_by_number(
        &self,
        series_id: u32,
        season: u32,
        episode: u32,
    ) -> Result<Option<String>> {
        Ok(self.episodes.get(&(series_id, season, episode)).cloned())
    }

    async fn movie_by_id(&self, movie_id: u32) -> Result<MovieDetails> {
        self.movies
            .get(&movie_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown movie {movie_id}"))
    }
}

/// Catalog handing out clones of one scripted session, counting logins
struct StubCatalog {
    session: StubSession,
    connects: Arc<AtomicUsize>,
}

impl StubCatalog {
    fn new(session: StubSession) -> Self {
        Self {
            session,
            connects: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Catalog for StubCatalog {
    async fn connect(&self) -> Result<Box<dyn CatalogSession>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.session.clone()))
    }
}

/// Catalog whose authentication always fails
struct RejectingCatalog {
    attempts: Arc<AtomicUsize>,
}

#[async_trait]
impl Catalog for RejectingCatalog {
    async fn connect(&self) -> Result<Box<dyn CatalogSession>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("invalid credentials")
    }
}

fn series_hit(id: &str, name: &str) -> SearchHit {
    SearchHit {
        id: Some(id.to_string()),
        name: Some(name.to_string()),
        kind: Some("series".to_string()),
        ..Default::default()
    }
}

fn movie_hit(id: &str, name: &str, year: &str) -> SearchHit {
    SearchHit {
        id: Some(id.to_string()),
        name: Some(name.to_string()),
        kind: Some("movie".to_string()),
        year: Some(year.to_string()),
        ..Default::default()
    }
}

fn proposal_service(catalog: impl Catalog + 'static) -> ProposalService {
    ProposalService::new(Arc::new(catalog), TitleOverrides::default())
}

fn write_file(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).unwrap();
}

fn task(source: &TempDir, destination: &TempDir) -> RenamingTask {
    RenamingTask {
        source_directory: source.path().to_path_buf(),
        destination_directory: destination.path().to_path_buf(),
    }
}

// ============================================================================
// Proposal pipeline
// ============================================================================

mod proposal_pipeline {
    use super::*;

    #[tokio::test]
    async fn episode_files_adopt_catalog_titles() {
        let source = TempDir::new().unwrap();
        let destination = TempDir::new().unwrap();
        write_file(
            source.path(),
            "Show.Name.S01E02.1080p.WEBRip.x264.mkv",
            "video",
        );

        let session = StubSession {
            hits: HashMap::from([(
                "Show Name".to_string(),
                vec![series_hit("series-11", "Show Name")],
            )]),
            episodes: HashMap::from([((11, 1, 2), "Pilot".to_string())]),
            ..Default::default()
        };
        let service = proposal_service(StubCatalog::new(session));

        let proposals = service.propose(&task(&source, &destination)).await.unwrap();

        assert_eq!(proposals.len(), 1);
        let change = &proposals[0];
        assert_eq!(change.proposed_file_name, "Show Name S01E02 Pilot.mkv");
        assert_eq!(
            change.original_file_name,
            "Show.Name.S01E02.1080p.WEBRip.x264.mkv"
        );
        assert_eq!(change.file_type, "series");
        assert_eq!(change.season, Some(1));
        assert_eq!(change.episode, Some(2));
    }

    #[tokio::test]
    async fn movie_files_gain_name_and_year() {
        let source = TempDir::new().unwrap();
        let destination = TempDir::new().unwrap();
        write_file(source.path(), "Movie.Name.2019.1080p.mkv", "video");

        let session = StubSession {
            hits: HashMap::from([(
                "Movie Name".to_string(),
                vec![movie_hit("movie-136", "Movie Name", "2019")],
            )]),
            movies: HashMap::from([(
                136,
                MovieDetails {
                    name: "Movie Name".to_string(),
                    year: Some("2019".to_string()),
                },
            )]),
            ..Default::default()
        };
        let service = proposal_service(StubCatalog::new(session));

        let proposals = service.propose(&task(&source, &destination)).await.unwrap();

        assert_eq!(proposals.len(), 1);
        let change = &proposals[0];
        assert_eq!(change.proposed_file_name, "Movie Name (2019).mkv");
        assert_eq!(change.file_type, "movie");
        assert_eq!(change.season, None);
        assert_eq!(change.episode, None);
        assert_eq!(change.original_file_path, source.path().to_string_lossy());
    }

    #[tokio::test]
    async fn canonical_names_bypass_the_catalog() {
        let source = TempDir::new().unwrap();
        let destination = TempDir::new().unwrap();
        write_file(source.path(), "Show Name S01E02 Pilot.MKV", "video");

        let catalog = StubCatalog::new(StubSession::default());
        let connects = catalog.connects.clone();
        let service = proposal_service(catalog);

        let proposals = service.propose(&task(&source, &destination)).await.unwrap();

        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].proposed_file_name, "Show Name S01E02 Pilot.mkv");
        assert_eq!(proposals[0].file_type, "series");
        assert_eq!(connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_directories_abort_the_scan() {
        let present = TempDir::new().unwrap();
        let missing = present.path().join("nope");
        let service = proposal_service(StubCatalog::new(StubSession::default()));

        let bad_source = RenamingTask {
            source_directory: missing.clone(),
            destination_directory: present.path().to_path_buf(),
        };
        assert_matches!(
            service.propose(&bad_source).await,
            Err(ScanError::DirectoryNotFound { .. })
        );

        let bad_destination = RenamingTask {
            source_directory: present.path().to_path_buf(),
            destination_directory: missing,
        };
        assert_matches!(
            service.propose(&bad_destination).await,
            Err(ScanError::DirectoryNotFound { .. })
        );
    }

    #[tokio::test]
    async fn empty_directory_yields_no_proposals() {
        let source = TempDir::new().unwrap();
        let destination = TempDir::new().unwrap();
        let service = proposal_service(StubCatalog::new(StubSession::default()));

        let proposals = service.propose(&task(&source, &destination)).await.unwrap();

        assert!(proposals.is_empty());
    }

    #[tokio::test]
    async fn non_video_files_are_ignored() {
        let source = TempDir::new().unwrap();
        let destination = TempDir::new().unwrap();
        write_file(source.path(), "Show Name S01E02 Pilot.mkv", "video");
        write_file(source.path(), "Show Name S01E02 Pilot.srt", "subs");
        write_file(source.path(), "notes.txt", "text");
        write_file(source.path(), "cover.jpg", "image");

        let service = proposal_service(StubCatalog::new(StubSession::default()));

        let proposals = service.propose(&task(&source, &destination)).await.unwrap();

        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].original_file_name, "Show Name S01E02 Pilot.mkv");
    }

    #[tokio::test]
    async fn proposals_come_back_sorted_and_repeatable() {
        let source = TempDir::new().unwrap();
        let destination = TempDir::new().unwrap();
        write_file(source.path(), "Charlie S01E03 Three.mkv", "video");
        write_file(source.path(), "Alpha S01E01 One.mkv", "video");
        write_file(source.path(), "Bravo S01E02 Two.mkv", "video");

        let service = proposal_service(StubCatalog::new(StubSession::default()));
        let task = task(&source, &destination);

        let first: Vec<String> = service
            .propose(&task)
            .await
            .unwrap()
            .into_iter()
            .map(|change| change.original_file_name)
            .collect();
        let second: Vec<String> = service
            .propose(&task)
            .await
            .unwrap()
            .into_iter()
            .map(|change| change.original_file_name)
            .collect();

        assert_eq!(
            first,
            vec![
                "Alpha S01E01 One.mkv",
                "Bravo S01E02 Two.mkv",
                "Charlie S01E03 Three.mkv",
            ]
        );
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn catalog_outage_degrades_movies_and_drops_episodes() {
        let source = TempDir::new().unwrap();
        let destination = TempDir::new().unwrap();
        write_file(source.path(), "Movie.Name.2019.1080p.mkv", "video");
        write_file(source.path(), "Random.Capture.x264.mkv", "video");
        write_file(source.path(), "Show.Name.S01E02.720p.mkv", "video");

        let attempts = Arc::new(AtomicUsize::new(0));
        let service = proposal_service(RejectingCatalog {
            attempts: attempts.clone(),
        });

        let proposals = service.propose(&task(&source, &destination)).await.unwrap();

        let degraded: Vec<(String, String)> = proposals
            .into_iter()
            .map(|change| (change.proposed_file_name, change.file_type))
            .collect();
        assert_eq!(
            degraded,
            vec![
                ("Movie Name 2019.mkv".to_string(), ".mkv".to_string()),
                ("Random Capture.mkv".to_string(), ".mkv".to_string()),
            ]
        );
        // One login attempt for the whole scan; the failure is sticky.
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn series_search_retries_with_the_first_token() {
        let source = TempDir::new().unwrap();
        let destination = TempDir::new().unwrap();
        write_file(source.path(), "Show.Garbled.Tail.S01E02.mkv", "video");

        let session = StubSession {
            hits: HashMap::from([(
                "Show".to_string(),
                vec![series_hit("series-11", "Show Name")],
            )]),
            episodes: HashMap::from([((11, 1, 2), "Pilot".to_string())]),
            ..Default::default()
        };
        let service = proposal_service(StubCatalog::new(session));

        let proposals = service.propose(&task(&source, &destination)).await.unwrap();

        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].proposed_file_name, "Show Name S01E02 Pilot.mkv");
    }

    #[tokio::test]
    async fn unknown_episode_numbers_drop_the_file() {
        let source = TempDir::new().unwrap();
        let destination = TempDir::new().unwrap();
        write_file(source.path(), "Show.Name.S04E99.720p.mkv", "video");

        let session = StubSession {
            hits: HashMap::from([(
                "Show Name".to_string(),
                vec![series_hit("series-11", "Show Name")],
            )]),
            ..Default::default()
        };
        let service = proposal_service(StubCatalog::new(session));

        let proposals = service.propose(&task(&source, &destination)).await.unwrap();

        assert!(proposals.is_empty());
    }
}

// ============================================================================
// Rename execution
// ============================================================================

mod rename_execution {
    use super::*;

    fn executor() -> ExecutorService {
        ExecutorService::new(
            MkvToolset::new("mkvmerge".to_string(), "mkvextract".to_string()),
            None,
            "en".to_string(),
        )
    }

    fn change(source: &Path, from: &str, destination: &Path, to: &str) -> ConfirmedChange {
        ConfirmedChange {
            original_file_path: source.to_string_lossy().to_string(),
            original_file_name: from.to_string(),
            new_file_path: destination.to_string_lossy().to_string(),
            new_file_name: to.to_string(),
        }
    }

    #[tokio::test]
    async fn moves_and_renames_a_file() {
        let source = TempDir::new().unwrap();
        let destination = TempDir::new().unwrap();
        write_file(source.path(), "Movie.Name.2019.1080p.mp4", "movie bytes");

        let report = executor()
            .execute(&[change(
                source.path(),
                "Movie.Name.2019.1080p.mp4",
                destination.path(),
                "Movie Name (2019).mp4",
            )])
            .await;

        assert!(report.succeeded());
        assert_matches!(report.outcomes[0].outcome, ChangeOutcome::Moved);
        assert!(!source.path().join("Movie.Name.2019.1080p.mp4").exists());
        assert_eq!(
            fs::read_to_string(destination.path().join("Movie Name (2019).mp4")).unwrap(),
            "movie bytes"
        );
    }

    #[tokio::test]
    async fn collisions_leave_the_destination_untouched() {
        let source = TempDir::new().unwrap();
        let destination = TempDir::new().unwrap();
        write_file(source.path(), "incoming.mp4", "new bytes");
        write_file(destination.path(), "Taken.mp4", "original bytes");

        let report = executor()
            .execute(&[change(
                source.path(),
                "incoming.mp4",
                destination.path(),
                "Taken.mp4",
            )])
            .await;

        assert!(report.succeeded());
        assert_matches!(report.outcomes[0].outcome, ChangeOutcome::SkippedCollision);
        assert_eq!(
            fs::read_to_string(destination.path().join("Taken.mp4")).unwrap(),
            "original bytes"
        );
        assert!(source.path().join("incoming.mp4").exists());
    }

    #[tokio::test]
    async fn vanished_sources_are_skipped() {
        let source = TempDir::new().unwrap();
        let destination = TempDir::new().unwrap();

        let report = executor()
            .execute(&[change(
                source.path(),
                "ghost.mp4",
                destination.path(),
                "Ghost.mp4",
            )])
            .await;

        assert!(report.succeeded());
        assert_matches!(
            report.outcomes[0].outcome,
            ChangeOutcome::SkippedMissingSource
        );
    }

    #[tokio::test]
    async fn disallowed_extensions_are_skipped() {
        let source = TempDir::new().unwrap();
        let destination = TempDir::new().unwrap();
        write_file(source.path(), "notes.txt", "text");

        let report = executor()
            .execute(&[change(
                source.path(),
                "notes.txt",
                destination.path(),
                "Renamed.txt",
            )])
            .await;

        assert!(report.succeeded());
        assert_matches!(report.outcomes[0].outcome, ChangeOutcome::SkippedExtension);
        assert!(source.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn sidecar_subtitles_follow_their_video() {
        let source = TempDir::new().unwrap();
        let destination = TempDir::new().unwrap();
        write_file(source.path(), "Show.Name.S01E02.mkv", "video");
        write_file(source.path(), "Show.Name.S01E02.srt", "subs");

        let report = executor()
            .execute(&[change(
                source.path(),
                "Show.Name.S01E02.mkv",
                destination.path(),
                "Show Name S01E02 Pilot.mkv",
            )])
            .await;

        assert!(report.succeeded());
        assert_matches!(report.outcomes[0].outcome, ChangeOutcome::Moved);
        assert!(destination.path().join("Show Name S01E02 Pilot.mkv").exists());
        assert_eq!(
            fs::read_to_string(destination.path().join("Show Name S01E02 Pilot.srt")).unwrap(),
            "subs"
        );
        assert!(!source.path().join("Show.Name.S01E02.srt").exists());
    }

    #[tokio::test]
    async fn failed_moves_fail_the_batch_but_later_changes_run() {
        let source = TempDir::new().unwrap();
        let destination = TempDir::new().unwrap();
        write_file(source.path(), "first.mp4", "one");
        write_file(source.path(), "second.mp4", "two");

        let missing = destination.path().join("missing");
        let report = executor()
            .execute(&[
                change(source.path(), "first.mp4", &missing, "First.mp4"),
                change(source.path(), "second.mp4", destination.path(), "Second.mp4"),
            ])
            .await;

        assert!(!report.succeeded());
        assert_matches!(report.outcomes[0].outcome, ChangeOutcome::Failed { .. });
        assert_matches!(report.outcomes[1].outcome, ChangeOutcome::Moved);
        assert!(source.path().join("first.mp4").exists());
        assert_eq!(
            fs::read_to_string(destination.path().join("Second.mp4")).unwrap(),
            "two"
        );
    }
}
