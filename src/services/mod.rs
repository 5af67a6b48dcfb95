//! Rename pipeline services

pub mod catalog;
pub mod executor;
pub mod filename_parser;
pub mod naming;
pub mod resolver;
pub mod scanner;
pub mod subtitles;
pub mod tvdb;

pub use catalog::{Catalog, CatalogSession, MediaKind, MovieDetails, SearchHit};
pub use executor::{ChangeOutcome, ConfirmedChange, ExecutionReport, ExecutorService};
pub use scanner::{ProposalService, ProposedChange, RenamingTask, ScanError};
pub use subtitles::{MkvToolset, OpenSubtitlesClient};
pub use tvdb::TvdbClient;
