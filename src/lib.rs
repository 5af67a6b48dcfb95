//! Renamarr - media file rename service
//!
//! Scans a directory of video files, resolves proper names against TheTVDB,
//! and applies confirmed renames with subtitle handling.

pub mod api;
pub mod config;
pub mod services;

use std::sync::Arc;

use config::Config;
use services::{ExecutorService, ProposalService};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub proposals: Arc<ProposalService>,
    pub executor: Arc<ExecutorService>,
}
