//! Rename proposal and execution endpoints

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;
use std::path::PathBuf;

use crate::AppState;
use crate::services::{ConfirmedChange, ProposedChange, RenamingTask, ScanError};

#[derive(Debug, Deserialize)]
pub struct ProposalsQuery {
    source_directory: Option<String>,
    destination_directory: Option<String>,
}

/// Scan the source directory and propose a new name for every video file
async fn get_proposals(
    State(state): State<AppState>,
    Query(query): Query<ProposalsQuery>,
) -> Result<Json<Vec<ProposedChange>>, (StatusCode, String)> {
    let source = query.source_directory.unwrap_or_default();
    let destination = query.destination_directory.unwrap_or_default();

    if source.trim().is_empty() || destination.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "source_directory and destination_directory are required".to_string(),
        ));
    }

    let task = RenamingTask {
        source_directory: PathBuf::from(source),
        destination_directory: PathBuf::from(destination),
    };

    let proposals = state
        .proposals
        .propose(&task)
        .await
        .map_err(|error| match error {
            ScanError::DirectoryNotFound { .. } => (StatusCode::NOT_FOUND, error.to_string()),
        })?;

    if proposals.is_empty() {
        return Err((
            StatusCode::NOT_FOUND,
            "No files found for renaming.".to_string(),
        ));
    }

    Ok(Json(proposals))
}

/// Apply a confirmed batch of rename changes
async fn execute_changes(
    State(state): State<AppState>,
    Json(changes): Json<Vec<ConfirmedChange>>,
) -> (StatusCode, String) {
    if changes.is_empty() {
        return (StatusCode::BAD_REQUEST, "No changes provided.".to_string());
    }

    let report = state.executor.execute(&changes).await;

    if report.succeeded() {
        (
            StatusCode::OK,
            "Renaming operation completed successfully.".to_string(),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Renaming operation failed.".to_string(),
        )
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rename/proposals", get(get_proposals))
        .route("/rename/execute", post(execute_changes))
}
