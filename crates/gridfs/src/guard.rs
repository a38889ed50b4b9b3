//! Cleanup after a failed store.

use crate::error::GridFsError;
use gridstore_core::chunk::FILES_ID_FIELD;
use gridstore_core::file::ID_FIELD;
use gridstore_core::{Value, doc};
use gridstore_docstore::{Collection, RemoveOptions};
use std::sync::Arc;
use tracing::{instrument, warn};

/// Best-effort removal of whatever a failed store left behind.
#[derive(Clone)]
pub struct ConsistencyGuard {
    files: Arc<dyn Collection>,
    chunks: Arc<dyn Collection>,
}

impl ConsistencyGuard {
    pub fn new(files: Arc<dyn Collection>, chunks: Arc<dyn Collection>) -> Self {
        Self { files, chunks }
    }

    /// Delete every chunk of `id`, then its metadata document, and compose the
    /// error to report.
    ///
    /// Both deletions are attempted whether or not anything exists. A failing
    /// deletion is logged and never replaces `pending`.
    #[instrument(skip(self, id, pending), fields(files_id = %id))]
    pub async fn rollback(&self, id: &Value, pending: Option<GridFsError>) -> GridFsError {
        let options = RemoveOptions::default();

        if let Err(e) = self
            .chunks
            .remove(doc! { FILES_ID_FIELD => id.clone() }, &options)
            .await
        {
            warn!(
                collection = self.chunks.name(),
                error = %e,
                "Failed to remove chunks after store failure"
            );
        }

        if let Err(e) = self
            .files
            .remove(doc! { ID_FIELD => id.clone() }, &options)
            .await
        {
            warn!(
                collection = self.files.name(),
                error = %e,
                "Failed to remove file metadata after store failure"
            );
        }

        GridFsError::store_failed(pending)
    }
}
