//! Content digest of stored chunks, computed by the backing store.

use gridstore_core::{Md5Digest, Value, doc};
use gridstore_docstore::{Database, FILEMD5_COMMAND};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Asks the backing store to hash all chunks of a file.
#[derive(Clone)]
pub struct ChecksumComputer {
    db: Arc<dyn Database>,
    root: String,
}

impl ChecksumComputer {
    /// Computer for chunks under `<root>.chunks`.
    pub fn new(db: Arc<dyn Database>, root: impl Into<String>) -> Self {
        Self {
            db,
            root: root.into(),
        }
    }

    /// Hex digest of the chunks of `id`, or `None` when the store could not
    /// produce one. A failure here never fails the store.
    #[instrument(skip(self, id), fields(files_id = %id, root = %self.root))]
    pub async fn compute(&self, id: &Value) -> Option<String> {
        let command = doc! {
            FILEMD5_COMMAND => id.clone(),
            "root" => self.root.as_str(),
        };

        let reply = match self.db.run_command(command).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Checksum command failed; storing file without md5");
                return None;
            }
        };

        match reply.get_str("md5").map(Md5Digest::from_hex) {
            Some(Ok(digest)) => {
                debug!(md5 = %digest, "Computed checksum");
                Some(digest.to_hex())
            }
            Some(Err(e)) => {
                warn!(error = %e, "Checksum reply carried a malformed digest");
                None
            }
            None => {
                warn!("Checksum reply carried no digest");
                None
            }
        }
    }
}
