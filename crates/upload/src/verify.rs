//! Cross-checks the parts the remote recorded against what was sent.

use std::collections::HashMap;
use std::sync::Arc;

use panup_protocol::UploadedPart;
use panup_transfer::ContentDigest;
use tracing::{debug, warn};

use crate::error::{IntegrityFailure, Step, UploadError};
use crate::remote::RemoteApi;
use crate::session::{ChunkRecord, SessionStatus, UploadSession};

/// Verifies multi-chunk uploads before completion.
pub struct PartVerifier {
    remote: Arc<dyn RemoteApi>,
}

impl PartVerifier {
    pub fn new(remote: Arc<dyn RemoteApi>) -> Self {
        Self { remote }
    }

    /// Moves a session from `AllChunksSent` to `Verified`.
    ///
    /// Sessions with at most one chunk are accepted without a remote call.
    /// Otherwise every sent chunk must appear in the remote part list with
    /// the same digest; the first chunk that does not is marked failed and
    /// the session fails with [`UploadError::Integrity`].
    pub async fn verify(&self, session: &mut UploadSession) -> Result<(), UploadError> {
        if session.status() != SessionStatus::AllChunksSent {
            return Err(UploadError::InvalidTransition {
                from: session.status(),
                to: SessionStatus::Verified,
            });
        }
        if !session.requires_verification() {
            return session.transition(SessionStatus::Verified);
        }

        let preupload_id = session
            .preupload_id()
            .ok_or_else(|| UploadError::protocol(Step::ListParts, "session has no preuploadID"))?
            .to_string();
        let parts = self
            .remote
            .list_upload_parts(&preupload_id)
            .await
            .map_err(|e| UploadError::from_api(Step::ListParts, None, e))?;
        debug!(
            remote_parts = parts.len(),
            local_chunks = session.total_chunks(),
            "verifying parts"
        );

        if let Err((chunk, failure)) = reconcile(session.chunks(), &parts) {
            warn!(chunk, %failure, "part verification failed");
            session.mark_failed(chunk);
            session.fail();
            return Err(UploadError::Integrity { chunk, failure });
        }

        let indices: Vec<u32> = session.chunks().map(|c| c.index).collect();
        for index in indices {
            session.mark_verified(index);
        }
        session.transition(SessionStatus::Verified)
    }
}

/// Compares local records with the remote part list.
///
/// Records without a local digest are skipped. Remote etags are compared
/// case-insensitively; surrounding quotes are ignored. When a part number
/// appears twice, the later entry wins.
pub fn reconcile<'a>(
    records: impl IntoIterator<Item = &'a ChunkRecord>,
    parts: &[UploadedPart],
) -> Result<(), (u32, IntegrityFailure)> {
    let remote: HashMap<u32, &UploadedPart> =
        parts.iter().map(|p| (p.part_number, p)).collect();

    for record in records {
        let Some(local) = record.local_digest else {
            continue;
        };
        let Some(part) = remote.get(&record.index) else {
            return Err((record.index, IntegrityFailure::MissingPart));
        };
        let etag = part.etag.trim().trim_matches('"');
        let matches = ContentDigest::from_hex(etag).is_ok_and(|remote| remote == local);
        if !matches {
            return Err((
                record.index,
                IntegrityFailure::DigestMismatch {
                    local,
                    remote: etag.to_string(),
                },
            ));
        }
    }
    Ok(())
}
