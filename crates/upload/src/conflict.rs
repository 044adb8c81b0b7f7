//! What to do when the destination folder already has the filename.

use tracing::{debug, info};

use crate::error::{Step, UploadError};
use crate::remote::RemoteApi;

/// Upper bound on `_copyN` candidates tried before giving up.
const MAX_RENAME_CANDIDATES: u32 = 1000;

/// Policy applied when the destination already holds an entry with the
/// requested name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Upload under the requested name without looking.
    #[default]
    Allow,
    /// Upload as the first free `{stem}_copy{n}{ext}`.
    Rename,
    /// Refuse with [`UploadError::Declined`].
    Abort,
}

/// Builds the `n`-th copy name: `report.pdf` becomes `report_copy1.pdf`.
///
/// Only the last extension is kept apart. A leading dot is part of the stem.
pub fn copy_candidate(filename: &str, n: u32) -> String {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}_copy{n}.{ext}"),
        _ => format!("{filename}_copy{n}"),
    }
}

/// Applies `policy` and returns the name to upload under.
pub async fn resolve_filename(
    remote: &dyn RemoteApi,
    policy: ConflictPolicy,
    parent_id: i64,
    filename: &str,
) -> Result<String, UploadError> {
    if policy == ConflictPolicy::Allow {
        return Ok(filename.to_string());
    }

    if !exists(remote, parent_id, filename).await? {
        return Ok(filename.to_string());
    }

    match policy {
        ConflictPolicy::Allow => Ok(filename.to_string()),
        ConflictPolicy::Abort => {
            info!(filename, parent_id, "destination already has this name");
            Err(UploadError::Declined {
                filename: filename.to_string(),
            })
        }
        ConflictPolicy::Rename => {
            for n in 1..=MAX_RENAME_CANDIDATES {
                let candidate = copy_candidate(filename, n);
                if !exists(remote, parent_id, &candidate).await? {
                    debug!(from = filename, to = %candidate, "renamed to avoid conflict");
                    return Ok(candidate);
                }
            }
            Err(UploadError::Config(format!(
                "no free name for {filename} after {MAX_RENAME_CANDIDATES} candidates"
            )))
        }
    }
}

async fn exists(remote: &dyn RemoteApi, parent_id: i64, name: &str) -> Result<bool, UploadError> {
    remote
        .find_file(parent_id, name)
        .await
        .map(|found| found.is_some())
        .map_err(|e| UploadError::from_api(Step::ConflictCheck, None, e))
}
