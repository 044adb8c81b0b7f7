use crate::{MAX_FILENAME_CHARS, TransferError};

/// Characters the remote refuses in file and folder names.
const FORBIDDEN_CHARS: &[char] = &['"', '\\', '/', ':', '*', '?', '|', '>', '<'];

/// Validates a filename before it is sent to the remote.
///
/// Rejects:
/// - Empty or whitespace-only names
/// - Names longer than [`MAX_FILENAME_CHARS`] characters
/// - Any of `" \ / : * ? | > <`
pub fn validate_remote_filename(name: &str) -> Result<(), TransferError> {
    if name.trim().is_empty() {
        return Err(TransferError::InvalidFilename("empty filename".into()));
    }

    let chars = name.chars().count();
    if chars > MAX_FILENAME_CHARS {
        return Err(TransferError::InvalidFilename(format!(
            "filename is {chars} characters, limit is {MAX_FILENAME_CHARS}"
        )));
    }

    if let Some(c) = name.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        return Err(TransferError::InvalidFilename(format!(
            "character {c:?} not allowed: {name}"
        )));
    }

    Ok(())
}
