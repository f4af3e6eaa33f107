//! Hands finished artifacts to the desktop's default application.

use crate::error::{MiniPresError, Result};
use std::path::Path;

/// Opens `path` with the OS default handler (player, viewer, ...).
///
/// Returns once the handler has been launched; playback itself is not
/// tracked.
pub fn open_artifact(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(MiniPresError::InvalidRequest(format!(
            "{} does not exist",
            path.display()
        )));
    }
    tracing::debug!(path = %path.display(), "opening with default handler");
    open::that(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_artifact_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_artifact(&dir.path().join("video.mp4")).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
