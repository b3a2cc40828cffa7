//! Media persistence helpers
//!
//! Received images and voice messages are written to flat directories with
//! timestamp-derived filenames, which keeps concurrent writers from
//! colliding without any coordination.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

/// Milliseconds since the Unix epoch; feeds generated session ids and
/// media filenames
pub fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

/// Write a media payload into `dir/filename`, creating the directory as
/// needed, and return the full path
pub async fn save_media(dir: &Path, filename: &str, data: &[u8]) -> io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(filename);
    tokio::fs::write(&path, data).await?;
    debug!(path = %path.display(), bytes = data.len(), "media saved");
    Ok(path)
}

/// Remove a temporary media file, logging instead of failing when the file
/// is already gone
pub async fn remove_media(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!("could not remove {}: {e}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_media_creates_dir_and_writes() {
        let tmp = tempfile::tempdir().expect("Should create tempdir");
        let dir = tmp.path().join("images");

        let path = save_media(&dir, "image_1.jpg", b"jpeg-bytes")
            .await
            .expect("Should save");

        assert_eq!(path, dir.join("image_1.jpg"));
        let contents = tokio::fs::read(&path).await.expect("Should read back");
        assert_eq!(contents, b"jpeg-bytes");
    }

    #[tokio::test]
    async fn test_remove_media_tolerates_missing_file() {
        let tmp = tempfile::tempdir().expect("Should create tempdir");
        // Must not panic or error out
        remove_media(&tmp.path().join("gone.jpg")).await;
    }

    #[test]
    fn test_unix_millis_is_monotonic_enough() {
        let a = unix_millis();
        let b = unix_millis();
        assert!(b >= a);
    }
}
