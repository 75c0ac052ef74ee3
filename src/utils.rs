//! Utility functions for file operations and path manipulation

use crate::error::{Error, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Names to try for `path`, in order
///
/// Yields `path` itself, then `name (1).ext`, `name (2).ext`, ... in the same
/// directory.
pub fn candidate_paths(path: &Path) -> Result<impl Iterator<Item = PathBuf>> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| Error::Other(format!("cannot extract file stem from {}", path.display())))?;
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());
    let parent = path
        .parent()
        .ok_or_else(|| Error::Other(format!("cannot extract parent of {}", path.display())))?
        .to_path_buf();

    let numbered = (1..=MAX_RENAME_ATTEMPTS).map(move |i| {
        let new_name = match &extension {
            Some(ext) => format!("{} ({}).{}", stem, i, ext),
            None => format!("{} ({})", stem, i),
        };
        parent.join(new_name)
    });
    Ok(std::iter::once(path.to_path_buf()).chain(numbered))
}

/// Move `source` to `path`, or to the first free name from [`candidate_paths`]
///
/// Every name is claimed atomically: with a hard link, or with an exclusive
/// create followed by a copy where the filesystem cannot link. An existing
/// file is never overwritten, even by another task moving into the same
/// directory at the same time. `source` is removed once its content is in
/// place.
///
/// Returns the path the file ended up at.
///
/// # Examples
///
/// ```no_run
/// use udown::utils::move_to_unique_path;
/// use std::path::Path;
///
/// # async fn example() -> udown::Result<()> {
/// let moved = move_to_unique_path(
///     Path::new("/tmp/staging/video.mp4"),
///     Path::new("/tmp/downloads/video.mp4"),
/// )
/// .await?;
/// // If video.mp4 exists, the file lands at video (1).mp4
/// // If that exists too, at video (2).mp4, etc.
/// # Ok(())
/// # }
/// ```
pub async fn move_to_unique_path(source: &Path, path: &Path) -> Result<PathBuf> {
    for candidate in candidate_paths(path)? {
        match fs::hard_link(source, &candidate).await {
            Ok(()) => {
                fs::remove_file(source).await?;
                return Ok(candidate);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(_) => {}
        }

        // No hard links here (other filesystem, or not supported)
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(claimed) => {
                drop(claimed);
                if let Err(e) = fs::copy(source, &candidate).await {
                    let _ = fs::remove_file(&candidate).await;
                    return Err(e.into());
                }
                fs::remove_file(source).await?;
                return Ok(candidate);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(Error::Io(std::io::Error::new(
        ErrorKind::AlreadyExists,
        format!(
            "could not find a free name for {} after {} attempts",
            path.display(),
            MAX_RENAME_ATTEMPTS
        ),
    )))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_candidate_paths_start_with_the_path_itself() {
        let path = Path::new("/out/clip.mp4");
        let names: Vec<PathBuf> = candidate_paths(path).unwrap().take(3).collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("/out/clip.mp4"),
                PathBuf::from("/out/clip (1).mp4"),
                PathBuf::from("/out/clip (2).mp4"),
            ]
        );
    }

    #[test]
    fn test_candidate_paths_without_extension() {
        let names: Vec<PathBuf> = candidate_paths(Path::new("/out/README"))
            .unwrap()
            .skip(1)
            .take(1)
            .collect();
        assert_eq!(names, vec![PathBuf::from("/out/README (1)")]);
    }

    #[tokio::test]
    async fn test_move_to_free_name_keeps_it() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("staged.mp4");
        let path = dir.path().join("clip.mp4");
        fs::write(&source, b"a").await.unwrap();

        assert_eq!(move_to_unique_path(&source, &path).await.unwrap(), path);
        assert!(!source.exists());
        assert_eq!(fs::read(&path).await.unwrap(), b"a");
    }

    #[tokio::test]
    async fn test_move_adds_counter_instead_of_overwriting() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        fs::write(&path, b"existing").await.unwrap();
        fs::write(dir.path().join("clip (1).mp4"), b"also existing")
            .await
            .unwrap();

        let source = dir.path().join("staged.mp4");
        fs::write(&source, b"new").await.unwrap();

        let moved = move_to_unique_path(&source, &path).await.unwrap();
        assert_eq!(moved, dir.path().join("clip (2).mp4"));
        assert_eq!(fs::read(&path).await.unwrap(), b"existing");
        assert_eq!(fs::read(&moved).await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_move_missing_source_fails_without_leftovers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.mp4");

        assert!(move_to_unique_path(&dir.path().join("gone.mp4"), &path)
            .await
            .is_err());
        assert!(!path.exists());
    }
}
