//! Moving finished downloads out of a job's staging directory

use crate::error::Result;
use crate::utils::move_to_unique_path;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::fs;
use tracing::debug;

/// Move everything in `staging` into `destination`, then remove `staging`
///
/// Relative subdirectories (playlist folders) are preserved. A file whose
/// name is taken in the destination gets a ` (n)` suffix instead of
/// replacing it, also when several jobs relocate into the same destination
/// at once. Partial downloads left behind by the tool are discarded.
///
/// Returns the final paths of the moved files.
pub async fn relocate(staging: &Path, destination: &Path) -> Result<Vec<PathBuf>> {
    let mut moved = Vec::new();
    if fs::metadata(staging).await.is_err() {
        return Ok(moved);
    }
    move_tree(staging, destination, &mut moved).await?;
    fs::remove_dir_all(staging).await?;
    Ok(moved)
}

fn move_tree<'a>(
    source_dir: &'a Path,
    destination: &'a Path,
    moved: &'a mut Vec<PathBuf>,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        fs::create_dir_all(destination).await?;
        let mut entries = fs::read_dir(source_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let source_path = entry.path();
            let name = entry.file_name();
            let file_type = entry.file_type().await?;

            if file_type.is_dir() {
                move_tree(&source_path, &destination.join(&name), moved).await?;
            } else if file_type.is_file() {
                if is_partial(&name.to_string_lossy()) {
                    debug!(path = ?source_path, "discarding partial download");
                    continue;
                }
                let target = move_to_unique_path(&source_path, &destination.join(&name)).await?;
                debug!(from = ?source_path, to = ?target, "moved download");
                moved.push(target);
            }
        }
        Ok(())
    })
}

/// Leftovers of an interrupted or in-progress download
fn is_partial(name: &str) -> bool {
    name.ends_with(".part")
        || name.ends_with(".ytdl")
        || name.ends_with(".temp")
        || name.contains(".part-Frag")
}
