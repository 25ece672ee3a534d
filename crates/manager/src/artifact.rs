//! Whole-file replacement of generated backend configuration.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::Result;

/// Replaces `path` with `contents` in one step.
///
/// The buffer is written to a sibling temporary file and renamed over the
/// target, so readers observe either the previous or the new file, never a
/// partial one.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = temp_path(path);
    let replaced = match fs::write(&tmp, contents).await {
        Ok(()) => fs::rename(&tmp, path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = replaced {
        // The temporary may exist partially written on either failure.
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    debug!("Wrote {} bytes to {}", contents.len(), path.display());
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
