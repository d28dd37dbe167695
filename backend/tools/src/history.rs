//! Shell history lookup.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Pick the history file to read.
///
/// An explicit override wins, then `$HISTFILE`, then `~/.bash_history`.
pub fn history_path(
    override_path: Option<&Path>,
    histfile: Option<String>,
    home: Option<PathBuf>,
) -> Option<PathBuf> {
    if let Some(path) = override_path {
        return Some(path.to_path_buf());
    }
    if let Some(path) = histfile.filter(|p| !p.trim().is_empty()) {
        return Some(PathBuf::from(path));
    }
    home.map(|h| h.join(".bash_history"))
}

/// Read the history file, tolerating non-UTF-8 bytes.
pub async fn read_history(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("cannot read shell history at {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
