//! How entries reach the trash.

use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::error::{Result, TrashError};

/// Strategy used to send entries to the trash.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrashBackend {
    /// Write the trash layout directly.
    #[default]
    Direct,
    /// Ask the host to trash the entry; used inside a sandbox whose
    /// filesystem view hides the real trash directories.
    HostProxy,
}

impl TrashBackend {
    /// Backend appropriate for the sandbox flag.
    pub fn for_sandbox(sandboxed: bool) -> Self {
        if sandboxed { Self::HostProxy } else { Self::Direct }
    }
}

/// Trash `path` through the host's `gio trash`.
pub(crate) fn host_trash(path: &Path) -> Result<()> {
    debug!(path = %path.display(), "trashing through host");
    let output = Command::new("flatpak-spawn")
        .args(["--host", "gio", "trash"])
        .arg(path)
        .output()
        .map_err(|e| TrashError::Proxy {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(TrashError::Proxy {
            path: path.to_path_buf(),
            message: if stderr.is_empty() {
                output.status.to_string()
            } else {
                stderr
            },
        })
    }
}
