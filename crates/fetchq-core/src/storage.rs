//! Output directory layout: audio and video trees under one base dir.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::job::DownloadMode;

/// Where finished files land, split by mode.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    base: PathBuf,
}

impl OutputLayout {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn dir_for(&self, mode: DownloadMode) -> PathBuf {
        self.base.join(mode.dir_name())
    }

    /// Create the audio and video directories. Called once at startup.
    pub fn ensure(&self) -> Result<()> {
        for mode in [DownloadMode::Mp3, DownloadMode::Mp4] {
            let dir = self.dir_for(mode);
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("create download dir: {}", dir.display()))?;
        }
        Ok(())
    }
}

/// Open a directory in the local file browser. Fire-and-forget: the spawned
/// viewer outlives the request.
pub fn open_folder(path: &Path) -> Result<()> {
    #[cfg(target_os = "macos")]
    let opener = "open";
    #[cfg(target_os = "windows")]
    let opener = "explorer";
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let opener = "xdg-open";

    std::process::Command::new(opener)
        .arg(path)
        .spawn()
        .with_context(|| format!("spawn {} for {}", opener, path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_creates_both_trees() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path().join("dl"));
        layout.ensure().unwrap();
        assert!(dir.path().join("dl/audio").is_dir());
        assert!(dir.path().join("dl/video").is_dir());
    }

    #[test]
    fn dir_for_mode() {
        let layout = OutputLayout::new("/dl");
        assert_eq!(layout.dir_for(DownloadMode::Mp3), PathBuf::from("/dl/audio"));
        assert_eq!(layout.dir_for(DownloadMode::Mp4), PathBuf::from("/dl/video"));
    }

    #[test]
    fn ensure_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path());
        layout.ensure().unwrap();
        layout.ensure().unwrap();
    }
}
