//! Helpers for tests that need a fake downloader executable.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

static STUB_SEQ: AtomicUsize = AtomicUsize::new(0);

/// Write an executable shell script into `dir` that ignores its arguments
/// and runs `body`. Returns the script path for use as the configured tool.
pub(crate) fn stub_tool(dir: &Path, body: &str) -> String {
    use std::os::unix::fs::PermissionsExt;

    let n = STUB_SEQ.fetch_add(1, Ordering::Relaxed);
    let path = dir.join(format!("stub-tool-{}.sh", n));
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().into_owned()
}
