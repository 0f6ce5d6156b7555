//! Metadata probe: ask the downloader for title and thumbnail without
//! downloading anything, bounded by a timeout.
//!
//! Failures are classified into a fixed taxonomy by string-matching the
//! tool's diagnostics. That is policy over text we don't control, so the
//! matching lives in one function with tests pinning each marker.

use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

use crate::config::FetchqConfig;
use crate::ytdlp;

/// Metadata returned by a successful probe.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct MediaInfo {
    pub title: String,
    pub thumbnail: String,
}

/// Why a probe failed, with user-facing messages.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("YouTube bot detection. Try: 1) Sign into Chrome/Firefox 2) Install cookies.txt")]
    BotDetection,
    #[error("Video is unavailable or private")]
    Unavailable,
    #[error("Age-restricted video. Sign into your browser first.")]
    AgeRestricted,
    #[error("Premium-only content")]
    PremiumOnly,
    #[error("Node.js required. Install: sudo apt install nodejs")]
    MissingJsRuntime,
    #[error("Failed to extract video info. The site may be blocking requests.")]
    ExtractionBlocked,
    #[error("Request timed out")]
    Timeout,
    #[error("No data returned from the downloader")]
    EmptyOutput,
    #[error("Invalid output from the downloader")]
    MalformedOutput,
    #[error("downloader error: {0}")]
    Tool(String),
    #[error("failed to launch the downloader")]
    Spawn(#[source] std::io::Error),
}

/// Map a nonzero-exit diagnostic to its taxonomy variant.
/// The age check runs before the bot check: both messages begin with
/// "Sign in to confirm".
pub fn classify_tool_error(diagnostic: &str) -> ProbeError {
    if diagnostic.contains("Sign in to confirm your age") {
        ProbeError::AgeRestricted
    } else if diagnostic.contains("Sign in to confirm") {
        ProbeError::BotDetection
    } else if diagnostic.contains("Video unavailable") {
        ProbeError::Unavailable
    } else if diagnostic.contains("This video is available to Music Premium members") {
        ProbeError::PremiumOnly
    } else if diagnostic.contains("No supported JavaScript runtime") {
        ProbeError::MissingJsRuntime
    } else if diagnostic.contains("ERROR: unable to extract")
        || diagnostic.contains("ERROR: unable to download")
    {
        ProbeError::ExtractionBlocked
    } else {
        ProbeError::Tool(truncate(diagnostic, 200))
    }
}

fn truncate(s: &str, max: usize) -> String {
    let s = s.trim();
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Run the probe command and extract title/thumbnail from its JSON output.
pub async fn probe(cfg: &FetchqConfig, url: &str) -> Result<MediaInfo, ProbeError> {
    let cmd = ytdlp::probe_command(cfg, url);
    tracing::info!(url, "probing metadata");

    let child = Command::new(&cmd[0])
        .args(&cmd[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(ProbeError::Spawn)?;

    // Dropping the wait future on timeout kills the child (kill_on_drop).
    let timeout = Duration::from_secs(cfg.probe_timeout_secs);
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Err(_) => {
            tracing::warn!(url, timeout_secs = cfg.probe_timeout_secs, "probe timed out");
            return Err(ProbeError::Timeout);
        }
        Ok(Err(e)) => return Err(ProbeError::Spawn(e)),
        Ok(Ok(out)) => out,
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    if !output.status.success() {
        let diagnostic = if stderr.trim().is_empty() { &stdout } else { &stderr };
        tracing::error!(
            url,
            code = output.status.code(),
            "probe failed: {}",
            truncate(diagnostic, 500)
        );
        return Err(classify_tool_error(diagnostic));
    }

    if stdout.trim().is_empty() {
        tracing::error!(url, "probe returned no output");
        return Err(ProbeError::EmptyOutput);
    }
    parse_metadata(&stdout).ok_or_else(|| {
        tracing::error!(url, "no metadata JSON in probe output: {}", truncate(&stdout, 200));
        ProbeError::MalformedOutput
    })
}

/// Pick the metadata object out of probe stdout. Warnings may surround it, so
/// scan for the first line that is a whole JSON object.
fn parse_metadata(stdout: &str) -> Option<MediaInfo> {
    for line in stdout.lines() {
        let line = line.trim();
        if !(line.starts_with('{') && line.ends_with('}')) {
            continue;
        }
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(line) {
            let title = value
                .get("title")
                .and_then(|t| t.as_str())
                .unwrap_or("Unknown")
                .to_string();
            let thumbnail = value
                .get("thumbnail")
                .and_then(|t| t.as_str())
                .unwrap_or_default()
                .to_string();
            return Some(MediaInfo { title, thumbnail });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_known_markers() {
        assert!(matches!(
            classify_tool_error("ERROR: Sign in to confirm you're not a bot"),
            ProbeError::BotDetection
        ));
        assert!(matches!(
            classify_tool_error("ERROR: Sign in to confirm your age"),
            ProbeError::AgeRestricted
        ));
        assert!(matches!(
            classify_tool_error("ERROR: Video unavailable"),
            ProbeError::Unavailable
        ));
        assert!(matches!(
            classify_tool_error("This video is available to Music Premium members"),
            ProbeError::PremiumOnly
        ));
        assert!(matches!(
            classify_tool_error("No supported JavaScript runtime found"),
            ProbeError::MissingJsRuntime
        ));
        assert!(matches!(
            classify_tool_error("ERROR: unable to extract player response"),
            ProbeError::ExtractionBlocked
        ));
        assert!(matches!(
            classify_tool_error("ERROR: unable to download webpage"),
            ProbeError::ExtractionBlocked
        ));
    }

    #[test]
    fn classify_unknown_truncates() {
        let long = "x".repeat(500);
        match classify_tool_error(&long) {
            ProbeError::Tool(msg) => assert_eq!(msg.len(), 200),
            other => panic!("expected Tool, got {:?}", other),
        }
    }

    #[test]
    fn parse_metadata_picks_json_line() {
        let out = "WARNING: something\n{\"title\": \"A Song\", \"thumbnail\": \"https://i.ytimg.com/t.jpg\"}\n";
        let info = parse_metadata(out).unwrap();
        assert_eq!(info.title, "A Song");
        assert_eq!(info.thumbnail, "https://i.ytimg.com/t.jpg");
    }

    #[test]
    fn parse_metadata_defaults_missing_fields() {
        let info = parse_metadata("{\"id\": \"abc\"}").unwrap();
        assert_eq!(info.title, "Unknown");
        assert_eq!(info.thumbnail, "");
    }

    #[test]
    fn parse_metadata_rejects_garbage() {
        assert!(parse_metadata("no json here").is_none());
        assert!(parse_metadata("{broken").is_none());
    }

    #[cfg(unix)]
    mod with_stub_tool {
        use super::*;
        use crate::test_support::stub_tool;

        #[tokio::test]
        async fn probe_success_via_stub() {
            let dir = tempfile::tempdir().unwrap();
            let tool = stub_tool(
                dir.path(),
                "echo '{\"title\": \"Stub Video\", \"thumbnail\": \"thumb.jpg\"}'",
            );
            let cfg = FetchqConfig {
                tool: Some(tool),
                ..FetchqConfig::default()
            };
            let info = probe(&cfg, "https://example.com/v").await.unwrap();
            assert_eq!(info.title, "Stub Video");
            assert_eq!(info.thumbnail, "thumb.jpg");
        }

        #[tokio::test]
        async fn probe_classifies_nonzero_exit() {
            let dir = tempfile::tempdir().unwrap();
            let tool = stub_tool(dir.path(), "echo 'ERROR: Video unavailable' >&2; exit 1");
            let cfg = FetchqConfig {
                tool: Some(tool),
                ..FetchqConfig::default()
            };
            match probe(&cfg, "https://example.com/v").await {
                Err(ProbeError::Unavailable) => {}
                other => panic!("expected Unavailable, got {:?}", other),
            }
        }

        #[tokio::test]
        async fn probe_times_out() {
            let dir = tempfile::tempdir().unwrap();
            let tool = stub_tool(dir.path(), "sleep 5");
            let cfg = FetchqConfig {
                tool: Some(tool),
                probe_timeout_secs: 1,
                ..FetchqConfig::default()
            };
            match probe(&cfg, "https://example.com/v").await {
                Err(ProbeError::Timeout) => {}
                other => panic!("expected Timeout, got {:?}", other),
            }
        }

        #[tokio::test]
        async fn probe_rejects_empty_and_malformed_output() {
            let dir = tempfile::tempdir().unwrap();
            let cfg = FetchqConfig {
                tool: Some(stub_tool(dir.path(), "true")),
                ..FetchqConfig::default()
            };
            assert!(matches!(
                probe(&cfg, "u").await,
                Err(ProbeError::EmptyOutput)
            ));

            let cfg = FetchqConfig {
                tool: Some(stub_tool(dir.path(), "echo 'not json at all'")),
                ..FetchqConfig::default()
            };
            assert!(matches!(
                probe(&cfg, "u").await,
                Err(ProbeError::MalformedOutput)
            ));
        }
    }
}
