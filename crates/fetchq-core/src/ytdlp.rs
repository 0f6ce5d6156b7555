//! Command construction for the external downloader.
//!
//! The option set is the wire contract with yt-dlp: structured per-line
//! progress on stdout for downloads, a single metadata JSON object for
//! probes. Retry counts and the socket timeout are fixed; going cookieless
//! avoids tripping bot detection on most videos.

use crate::config::FetchqConfig;
use crate::job::DownloadMode;
use std::path::Path;

/// Options shared by downloads and probes.
fn common_opts(cfg: &FetchqConfig) -> Vec<String> {
    vec![
        "--user-agent".into(),
        cfg.user_agent().to_string(),
        "--no-playlist".into(),
        "--extractor-retries".into(),
        "5".into(),
        "--retries".into(),
        "10".into(),
        "--fragment-retries".into(),
        "10".into(),
        "--socket-timeout".into(),
        "30".into(),
    ]
}

/// Full launch command (program + args) for a download job.
/// Output lands under `outdir` named by the media title; mp3 re-encodes to
/// audio, mp4 lets the tool pick and merge the best streams itself.
pub fn download_command(
    cfg: &FetchqConfig,
    url: &str,
    mode: DownloadMode,
    outdir: &Path,
) -> Vec<String> {
    let mut cmd = vec![cfg.tool().to_string()];
    cmd.extend(common_opts(cfg));
    cmd.extend([
        "--newline".to_string(),
        "--no-warnings".to_string(),
        "--progress-template".to_string(),
        "%(progress)j".to_string(),
    ]);
    if mode == DownloadMode::Mp3 {
        cmd.extend([
            "-x".to_string(),
            "--audio-format".to_string(),
            "mp3".to_string(),
            "--audio-quality".to_string(),
            "0".to_string(),
        ]);
    }
    cmd.extend([
        "-o".to_string(),
        format!("{}/%(title)s.%(ext)s", outdir.display()),
        url.to_string(),
    ]);
    cmd
}

/// Full launch command for a metadata-only probe: one JSON object on stdout,
/// nothing downloaded. `--no-warnings` keeps warnings out of the JSON stream.
pub fn probe_command(cfg: &FetchqConfig, url: &str) -> Vec<String> {
    let mut cmd = vec![cfg.tool().to_string()];
    cmd.extend(common_opts(cfg));
    cmd.extend([
        "--dump-json".to_string(),
        "--skip-download".to_string(),
        "--no-warnings".to_string(),
        "--sleep-requests".to_string(),
        "1".to_string(),
        url.to_string(),
    ]);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn cfg() -> FetchqConfig {
        FetchqConfig::default()
    }

    #[test]
    fn download_command_mp4_shape() {
        let out = PathBuf::from("/dl/video");
        let cmd = download_command(&cfg(), "https://example.com/v", DownloadMode::Mp4, &out);
        assert_eq!(cmd[0], "yt-dlp");
        assert!(cmd.contains(&"--no-playlist".to_string()));
        assert!(cmd.contains(&"--progress-template".to_string()));
        assert!(cmd.contains(&"%(progress)j".to_string()));
        // mp4 never forces a format; the tool selects and merges.
        assert!(!cmd.contains(&"-x".to_string()));
        assert!(cmd.contains(&"/dl/video/%(title)s.%(ext)s".to_string()));
        assert_eq!(cmd.last().unwrap(), "https://example.com/v");
    }

    #[test]
    fn download_command_mp3_extracts_audio() {
        let out = PathBuf::from("/dl/audio");
        let cmd = download_command(&cfg(), "https://example.com/v", DownloadMode::Mp3, &out);
        let x = cmd.iter().position(|a| a == "-x").expect("-x present");
        assert_eq!(cmd[x + 1], "--audio-format");
        assert_eq!(cmd[x + 2], "mp3");
        assert_eq!(cmd[x + 3], "--audio-quality");
        assert_eq!(cmd[x + 4], "0");
    }

    #[test]
    fn probe_command_shape() {
        let cmd = probe_command(&cfg(), "https://example.com/v");
        assert_eq!(cmd[0], "yt-dlp");
        assert!(cmd.contains(&"--dump-json".to_string()));
        assert!(cmd.contains(&"--skip-download".to_string()));
        assert!(cmd.contains(&"--no-warnings".to_string()));
        // Probes never carry the progress template.
        assert!(!cmd.contains(&"--progress-template".to_string()));
        assert_eq!(cmd.last().unwrap(), "https://example.com/v");
    }

    #[test]
    fn tool_override_respected() {
        let cfg = FetchqConfig {
            tool: Some("/opt/yt-dlp".to_string()),
            ..FetchqConfig::default()
        };
        assert_eq!(probe_command(&cfg, "u")[0], "/opt/yt-dlp");
    }
}
