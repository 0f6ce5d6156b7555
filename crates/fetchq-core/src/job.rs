//! Job model: one tracked request to produce a media file from a URL.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Requested output: audio-only mp3 or full video mp4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadMode {
    Mp3,
    Mp4,
}

impl DownloadMode {
    /// Subdirectory under the download base dir for this mode.
    pub fn dir_name(self) -> &'static str {
        match self {
            DownloadMode::Mp3 => "audio",
            DownloadMode::Mp4 => "video",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DownloadMode::Mp3 => "mp3",
            DownloadMode::Mp4 => "mp4",
        }
    }
}

impl std::str::FromStr for DownloadMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mp3" => Ok(DownloadMode::Mp3),
            "mp4" => Ok(DownloadMode::Mp4),
            _ => Err(()),
        }
    }
}

/// Lifecycle state. `Done`, `Error` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Starting,
    Downloading,
    Done,
    Error,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Done | JobStatus::Error | JobStatus::Cancelled
        )
    }
}

/// One tracked download. Owned exclusively by the registry; the runner holds
/// the child process itself and reports back through the registry lock.
#[derive(Debug)]
pub struct Job {
    pub id: String,
    pub url: String,
    /// Display name used for the history entry. The submitted URL until the
    /// downloader tells us better.
    pub title: String,
    pub mode: DownloadMode,
    /// Directory the output file lands in.
    pub folder: PathBuf,
    pub status: JobStatus,
    pub percent: f64,
    pub speed: String,
    pub eta: String,
    /// Full launch command (program + args), built at submission time.
    pub cmd: Vec<String>,
    /// Pid of the running child. Set on spawn, cleared on exit; at most one
    /// process is ever associated with a job.
    pub pid: Option<u32>,
    /// Fired by `cancel` to ask the runner to terminate the process.
    pub cancel: CancellationToken,
    /// Completion latch: fired once the runner has fully torn the job down,
    /// so cancellation cleanup can wait for it instead of a blind sleep.
    pub finished: CancellationToken,
}

impl Job {
    pub fn new(
        id: String,
        url: String,
        mode: DownloadMode,
        folder: PathBuf,
        status: JobStatus,
        cmd: Vec<String>,
    ) -> Self {
        Self {
            id,
            title: url.clone(),
            url,
            mode,
            folder,
            status,
            percent: 0.0,
            speed: String::new(),
            eta: String::new(),
            cmd,
            pid: None,
            cancel: CancellationToken::new(),
            finished: CancellationToken::new(),
        }
    }
}

/// Read-only per-job view returned to polling clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub status: JobStatus,
    pub percent: f64,
    pub speed: String,
    pub eta: String,
    pub mode: DownloadMode,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            status: job.status,
            percent: job.percent,
            speed: job.speed.clone(),
            eta: job.eta.clone(),
            mode: job.mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parse_and_dirs() {
        assert_eq!("mp3".parse::<DownloadMode>(), Ok(DownloadMode::Mp3));
        assert_eq!("mp4".parse::<DownloadMode>(), Ok(DownloadMode::Mp4));
        assert!("wav".parse::<DownloadMode>().is_err());
        assert_eq!(DownloadMode::Mp3.dir_name(), "audio");
        assert_eq!(DownloadMode::Mp4.dir_name(), "video");
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Downloading).unwrap(),
            "\"downloading\""
        );
        assert_eq!(
            serde_json::to_string(&JobStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
    }

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Done.is_terminal());
        assert!(JobStatus::Error.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Starting.is_terminal());
        assert!(!JobStatus::Downloading.is_terminal());
    }
}
