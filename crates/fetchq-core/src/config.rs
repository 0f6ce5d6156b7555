use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Global configuration loaded from `~/.config/fetchq/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchqConfig {
    /// Maximum jobs downloading at once when queue mode is off.
    pub max_parallel: usize,
    /// Maximum entries kept in the history file (newest first).
    pub max_history_entries: usize,
    /// Base directory for downloads; `audio/` and `video/` live under it.
    pub download_dir: PathBuf,
    /// Path of the history file. Defaults next to the download dir.
    #[serde(default)]
    pub history_file: Option<PathBuf>,
    /// Seconds before a metadata probe is abandoned.
    pub probe_timeout_secs: u64,
    /// Milliseconds granted to a cancelled job's process to exit before its
    /// registry record is removed.
    pub cancel_grace_ms: u64,
    /// Optional wall-clock bound on a download job in seconds (None = unbounded).
    #[serde(default)]
    pub job_timeout_secs: Option<u64>,
    /// External downloader executable.
    #[serde(default)]
    pub tool: Option<String>,
    /// User-Agent handed to the downloader. Defaults to a desktop Chrome string.
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for FetchqConfig {
    fn default() -> Self {
        Self {
            max_parallel: 3,
            max_history_entries: 50,
            download_dir: PathBuf::from("downloads"),
            history_file: None,
            probe_timeout_secs: 30,
            cancel_grace_ms: 600,
            job_timeout_secs: None,
            tool: None,
            user_agent: None,
        }
    }
}

impl FetchqConfig {
    pub fn tool(&self) -> &str {
        self.tool.as_deref().unwrap_or("yt-dlp")
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        )
    }

    /// History file path: explicit setting, or `history.json` beside the download dir.
    pub fn history_path(&self) -> PathBuf {
        self.history_file
            .clone()
            .unwrap_or_else(|| self.download_dir.join("history.json"))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("fetchq")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<FetchqConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = FetchqConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: FetchqConfig = toml::from_str(&data)?;
    Ok(cfg)
}
