//! Daemon configuration.
//!
//! Layering, lowest precedence first: built-in defaults, a TOML file named
//! by `FEEDHUB_CONFIG`, then `FEEDHUB_*` environment variables. `validate`
//! runs last so a bad override fails loudly at startup instead of surfacing
//! as a confusing runtime default.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::CaptureSettings;
use crate::source::SourceId;

const DEFAULT_VIDEO_DIR: &str = "videos";
const DEFAULT_EXTENSION: &str = ".mp4";
const DEFAULT_MAX_DEVICES: u32 = 10;
const DEFAULT_POLL_MS: u64 = 33;
const DEFAULT_RECONCILE_SECS: u64 = 30;

#[derive(Debug, Deserialize, Default)]
struct FeedhubConfigFile {
    video_dir: Option<PathBuf>,
    extension: Option<String>,
    max_devices: Option<u32>,
    /// Explicit source specs ("0", "videos/a.mp4"). Empty or absent means
    /// start from discovery alone.
    sources: Option<Vec<String>>,
    capture: Option<CaptureConfigFile>,
    daemon: Option<DaemonConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DaemonConfigFile {
    poll_ms: Option<u64>,
    /// Seconds between unattended reconcile passes; 0 disables them.
    reconcile_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct FeedhubConfig {
    pub video_dir: PathBuf,
    pub extension: String,
    pub max_devices: u32,
    pub sources: Vec<SourceId>,
    pub capture: CaptureSettings,
    pub poll_interval: Duration,
    pub reconcile_interval: Option<Duration>,
}

impl FeedhubConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("FEEDHUB_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => read_config_file(Path::new(path))?,
            None => FeedhubConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: FeedhubConfigFile) -> Self {
        let capture_file = file.capture.unwrap_or_default();
        let defaults = CaptureSettings::default();
        let capture = CaptureSettings {
            target_fps: capture_file.target_fps.unwrap_or(defaults.target_fps),
            width: capture_file.width.unwrap_or(defaults.width),
            height: capture_file.height.unwrap_or(defaults.height),
        };
        let daemon = file.daemon.unwrap_or_default();
        Self {
            video_dir: file
                .video_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_VIDEO_DIR)),
            extension: file
                .extension
                .unwrap_or_else(|| DEFAULT_EXTENSION.to_string()),
            max_devices: file.max_devices.unwrap_or(DEFAULT_MAX_DEVICES),
            sources: file
                .sources
                .unwrap_or_default()
                .iter()
                .map(|spec| SourceId::parse(spec))
                .collect(),
            capture,
            poll_interval: Duration::from_millis(daemon.poll_ms.unwrap_or(DEFAULT_POLL_MS)),
            reconcile_interval: reconcile_interval(
                daemon.reconcile_secs.unwrap_or(DEFAULT_RECONCILE_SECS),
            ),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("FEEDHUB_VIDEO_DIR") {
            if !dir.trim().is_empty() {
                self.video_dir = PathBuf::from(dir);
            }
        }
        if let Ok(extension) = std::env::var("FEEDHUB_EXTENSION") {
            if !extension.trim().is_empty() {
                self.extension = extension;
            }
        }
        if let Ok(max) = std::env::var("FEEDHUB_MAX_DEVICES") {
            self.max_devices = max
                .parse()
                .map_err(|_| anyhow!("FEEDHUB_MAX_DEVICES must be an integer"))?;
        }
        if let Ok(sources) = std::env::var("FEEDHUB_SOURCES") {
            let parsed: Vec<SourceId> = split_csv(&sources)
                .iter()
                .map(|spec| SourceId::parse(spec))
                .collect();
            if !parsed.is_empty() {
                self.sources = parsed;
            }
        }
        if let Ok(fps) = std::env::var("FEEDHUB_TARGET_FPS") {
            self.capture.target_fps = fps
                .parse()
                .map_err(|_| anyhow!("FEEDHUB_TARGET_FPS must be an integer"))?;
        }
        if let Ok(poll) = std::env::var("FEEDHUB_POLL_MS") {
            let millis: u64 = poll
                .parse()
                .map_err(|_| anyhow!("FEEDHUB_POLL_MS must be an integer number of ms"))?;
            self.poll_interval = Duration::from_millis(millis);
        }
        if let Ok(secs) = std::env::var("FEEDHUB_RECONCILE_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|_| anyhow!("FEEDHUB_RECONCILE_SECS must be an integer of seconds"))?;
            self.reconcile_interval = reconcile_interval(secs);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.extension.trim_start_matches('.').is_empty() {
            return Err(anyhow!("extension filter must not be empty"));
        }
        if self.capture.target_fps == 0 {
            return Err(anyhow!("capture target_fps must be greater than zero"));
        }
        if self.poll_interval.is_zero() {
            return Err(anyhow!("poll interval must be greater than zero"));
        }
        Ok(())
    }
}

fn reconcile_interval(secs: u64) -> Option<Duration> {
    if secs == 0 {
        None
    } else {
        Some(Duration::from_secs(secs))
    }
}

fn read_config_file(path: &Path) -> Result<FeedhubConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
