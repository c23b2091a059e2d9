//! Source identification.
//!
//! A `SourceId` is the stable key naming one capture source across restarts:
//! either a local capture device index or a path to a video file. Workers,
//! the registry, and discovery all key on it; two workers for the same id
//! would mean two capture loops fighting over one device, so the registry
//! enforces uniqueness.

use std::fmt;
use std::path::{Path, PathBuf};

/// Stable identifier for a capture source.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceId {
    /// Local capture device by index (e.g. `/dev/video0` on Linux).
    Device(u32),
    /// Video file on the local filesystem.
    File(PathBuf),
}

impl SourceId {
    /// Parse a configuration spec: a bare non-negative integer names a
    /// device, anything else is treated as a file path.
    pub fn parse(spec: &str) -> Self {
        match spec.trim().parse::<u32>() {
            Ok(index) => SourceId::Device(index),
            Err(_) => SourceId::File(PathBuf::from(spec.trim())),
        }
    }

    /// Short human-readable label derived from the identifier, used when a
    /// worker has no explicit name.
    pub fn default_label(&self) -> String {
        match self {
            SourceId::Device(index) => format!("camera {}", index),
            SourceId::File(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            SourceId::Device(_) => None,
            SourceId::File(path) => Some(path.as_path()),
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::Device(index) => write!(f, "device:{}", index),
            SourceId::File(path) => write!(f, "file:{}", path.display()),
        }
    }
}

impl From<u32> for SourceId {
    fn from(index: u32) -> Self {
        SourceId::Device(index)
    }
}

impl From<PathBuf> for SourceId {
    fn from(path: PathBuf) -> Self {
        SourceId::File(path)
    }
}

impl From<&str> for SourceId {
    fn from(spec: &str) -> Self {
        SourceId::parse(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_distinguishes_devices_and_files() {
        assert_eq!(SourceId::parse("0"), SourceId::Device(0));
        assert_eq!(SourceId::parse(" 3 "), SourceId::Device(3));
        assert_eq!(
            SourceId::parse("videos/a.mp4"),
            SourceId::File(PathBuf::from("videos/a.mp4"))
        );
        // A negative index is not a device.
        assert_eq!(SourceId::parse("-1"), SourceId::File(PathBuf::from("-1")));
    }

    #[test]
    fn default_label_uses_file_name() {
        assert_eq!(SourceId::Device(2).default_label(), "camera 2");
        assert_eq!(
            SourceId::File(PathBuf::from("videos/a.mp4")).default_label(),
            "a.mp4"
        );
    }
}
