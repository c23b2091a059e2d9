//! Source discovery.
//!
//! A `DiscoveryAdapter` answers one question: which source identifiers are
//! reachable right now? It must be idempotent and side-effect-free so the
//! manager can call it on every reconciliation without accumulating state.
//! Discovery results are never cached at module scope — the caller owns the
//! result and decides when to ask again.
//!
//! `FsDiscovery` is the production adapter: probe capture devices by index,
//! then scan a media folder for files with a fixed extension. `StaticDiscovery`
//! serves fixed or test-controlled lists.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::backend::CaptureBackend;
use crate::source::SourceId;

/// Enumerates currently reachable source identifiers.
pub trait DiscoveryAdapter: Send + Sync {
    /// Full ordered list of reachable sources. Devices precede files;
    /// ordering within each group is deterministic.
    fn list_sources(&self) -> Vec<SourceId>;
}

// ----------------------------------------------------------------------------
// Static discovery
// ----------------------------------------------------------------------------

/// Fixed source list, mutable from the outside. Used for explicitly
/// configured deployments and for tests that script sources appearing.
#[derive(Default)]
pub struct StaticDiscovery {
    sources: Mutex<Vec<SourceId>>,
}

impl StaticDiscovery {
    pub fn new(sources: impl IntoIterator<Item = SourceId>) -> Self {
        Self {
            sources: Mutex::new(sources.into_iter().collect()),
        }
    }

    /// Append a source to the advertised list, skipping duplicates.
    pub fn publish(&self, id: SourceId) {
        let mut sources = self.lock_sources();
        if !sources.contains(&id) {
            sources.push(id);
        }
    }

    /// Drop a source from the advertised list.
    pub fn withdraw(&self, id: &SourceId) {
        self.lock_sources().retain(|existing| existing != id);
    }

    fn lock_sources(&self) -> std::sync::MutexGuard<'_, Vec<SourceId>> {
        self.sources
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DiscoveryAdapter for StaticDiscovery {
    fn list_sources(&self) -> Vec<SourceId> {
        self.lock_sources().clone()
    }
}

// ----------------------------------------------------------------------------
// Filesystem + device discovery
// ----------------------------------------------------------------------------

/// Probes device indices through the capture backend and scans a folder for
/// media files with a fixed extension.
pub struct FsDiscovery {
    backend: Arc<dyn CaptureBackend>,
    video_dir: PathBuf,
    extension: String,
    max_devices: u32,
}

impl FsDiscovery {
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        video_dir: impl Into<PathBuf>,
        extension: impl Into<String>,
        max_devices: u32,
    ) -> Self {
        Self {
            backend,
            video_dir: video_dir.into(),
            extension: extension.into(),
            max_devices,
        }
    }

    /// Probe indices `0..max_devices` by opening each through the backend.
    /// The probe handle is dropped immediately, releasing the device. A
    /// device that is busy (already captured by a worker) may fail the
    /// probe; that is harmless because tracked identifiers are never
    /// re-added by reconciliation.
    fn probe_devices(&self) -> Vec<SourceId> {
        (0..self.max_devices)
            .map(SourceId::Device)
            .filter(|id| match self.backend.open(id) {
                Ok(_handle) => true,
                Err(err) => {
                    log::debug!("device probe {}: {}", id, err);
                    false
                }
            })
            .collect()
    }

    /// Scan the media folder for files matching the extension filter,
    /// case-insensitively, sorted by path for deterministic ordering. A
    /// missing folder yields an empty list, not an error.
    fn scan_files(&self) -> Vec<SourceId> {
        let entries = match std::fs::read_dir(&self.video_dir) {
            Ok(entries) => entries,
            Err(err) => {
                log::debug!(
                    "media folder {} not readable: {}",
                    self.video_dir.display(),
                    err
                );
                return Vec::new();
            }
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && has_extension(path, &self.extension))
            .collect();
        paths.sort();
        paths.into_iter().map(SourceId::File).collect()
    }
}

impl DiscoveryAdapter for FsDiscovery {
    fn list_sources(&self) -> Vec<SourceId> {
        let mut sources = self.probe_devices();
        sources.extend(self.scan_files());
        sources
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    let wanted = extension.trim_start_matches('.');
    path.extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(wanted))
        .unwrap_or(false)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::stub::{StubBackend, StubPlan};

    #[test]
    fn static_discovery_publishes_and_withdraws() {
        let discovery = StaticDiscovery::new([SourceId::Device(0)]);
        discovery.publish(SourceId::parse("a.mp4"));
        discovery.publish(SourceId::parse("a.mp4"));
        assert_eq!(discovery.list_sources().len(), 2);

        discovery.withdraw(&SourceId::Device(0));
        assert_eq!(discovery.list_sources(), vec![SourceId::parse("a.mp4")]);
    }

    #[test]
    fn device_probe_lists_only_openable_indices() {
        let backend = StubBackend::new()
            .with_source(0u32, StubPlan::endless(100.0))
            .with_source(1u32, StubPlan::failing())
            .with_source(2u32, StubPlan::endless(100.0));
        let discovery = FsDiscovery::new(
            Arc::new(backend),
            "does-not-exist",
            ".mp4",
            4,
        );

        assert_eq!(
            discovery.list_sources(),
            vec![SourceId::Device(0), SourceId::Device(2)]
        );
    }

    #[test]
    fn extension_filter_is_case_insensitive() {
        assert!(has_extension(Path::new("videos/a.mp4"), ".mp4"));
        assert!(has_extension(Path::new("videos/a.MP4"), ".mp4"));
        assert!(!has_extension(Path::new("videos/a.mkv"), ".mp4"));
        assert!(!has_extension(Path::new("videos/noext"), ".mp4"));
    }
}
