//! Hardware encode capability.
//!
//! Vendor detection and codec selection are peripheral to the capture core:
//! the capability is probed once at startup and handed to whatever saves or
//! encodes frames, never threaded through the worker abstraction. Detection
//! is best effort — an env override first, then Linux driver probes — and
//! always falls back to software encoding.

use std::path::Path;

const NVIDIA_PROC_PATH: &str = "/proc/driver/nvidia/version";
const DRM_SYSFS_DIR: &str = "/sys/class/drm";
const NVIDIA_PCI_VENDOR: &str = "0x10de";
const AMD_PCI_VENDOR: &str = "0x1002";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    /// No dedicated GPU detected; encode in software.
    Cpu,
}

impl GpuVendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            GpuVendor::Nvidia => "nvidia",
            GpuVendor::Amd => "amd",
            GpuVendor::Cpu => "cpu",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "nvidia" => Some(GpuVendor::Nvidia),
            "amd" => Some(GpuVendor::Amd),
            "cpu" | "none" => Some(GpuVendor::Cpu),
            _ => None,
        }
    }
}

/// H.265 encoder best matched to the vendor.
pub fn preferred_codec(vendor: GpuVendor) -> &'static str {
    match vendor {
        GpuVendor::Nvidia => "hevc_nvenc",
        GpuVendor::Amd => "hevc_amf",
        GpuVendor::Cpu => "libx265",
    }
}

/// Detect the GPU vendor. `FEEDHUB_GPU` overrides probing entirely, which is
/// also the escape hatch when sysfs misreports hybrid setups.
pub fn detect_gpu_vendor() -> GpuVendor {
    if let Ok(value) = std::env::var("FEEDHUB_GPU") {
        if let Some(vendor) = GpuVendor::parse(&value) {
            return vendor;
        }
        log::warn!("FEEDHUB_GPU={} not recognized, probing instead", value);
    }
    probe_drivers()
}

fn probe_drivers() -> GpuVendor {
    if Path::new(NVIDIA_PROC_PATH).exists() {
        return GpuVendor::Nvidia;
    }
    match scan_drm_vendors() {
        Some(vendor) => vendor,
        None => GpuVendor::Cpu,
    }
}

/// Walk `/sys/class/drm/card*/device/vendor` looking for a known PCI vendor
/// id. First match wins; integrated and discrete cards are not told apart.
fn scan_drm_vendors() -> Option<GpuVendor> {
    let entries = std::fs::read_dir(DRM_SYSFS_DIR).ok()?;
    for entry in entries.filter_map(|entry| entry.ok()) {
        let vendor_path = entry.path().join("device/vendor");
        let Ok(raw) = std::fs::read_to_string(&vendor_path) else {
            continue;
        };
        match raw.trim() {
            NVIDIA_PCI_VENDOR => return Some(GpuVendor::Nvidia),
            AMD_PCI_VENDOR => return Some(GpuVendor::Amd),
            _ => {}
        }
    }
    None
}
