//! Filesystem discovery against a real temporary media folder.

use std::fs::File;
use std::sync::Arc;

use feedhub::{DiscoveryAdapter, FsDiscovery, SourceId, StubBackend, StubPlan};

#[test]
fn scan_filters_by_extension_and_sorts() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["b.mp4", "a.mp4", "notes.txt", "c.MP4"] {
        File::create(dir.path().join(name)).unwrap();
    }
    std::fs::create_dir(dir.path().join("sub.mp4")).unwrap();

    let discovery = FsDiscovery::new(Arc::new(StubBackend::new()), dir.path(), ".mp4", 0);
    let sources = discovery.list_sources();

    let expected: Vec<SourceId> = ["a.mp4", "b.mp4", "c.MP4"]
        .iter()
        .map(|name| SourceId::File(dir.path().join(name)))
        .collect();
    assert_eq!(sources, expected);
}

#[test]
fn missing_folder_yields_no_files() {
    let discovery = FsDiscovery::new(
        Arc::new(StubBackend::new()),
        "definitely/not/here",
        ".mp4",
        0,
    );
    assert!(discovery.list_sources().is_empty());
}

#[test]
fn devices_come_before_files() {
    let dir = tempfile::tempdir().unwrap();
    File::create(dir.path().join("a.mp4")).unwrap();

    let backend = StubBackend::new().with_source(1u32, StubPlan::endless(100.0));
    let discovery = FsDiscovery::new(Arc::new(backend), dir.path(), ".mp4", 3);

    assert_eq!(
        discovery.list_sources(),
        vec![
            SourceId::Device(1),
            SourceId::File(dir.path().join("a.mp4")),
        ]
    );
}

#[test]
fn listing_twice_gives_the_same_answer() {
    let dir = tempfile::tempdir().unwrap();
    File::create(dir.path().join("a.mp4")).unwrap();

    let backend = StubBackend::new().with_source(0u32, StubPlan::endless(100.0));
    let discovery = FsDiscovery::new(Arc::new(backend), dir.path(), ".mp4", 2);

    assert_eq!(discovery.list_sources(), discovery.list_sources());
}
