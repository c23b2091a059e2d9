use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use feedhub::{FeedhubConfig, SourceId};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "FEEDHUB_CONFIG",
        "FEEDHUB_VIDEO_DIR",
        "FEEDHUB_EXTENSION",
        "FEEDHUB_MAX_DEVICES",
        "FEEDHUB_SOURCES",
        "FEEDHUB_TARGET_FPS",
        "FEEDHUB_POLL_MS",
        "FEEDHUB_RECONCILE_SECS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_apply_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = FeedhubConfig::load().expect("load config");
    assert_eq!(cfg.video_dir.to_string_lossy(), "videos");
    assert_eq!(cfg.extension, ".mp4");
    assert_eq!(cfg.max_devices, 10);
    assert!(cfg.sources.is_empty());
    assert_eq!(cfg.capture.target_fps, 30);
    assert_eq!(cfg.reconcile_interval, Some(Duration::from_secs(30)));
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let toml = r#"
        video_dir = "media"
        extension = ".mkv"
        max_devices = 2
        sources = ["0", "media/a.mkv"]

        [capture]
        target_fps = 15
        width = 800
        height = 600

        [daemon]
        poll_ms = 50
        reconcile_secs = 0
    "#;
    file.write_all(toml.as_bytes()).expect("write config");

    std::env::set_var("FEEDHUB_CONFIG", file.path());
    std::env::set_var("FEEDHUB_EXTENSION", ".avi");
    std::env::set_var("FEEDHUB_RECONCILE_SECS", "60");

    let cfg = FeedhubConfig::load().expect("load config");
    assert_eq!(cfg.video_dir.to_string_lossy(), "media");
    // Env wins over file.
    assert_eq!(cfg.extension, ".avi");
    assert_eq!(cfg.max_devices, 2);
    assert_eq!(
        cfg.sources,
        vec![SourceId::Device(0), SourceId::parse("media/a.mkv")]
    );
    assert_eq!(cfg.capture.target_fps, 15);
    assert_eq!(cfg.capture.width, 800);
    assert_eq!(cfg.poll_interval, Duration::from_millis(50));
    assert_eq!(cfg.reconcile_interval, Some(Duration::from_secs(60)));

    clear_env();
}

#[test]
fn zero_reconcile_secs_disables_unattended_passes() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("FEEDHUB_RECONCILE_SECS", "0");
    let cfg = FeedhubConfig::load().expect("load config");
    assert_eq!(cfg.reconcile_interval, None);

    clear_env();
}

#[test]
fn invalid_overrides_fail_loudly() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("FEEDHUB_TARGET_FPS", "0");
    assert!(FeedhubConfig::load().is_err());

    clear_env();
    std::env::set_var("FEEDHUB_MAX_DEVICES", "many");
    assert!(FeedhubConfig::load().is_err());

    clear_env();
}
