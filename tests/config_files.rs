//! Loading the two INI files the binary takes on its command line.

use ion_gauge_daq::config::{AppConfig, GaugeConfig, RecordingConfig};
use ion_gauge_daq::error::GaugeError;
use ion_gauge_daq::protocol::GaugeModel;
use std::path::Path;
use std::time::Duration;

fn write(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_load_both_files() {
    let dir = tempfile::tempdir().unwrap();
    let gauge = write(
        dir.path(),
        "gauge.ini",
        "[Serial]\nport = /dev/ttyUSB3\nbaudrate = 9600\naddress = 05\ntimeout = 0.5\nmin_delay = 0.1\n",
    );
    let recording = write(
        dir.path(),
        "recording.ini",
        "; pressure log\n[Logging]\nstore_data = true\nh5file = /data/vacuum.h5\ninterval = 2.0\nduration = 10\n",
    );

    let config = AppConfig::load(&gauge, &recording).unwrap();
    assert_eq!(config.gauge.port, "/dev/ttyUSB3");
    assert_eq!(config.gauge.address.value(), 0x05);
    assert_eq!(config.gauge.min_delay, Duration::from_millis(100));
    assert_eq!(config.gauge.model, GaugeModel::Series354);
    assert_eq!(config.recording.store_path(), Some(Path::new("/data/vacuum.h5")));
    assert_eq!(config.recording.interval, Duration::from_secs(2));
    assert_eq!(config.recording.duration, 10);
}

#[test]
fn test_missing_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = GaugeConfig::load(&dir.path().join("absent.ini"));
    assert!(matches!(result, Err(GaugeError::Config(_))));
}

#[test]
fn test_recording_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "recording.ini", "[Logging]\nh5file = run.csv\n");

    let config = RecordingConfig::load(&path).unwrap();
    assert!(config.store_data);
    assert_eq!(config.interval, Duration::from_secs(5));
    assert_eq!(config.duration, 300);
    assert!(config.is_bounded());
}

#[test]
fn test_invalid_values_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let gauge = write(dir.path(), "gauge.ini", "[Serial]\naddress = 100\n");
    assert!(matches!(
        GaugeConfig::load(&gauge),
        Err(GaugeError::Configuration(_))
    ));

    let recording = write(
        dir.path(),
        "recording.ini",
        "[Logging]\nstore_data = false\ninterval = -1\n",
    );
    assert!(matches!(
        RecordingConfig::load(&recording),
        Err(GaugeError::Configuration(_))
    ));
}
