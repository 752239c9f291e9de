// Configuration system integration tests

use edge_datasync::config::{load_config, load_config_with_user, SyncConfig};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).expect("Failed to write temp config");
    path
}

#[test]
fn test_load_shipped_config() {
    let config_path = PathBuf::from("config/datasync.yaml");

    if config_path.exists() && std::env::var("DEVICE_ID").is_err() {
        let result = load_config(&config_path);
        assert!(result.is_ok(), "Failed to load shipped config: {:?}", result.err());

        let config = result.unwrap();
        assert_eq!(config.mqtt.client_id, "AirSENCE-Dummy");
        assert_eq!(config.mqtt.qos, 1);
        assert_eq!(config.mqtt.local.port, 1883);
        assert_eq!(config.mqtt.resending_interval(), Duration::from_secs(600));
        assert_eq!(config.server.clock_retry_seconds, 15);
        assert_eq!(config.recovery.program, "fsck.fat");
        assert_eq!(config.logging.format, "text");
    }
}

#[test]
fn test_minimal_config_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "base.yaml", "mqtt:\n  client_id: AirSENCE-77\n");

    let config = load_config(&path).unwrap();
    assert_eq!(config.mqtt.client_id, "AirSENCE-77");
    assert_eq!(config.mqtt.session_client_id(), "AirSENCE-77_DataSync");
    assert_eq!(config.mqtt.publish_timeout(), Duration::from_secs(5));
    assert_eq!(config.mqtt.local.host, "127.0.0.1");
    assert!(config.server.send_raw_data);
    assert!(config.server.log_pollutant);
    assert_eq!(config.server.main_folder, "/mnt/mmcblk0p1");
}

#[test]
fn test_env_default_substitution() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "base.yaml",
        r#"
server:
  main_folder: ${DATASYNC_IT_UNSET_FOLDER:-/data/store}
mqtt:
  client_id: AirSENCE-1
  remote:
    server: ${DATASYNC_IT_REMOTE}
"#,
    );

    std::env::set_var("DATASYNC_IT_REMOTE", "mqtts://iot.example.com:8883");
    let config = load_config(&path).unwrap();
    std::env::remove_var("DATASYNC_IT_REMOTE");

    assert_eq!(config.server.main_folder, "/data/store");
    assert_eq!(config.mqtt.remote.server, "mqtts://iot.example.com:8883");
}

#[test]
fn test_user_file_overrides_present_fields_only() {
    let dir = TempDir::new().unwrap();
    let base = write(
        &dir,
        "base.yaml",
        r#"
server:
  main_folder: /data
  send_raw_data: true
mqtt:
  client_id: AirSENCE-1
  resending_interval_minutes: 10
"#,
    );
    let user = write(
        &dir,
        "user.yaml",
        r#"
server:
  send_raw_data: false
  wait_time_seconds: 30
mqtt:
  resending_interval_minutes: 2
  raw_topic: custom/+/raw
"#,
    );

    if std::env::var("DEVICE_ID").is_ok() || std::env::var("DATASYNC_MAIN_FOLDER").is_ok() {
        return;
    }

    let config = load_config_with_user(&base, Some(&user)).unwrap();
    assert!(!config.server.send_raw_data);
    assert!(config.server.send_pollutant_data);
    assert_eq!(config.server.wait_time_seconds, 30);
    assert_eq!(config.server.main_folder, "/data");
    assert_eq!(config.mqtt.resending_interval_minutes, 2);
    assert_eq!(config.mqtt.raw_topic, "custom/+/raw");
    assert_eq!(config.mqtt.client_id, "AirSENCE-1");
}

#[test]
fn test_broken_user_file_is_ignored() {
    let dir = TempDir::new().unwrap();
    let base = write(&dir, "base.yaml", "mqtt:\n  client_id: AirSENCE-1\n");
    let user = write(&dir, "user.yaml", "server: [this is not a map\n");

    let config = load_config_with_user(&base, Some(&user)).unwrap();
    assert!(config.server.send_raw_data);

    let missing = dir.path().join("missing.yaml");
    assert!(load_config_with_user(&base, Some(&missing)).is_ok());
}

#[test]
fn test_invalid_user_override_fails_validation() {
    let dir = TempDir::new().unwrap();
    let base = write(&dir, "base.yaml", "mqtt:\n  client_id: AirSENCE-1\n");
    let user = write(&dir, "user.yaml", "mqtt:\n  qos: 3\n");

    assert!(load_config_with_user(&base, Some(&user)).is_err());
}

#[test]
fn test_missing_base_file_is_fatal() {
    let dir = TempDir::new().unwrap();
    let result = load_config(dir.path().join("nope.yaml"));
    assert!(result.is_err());
}

#[test]
fn test_invalid_values_rejected() {
    let dir = TempDir::new().unwrap();
    for content in [
        "mqtt:\n  client_id: \"\"\n",
        "mqtt:\n  resending_interval_minutes: 0\n",
        "mqtt:\n  publish_timeout_seconds: 0\n",
        "mqtt:\n  raw_topic: \"\"\n",
        "logging:\n  level: loud\n",
        "logging:\n  format: xml\n",
    ] {
        let path = write(&dir, "bad.yaml", content);
        assert!(load_config(&path).is_err(), "accepted: {}", content);
    }
}

#[test]
fn test_default_config_round_trips_through_yaml() {
    let yaml = serde_yaml::to_string(&SyncConfig::default()).unwrap();
    let parsed: SyncConfig = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(parsed.mqtt.will_topic, "airsence/AUG/+/status");
    assert_eq!(parsed.server.clock_milestone, SyncConfig::default().server.clock_milestone);
}
