use std::sync::Mutex;
use std::time::Duration;

use tempfile::{Builder, NamedTempFile};

use watchpost::config::WatchpostConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "WATCHPOST_CONFIG",
        "WATCHPOST_INFERENCE_URL",
        "WATCHPOST_API_KEY",
        "WATCHPOST_CAMERA",
        "WATCHPOST_CAPTURE_INTERVAL_SECS",
        "WATCHPOST_EVIDENCE_DIR",
        "WATCHPOST_API_ADDR",
        "WATCHPOST_WEBHOOK_URL",
        "WATCHPOST_MQTT_BROKER",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = WatchpostConfig::load().expect("load defaults");
    assert_eq!(cfg.inference.endpoint, "stub://secure");
    assert_eq!(cfg.inference.upload_width, 480);
    assert_eq!(cfg.inference.upload_quality, 50);
    assert_eq!(cfg.inference.retry_delay, Duration::from_secs(1));
    assert_eq!(cfg.camera.device, "stub://camera0");
    assert_eq!(cfg.capture.interval, Duration::from_secs(15));
    assert_eq!(cfg.capture.max_read_failures, 30);
    assert_eq!(cfg.evidence.dir.to_str(), Some("evidence"));
    assert_eq!(cfg.evidence.quality, 95);
    assert_eq!(cfg.api_addr, "127.0.0.1:5001");
    assert_eq!(cfg.notify.mqtt_topic, "watchpost/incidents");
    assert!(cfg.notify.webhook_url.is_none());
}

#[test]
fn loads_json_config_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "inference": {
            "endpoint": "https://vision.example/v1/classify",
            "api_key": "file-key",
            "upload_width": 320,
            "retry_delay_ms": 250
        },
        "camera": {
            "device": "/dev/video2",
            "target_fps": 10,
            "width": 800,
            "height": 600
        },
        "capture": { "interval_secs": 30, "max_read_failures": 5 },
        "evidence": { "dir": "/var/lib/watchpost", "quality": 90 },
        "api": { "addr": "0.0.0.0:8080" },
        "notify": { "mqtt_topic": "site/incidents" }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("WATCHPOST_CONFIG", file.path());
    std::env::set_var("WATCHPOST_API_KEY", "env-key");
    std::env::set_var("WATCHPOST_CAPTURE_INTERVAL_SECS", "5");
    std::env::set_var("WATCHPOST_MQTT_BROKER", "mqtt://broker.local:1883");

    let cfg = WatchpostConfig::load().expect("load config");

    assert_eq!(cfg.inference.endpoint, "https://vision.example/v1/classify");
    assert_eq!(cfg.inference.api_key.as_deref(), Some("env-key"));
    assert_eq!(cfg.inference.upload_width, 320);
    assert_eq!(cfg.inference.retry_delay, Duration::from_millis(250));
    assert_eq!(cfg.camera.device, "/dev/video2");
    assert_eq!(cfg.camera.width, 800);
    assert_eq!(cfg.capture.interval, Duration::from_secs(5));
    assert_eq!(cfg.capture.max_read_failures, 5);
    assert_eq!(cfg.evidence.quality, 90);
    assert_eq!(cfg.api_addr, "0.0.0.0:8080");
    assert_eq!(cfg.notify.mqtt_broker.as_deref(), Some("mqtt://broker.local:1883"));
    assert_eq!(cfg.notify.mqtt_topic, "site/incidents");

    let options = cfg.monitor_options();
    assert_eq!(options.interval, Duration::from_secs(5));
    assert_eq!(options.frame_pause, Duration::from_millis(100));
    assert!(!format!("{:?}", cfg).contains("env-key"));

    clear_env();
}

#[test]
fn loads_toml_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
[inference]
endpoint = "stub://offline"

[evidence]
dir = "incidents"

[notify]
webhook_url = "http://127.0.0.1:9000/hook"
"#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");
    std::env::set_var("WATCHPOST_CONFIG", file.path());

    let cfg = WatchpostConfig::load().expect("load toml config");
    assert_eq!(cfg.inference.endpoint, "stub://offline");
    assert_eq!(cfg.evidence.dir.to_str(), Some("incidents"));
    assert_eq!(
        cfg.notify.webhook_url.as_deref(),
        Some("http://127.0.0.1:9000/hook")
    );

    clear_env();
}

#[test]
fn remote_endpoint_requires_api_key() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("WATCHPOST_INFERENCE_URL", "https://vision.example/v1/classify");
    let err = WatchpostConfig::load().expect_err("missing key must fail");
    assert!(err.to_string().contains("API key"));

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("WATCHPOST_CAPTURE_INTERVAL_SECS", "0");
    assert!(WatchpostConfig::load().is_err());
    std::env::set_var("WATCHPOST_CAPTURE_INTERVAL_SECS", "soon");
    assert!(WatchpostConfig::load().is_err());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, br#"{ "evidence": { "quality": 0 } }"#)
        .expect("write config");
    std::env::set_var("WATCHPOST_CONFIG", file.path());
    assert!(WatchpostConfig::load().is_err());

    let mut unknown = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut unknown, br#"{ "evidnce": {} }"#).expect("write config");
    std::env::set_var("WATCHPOST_CONFIG", unknown.path());
    assert!(WatchpostConfig::load().is_err());

    clear_env();
}
