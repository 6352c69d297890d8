use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::analyzer::{AnalyzerSettings, DEFAULT_UPLOAD_QUALITY, DEFAULT_UPLOAD_WIDTH};
use crate::api::ApiConfig;
use crate::evidence::DEFAULT_EVIDENCE_QUALITY;
use crate::ingest::CameraConfig;
use crate::monitor::{MonitorOptions, DEFAULT_MAX_READ_FAILURES};

const DEFAULT_INFERENCE_ENDPOINT: &str = "stub://secure";
const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CAMERA_DEVICE: &str = "stub://camera0";
const DEFAULT_CAMERA_FPS: u32 = 15;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_INTERVAL_SECS: u64 = 15;
const DEFAULT_EVIDENCE_DIR: &str = "evidence";
const DEFAULT_API_ADDR: &str = "127.0.0.1:5001";
const DEFAULT_MQTT_TOPIC: &str = "watchpost/incidents";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct WatchpostConfigFile {
    inference: Option<InferenceConfigFile>,
    camera: Option<CameraConfigFile>,
    capture: Option<CaptureConfigFile>,
    evidence: Option<EvidenceConfigFile>,
    api: Option<ApiConfigFile>,
    notify: Option<NotifyConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct InferenceConfigFile {
    endpoint: Option<String>,
    api_key: Option<String>,
    upload_width: Option<u32>,
    upload_quality: Option<u8>,
    retry_delay_ms: Option<u64>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    device: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CaptureConfigFile {
    interval_secs: Option<u64>,
    max_read_failures: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct EvidenceConfigFile {
    dir: Option<PathBuf>,
    quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ApiConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct NotifyConfigFile {
    webhook_url: Option<String>,
    mqtt_broker: Option<String>,
    mqtt_topic: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WatchpostConfig {
    pub inference: InferenceSettings,
    pub camera: CameraConfig,
    pub capture: CaptureSettings,
    pub evidence: EvidenceSettings,
    pub api_addr: String,
    pub notify: NotifySettings,
}

#[derive(Clone)]
pub struct InferenceSettings {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub upload_width: u32,
    pub upload_quality: u8,
    pub retry_delay: Duration,
    pub timeout: Duration,
}

// Keeps the API key out of debug output.
impl std::fmt::Debug for InferenceSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceSettings")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("upload_width", &self.upload_width)
            .field("upload_quality", &self.upload_quality)
            .field("retry_delay", &self.retry_delay)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub interval: Duration,
    pub max_read_failures: u32,
}

#[derive(Debug, Clone)]
pub struct EvidenceSettings {
    pub dir: PathBuf,
    pub quality: u8,
}

#[derive(Debug, Clone)]
pub struct NotifySettings {
    pub webhook_url: Option<String>,
    pub mqtt_broker: Option<String>,
    pub mqtt_topic: String,
}

impl Default for WatchpostConfig {
    fn default() -> Self {
        Self::from_file(WatchpostConfigFile::default())
    }
}

impl WatchpostConfig {
    /// Defaults, then the file named by `WATCHPOST_CONFIG`, then `WATCHPOST_*`
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("WATCHPOST_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: WatchpostConfigFile) -> Self {
        let inference = file.inference.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        let capture = file.capture.unwrap_or_default();
        let evidence = file.evidence.unwrap_or_default();
        let notify = file.notify.unwrap_or_default();
        Self {
            inference: InferenceSettings {
                endpoint: inference
                    .endpoint
                    .unwrap_or_else(|| DEFAULT_INFERENCE_ENDPOINT.to_string()),
                api_key: inference.api_key,
                upload_width: inference.upload_width.unwrap_or(DEFAULT_UPLOAD_WIDTH),
                upload_quality: inference.upload_quality.unwrap_or(DEFAULT_UPLOAD_QUALITY),
                retry_delay: Duration::from_millis(
                    inference.retry_delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS),
                ),
                timeout: Duration::from_secs(inference.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            },
            camera: CameraConfig {
                device: camera
                    .device
                    .unwrap_or_else(|| DEFAULT_CAMERA_DEVICE.to_string()),
                target_fps: camera.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
            },
            capture: CaptureSettings {
                interval: Duration::from_secs(capture.interval_secs.unwrap_or(DEFAULT_INTERVAL_SECS)),
                max_read_failures: capture
                    .max_read_failures
                    .unwrap_or(DEFAULT_MAX_READ_FAILURES),
            },
            evidence: EvidenceSettings {
                dir: evidence
                    .dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_EVIDENCE_DIR)),
                quality: evidence.quality.unwrap_or(DEFAULT_EVIDENCE_QUALITY),
            },
            api_addr: file
                .api
                .and_then(|api| api.addr)
                .unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
            notify: NotifySettings {
                webhook_url: notify.webhook_url,
                mqtt_broker: notify.mqtt_broker,
                mqtt_topic: notify
                    .mqtt_topic
                    .unwrap_or_else(|| DEFAULT_MQTT_TOPIC.to_string()),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = env_nonempty("WATCHPOST_INFERENCE_URL") {
            self.inference.endpoint = url;
        }
        if let Some(key) = env_nonempty("WATCHPOST_API_KEY") {
            self.inference.api_key = Some(key);
        }
        if let Some(device) = env_nonempty("WATCHPOST_CAMERA") {
            self.camera.device = device;
        }
        if let Some(interval) = env_nonempty("WATCHPOST_CAPTURE_INTERVAL_SECS") {
            let seconds: u64 = interval.parse().map_err(|_| {
                anyhow!("WATCHPOST_CAPTURE_INTERVAL_SECS must be an integer number of seconds")
            })?;
            self.capture.interval = Duration::from_secs(seconds);
        }
        if let Some(dir) = env_nonempty("WATCHPOST_EVIDENCE_DIR") {
            self.evidence.dir = PathBuf::from(dir);
        }
        if let Some(addr) = env_nonempty("WATCHPOST_API_ADDR") {
            self.api_addr = addr;
        }
        if let Some(url) = env_nonempty("WATCHPOST_WEBHOOK_URL") {
            self.notify.webhook_url = Some(url);
        }
        if let Some(broker) = env_nonempty("WATCHPOST_MQTT_BROKER") {
            self.notify.mqtt_broker = Some(broker);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.capture.interval.is_zero() {
            return Err(anyhow!("capture interval must be greater than zero"));
        }
        if self.inference.upload_width == 0 {
            return Err(anyhow!("upload width must be greater than zero"));
        }
        for (name, quality) in [
            ("upload quality", self.inference.upload_quality),
            ("evidence quality", self.evidence.quality),
        ] {
            if !(1..=100).contains(&quality) {
                return Err(anyhow!("{} must be between 1 and 100, got {}", name, quality));
            }
        }
        if self.camera.target_fps == 0 {
            return Err(anyhow!("camera target_fps must be greater than zero"));
        }
        if !self.inference.endpoint.starts_with("stub://") && self.inference.api_key.is_none() {
            return Err(anyhow!(
                "an API key is required for inference endpoint {} (set WATCHPOST_API_KEY)",
                self.inference.endpoint
            ));
        }
        if self.notify.mqtt_topic.trim().is_empty() {
            return Err(anyhow!("mqtt topic must not be empty"));
        }
        Ok(())
    }

    pub fn analyzer_settings(&self) -> AnalyzerSettings {
        AnalyzerSettings {
            upload_width: self.inference.upload_width,
            upload_quality: self.inference.upload_quality,
            retry_delay: self.inference.retry_delay,
            ..AnalyzerSettings::default()
        }
    }

    pub fn monitor_options(&self) -> MonitorOptions {
        MonitorOptions {
            interval: self.capture.interval,
            max_read_failures: self.capture.max_read_failures,
            max_frames: None,
            frame_pause: Duration::from_millis(1000 / u64::from(self.camera.target_fps.max(1))),
        }
    }

    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            addr: self.api_addr.clone(),
            ..ApiConfig::default()
        }
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<WatchpostConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
