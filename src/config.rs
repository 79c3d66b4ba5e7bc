use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::frame::DEFAULT_JPEG_QUALITY;
use crate::session::{SessionConfig, DEFAULT_CONFIDENCE_THRESHOLD, LIVE_INTERVAL, UPLOAD_INTERVAL};

const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_SOURCE: &str = "stub://camera";

/// Cadence presets. The live camera client polls every 200 ms; the upload client
/// every 1000 ms.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CadenceProfile {
    Live,
    #[default]
    Upload,
}

impl CadenceProfile {
    pub fn interval(self) -> Duration {
        match self {
            CadenceProfile::Live => LIVE_INTERVAL,
            CadenceProfile::Upload => UPLOAD_INTERVAL,
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "live" => Ok(CadenceProfile::Live),
            "upload" => Ok(CadenceProfile::Upload),
            other => Err(anyhow!(
                "unknown cadence profile '{}'; expected live or upload",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ClientConfigFile {
    backend_url: Option<String>,
    source: Option<String>,
    profile: Option<CadenceProfile>,
    interval_ms: Option<u64>,
    confidence_threshold: Option<f32>,
    jpeg_quality: Option<u8>,
    request_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Frame source spec (`stub://`, `http(s)://`, or a file path).
    pub source: String,
    pub profile: CadenceProfile,
    pub session: SessionConfig,
}

impl ClientConfig {
    /// Load from `DETECT_CONFIG` (JSON, or TOML by extension), then env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("DETECT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ClientConfigFile) -> Self {
        let profile = file.profile.unwrap_or_default();
        let interval = file
            .interval_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| profile.interval());
        Self {
            source: file.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            profile,
            session: SessionConfig {
                backend_url: file
                    .backend_url
                    .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string()),
                interval,
                confidence_threshold: file
                    .confidence_threshold
                    .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
                jpeg_quality: file.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
                request_timeout: file.request_timeout_ms.map(Duration::from_millis),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = env_value("DETECT_BACKEND_URL") {
            self.session.backend_url = url;
        }
        if let Some(source) = env_value("DETECT_SOURCE") {
            self.source = source;
        }
        if let Some(profile) = env_value("DETECT_PROFILE") {
            self.set_profile(CadenceProfile::parse(&profile)?);
        }
        if let Some(interval) = env_value("DETECT_INTERVAL_MS") {
            let millis: u64 = interval
                .parse()
                .map_err(|_| anyhow!("DETECT_INTERVAL_MS must be an integer number of milliseconds"))?;
            self.session.interval = Duration::from_millis(millis);
        }
        if let Some(threshold) = env_value("DETECT_CONFIDENCE_THRESHOLD") {
            self.session.confidence_threshold = threshold
                .parse()
                .map_err(|_| anyhow!("DETECT_CONFIDENCE_THRESHOLD must be a number in [0, 1]"))?;
        }
        if let Some(quality) = env_value("DETECT_JPEG_QUALITY") {
            self.session.jpeg_quality = quality
                .parse()
                .map_err(|_| anyhow!("DETECT_JPEG_QUALITY must be an integer in 1..=100"))?;
        }
        if let Some(timeout) = env_value("DETECT_REQUEST_TIMEOUT_MS") {
            let millis: u64 = timeout.parse().map_err(|_| {
                anyhow!("DETECT_REQUEST_TIMEOUT_MS must be an integer number of milliseconds")
            })?;
            self.session.request_timeout = Some(Duration::from_millis(millis));
        }
        Ok(())
    }

    /// Switch cadence profile, resetting the interval to the profile's default.
    pub fn set_profile(&mut self, profile: CadenceProfile) {
        self.profile = profile;
        self.session.interval = profile.interval();
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.session.backend_url.trim();
        if !url.starts_with("stub://") {
            crate::detect::backends::http::validate_base_url(url)?;
        }
        if self.source.trim().is_empty() {
            return Err(anyhow!("source must not be empty"));
        }
        if self.session.interval.is_zero() {
            return Err(anyhow!("interval must be greater than zero"));
        }
        let threshold = self.session.confidence_threshold;
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(anyhow!(
                "confidence threshold must be in [0, 1], got {}",
                threshold
            ));
        }
        if !(1..=100).contains(&self.session.jpeg_quality) {
            return Err(anyhow!(
                "jpeg quality must be in 1..=100, got {}",
                self.session.jpeg_quality
            ));
        }
        if self.session.request_timeout.is_some_and(|t| t.is_zero()) {
            return Err(anyhow!("request timeout must be greater than zero"));
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_file(ClientConfigFile::default())
    }
}

fn read_config_file(path: &Path) -> Result<ClientConfigFile> {
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

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = ClientConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.session.interval, UPLOAD_INTERVAL);
        assert_eq!(cfg.session.confidence_threshold, 0.5);
        assert_eq!(cfg.session.jpeg_quality, 80);
        assert!(cfg.session.request_timeout.is_none());
    }

    #[test]
    fn profile_sets_interval_unless_explicit() {
        let live = ClientConfig::from_file(ClientConfigFile {
            profile: Some(CadenceProfile::Live),
            ..ClientConfigFile::default()
        });
        assert_eq!(live.session.interval, Duration::from_millis(200));

        let explicit = ClientConfig::from_file(ClientConfigFile {
            profile: Some(CadenceProfile::Live),
            interval_ms: Some(350),
            ..ClientConfigFile::default()
        });
        assert_eq!(explicit.session.interval, Duration::from_millis(350));
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut cfg = ClientConfig::default();
        cfg.session.confidence_threshold = 1.2;
        assert!(cfg.validate().is_err());

        let mut cfg = ClientConfig::default();
        cfg.session.jpeg_quality = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = ClientConfig::default();
        cfg.session.interval = Duration::ZERO;
        assert!(cfg.validate().is_err());

        let mut cfg = ClientConfig::default();
        cfg.session.backend_url = "ftp://detector".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = ClientConfig::default();
        cfg.session.backend_url = "stub://detector".to_string();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn profile_parse() {
        assert_eq!(CadenceProfile::parse(" LIVE ").unwrap(), CadenceProfile::Live);
        assert!(CadenceProfile::parse("fast").is_err());
    }
}
