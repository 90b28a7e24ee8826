use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::audio::{SinkError, SinkResult, StreamFormat};

/// Environment variable overriding the requested channel count
pub const CHANNELS_ENV: &str = "RINGSINK_CHANNELS";

/// Returns the path to the settings file: `~/.config/ringsink/settings.json`
pub fn settings_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("ringsink");
    path.push("settings.json");
    path
}

/// Which device adapter the binary should drive
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Backend {
    /// Device callback drains the ring directly
    #[default]
    Pull,
    /// Drained audio goes through a stream queue the callback pulls from
    Queued,
}

/// Persisted sink settings.
///
/// Serialized as JSON to the platform config directory.
/// Fields use `#[serde(default)]` so that adding new settings
/// won't break existing config files.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkSettings {
    // Engine clock
    pub sample_rate: u32,
    pub quantum_frames: u32,
    /// Ring capacity in quanta
    pub refills: u32,

    // Device
    /// `None` lets the device pick
    pub channels: Option<u16>,
    pub device_name: Option<String>,
    pub backend: Backend,
    /// Queued backend: most audio one refill may move into the stream queue,
    /// in device callback sizes. Refills only cover the current request, so
    /// this adds no buffering latency.
    pub queue_quanta: u32,

    /// Start with a ring full of silence
    pub prime_with_silence: bool,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            quantum_frames: 512,
            refills: 4,

            channels: None,
            device_name: None,
            backend: Backend::Pull,
            queue_quanta: 2,

            prime_with_silence: true,
        }
    }
}

impl SinkSettings {
    /// Load settings from the default path, falling back to defaults on any error.
    pub fn load() -> Self {
        Self::load_from(&settings_path())
    }

    /// Load settings from `path`, falling back to defaults on any error.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => {
                    log::info!("Loaded settings from {}", path.display());
                    settings
                }
                Err(e) => {
                    log::warn!("Failed to parse settings ({}), using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                log::info!("No settings file found ({}), using defaults", e);
                Self::default()
            }
        }
    }

    /// Save settings to the default path as pretty JSON.
    pub fn save(&self) {
        self.save_to(&settings_path())
    }

    /// Save settings to `path` as pretty JSON.
    pub fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::warn!("Failed to create config directory: {}", e);
                return;
            }
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    log::warn!("Failed to write settings: {}", e);
                }
            }
            Err(e) => {
                log::warn!("Failed to serialize settings: {}", e);
            }
        }
    }

    /// Reject values no session can run with
    pub fn validate(&self) -> SinkResult<()> {
        let invalid = |what: &str| -> SinkResult<()> {
            Err(SinkError::InvalidConfig(format!("{} must be positive", what)))
        };
        if self.sample_rate == 0 {
            return invalid("sample_rate");
        }
        if self.quantum_frames == 0 {
            return invalid("quantum_frames");
        }
        if self.refills == 0 {
            return invalid("refills");
        }
        if self.queue_quanta == 0 {
            return invalid("queue_quanta");
        }
        if self.channels == Some(0) {
            return invalid("channels");
        }
        Ok(())
    }

    /// Ring capacity in frames, always a whole number of quanta
    pub fn capacity_frames(&self) -> usize {
        self.quantum_frames as usize * self.refills as usize
    }

    /// Format to request from the device, honoring `RINGSINK_CHANNELS`
    pub fn desired_format(&self) -> StreamFormat {
        let env = std::env::var(CHANNELS_ENV).ok();
        self.desired_format_with(env.as_deref())
    }

    /// Format to request given a raw channel override
    ///
    /// A missing, unparsable or zero override leaves `channels` as configured.
    pub fn desired_format_with(&self, channels_override: Option<&str>) -> StreamFormat {
        let channels = channels_override
            .and_then(|v| v.trim().parse::<u16>().ok())
            .filter(|&c| c > 0)
            .or(self.channels)
            .unwrap_or(0);
        StreamFormat::new(self.sample_rate, channels, self.quantum_frames)
    }
}
