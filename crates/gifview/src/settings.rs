use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::media::decoder::{
    GifDecoder, DEFAULT_FRAME_DELAY_MS, DEFAULT_MAX_DECODED_BYTES, DEFAULT_MIN_FRAME_DELAY_MS,
};

/// Persisted playback configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub version: u32,
    /// Fixed display time per frame in ms; `<= 0` uses the delays from the file.
    pub frame_duration_ms: i64,
    /// Render frame 0 once when an animation is loaded while stopped.
    pub show_first_frame_on_load: bool,
    /// Decode budget for one animation, in bytes.
    pub max_decoded_bytes: u64,
    /// Delays shorter than this are replaced by `default_frame_delay_ms`.
    pub min_frame_delay_ms: u32,
    pub default_frame_delay_ms: u32,
    /// Stop after the file's loop count instead of looping forever.
    pub honor_loop_count: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            version: 1,
            frame_duration_ms: -1,
            show_first_frame_on_load: true,
            max_decoded_bytes: DEFAULT_MAX_DECODED_BYTES,
            min_frame_delay_ms: DEFAULT_MIN_FRAME_DELAY_MS,
            default_frame_delay_ms: DEFAULT_FRAME_DELAY_MS,
            honor_loop_count: true,
        }
    }
}

impl PlaybackConfig {
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config_dir.join("gifview").join("playback.json")
    }

    /// Load from the user config dir, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("Loaded playback config from {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("Failed to parse playback config: {e}");
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("No playback config found, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self) {
        self.save_to(&Self::config_path());
    }

    pub fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::error!("Failed to create config dir: {e}");
                return;
            }
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    log::error!("Failed to write playback config: {e}");
                } else {
                    log::debug!("Saved playback config to {}", path.display());
                }
            }
            Err(e) => log::error!("Failed to serialize playback config: {e}"),
        }
    }

    /// GIF decoder with this config's limits.
    pub fn gif_decoder(&self) -> GifDecoder {
        GifDecoder {
            max_decoded_bytes: self.max_decoded_bytes,
            min_frame_delay_ms: self.min_frame_delay_ms,
            default_frame_delay_ms: self.default_frame_delay_ms,
            honor_loop_count: self.honor_loop_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playback_config_defaults() {
        let c = PlaybackConfig::default();
        assert_eq!(c.version, 1);
        assert_eq!(c.frame_duration_ms, -1);
        assert!(c.show_first_frame_on_load);
        assert!(c.honor_loop_count);
        assert_eq!(c.min_frame_delay_ms, 20);
        assert_eq!(c.default_frame_delay_ms, 100);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let c: PlaybackConfig = serde_json::from_str(r#"{"frame_duration_ms": 40}"#).unwrap();
        assert_eq!(c.frame_duration_ms, 40);
        assert!(c.show_first_frame_on_load);
        assert_eq!(c.max_decoded_bytes, DEFAULT_MAX_DECODED_BYTES);
    }

    #[test]
    fn save_and_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("playback.json");
        let c = PlaybackConfig {
            frame_duration_ms: 33,
            honor_loop_count: false,
            ..PlaybackConfig::default()
        };
        c.save_to(&path);
        assert_eq!(PlaybackConfig::load_from(&path), c);
    }

    #[test]
    fn unreadable_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playback.json");
        assert_eq!(PlaybackConfig::load_from(&path), PlaybackConfig::default());

        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(PlaybackConfig::load_from(&path), PlaybackConfig::default());
    }

    #[test]
    fn gif_decoder_uses_config_limits() {
        let c = PlaybackConfig {
            max_decoded_bytes: 4096,
            min_frame_delay_ms: 50,
            ..PlaybackConfig::default()
        };
        let d = c.gif_decoder();
        assert_eq!(d.max_decoded_bytes, 4096);
        assert_eq!(d.min_frame_delay_ms, 50);
        assert!(d.honor_loop_count);
    }
}
