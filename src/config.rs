//! Runtime configuration read from the environment (and `.env`).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::generation::GeminiSettings;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_HISTORY_PATH: &str = "avatar_history.json";

#[derive(Debug, Clone)]
pub struct Config {
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub bind_addr: String,
    pub history_path: PathBuf,
    /// Duration the progress bar assumes a generation takes.
    pub progress_expected: Duration,
    pub progress_tick: Duration,
    /// Longest edge an upload keeps before being downscaled.
    pub max_image_edge: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_model: DEFAULT_MODEL.to_owned(),
            gemini_base_url: DEFAULT_BASE_URL.to_owned(),
            bind_addr: DEFAULT_BIND_ADDR.to_owned(),
            history_path: PathBuf::from(DEFAULT_HISTORY_PATH),
            progress_expected: Duration::from_millis(15_000),
            progress_tick: Duration::from_millis(100),
            max_image_edge: 2048,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source; unparseable numbers fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let string = |name: &str, default: String| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
                .unwrap_or(default)
        };
        let millis = |name: &str, default: Duration| {
            lookup(name)
                .and_then(|value| value.trim().parse::<u64>().ok())
                .filter(|value| *value > 0)
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        Self {
            gemini_api_key: lookup("GEMINI_API_KEY")
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty()),
            gemini_model: string("GEMINI_IMAGE_MODEL", defaults.gemini_model),
            gemini_base_url: string("GEMINI_BASE_URL", defaults.gemini_base_url),
            bind_addr: string("BIND_ADDR", defaults.bind_addr),
            history_path: PathBuf::from(string(
                "HISTORY_PATH",
                defaults.history_path.to_string_lossy().into_owned(),
            )),
            progress_expected: millis("PROGRESS_EXPECTED_MS", defaults.progress_expected),
            progress_tick: millis("PROGRESS_TICK_MS", defaults.progress_tick),
            max_image_edge: lookup("MAX_IMAGE_EDGE")
                .and_then(|value| value.trim().parse::<u32>().ok())
                .filter(|value| *value > 0)
                .unwrap_or(defaults.max_image_edge),
        }
    }

    pub fn gemini_settings(&self) -> GeminiSettings {
        GeminiSettings {
            api_key: self.gemini_api_key.clone(),
            model: self.gemini_model.clone(),
            base_url: self.gemini_base_url.clone(),
        }
    }
}
