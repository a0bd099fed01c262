//! Load settings from file and environment.

use crate::error::{Result, VastError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Resolver settings. Env overrides: VAST_VIDEO_SCREEN_WIDTH,
/// VAST_VIDEO_SCREEN_HEIGHT, VAST_VIDEO_MAX_REDIRECTS,
/// VAST_VIDEO_HTTP_TIMEOUT_SECS, VAST_VIDEO_USER_AGENT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Screen width used for media fitness and companion scaling (default 1920).
    #[serde(default = "default_screen_width")]
    pub screen_width: i32,
    /// Screen height (default 1080).
    #[serde(default = "default_screen_height")]
    pub screen_height: i32,
    /// Wrapper redirects followed per resolution (default 10).
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,
    /// Timeout for fetching a VAST document (default 3).
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_screen_width() -> i32 {
    1920
}
fn default_screen_height() -> i32 {
    1080
}
fn default_max_redirects() -> u32 {
    10
}
fn default_http_timeout_secs() -> u64 {
    3
}
fn default_user_agent() -> String {
    format!("vast-video/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            screen_width: default_screen_width(),
            screen_height: default_screen_height(),
            max_redirects: default_max_redirects(),
            http_timeout_secs: default_http_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Settings {
    /// Defaults, then the TOML file at `path` if one is given, then env vars.
    /// A named file that is missing or malformed is an error.
    pub fn load(path: Option<&Path>) -> Result<Settings> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Settings::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Settings> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|e| VastError::SettingsError(format!("{}: {}", path.display(), e)))
    }

    /// Values that fail to parse are ignored.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("VAST_VIDEO_SCREEN_WIDTH").and_then(|s| s.parse().ok()) {
            self.screen_width = v;
        }
        if let Some(v) = var("VAST_VIDEO_SCREEN_HEIGHT").and_then(|s| s.parse().ok()) {
            self.screen_height = v;
        }
        if let Some(v) = var("VAST_VIDEO_MAX_REDIRECTS").and_then(|s| s.parse().ok()) {
            self.max_redirects = v;
        }
        if let Some(v) = var("VAST_VIDEO_HTTP_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            self.http_timeout_secs = v;
        }
        if let Some(v) = var("VAST_VIDEO_USER_AGENT").filter(|s| !s.is_empty()) {
            self.user_agent = v;
        }
    }

    pub(crate) fn screen_aspect_ratio(&self) -> f64 {
        f64::from(self.screen_width) / f64::from(self.screen_height)
    }

    pub(crate) fn screen_area(&self) -> f64 {
        f64::from(self.screen_width) * f64::from(self.screen_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let settings: Settings = toml::from_str("screen_width = 1280\nscreen_height = 720\n").unwrap();
        assert_eq!(settings.screen_width, 1280);
        assert_eq!(settings.max_redirects, 10);
        assert_eq!(settings.http_timeout_secs, 3);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(toml::from_str::<Settings>("screen_depth = 3\n").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = Settings::default();
        settings.apply_env(|key| match key {
            "VAST_VIDEO_MAX_REDIRECTS" => Some("2".to_string()),
            "VAST_VIDEO_SCREEN_WIDTH" => Some("wide".to_string()),
            "VAST_VIDEO_USER_AGENT" => Some("test-agent".to_string()),
            _ => None,
        });
        assert_eq!(settings.max_redirects, 2);
        assert_eq!(settings.screen_width, 1920);
        assert_eq!(settings.user_agent, "test-agent");
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(Settings::load(Some(Path::new("/nonexistent/vast-video.toml"))).is_err());
    }
}
