use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::{Result, Tv5Error};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Catalog site, also used to absolutize detail links and cover images.
    pub site_url: String,
    pub player_url: String,
    pub video_api_url: String,
    pub user_agent: String,
    /// Per-request timeout in seconds.
    pub timeout: u64,
    pub concurrent_segments: usize,
    pub temp_dir: Option<PathBuf>,
    pub ffmpeg_path: Option<PathBuf>,
    /// Fail instead of byte-concatenating when ffmpeg is missing or fails.
    pub require_muxer: bool,
    pub bind: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_url: "https://tv532.ru".to_string(),
            player_url: "https://playep.pro".to_string(),
            video_api_url: "https://gencit.info/player/responce.php".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
            timeout: 30,
            concurrent_segments: 8,
            temp_dir: None,
            ffmpeg_path: None,
            require_muxer: false,
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

impl Config {
    /// Load defaults, then the optional TOML file, then `TV5_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Tv5Error::Config(e.to_string()))
    }

    fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TV5_SITE_URL") {
            self.site_url = v;
        }
        if let Some(v) = lookup("TV5_PLAYER_URL") {
            self.player_url = v;
        }
        if let Some(v) = lookup("TV5_VIDEO_API_URL") {
            self.video_api_url = v;
        }
        if let Some(v) = lookup("TV5_TIMEOUT") {
            self.timeout = v
                .parse()
                .map_err(|_| Tv5Error::Config(format!("TV5_TIMEOUT is not a number: {v}")))?;
        }
        if let Some(v) = lookup("TV5_CONCURRENT_SEGMENTS") {
            self.concurrent_segments = v.parse().map_err(|_| {
                Tv5Error::Config(format!("TV5_CONCURRENT_SEGMENTS is not a number: {v}"))
            })?;
        }
        if let Some(v) = lookup("TV5_TEMP_DIR") {
            self.temp_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("TV5_FFMPEG") {
            self.ffmpeg_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("TV5_BIND") {
            self.bind = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrent_segments == 0 {
            return Err(Tv5Error::Config(
                "concurrent_segments must be at least 1".to_string(),
            ));
        }
        if self.timeout == 0 {
            return Err(Tv5Error::Config("timeout must be at least 1 second".to_string()));
        }
        url::Url::parse(&self.site_url)?;
        url::Url::parse(&self.player_url)?;
        url::Url::parse(&self.video_api_url)?;
        Ok(())
    }

    pub fn site_base(&self) -> &str {
        self.site_url.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml("timeout = 10\nconcurrent_segments = 2\n").unwrap();
        assert_eq!(config.timeout, 10);
        assert_eq!(config.concurrent_segments, 2);
        assert_eq!(config.site_url, "https://tv532.ru");
        assert!(!config.require_muxer);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("TV5_SITE_URL", "https://tv533.ru"),
            ("TV5_CONCURRENT_SEGMENTS", "3"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.site_url, "https://tv533.ru");
        assert_eq!(config.concurrent_segments, 3);
    }

    #[test]
    fn test_bad_env_number_is_rejected() {
        let mut config = Config::default();
        let result = config.apply_env(|key| (key == "TV5_TIMEOUT").then(|| "soon".to_string()));
        assert!(matches!(result, Err(Tv5Error::Config(_))));
    }

    #[test]
    fn test_zero_concurrency_is_invalid() {
        let config = Config {
            concurrent_segments: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
