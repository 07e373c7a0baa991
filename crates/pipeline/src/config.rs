use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use coverclip_core::render::EncodeSettings;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} is required")]
    Missing { name: &'static str },

    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Pipeline configuration, fixed at startup.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Job Executor permits (default: `1`).
    pub worker_pool_size: usize,
    /// Largest accepted upload or download in bytes (default: 20 MiB).
    pub max_input_bytes: usize,
    /// Base directory for session workspaces (default: `temp`).
    pub workspace_root: PathBuf,
    pub ffmpeg_bin: PathBuf,
    pub ffprobe_bin: PathBuf,
    pub ytdlp_bin: PathBuf,
    /// Metadata catalog base URL (default: `https://api.deezer.com`).
    pub catalog_base_url: String,
    /// Direct link API. Unset disables the API stage of link resolution.
    pub link_api_url: Option<String>,
    pub link_api_token: Option<String>,
    pub http_timeout: Duration,
    pub audio_fetch_timeout: Duration,
    pub render_timeout: Duration,
    pub placeholder_timeout: Duration,
    pub delivery_timeout: Duration,
    pub encode: EncodeSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 1,
            max_input_bytes: 20 * 1024 * 1024,
            workspace_root: PathBuf::from("temp"),
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            ffprobe_bin: PathBuf::from("ffprobe"),
            ytdlp_bin: PathBuf::from("yt-dlp"),
            catalog_base_url: "https://api.deezer.com".to_string(),
            link_api_url: None,
            link_api_token: None,
            http_timeout: Duration::from_secs(10),
            audio_fetch_timeout: Duration::from_secs(120),
            render_timeout: Duration::from_secs(300),
            placeholder_timeout: Duration::from_secs(10),
            delivery_timeout: Duration::from_secs(60),
            encode: EncodeSettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                  |
    /// |----------------------------|--------------------------|
    /// | `WORKER_POOL_SIZE`         | `1`                      |
    /// | `MAX_INPUT_BYTES`          | `20971520`               |
    /// | `WORKSPACE_ROOT`           | `temp`                   |
    /// | `FFMPEG_BIN`               | `ffmpeg`                 |
    /// | `FFPROBE_BIN`              | `ffprobe`                |
    /// | `YTDLP_BIN`                | `yt-dlp`                 |
    /// | `CATALOG_BASE_URL`         | `https://api.deezer.com` |
    /// | `LINK_API_URL`             | unset                    |
    /// | `LINK_API_TOKEN`           | unset                    |
    /// | `HTTP_TIMEOUT_SECS`        | `10`                     |
    /// | `AUDIO_FETCH_TIMEOUT_SECS` | `120`                    |
    /// | `RENDER_TIMEOUT_SECS`      | `300`                    |
    /// | `PLACEHOLDER_TIMEOUT_SECS` | `10`                     |
    /// | `DELIVERY_TIMEOUT_SECS`    | `60`                     |
    /// | `OUTPUT_WIDTH`             | `480`                    |
    /// | `OUTPUT_FPS`               | `25`                     |
    /// | `AUDIO_BITRATE`            | `128k`                   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let env = Env(&lookup);

        let encode = EncodeSettings {
            width: env.parse("OUTPUT_WIDTH", defaults.encode.width)?,
            fps: env.parse("OUTPUT_FPS", defaults.encode.fps)?,
            audio_bitrate: env.string("AUDIO_BITRATE", &defaults.encode.audio_bitrate),
            ..defaults.encode.clone()
        };
        encode.validate().map_err(|e| ConfigError::Invalid {
            name: "OUTPUT_WIDTH/OUTPUT_FPS",
            value: format!("{}x{}fps", encode.width, encode.fps),
            reason: e.to_string(),
        })?;

        let worker_pool_size: usize = env.parse("WORKER_POOL_SIZE", defaults.worker_pool_size)?;
        if worker_pool_size == 0 {
            return Err(ConfigError::Invalid {
                name: "WORKER_POOL_SIZE",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            worker_pool_size,
            max_input_bytes: env.parse("MAX_INPUT_BYTES", defaults.max_input_bytes)?,
            workspace_root: env.path("WORKSPACE_ROOT", defaults.workspace_root),
            ffmpeg_bin: env.path("FFMPEG_BIN", defaults.ffmpeg_bin),
            ffprobe_bin: env.path("FFPROBE_BIN", defaults.ffprobe_bin),
            ytdlp_bin: env.path("YTDLP_BIN", defaults.ytdlp_bin),
            catalog_base_url: env
                .string("CATALOG_BASE_URL", &defaults.catalog_base_url)
                .trim_end_matches('/')
                .to_string(),
            link_api_url: env.optional("LINK_API_URL"),
            link_api_token: env.optional("LINK_API_TOKEN"),
            http_timeout: env.secs("HTTP_TIMEOUT_SECS", defaults.http_timeout)?,
            audio_fetch_timeout: env
                .secs("AUDIO_FETCH_TIMEOUT_SECS", defaults.audio_fetch_timeout)?,
            render_timeout: env.secs("RENDER_TIMEOUT_SECS", defaults.render_timeout)?,
            placeholder_timeout: env
                .secs("PLACEHOLDER_TIMEOUT_SECS", defaults.placeholder_timeout)?,
            delivery_timeout: env.secs("DELIVERY_TIMEOUT_SECS", defaults.delivery_timeout)?,
            encode,
        })
    }
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, name: &str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_string())
    }

    fn path(&self, name: &str, default: PathBuf) -> PathBuf {
        self.optional(name).map(PathBuf::from).unwrap_or(default)
    }

    fn parse<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(name) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
                name,
                reason: e.to_string(),
                value,
            }),
        }
    }

    fn secs(&self, name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        let secs: u64 = self.parse(name, default.as_secs())?;
        if secs == 0 {
            return Err(ConfigError::Invalid {
                name,
                value: "0".to_string(),
                reason: "timeout must be at least one second".to_string(),
            });
        }
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = PipelineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.worker_pool_size, 1);
        assert_eq!(config.max_input_bytes, 20_971_520);
        assert_eq!(config.catalog_base_url, "https://api.deezer.com");
        assert_eq!(config.render_timeout, Duration::from_secs(300));
        assert!(config.link_api_url.is_none());
        assert_eq!(config.encode, EncodeSettings::default());
    }

    #[test]
    fn overrides_are_applied() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("WORKER_POOL_SIZE", "3"),
            ("CATALOG_BASE_URL", "http://localhost:9000/"),
            ("LINK_API_URL", "https://links.example.com/resolve"),
            ("OUTPUT_WIDTH", "720"),
            ("DELIVERY_TIMEOUT_SECS", "90"),
        ]))
        .unwrap();
        assert_eq!(config.worker_pool_size, 3);
        assert_eq!(config.catalog_base_url, "http://localhost:9000");
        assert_eq!(
            config.link_api_url.as_deref(),
            Some("https://links.example.com/resolve")
        );
        assert_eq!(config.encode.width, 720);
        assert_eq!(config.delivery_timeout, Duration::from_secs(90));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = PipelineConfig::from_lookup(lookup(&[("LINK_API_URL", "  ")])).unwrap();
        assert!(config.link_api_url.is_none());
    }

    #[test]
    fn malformed_number_is_reported() {
        let err = PipelineConfig::from_lookup(lookup(&[("WORKER_POOL_SIZE", "many")])).unwrap_err();
        assert_matches!(err, ConfigError::Invalid { name: "WORKER_POOL_SIZE", .. });
    }

    #[test]
    fn odd_width_is_rejected() {
        assert!(PipelineConfig::from_lookup(lookup(&[("OUTPUT_WIDTH", "481")])).is_err());
    }

    #[test]
    fn zero_pool_is_rejected() {
        assert!(PipelineConfig::from_lookup(lookup(&[("WORKER_POOL_SIZE", "0")])).is_err());
    }
}
