use coverclip_pipeline::ConfigError;

/// Headroom on top of the largest accepted upload for multipart framing
/// and the `kind` field.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `10000`).
    pub port: u16,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Base URL of the outbound delivery webhook. Required.
    pub webhook_url: String,
    /// Largest accepted request body, derived from the upload limit.
    pub max_body_bytes: usize,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                | Default    |
    /// |------------------------|------------|
    /// | `HOST`                 | `0.0.0.0`  |
    /// | `PORT`                 | `10000`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`       |
    /// | `DELIVERY_WEBHOOK_URL` | (required) |
    pub fn from_env(max_input_bytes: usize) -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok(), max_input_bytes)
    }

    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        max_input_bytes: usize,
    ) -> Result<Self, ConfigError> {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".into());

        let port = match var("PORT") {
            None => 10000,
            Some(value) => value.parse::<u16>().map_err(|e| ConfigError::Invalid {
                name: "PORT",
                reason: e.to_string(),
                value,
            })?,
        };

        let request_timeout_secs = match var("REQUEST_TIMEOUT_SECS") {
            None => 30,
            Some(value) => match value.parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                Ok(_) => {
                    return Err(ConfigError::Invalid {
                        name: "REQUEST_TIMEOUT_SECS",
                        value,
                        reason: "must be at least one second".to_string(),
                    })
                }
                Err(e) => {
                    return Err(ConfigError::Invalid {
                        name: "REQUEST_TIMEOUT_SECS",
                        reason: e.to_string(),
                        value,
                    })
                }
            },
        };

        let webhook_url = var("DELIVERY_WEBHOOK_URL").ok_or(ConfigError::Missing {
            name: "DELIVERY_WEBHOOK_URL",
        })?;
        if !(webhook_url.starts_with("http://") || webhook_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                name: "DELIVERY_WEBHOOK_URL",
                value: webhook_url,
                reason: "must be an http(s) URL".to_string(),
            });
        }

        Ok(Self {
            host,
            port,
            request_timeout_secs,
            webhook_url: webhook_url.trim_end_matches('/').to_string(),
            max_body_bytes: max_input_bytes + MULTIPART_OVERHEAD_BYTES,
        })
    }
}
