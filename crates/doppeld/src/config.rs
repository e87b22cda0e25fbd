use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
}

/// Daemon configuration, loaded from `DOPPEL_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Face-search service endpoint URL.
    pub face_api_url: String,
    /// Face-search service API key.
    pub face_api_key: String,
    /// Lookup service endpoint URL.
    pub lookup_api_url: String,
    /// Lookup service API key, for deployments that require one.
    pub lookup_api_key: Option<String>,
    /// Timeout in seconds for each outbound HTTP request.
    pub http_timeout_secs: u64,
    /// Number of warmup frames to discard at startup (camera AGC/AE stabilization).
    pub warmup_frames: usize,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// A missing or empty required variable fails startup; the daemon
    /// never limps along without its service endpoints.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            camera_device: get("DOPPEL_CAMERA_DEVICE")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "/dev/video0".to_string()),
            face_api_url: required(&get, "DOPPEL_FACE_API_URL")?,
            face_api_key: required(&get, "DOPPEL_FACE_API_KEY")?,
            lookup_api_url: required(&get, "DOPPEL_LOOKUP_API_URL")?,
            lookup_api_key: get("DOPPEL_LOOKUP_API_KEY").filter(|v| !v.is_empty()),
            http_timeout_secs: env_u64(&get, "DOPPEL_HTTP_TIMEOUT_SECS", 10),
            warmup_frames: env_usize(&get, "DOPPEL_WARMUP_FRAMES", 2),
        })
    }
}

/// An empty value counts as missing; `DOPPEL_FACE_API_KEY=""` is the
/// usual symptom of a broken service file.
fn required(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<String, ConfigError> {
    get(key)
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingVar(key))
}

fn env_u64(get: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> u64 {
    get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(get: &impl Fn(&str) -> Option<String>, key: &str, default: usize) -> usize {
    get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}
