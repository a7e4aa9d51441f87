use crate::cache::RetryPolicy;
use std::time::Duration;

/// Upper bound for a single statement upload (256 KiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 256 * 1024;

/// Upper bound for one bank-import batch.
pub const DEFAULT_MAX_BATCH_FILES: usize = 10;

/// Client configuration
///
/// Describes where the REST API lives and how the query cache behaves.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Scheme + host (+ port) of the backend, without trailing slash
    pub base_url: String,

    /// Versioned prefix prepended to every resource path
    pub api_prefix: String,

    /// Per-request timeout enforced by the HTTP client
    pub request_timeout: Duration,

    /// How long a successful read is served from cache without refetching
    pub stale_time: Duration,

    /// Idle time after which an unsubscribed entry is garbage-collected
    pub gc_time: Duration,

    /// Maximum number of cache entries kept at once
    pub max_entries: usize,

    /// Retry policy for reads
    pub retry: RetryPolicy,

    /// Statement upload size limit in bytes
    pub max_upload_bytes: usize,

    /// Maximum number of files in one bank-import batch
    pub max_batch_files: usize,
}

impl ClientConfig {
    /// Create a configuration for the given backend origin
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_prefix: "/api/v1".to_string(),
            request_timeout: Duration::from_secs(30),
            stale_time: Duration::from_secs(60),
            gc_time: Duration::from_secs(300), // 5 minutes
            max_entries: 512,
            retry: RetryPolicy::default(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_batch_files: DEFAULT_MAX_BATCH_FILES,
        }
    }

    /// Set the API prefix
    pub fn api_prefix(mut self, prefix: &str) -> Self {
        let trimmed = prefix.trim_matches('/');
        self.api_prefix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{}", trimmed)
        };
        self
    }

    /// Set request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set staleness window
    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    /// Set garbage-collection idle time
    pub fn gc_time(mut self, gc_time: Duration) -> Self {
        self.gc_time = gc_time;
        self
    }

    /// Set maximum cache entries
    pub fn max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Set retry policy
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set upload size limit
    pub fn max_upload_bytes(mut self, max: usize) -> Self {
        self.max_upload_bytes = max;
        self
    }

    /// Set batch size limit
    pub fn max_batch_files(mut self, max: usize) -> Self {
        self.max_batch_files = max;
        self
    }

    /// Parse from an API URL
    ///
    /// Format: "http(s)://host[:port][/prefix]"
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let config = ClientConfig::from_url("https://money.example.com/api/v2")?;
    /// ```
    pub fn from_url(url: &str) -> Result<Self, String> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| "URL must include a scheme".to_string())?;
        if scheme != "http" && scheme != "https" {
            return Err(format!("Unsupported scheme '{}'", scheme));
        }

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };
        if authority.is_empty() {
            return Err("URL is missing a host".to_string());
        }
        if let Some((_, port)) = authority.rsplit_once(':') {
            port.parse::<u16>()
                .map_err(|_| "Invalid port".to_string())?;
        }

        let config = Self::new(&format!("{}://{}", scheme, authority));
        Ok(if path.trim_matches('/').is_empty() {
            config
        } else {
            config.api_prefix(path)
        })
    }

    /// Full URL of a resource path such as `/account/3`
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, self.api_prefix, path)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.is_empty() {
            return Err("base_url cannot be empty".to_string());
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err("base_url must start with http:// or https://".to_string());
        }

        if self.max_entries == 0 {
            return Err("max_entries must be > 0".to_string());
        }

        if self.max_upload_bytes == 0 {
            return Err("max_upload_bytes must be > 0".to_string());
        }

        if self.max_batch_files == 0 {
            return Err("max_batch_files must be > 0".to_string());
        }

        self.retry.validate()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("http://localhost:8000")
    }
}
