use thiserror::Error;

/// Failure surfaced by the remote client, the query cache or a mutation.
///
/// HTTP failures keep the status that produced them so callers can branch on
/// [`ApiError::status`]. The type is `Clone` because a single failed fetch is
/// delivered to every reader that was waiting on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Validation failed for {resource}: {message}")]
    Validation { resource: String, message: String },

    #[error("Not authenticated ({resource}): {message}")]
    Auth { resource: String, message: String },

    #[error("Forbidden ({resource}): {message}")]
    Forbidden { resource: String, message: String },

    #[error("{resource} not found: {message}")]
    NotFound { resource: String, message: String },

    #[error("Conflict on {resource}: {message}")]
    Conflict { resource: String, message: String },

    #[error("Server error {status} on {resource}: {message}")]
    Server {
        status: u16,
        resource: String,
        message: String,
    },

    /// Any other non-2xx status (408, 422, 429, ...).
    #[error("HTTP {status} on {resource}: {message}")]
    Http {
        status: u16,
        resource: String,
        message: String,
    },

    #[error("Network error on {resource}: {message}")]
    Network { resource: String, message: String },

    #[error("Request for {resource} was cancelled")]
    Cancelled { resource: String },

    #[error("Malformed response for {resource}: {message}")]
    Decode { resource: String, message: String },

    #[error("Invalid input for {resource}: {message}")]
    InvalidInput { resource: String, message: String },
}

pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    /// Build the error matching an HTTP status code.
    pub fn from_status(status: u16, resource: &str, message: impl Into<String>) -> Self {
        let resource = resource.to_string();
        let message = message.into();
        match status {
            400 => Self::Validation { resource, message },
            401 => Self::Auth { resource, message },
            403 => Self::Forbidden { resource, message },
            404 => Self::NotFound { resource, message },
            409 => Self::Conflict { resource, message },
            500..=599 => Self::Server {
                status,
                resource,
                message,
            },
            _ => Self::Http {
                status,
                resource,
                message,
            },
        }
    }

    pub fn network(resource: &str, message: impl Into<String>) -> Self {
        Self::Network {
            resource: resource.to_string(),
            message: message.into(),
        }
    }

    pub fn decode(resource: &str, message: impl Into<String>) -> Self {
        Self::Decode {
            resource: resource.to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_input(resource: &str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            resource: resource.to_string(),
            message: message.into(),
        }
    }

    pub fn cancelled(resource: &str) -> Self {
        Self::Cancelled {
            resource: resource.to_string(),
        }
    }

    /// HTTP status carried by the error; `None` when no response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Validation { .. } => Some(400),
            Self::Auth { .. } => Some(401),
            Self::Forbidden { .. } => Some(403),
            Self::NotFound { .. } => Some(404),
            Self::Conflict { .. } => Some(409),
            Self::Server { status, .. } | Self::Http { status, .. } => Some(*status),
            Self::Network { .. }
            | Self::Cancelled { .. }
            | Self::Decode { .. }
            | Self::InvalidInput { .. } => None,
        }
    }

    pub fn resource(&self) -> &str {
        match self {
            Self::Validation { resource, .. }
            | Self::Auth { resource, .. }
            | Self::Forbidden { resource, .. }
            | Self::NotFound { resource, .. }
            | Self::Conflict { resource, .. }
            | Self::Server { resource, .. }
            | Self::Http { resource, .. }
            | Self::Network { resource, .. }
            | Self::Cancelled { resource }
            | Self::Decode { resource, .. }
            | Self::InvalidInput { resource, .. } => resource,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Validation { message, .. }
            | Self::Auth { message, .. }
            | Self::Forbidden { message, .. }
            | Self::NotFound { message, .. }
            | Self::Conflict { message, .. }
            | Self::Server { message, .. }
            | Self::Http { message, .. }
            | Self::Network { message, .. }
            | Self::Decode { message, .. }
            | Self::InvalidInput { message, .. } => message,
            Self::Cancelled { .. } => "request cancelled",
        }
    }

    /// Whether a read may be retried: server and network failures, plus the
    /// two transient 4xx statuses (408 request timeout, 429 too many requests).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Server { .. } | Self::Network { .. } => true,
            Self::Http { status, .. } => matches!(status, 408 | 429),
            _ => false,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}
