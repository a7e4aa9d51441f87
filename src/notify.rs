//! User-facing error reporting.
//!
//! Failures are classified into where they should surface: inline next to the
//! form that caused them (400), as a global session-expiry (401), or as a
//! toast (everything else). Operation-specific overrides win over the
//! generic status mapping.

use crate::core::ApiError;
use tracing::{Level, event};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Inline,
    Toast,
    SessionExpired,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub disposition: Disposition,
    pub operation: String,
    pub title: String,
    pub message: String,
    pub status: Option<u16>,
}

/// Receives notifications produced by failed operations.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Default notifier: records notifications as tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification.disposition {
            Disposition::SessionExpired => event!(
                Level::WARN,
                operation = %notification.operation,
                "{}: {}",
                notification.title,
                notification.message
            ),
            Disposition::Toast | Disposition::Inline => event!(
                Level::INFO,
                operation = %notification.operation,
                status = ?notification.status,
                "{}: {}",
                notification.title,
                notification.message
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Override {
    operation: String,
    status: u16,
    disposition: Disposition,
    message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ErrorPolicy {
    overrides: Vec<Override>,
}

impl ErrorPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `status` during `operation` with a dedicated message, e.g. a
    /// 401 during `login` means a wrong password, not an expired session.
    pub fn with_override(
        mut self,
        operation: &str,
        status: u16,
        disposition: Disposition,
        message: &str,
    ) -> Self {
        self.overrides.push(Override {
            operation: operation.to_string(),
            status,
            disposition,
            message: message.to_string(),
        });
        self
    }

    /// Notification for `err` raised by `operation`; `None` for cancellations,
    /// which are not failures from the user's point of view.
    pub fn classify(&self, operation: &str, err: &ApiError) -> Option<Notification> {
        if matches!(err, ApiError::Cancelled { .. }) {
            return None;
        }

        let status = err.status();
        if let Some(found) = self
            .overrides
            .iter()
            .find(|o| o.operation == operation && Some(o.status) == status)
        {
            return Some(Notification {
                disposition: found.disposition,
                operation: operation.to_string(),
                title: title_for(err).to_string(),
                message: found.message.clone(),
                status,
            });
        }

        let disposition = match err {
            ApiError::Validation { .. } | ApiError::InvalidInput { .. } => Disposition::Inline,
            ApiError::Auth { .. } => Disposition::SessionExpired,
            _ => Disposition::Toast,
        };
        let message = match err {
            ApiError::Network { .. } | ApiError::Server { .. } => {
                "Something went wrong. Please try again.".to_string()
            }
            ApiError::Auth { .. } => "Please sign in again.".to_string(),
            other => other.message().to_string(),
        };

        Some(Notification {
            disposition,
            operation: operation.to_string(),
            title: title_for(err).to_string(),
            message,
            status,
        })
    }
}

fn title_for(err: &ApiError) -> &'static str {
    match err {
        ApiError::Validation { .. } | ApiError::InvalidInput { .. } => "Invalid input",
        ApiError::Auth { .. } => "Session expired",
        ApiError::Forbidden { .. } => "Not allowed",
        ApiError::NotFound { .. } => "Not found",
        ApiError::Conflict { .. } => "Conflict",
        ApiError::Server { .. } | ApiError::Http { .. } => "Server error",
        ApiError::Network { .. } => "Connection problem",
        ApiError::Decode { .. } => "Unexpected response",
        ApiError::Cancelled { .. } => "Cancelled",
    }
}
