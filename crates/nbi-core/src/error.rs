//! Error types for the intent engine

use thiserror::Error;

/// Main error type shared by drivers and services
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Caller faults
    // ========================================================================
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device not mounted: {0}")]
    DeviceNotMounted(String),

    #[error("Unsupported intent: {0}")]
    UnsupportedIntent(String),

    #[error("Unsupported vendor: {0}")]
    UnsupportedVendor(String),

    #[error("Driver build error: {0}")]
    DriverBuild(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // ========================================================================
    // Controller and infrastructure faults
    // ========================================================================
    #[error("Controller request failed{}: {message}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Controller {
        status: Option<u16>,
        message: String,
        suggestion: Option<String>,
    },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn device_not_found(node_id: impl Into<String>) -> Self {
        Error::DeviceNotFound(node_id.into())
    }

    pub fn not_mounted(msg: impl Into<String>) -> Self {
        Error::DeviceNotMounted(msg.into())
    }

    pub fn unsupported_intent(intent: impl Into<String>) -> Self {
        Error::UnsupportedIntent(intent.into())
    }

    pub fn build(msg: impl Into<String>) -> Self {
        Error::DriverBuild(msg.into())
    }

    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Error::InvalidParams(msg.into())
    }

    pub fn controller(status: Option<u16>, message: impl Into<String>) -> Self {
        Error::Controller {
            status,
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Attach a diagnosis hint to a controller failure. Other kinds are
    /// returned unchanged.
    pub fn with_suggestion(self, hint: impl Into<String>) -> Self {
        match self {
            Error::Controller {
                status, message, ..
            } => Error::Controller {
                status,
                message,
                suggestion: Some(hint.into()),
            },
            other => other,
        }
    }

    /// Closed error code used by the API envelope
    pub fn code(&self) -> &'static str {
        match self {
            Error::DeviceNotFound(_) => "DEVICE_NOT_FOUND",
            Error::DeviceNotMounted(_) => "DEVICE_NOT_MOUNTED",
            Error::UnsupportedIntent(_) => "UNSUPPORTED_INTENT",
            Error::UnsupportedVendor(_) => "UNSUPPORTED_VENDOR",
            Error::DriverBuild(_) | Error::InvalidParams(_) => "INVALID_PARAMS",
            Error::Conflict(_) => "CONFLICT",
            Error::Controller { .. } => "ODL_REQUEST_FAILED",
            Error::Timeout(_) => "ODL_TIMEOUT",
            Error::Storage(_) => "DATABASE_ERROR",
            Error::Cancelled(_) => "CANCELLED",
            Error::Serialization(_) | Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True when retrying the same request cannot succeed
    pub fn is_client_fault(&self) -> bool {
        match self {
            Error::DeviceNotFound(_)
            | Error::DeviceNotMounted(_)
            | Error::UnsupportedIntent(_)
            | Error::UnsupportedVendor(_)
            | Error::DriverBuild(_)
            | Error::InvalidParams(_)
            | Error::Conflict(_) => true,
            Error::Controller { status, .. } => {
                matches!(status, Some(s) if (400..500).contains(s))
            }
            _ => false,
        }
    }

    /// HTTP status the surrounding API layer should answer with
    pub fn http_status(&self) -> u16 {
        match self {
            Error::DeviceNotFound(_) => 404,
            Error::DeviceNotMounted(_) | Error::Conflict(_) => 409,
            Error::UnsupportedIntent(_)
            | Error::UnsupportedVendor(_)
            | Error::DriverBuild(_)
            | Error::InvalidParams(_) => 400,
            Error::Controller { .. } => 502,
            Error::Timeout(_) => 504,
            _ => 500,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(err.to_string())
    }
}
