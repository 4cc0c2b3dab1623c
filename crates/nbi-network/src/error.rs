//! Controller failure kinds

use std::time::Duration;
use thiserror::Error;

use nbi_core::Error;

/// Longest controller body kept in error messages
const BODY_EXCERPT: usize = 300;

#[derive(Error, Debug, Clone)]
pub enum ControllerError {
    #[error("Controller unreachable: {0}")]
    Transport(String),

    #[error("Controller did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Controller returned HTTP {status}: {}", excerpt(.body))]
    Status { status: u16, body: String },

    #[error("Unreadable controller response: {0}")]
    Decode(String),

    #[error("Controller failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl ControllerError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ControllerError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// 4xx answers are final; retrying the same request cannot change them
    pub fn is_retryable(&self) -> bool {
        !matches!(self.status(), Some(s) if (400..500).contains(&s))
    }

    /// Operator hint for the failure
    pub fn suggestion(&self) -> &'static str {
        match self {
            ControllerError::Transport(_) | ControllerError::RetriesExhausted { .. } => {
                "Check ODL_BASE_URL and that the controller is reachable"
            }
            ControllerError::Timeout(_) => "Increase ODL_TIMEOUT_SEC or check controller load",
            ControllerError::Decode(_) => "The controller answered with an unexpected body; check its version",
            ControllerError::Status { status, .. } => match status {
                400 => "Check the payload against the device YANG model",
                401 | 403 => "Check ODL_USERNAME and ODL_PASSWORD",
                404 => "Check that the device is mounted and the path exists",
                409 => "The resource already exists",
                500..=599 => "Controller internal error; check the controller and device logs",
                _ => "Check the request and controller logs",
            },
        }
    }
}

pub(crate) fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT).collect()
}

impl From<ControllerError> for Error {
    fn from(err: ControllerError) -> Self {
        let hint = err.suggestion();
        match err {
            ControllerError::Timeout(after) => {
                Error::Timeout(format!("controller did not answer within {:?}", after))
            }
            ControllerError::Status { status, ref body } => {
                Error::controller(Some(status), excerpt(body)).with_suggestion(hint)
            }
            other => Error::controller(None, other.to_string()).with_suggestion(hint),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_and_retry_split() {
        let missing = ControllerError::Status { status: 404, body: String::new() };
        assert!(missing.is_not_found());
        assert!(!missing.is_retryable());

        let busy = ControllerError::Status { status: 503, body: String::new() };
        assert!(busy.is_retryable());
        assert!(ControllerError::Transport("refused".into()).is_retryable());
    }

    #[test]
    fn test_conversion_keeps_timeout_distinct() {
        let err: Error = ControllerError::Timeout(Duration::from_secs(5)).into();
        assert_eq!(err.code(), "ODL_TIMEOUT");

        let err: Error = ControllerError::Status { status: 400, body: "bad leaf".into() }.into();
        assert_eq!(err.code(), "ODL_REQUEST_FAILED");
        assert!(err.is_client_fault());
        match err {
            Error::Controller { status, message, suggestion } => {
                assert_eq!(status, Some(400));
                assert_eq!(message, "bad leaf");
                assert!(suggestion.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_body_excerpt_is_bounded() {
        let err = ControllerError::Status { status: 500, body: "x".repeat(1000) };
        assert!(err.to_string().len() < 400);
    }
}
