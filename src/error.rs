//! Error taxonomy for the punch flow and the sync pipeline.

use thiserror::Error;

const UNEXPECTED_FAILURE_MESSAGE: &str =
    "An unexpected failure occurred while registering the punch. Please try again.";

/// Local store failure. Always fatal to the operation that hit it.
#[derive(Debug, Error)]
#[error("local store failure: {0:#}")]
pub struct PersistenceError(#[from] pub anyhow::Error);

/// Why a captured frame was refused as proof of presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QualityIssue {
    #[error("image is too dark")]
    TooDark,
    #[error("image is overexposed")]
    Overexposed,
    #[error("image is out of focus")]
    OutOfFocus,
    #[error("frame could not be decoded as an image")]
    Undecodable,
}

impl QualityIssue {
    pub fn user_message(&self) -> &'static str {
        match self {
            QualityIssue::TooDark => "The image is too dark. Please improve the lighting.",
            QualityIssue::Overexposed => {
                "The image is too bright (overexposed). Please adjust the lighting."
            }
            QualityIssue::OutOfFocus => {
                "The image is out of focus (blurred). Please hold still and try again."
            }
            QualityIssue::Undecodable => "The camera returned an unreadable frame. Please try again.",
        }
    }
}

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("no camera is available")]
    NotAvailable,
    #[error("frame capture failed: {0}")]
    CaptureFailed(String),
}

/// Everything that can stop a punch from being recorded.
#[derive(Debug, Error)]
pub enum PunchError {
    #[error("{0}")]
    BusinessRuleViolation(String),

    #[error("invalid punch history: {0}")]
    InvalidStateSequence(String),

    #[error("image quality check failed: {0}")]
    ImageQuality(QualityIssue),

    #[error("camera unavailable: {0}")]
    HardwareUnavailable(#[from] HardwareError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl PunchError {
    /// Message safe to show at the terminal. Persistence details stay in the log.
    pub fn user_message(&self) -> String {
        match self {
            PunchError::BusinessRuleViolation(message) => message.clone(),
            PunchError::InvalidStateSequence(_) => {
                "Could not determine the next punch type from today's history.".to_string()
            }
            PunchError::ImageQuality(issue) => issue.user_message().to_string(),
            PunchError::HardwareUnavailable(_) => {
                "Camera not available for capture. Please check the device.".to_string()
            }
            PunchError::Persistence(_) => UNEXPECTED_FAILURE_MESSAGE.to_string(),
        }
    }
}

/// Classified outcome of a failed submission. Never reaches the punch caller.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("could not serialize record {record_id}: {reason}")]
    Serialization { record_id: String, reason: String },

    #[error("network error: {0}")]
    Transient(String),

    #[error("server rejected submission with status {status}")]
    Rejected { status: u16, body: String },

    #[error("circuit breaker is open")]
    CircuitOpen,

    #[error("unreadable success response: {0}")]
    InvalidResponse(String),
}

impl SyncError {
    /// Errors worth another attempt inside the retry envelope.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Transient(_) | SyncError::Rejected { .. })
    }
}
