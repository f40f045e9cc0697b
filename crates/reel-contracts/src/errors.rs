use std::fmt;

pub const RATE_LIMITED_MESSAGE: &str =
    "The video service is rate limiting this API key right now. Wait a little and try again.";
pub const INVALID_CREDENTIAL_MESSAGE: &str =
    "The video service rejected the API key. Select a valid key and try again.";
pub const MISSING_CREDENTIAL_MESSAGE: &str = "No API key is configured for the video service.";
pub const CANCELLED_MESSAGE: &str = "Generation was cancelled before it finished.";
pub const GENERIC_FAILURE_MESSAGE: &str = "Video generation failed for an unknown reason.";

/// User-actionable bucket a pipeline failure lands in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureKind {
    MissingCredential,
    InvalidCredential,
    RateLimited,
    MissingResult,
    InputProcessing,
    Cancelled,
    Unknown,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::MissingCredential => "missing_credential",
            FailureKind::InvalidCredential => "invalid_credential",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::MissingResult => "missing_result",
            FailureKind::InputProcessing => "input_processing",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Unknown => "unknown",
        }
    }
}

/// Outcome of the single classification boundary around a pipeline run:
/// one kind plus one short human-readable message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PipelineError {
    pub kind: FailureKind,
    pub message: String,
}

impl PipelineError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn missing_credential() -> Self {
        Self::new(FailureKind::MissingCredential, MISSING_CREDENTIAL_MESSAGE)
    }

    pub fn invalid_credential() -> Self {
        Self::new(FailureKind::InvalidCredential, INVALID_CREDENTIAL_MESSAGE)
    }

    pub fn rate_limited() -> Self {
        Self::new(FailureKind::RateLimited, RATE_LIMITED_MESSAGE)
    }

    pub fn missing_result(message: impl Into<String>) -> Self {
        Self::new(FailureKind::MissingResult, message)
    }

    pub fn input_processing(message: impl Into<String>) -> Self {
        Self::new(FailureKind::InputProcessing, message)
    }

    pub fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, CANCELLED_MESSAGE)
    }

    /// Pass-through bucket. Blank raw text falls back to a generic line so
    /// the caller always has something to show.
    pub fn unknown(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            Self::new(FailureKind::Unknown, GENERIC_FAILURE_MESSAGE)
        } else {
            Self::new(FailureKind::Unknown, message)
        }
    }

    /// True when the caller should re-select credentials before retrying.
    pub fn needs_credentials(&self) -> bool {
        matches!(
            self.kind,
            FailureKind::MissingCredential | FailureKind::InvalidCredential
        )
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for PipelineError {}
