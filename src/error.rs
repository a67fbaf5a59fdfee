use thiserror::Error;
use uuid::Uuid;

/// Failure raised by a region detector or entity extractor engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The engine cannot run in the current environment (missing models,
    /// no detector registered for the requested kind, ...)
    #[error("{engine} unavailable: {reason}")]
    Unavailable { engine: String, reason: String },

    /// The engine was invoked but failed internally
    #[error("{engine} failed: {reason}")]
    Failed { engine: String, reason: String },
}

impl EngineError {
    pub fn unavailable(engine: impl Into<String>, reason: impl ToString) -> Self {
        Self::Unavailable {
            engine: engine.into(),
            reason: reason.to_string(),
        }
    }

    pub fn failed(engine: impl Into<String>, reason: impl ToString) -> Self {
        Self::Failed {
            engine: engine.into(),
            reason: reason.to_string(),
        }
    }
}

/// Error surfaced to the caller of an analysis run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Failed to decode image: {0}")]
    ImageDecode(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A newer request replaced this run before it could publish
    #[error("Analysis run {0} was superseded by a newer request")]
    Superseded(Uuid),

    /// The run was cancelled explicitly without a replacement
    #[error("Analysis run {0} was cancelled")]
    Cancelled(Uuid),
}

/// Entity extractor configuration that could not be turned into recognizers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("Unsupported region: {0}")]
    UnsupportedRegion(String),

    #[error("Unknown entity category: {0}")]
    UnknownCategory(String),

    #[error("Invalid pattern for carrier {carrier}: {reason}")]
    InvalidCarrierPattern { carrier: String, reason: String },

    #[error("Invalid tracking URL template for carrier {carrier}: {reason}")]
    InvalidTrackingUrl { carrier: String, reason: String },

    #[error("Failed to compile {recognizer} recognizer: {reason}")]
    Recognizer { recognizer: String, reason: String },
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
