use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

pub const NO_IMAGE_MESSAGE: &str = "No image provided";
pub const KEY_MISSING_MESSAGE: &str =
    "OpenRouter API key missing. Please set it with `visual-explain settings set --api-key <KEY>`.";
pub const VISION_UNINTELLIGIBLE_MESSAGE: &str =
    "Unable to understand the image. Please try a clearer image.";
pub const NETWORK_ERROR_MESSAGE: &str =
    "Network error: the request could not reach the inference endpoint. Check your API key, network, and proxy settings.";
pub const FOLLOW_UP_TRANSIENT_MESSAGE: &str =
    "Temporary connection issue while answering your question. Please try again in a moment.";
pub const CONTEXT_MISSING_MESSAGE: &str = "Vision context missing. Please re-run explanation.";

/// Every way an explanation run or a follow-up can end badly.
///
/// Messages are user-facing. Only `ReasoningFailure` and `FollowUpFailure`
/// carry provider text; the others are fixed so no provider detail leaks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExplainError {
    #[error("{0}")]
    MissingInput(String),
    #[error("The vision model {model} is not available for your OpenRouter account. Update your settings to choose a different model or remove the image.")]
    ModelUnavailable { model: String },
    #[error("{}", VISION_UNINTELLIGIBLE_MESSAGE)]
    VisionUnintelligible,
    #[error("{0}")]
    ReasoningFailure(String),
    #[error("{}", NETWORK_ERROR_MESSAGE)]
    Network,
    #[error("{}", FOLLOW_UP_TRANSIENT_MESSAGE)]
    FollowUpTransient,
    #[error("{0}")]
    FollowUpFailure(String),
}

impl ExplainError {
    pub fn no_image() -> Self {
        Self::MissingInput(NO_IMAGE_MESSAGE.to_string())
    }

    pub fn key_missing() -> Self {
        Self::MissingInput(KEY_MISSING_MESSAGE.to_string())
    }
}

/// Outcome of a single chat-completion call that did not produce a body to
/// extract text from.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Transport failure. The raw error is kept for logs only.
    #[error("{}", NETWORK_ERROR_MESSAGE)]
    Network(#[source] reqwest::Error),
    /// Non-2xx response. `body` is the raw response text, JSON or not.
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}
