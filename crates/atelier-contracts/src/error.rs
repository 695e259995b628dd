use thiserror::Error;

/// Request problems caught at the boundary before any adapter runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("prompt must not be empty")]
    MissingPrompt,
    #[error("a style must be selected")]
    MissingStyle,
    #[error("reference image rejected: {0}")]
    InvalidReference(String),
    #[error("unknown model selector '{0}'")]
    UnknownModel(String),
    #[error("an image URL is required")]
    MissingImageUrl,
    #[error("a task id is required")]
    MissingTaskId,
    #[error("video duration must be between 1 and {max} seconds, got {requested}")]
    InvalidDuration { requested: u32, max: u32 },
    #[error("unsupported document format: {0}")]
    UnsupportedDocument(String),
    #[error("document could not be read: {0}")]
    UnreadableDocument(String),
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("local renderer failed: {0}")]
    Render(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VideoError {
    #[error("{message}")]
    Rejected { status: u16, message: String },
    #[error("video task query failed ({status}): {message}")]
    Query { status: u16, message: String },
    #[error("video service unreachable: {0}")]
    Transport(String),
    #[error("video service returned an unexpected payload: {0}")]
    Malformed(String),
}

pub type VideoResult<T> = std::result::Result<T, VideoError>;
