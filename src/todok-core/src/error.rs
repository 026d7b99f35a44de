//! Error types for the debate system.

use std::time::Duration;

use thiserror::Error;

use crate::bot::SessionPhase;

#[derive(Error, Debug)]
pub enum DebateError {
    #[error("Failed to load content from {path}: {message}")]
    ContentLoad { path: String, message: String },

    #[error("Missing API credential: set {0} in the environment or a .env file")]
    MissingCredential(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No {kind} named '{id}'")]
    SelectionNotFound { kind: &'static str, id: String },

    #[error("Model stream failed: {0}")]
    StreamTransport(String),

    #[error("Could not parse evaluation response: {0}")]
    EvaluationParse(String),

    #[error("Missing key {0}")]
    MissingEvaluationKey(String),

    #[error("Model response took longer than {}s", .0.as_secs())]
    TimeoutExceeded(Duration),

    #[error("Turn limit of {max} reached; evaluate or restart the debate")]
    TurnLimitReached { max: usize },

    #[error("Input is too long: {actual} characters (max {max})")]
    InputTooLong { max: usize, actual: usize },

    #[error("Input is empty")]
    EmptyInput,

    #[error("Cannot {operation} while {phase}")]
    InvalidState {
        operation: &'static str,
        phase: SessionPhase,
    },

    #[error("OpenAI API error: {0}")]
    OpenAI(#[from] async_openai::error::OpenAIError),
}

impl DebateError {
    /// Whether the error should terminate the hosting process.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DebateError::ContentLoad { .. }
                | DebateError::MissingCredential(_)
                | DebateError::Config(_)
        )
    }
}
