//! TODOK Core Library
//!
//! Debate-practice sessions against an LLM opponent: content loading, prompt
//! composition, streamed turns and rubric evaluation.

pub mod bot;
pub mod config;
pub mod content;
pub mod error;
pub mod evaluation;
pub mod model;
pub mod prompt;
pub mod reply;

pub use bot::{DebateBot, DebateSession, SessionPhase, Turn, evaluate_transcript};
pub use config::{Config, default_config};
pub use content::{ContentStore, Persona, Stance, Topic};
pub use error::DebateError;
pub use evaluation::{CategoryScore, EvaluationReport, EvaluationResult, RubricCategory};
pub use model::{ChatMessage, ChatModel, ModelRequest, OpenAiModel, Role};
pub use prompt::PromptStyle;
pub use reply::ReplyStream;
