//! Debate session controller.
//!
//! `DebateBot` owns one user's debate: the loaded content, the running
//! session and its evaluation. Hosts keep one bot per user session.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::content::{ContentStore, Persona, Stance, Topic};
use crate::error::DebateError;
use crate::evaluation::EvaluationResult;
use crate::model::{ChatMessage, ChatModel, ModelRequest, OpenAiModel, Role};
use crate::prompt::{build_evaluation_prompt, build_turn_prompt, system_prompt_for};
use crate::reply::ReplyStream;

/// Lifecycle of a [`DebateBot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No content loaded yet.
    Uninitialized,
    /// Content loaded, no debate running.
    Configured,
    /// A debate is running.
    Active,
    /// The running debate has been evaluated.
    Evaluated,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Uninitialized => "uninitialized",
            SessionPhase::Configured => "configured",
            SessionPhase::Active => "active",
            SessionPhase::Evaluated => "evaluated",
        };
        f.write_str(name)
    }
}

/// One user utterance and the model's reply to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub user: String,
    pub ai: String,
}

/// State of a single debate.
#[derive(Debug, Clone)]
pub struct DebateSession {
    persona: Persona,
    topic: Topic,
    user_stance: Stance,
    turns: Vec<Turn>,
    messages: Vec<ChatMessage>,
}

impl DebateSession {
    fn new(persona: Persona, topic: Topic, user_stance: Stance) -> Self {
        Self {
            persona,
            topic,
            user_stance,
            turns: Vec::new(),
            messages: Vec::new(),
        }
    }

    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn user_stance(&self) -> Stance {
        self.user_stance
    }

    pub fn ai_stance(&self) -> Stance {
        self.user_stance.opposite()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Messages exchanged with the model, excluding the system prompt.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Store the model's reply to the latest turn.
    ///
    /// An empty reply also removes the unanswered user message so the log
    /// keeps alternating between user and assistant.
    pub(crate) fn record_reply(&mut self, reply: String) {
        if reply.is_empty() {
            if self.messages.last().is_some_and(|m| m.role == Role::User) {
                self.messages.pop();
            }
        } else {
            self.messages.push(ChatMessage::assistant(reply.clone()));
        }

        if let Some(turn) = self.turns.last_mut() {
            turn.ai = reply;
        }
    }
}

/// Conversation-and-evaluation controller for one user.
pub struct DebateBot {
    config: Config,
    model: Box<dyn ChatModel>,
    content: Option<ContentStore>,
    session: Option<DebateSession>,
    evaluation: Option<EvaluationResult>,
}

impl DebateBot {
    pub fn new(config: Config, model: Box<dyn ChatModel>) -> Self {
        Self {
            config,
            model,
            content: None,
            session: None,
            evaluation: None,
        }
    }

    /// Create a bot backed by the configured OpenAI-compatible provider.
    ///
    /// Fails when the API key is not present in the environment.
    pub fn from_config(config: Config) -> Result<Self, DebateError> {
        let api_key = config.api_key()?;
        let model = OpenAiModel::new(&config.model, &api_key)?;
        info!(model = %model.model_name(), api_base = %config.model.api_base, "Model client ready");
        Ok(Self::new(config, Box::new(model)))
    }

    pub fn phase(&self) -> SessionPhase {
        match (&self.content, &self.session, &self.evaluation) {
            (None, _, _) => SessionPhase::Uninitialized,
            (Some(_), None, _) => SessionPhase::Configured,
            (Some(_), Some(_), None) => SessionPhase::Active,
            (Some(_), Some(_), Some(_)) => SessionPhase::Evaluated,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn content(&self) -> Option<&ContentStore> {
        self.content.as_ref()
    }

    pub fn session(&self) -> Option<&DebateSession> {
        self.session.as_ref()
    }

    pub fn evaluation(&self) -> Option<&EvaluationResult> {
        self.evaluation.as_ref()
    }

    /// Turns left before the debate must be evaluated or restarted.
    pub fn turns_remaining(&self) -> usize {
        let used = self.session.as_ref().map_or(0, |s| s.turns.len());
        self.config.session.max_turns.saturating_sub(used)
    }

    /// Read the topic and character documents named in the configuration.
    ///
    /// On failure the previously loaded content, if any, stays in place.
    pub fn load_content(&mut self) -> Result<&ContentStore, DebateError> {
        let store = ContentStore::load(
            &self.config.content.topics_path,
            &self.config.content.characters_path,
        )?;
        Ok(self.load_content_from(store))
    }

    /// Install content that was loaded elsewhere.
    pub fn load_content_from(&mut self, store: ContentStore) -> &ContentStore {
        self.content.insert(store)
    }

    /// Begin a new debate, discarding any previous one.
    pub fn start_debate(
        &mut self,
        persona_id: &str,
        topic_id: &str,
        user_stance: Stance,
    ) -> Result<&DebateSession, DebateError> {
        let Some(content) = self.content.as_ref() else {
            return Err(DebateError::InvalidState {
                operation: "start a debate",
                phase: SessionPhase::Uninitialized,
            });
        };

        let persona = content
            .find_persona(persona_id)
            .ok_or_else(|| {
                warn!("Selected character not found: {}", persona_id);
                DebateError::SelectionNotFound {
                    kind: "character",
                    id: persona_id.to_string(),
                }
            })?
            .clone();
        let topic = content
            .find_topic(topic_id)
            .ok_or_else(|| {
                warn!("Selected topic not found: {}", topic_id);
                DebateError::SelectionNotFound {
                    kind: "topic",
                    id: topic_id.to_string(),
                }
            })?
            .clone();

        info!(
            character = %persona.char_type,
            topic = %topic.keyword,
            user_stance = %user_stance,
            ai_stance = %user_stance.opposite(),
            "Debate started"
        );

        self.evaluation = None;
        Ok(self
            .session
            .insert(DebateSession::new(persona, topic, user_stance)))
    }

    /// Send a user message and stream the model's reply.
    ///
    /// The returned stream borrows the bot until it is exhausted or dropped;
    /// the reply is written to the session at that point.
    pub fn chat_stream(&mut self, user_text: &str) -> Result<ReplyStream<'_>, DebateError> {
        let phase = self.phase();
        let session = match self.session.as_mut() {
            Some(session) if phase == SessionPhase::Active => session,
            _ => {
                return Err(DebateError::InvalidState {
                    operation: "chat",
                    phase,
                });
            }
        };

        let limits = &self.config.session;
        if session.turns.len() >= limits.max_turns {
            return Err(DebateError::TurnLimitReached {
                max: limits.max_turns,
            });
        }
        if user_text.trim().is_empty() {
            return Err(DebateError::EmptyInput);
        }
        let length = user_text.chars().count();
        if length > limits.max_input_chars {
            return Err(DebateError::InputTooLong {
                max: limits.max_input_chars,
                actual: length,
            });
        }

        let ai_stance = session.ai_stance();
        let style = limits.prompt_style;
        let turn_prompt = build_turn_prompt(user_text, style, session.topic.role_for(ai_stance));
        session.turns.push(Turn {
            user: user_text.to_string(),
            ai: String::new(),
        });
        session.messages.push(ChatMessage::user(turn_prompt));

        let request = ModelRequest {
            system: Some(system_prompt_for(
                style,
                &session.persona,
                &session.topic,
                ai_stance,
                &self.config.prompts,
            )),
            messages: session.messages.clone(),
            max_tokens: self.config.model.chat_max_tokens,
        };
        debug!(
            turn = session.turns.len(),
            messages = request.messages.len(),
            "Requesting streamed reply"
        );

        let inner = self.model.stream(request);
        Ok(ReplyStream::new(session, inner))
    }

    /// Score the current debate. Failures are folded into the result.
    pub async fn evaluate_debate(&mut self) -> Result<&EvaluationResult, DebateError> {
        let phase = self.phase();
        let session = match self.session.as_ref() {
            Some(session) if matches!(phase, SessionPhase::Active | SessionPhase::Evaluated) => {
                session
            }
            _ => {
                return Err(DebateError::InvalidState {
                    operation: "evaluate",
                    phase,
                });
            }
        };

        let result = evaluate_transcript(
            self.model.as_ref(),
            &session.turns,
            self.config.model.evaluation_max_tokens,
        )
        .await;
        info!(total = result.total(), failed = result.is_failed(), "Debate evaluated");
        Ok(self.evaluation.insert(result))
    }
}

/// Ask the model to judge a transcript and normalize its answer.
pub async fn evaluate_transcript(
    model: &dyn ChatModel,
    turns: &[Turn],
    max_tokens: u32,
) -> EvaluationResult {
    if turns.is_empty() {
        return EvaluationResult::failed("there are no turns to evaluate");
    }

    let request = ModelRequest {
        system: None,
        messages: vec![ChatMessage::user(build_evaluation_prompt(turns))],
        max_tokens,
    };

    match model.complete(request).await {
        Ok(text) => {
            debug!(response = %text, "Evaluation response");
            EvaluationResult::from_response(&text)
        }
        Err(e) => {
            warn!("Evaluation request failed: {}", e);
            EvaluationResult::failed(e)
        }
    }
}
