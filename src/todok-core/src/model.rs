//! Model provider boundary.
//!
//! `ChatModel` is the seam between the session controller and whatever serves
//! completions. `OpenAiModel` talks to any OpenAI-compatible endpoint.

use std::pin::Pin;
use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    CreateChatCompletionStreamResponse,
};
use async_trait::async_trait;
use futures::{Stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ModelConfig;
use crate::error::DebateError;

/// Text fragments of a streamed reply, in arrival order.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, DebateError>> + Send>>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A role-tagged message in the log sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One request to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRequest {
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Return the whole reply at once.
    async fn complete(&self, request: ModelRequest) -> Result<String, DebateError>;

    /// Return the reply as a lazy stream of fragments.
    ///
    /// Nothing is sent until the stream is first polled; connection failures
    /// arrive as the first item.
    fn stream(&self, request: ModelRequest) -> FragmentStream;
}

/// Chat completions over an OpenAI-compatible API.
#[derive(Debug, Clone)]
pub struct OpenAiModel {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiModel {
    pub fn new(config: &ModelConfig, api_key: &str) -> Result<Self, DebateError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DebateError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(&config.api_base);

        Ok(Self {
            client: Client::with_config(openai_config).with_http_client(http_client),
            model: config.name.clone(),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    fn build_request(
        &self,
        request: ModelRequest,
        stream: bool,
    ) -> Result<CreateChatCompletionRequest, DebateError> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = request.system {
            messages.push(ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessage {
                    content: system.into(),
                    name: None,
                },
            ));
        }
        messages.extend(request.messages.into_iter().map(to_openai_message));

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model)
            .max_completion_tokens(request.max_tokens)
            .messages(messages);
        if stream {
            args.stream(true);
        }
        Ok(args.build()?)
    }
}

fn to_openai_message(message: ChatMessage) -> ChatCompletionRequestMessage {
    match message.role {
        Role::User => ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
            content: message.content.into(),
            name: None,
        }),
        Role::Assistant => {
            ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                content: Some(message.content.into()),
                name: None,
                tool_calls: None,
                refusal: None,
                audio: None,
                function_call: None,
            })
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiModel {
    /// Retries transient failures with exponential backoff.
    async fn complete(&self, request: ModelRequest) -> Result<String, DebateError> {
        let request = self.build_request(request, false)?;

        let max_retries = 3;
        let mut last_error = None;

        for attempt in 0..max_retries {
            if attempt > 0 {
                // 1s, 2s
                let delay = Duration::from_secs(1 << (attempt - 1));
                warn!(attempt, ?delay, "Retrying model request");
                tokio::time::sleep(delay).await;
            }

            match self.client.chat().create(request.clone()).await {
                Ok(response) => {
                    let content = response
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|c| c.message.content)
                        .unwrap_or_default();
                    debug!(model = %self.model, chars = content.len(), "Model response received");
                    return Ok(content);
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.map(DebateError::from).unwrap_or_else(|| {
            DebateError::StreamTransport("Unknown API error after retries".to_string())
        }))
    }

    fn stream(&self, request: ModelRequest) -> FragmentStream {
        let client = self.client.clone();
        let request = self.build_request(request, true);

        let opened = async move {
            let stream = client.chat().create_stream(request?).await?;
            Ok::<_, DebateError>(
                stream
                    .map_err(DebateError::from)
                    .try_filter_map(|chunk| async move { Ok(chunk_text(chunk)) }),
            )
        };

        futures::stream::once(opened).try_flatten().boxed()
    }
}

/// Text carried by one streamed chunk. Role-only and empty deltas carry none.
fn chunk_text(chunk: CreateChatCompletionStreamResponse) -> Option<String> {
    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|text| !text.is_empty())
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory model used by controller tests.

    use super::*;
    use std::sync::{Arc, Mutex};

    /// How a scripted stream behaves after its fragments run out.
    #[derive(Debug, Clone)]
    pub enum StreamEnd {
        Finish,
        Fail(String),
        Hang,
    }

    #[derive(Debug, Clone)]
    pub struct ScriptedModel {
        pub fragments: Vec<String>,
        pub end: StreamEnd,
        pub completion: Result<String, String>,
        pub requests: Arc<Mutex<Vec<ModelRequest>>>,
    }

    impl ScriptedModel {
        pub fn new(fragments: &[&str]) -> Self {
            Self {
                fragments: fragments.iter().map(|s| s.to_string()).collect(),
                end: StreamEnd::Finish,
                completion: Ok(String::new()),
                requests: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn ending_with(mut self, end: StreamEnd) -> Self {
            self.end = end;
            self
        }

        pub fn completing(mut self, completion: Result<&str, &str>) -> Self {
            self.completion = completion.map(str::to_string).map_err(str::to_string);
            self
        }

        pub fn recorded(&self) -> Vec<ModelRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(&self, request: ModelRequest) -> Result<String, DebateError> {
            self.requests.lock().unwrap().push(request);
            self.completion
                .clone()
                .map_err(DebateError::StreamTransport)
        }

        fn stream(&self, request: ModelRequest) -> FragmentStream {
            self.requests.lock().unwrap().push(request);
            let fragments = futures::stream::iter(self.fragments.clone().into_iter().map(Ok));
            match self.end.clone() {
                StreamEnd::Finish => fragments.boxed(),
                StreamEnd::Fail(message) => fragments
                    .chain(futures::stream::once(async move {
                        Err(DebateError::StreamTransport(message))
                    }))
                    .boxed(),
                StreamEnd::Hang => fragments.chain(futures::stream::pending()).boxed(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedModel;
    use super::*;

    fn request() -> ModelRequest {
        ModelRequest {
            system: Some("system".to_string()),
            messages: vec![ChatMessage::user("안녕"), ChatMessage::assistant("반가워")],
            max_tokens: 500,
        }
    }

    #[test]
    fn test_openai_request_prepends_system_message() {
        let model = OpenAiModel::new(&ModelConfig::default(), "test-key").unwrap();
        let built = model.build_request(request(), true).unwrap();

        assert_eq!(built.messages.len(), 3);
        assert!(matches!(
            built.messages[0],
            ChatCompletionRequestMessage::System(_)
        ));
        assert!(matches!(built.messages[1], ChatCompletionRequestMessage::User(_)));
        assert!(matches!(
            built.messages[2],
            ChatCompletionRequestMessage::Assistant(_)
        ));
        assert_eq!(built.stream, Some(true));
        assert_eq!(built.model, "gpt-4o-mini");
    }

    #[test]
    fn test_openai_request_without_system() {
        let model = OpenAiModel::new(&ModelConfig::default(), "test-key").unwrap();
        let mut req = request();
        req.system = None;
        let built = model.build_request(req, false).unwrap();
        assert_eq!(built.messages.len(), 2);
        assert_eq!(built.stream, None);
    }

    #[tokio::test]
    async fn test_stream_concatenation_matches_completion() {
        let text = "교복은 학생 간 위화감을 줄여줘.";
        let model = ScriptedModel::new(&["교복은 ", "학생 간 ", "위화감을 줄여줘."])
            .completing(Ok(text));

        let streamed: Vec<String> = model.stream(request()).try_collect().await.unwrap();
        let whole = model.complete(request()).await.unwrap();
        assert_eq!(streamed.concat(), whole);
    }

    fn chunk(choices: &str) -> CreateChatCompletionStreamResponse {
        serde_json::from_str(&format!(
            r#"{{"id":"chatcmpl-1","object":"chat.completion.chunk","created":1,"model":"gpt-4o-mini","choices":{choices}}}"#
        ))
        .unwrap()
    }

    #[test]
    fn test_chunk_text_takes_first_choice_content() {
        let text = chunk(
            r#"[{"index":0,"delta":{"content":"교복은 "},"finish_reason":null}]"#,
        );
        assert_eq!(chunk_text(text), Some("교복은 ".to_string()));

        let role_only = chunk(
            r#"[{"index":0,"delta":{"role":"assistant"},"finish_reason":null}]"#,
        );
        assert_eq!(chunk_text(role_only), None);

        let empty = chunk(r#"[{"index":0,"delta":{"content":""},"finish_reason":"stop"}]"#);
        assert_eq!(chunk_text(empty), None);

        assert_eq!(chunk_text(chunk("[]")), None);
    }

    #[tokio::test]
    async fn test_openai_stream_reports_connection_failure() {
        let config = ModelConfig {
            api_base: "http://127.0.0.1:9/v1".to_string(),
            ..ModelConfig::default()
        };
        let model = OpenAiModel::new(&config, "test-key").unwrap();

        let mut stream = model.stream(request());
        let first = tokio::time::timeout(Duration::from_secs(30), stream.next())
            .await
            .unwrap();
        assert!(matches!(first, Some(Err(_))));
    }
}
