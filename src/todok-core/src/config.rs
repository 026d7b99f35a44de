//! Configuration module for loading TOML config files.

use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::DebateError;
use crate::prompt::PromptStyle;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub session: SessionConfig,
    pub content: ContentConfig,
    pub prompts: PromptsConfig,
}

/// Backing model and provider settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub name: String,
    /// OpenAI-compatible API base URL.
    pub api_base: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub chat_max_tokens: u32,
    pub evaluation_max_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "gpt-4o-mini".to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            chat_max_tokens: 500,
            evaluation_max_tokens: 3000,
        }
    }
}

/// Limits applied to a single debate.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub max_turns: usize,
    pub max_input_chars: usize,
    pub stream_timeout_secs: u64,
    pub prompt_style: PromptStyle,
}

impl SessionConfig {
    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: 10,
            max_input_chars: 200,
            stream_timeout_secs: 30,
            prompt_style: PromptStyle::Rebuttal,
        }
    }
}

/// Locations of the topic and character documents.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    pub topics_path: PathBuf,
    pub characters_path: PathBuf,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            topics_path: PathBuf::from("data/debate_topics.json"),
            characters_path: PathBuf::from("data/characters.json"),
        }
    }
}

/// Debate guidance embedded into the system prompt.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub debate_knowledge: String,
    pub rebuttal_guidelines: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            debate_knowledge: DEFAULT_DEBATE_KNOWLEDGE.to_string(),
            rebuttal_guidelines: DEFAULT_REBUTTAL_GUIDELINES.to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        default_config()
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DebateError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| DebateError::Config(format!("Failed to read config: {}", e)))?;

        Self::from_str(&content)
    }

    /// Load configuration from string content.
    pub fn from_str(content: &str) -> Result<Self, DebateError> {
        toml::from_str(content)
            .map_err(|e| DebateError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Read the provider API key from the configured environment variable.
    pub fn api_key(&self) -> Result<String, DebateError> {
        match env::var(&self.model.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(DebateError::MissingCredential(
                self.model.api_key_env.clone(),
            )),
        }
    }
}

/// Default configuration embedded in the binary.
pub fn default_config() -> Config {
    Config {
        model: ModelConfig::default(),
        session: SessionConfig::default(),
        content: ContentConfig::default(),
        prompts: PromptsConfig::default(),
    }
}

const DEFAULT_DEBATE_KNOWLEDGE: &str = r#"1. 가치논제는 옳은지 그른지, 바람직한지 아닌지, 좋은지 나쁜지 등 가치판단이 쟁점이 되는 논제입니다. 승패를 가를 때에는 논제를 더 잘 이해하고, 적절한 근거를 잘 제시했는지를 평가하게 됩니다.
2. 반론/반박의 전략은 두 가지가 있습니다. 1)직접적/공격적으로 주장을 하는 방법은 상대방이 주장하고 제시한 내용들을 모두 반박하는 것입니다. 이런 방법을 취하기 위해서는 주장을 '잘' 들을 수 있어야 하고, 주장에 대해 '적절하게' 반박할 수 있어야 합니다. 2)방어적으로 주장을 하는 방법은 부정측의 입장을 토대로 주장을 세우고 시작하는 것입니다.
3. 토론에서 이기기 위해 가장 중요한 것은 상대방의 주장을 논파해내는 것이 아니라, 내 주장을 설득하는 것입니다. 토론의 진짜 의의는 '승패'보다도 "주제에 대해 충분히 생각해보고, 보다 나은 의사결정을 하는 것"에 있습니다."#;

const DEFAULT_REBUTTAL_GUIDELINES: &str = r#"1. 사용자의 말 중 부적절한 부분이 있다면 반론의 전략 1번(직접적/공격적으로 주장을 하는 방법)을 사용하세요.
2. 사용자의 주장이 적절하다면 반론의 전략 2번(방어적으로 주장을 하는 방법)을 사용하세요."#;
