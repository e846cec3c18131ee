//! Language model clients used by the agent steps.
//!
//! | `llm.provider` | Client |
//! |----------------|--------|
//! | `"extractive"` | [`ExtractiveModel`], offline and deterministic |
//! | `"openai"` | [`OpenAiChatModel`], any OpenAI-compatible `/v1/chat/completions` |
//! | `"ollama"` | [`OllamaChatModel`], `/api/chat` without streaming |

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::error::OrchestrationError;
use crate::http;

pub const CONSULT_ADVICE: &str = "These findings are informational only. Please consult a \
healthcare provider before making any medical, dietary, or exercise decisions.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

/// Everything one agent step sends to the model.
#[derive(Debug, Clone, Default)]
pub struct ChatPrompt {
    /// Agent persona: role, goal and backstory.
    pub system: String,
    /// Task description with the user query interpolated.
    pub task: String,
    /// Report excerpts returned by the search tool.
    pub context: Vec<String>,
    /// `(role, output)` of every earlier step, in order.
    pub previous: Vec<(String, String)>,
    pub expected_output: String,
}

impl ChatPrompt {
    /// System + user message pair in chat-completion form.
    pub fn messages(&self) -> Vec<ChatMessage> {
        let mut user = self.task.clone();

        user.push_str("\n\nReport excerpts:\n");
        if self.context.is_empty() {
            user.push_str("(no matching sections found)\n");
        }
        for excerpt in &self.context {
            user.push_str("- ");
            user.push_str(excerpt.trim());
            user.push('\n');
        }

        if !self.previous.is_empty() {
            user.push_str("\nFindings from earlier steps:\n");
            for (role, output) in &self.previous {
                user.push_str(&format!("### {}\n{}\n", role, output.trim()));
            }
        }

        user.push_str("\nExpected output:\n");
        user.push_str(&self.expected_output);

        vec![
            ChatMessage {
                role: "system",
                content: self.system.clone(),
            },
            ChatMessage {
                role: "user",
                content: user,
            },
        ]
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;
    async fn complete(&self, prompt: &ChatPrompt) -> Result<String, OrchestrationError>;
}

// ============ Extractive ============

/// Offline model: lists the report lines found by the search tool and closes
/// with the consult-a-provider advice. Same prompt, same output.
pub struct ExtractiveModel;

#[async_trait]
impl LanguageModel for ExtractiveModel {
    fn model_name(&self) -> &str {
        "extractive"
    }

    async fn complete(&self, prompt: &ChatPrompt) -> Result<String, OrchestrationError> {
        let mut seen = std::collections::HashSet::new();
        let lines: Vec<&str> = prompt
            .context
            .iter()
            .flat_map(|excerpt| excerpt.lines())
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter(|line| seen.insert(without_page_tag(line)))
            .collect();

        let mut out = String::new();
        if lines.is_empty() {
            out.push_str("No matching results were found in the report for this request.\n");
        } else {
            out.push_str("Relevant results from the report:\n");
            for line in lines {
                out.push_str("- ");
                out.push_str(line);
                out.push('\n');
            }
        }
        out.push('\n');
        out.push_str(CONSULT_ADVICE);
        Ok(out)
    }
}

/// `"[page 2] Hemoglobin ..."` → `"Hemoglobin ..."`.
fn without_page_tag(line: &str) -> &str {
    line.strip_prefix("[page ")
        .and_then(|rest| rest.split_once("] "))
        .filter(|(page, _)| page.chars().all(|c| c.is_ascii_digit()))
        .map_or(line, |(_, text)| text)
}

// ============ OpenAI-compatible ============

pub struct OpenAiChatModel {
    model: String,
    endpoint: String,
    api_key: String,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiChatModel {
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for OpenAI provider"))?;
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            anyhow::anyhow!("{} environment variable not set", config.api_key_env)
        })?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com".to_string());
        let client = http::client(config.timeout_secs).map_err(anyhow::Error::msg)?;

        Ok(Self {
            model,
            endpoint: format!("{}/v1/chat/completions", url.trim_end_matches('/')),
            api_key,
            temperature: config.temperature,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &ChatPrompt) -> Result<String, OrchestrationError> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": prompt.messages(),
        });
        let json = http::post_json_with_retry(
            &self.client,
            &self.endpoint,
            Some(&self.api_key),
            &body,
            self.max_retries,
            "chat completion",
        )
        .await
        .map_err(OrchestrationError::Model)?;

        let content = json
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .ok_or_else(|| {
                OrchestrationError::Model("invalid chat response: missing choices[0].message.content".into())
            })?;
        non_empty(content)
    }
}

// ============ Ollama ============

pub struct OllamaChatModel {
    model: String,
    endpoint: String,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaChatModel {
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        let client = http::client(config.timeout_secs).map_err(anyhow::Error::msg)?;

        Ok(Self {
            model,
            endpoint: format!("{}/api/chat", url.trim_end_matches('/')),
            temperature: config.temperature,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &ChatPrompt) -> Result<String, OrchestrationError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": prompt.messages(),
            "stream": false,
            "options": { "temperature": self.temperature },
        });
        let json = http::post_json_with_retry(
            &self.client,
            &self.endpoint,
            None,
            &body,
            self.max_retries,
            "Ollama chat",
        )
        .await
        .map_err(OrchestrationError::Model)?;

        let content = json
            .pointer("/message/content")
            .and_then(|c| c.as_str())
            .ok_or_else(|| {
                OrchestrationError::Model("invalid Ollama response: missing message.content".into())
            })?;
        non_empty(content)
    }
}

fn non_empty(content: &str) -> Result<String, OrchestrationError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(OrchestrationError::EmptyResponse);
    }
    Ok(trimmed.to_string())
}

pub fn create_model(config: &LlmConfig) -> anyhow::Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "extractive" => Ok(Arc::new(ExtractiveModel)),
        "openai" => Ok(Arc::new(OpenAiChatModel::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaChatModel::new(config)?)),
        other => anyhow::bail!("Unknown llm provider: {}", other),
    }
}
