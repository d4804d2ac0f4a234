//! Chat-model abstraction, the Ollama client, and retried chat tasks.
//!
//! Every pipeline stage talks to the model through [`run_chat_task`]: a
//! [`ChatTask`] carries exactly the inputs of one call (prompt, response
//! format, log label) and a parser decides whether the reply is usable.
//! Transport errors and unparseable replies are both retried under the
//! configured [`RetryPolicy`].

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::{Config, LlmConfig};
use crate::parse::ParseError;
use crate::retry::{retry_with_backoff, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Output mode requested from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    /// Bias the model towards emitting a single JSON object.
    Json,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Send `messages` and return the assistant's reply text.
    async fn chat(&self, messages: &[ChatMessage], format: ResponseFormat) -> Result<String>;
}

// ============ Ollama Chat ============

/// Chat model served by Ollama's `POST /api/chat` (non-streaming).
pub struct OllamaChat {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(&self, messages: &[ChatMessage], format: ResponseFormat) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
        });
        if format == ResponseFormat::Json {
            body["format"] = serde_json::Value::String("json".to_string());
        }

        let response = self
            .client
            .post(format!("{}/api/chat", self.url))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                anyhow!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url,
                    e
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Ollama API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        parse_chat_response(&json)
    }
}

/// Extract `message.content` from an `/api/chat` response.
pub fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    if let Some(error) = json.get("error").and_then(|e| e.as_str()) {
        bail!("Ollama error: {}", error);
    }

    json.get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing message.content"))
}

/// Create the configured [`ChatModel`].
pub fn create_chat_model(config: &Config) -> Result<Arc<dyn ChatModel>> {
    match config.llm.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaChat::new(&config.llm)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

// ============ Chat tasks ============

/// One unit of model work: a single-message prompt and its expected output mode.
#[derive(Debug, Clone)]
pub struct ChatTask {
    /// Short description used in logs (e.g. `"seed high school/biology"`).
    pub label: String,
    pub prompt: String,
    pub format: ResponseFormat,
}

impl ChatTask {
    pub fn text(label: impl Into<String>, prompt: String) -> Self {
        Self {
            label: label.into(),
            prompt,
            format: ResponseFormat::Text,
        }
    }

    pub fn json(label: impl Into<String>, prompt: String) -> Self {
        Self {
            label: label.into(),
            prompt,
            format: ResponseFormat::Json,
        }
    }
}

/// Run `task` under `policy` until `parse` accepts the reply.
///
/// Returns the last error (transport or parse) once attempts run out.
pub async fn run_chat_task<T, P>(
    chat: &dyn ChatModel,
    policy: &RetryPolicy,
    task: &ChatTask,
    parse: P,
) -> Result<T>
where
    P: Fn(&str) -> Result<T, ParseError>,
{
    let messages = [ChatMessage::user(task.prompt.clone())];
    let messages: &[ChatMessage] = &messages;
    let parse = &parse;

    retry_with_backoff(policy, || async move {
        debug!("Chat request: {}", task.label);
        let reply = chat.chat(messages, task.format).await?;
        parse(&reply).map_err(|e| anyhow!("{}: {}", task.label, e))
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedChat {
        replies: Mutex<Vec<Result<String>>>,
        seen: Mutex<Vec<ResponseFormat>>,
    }

    impl ScriptedChat {
        fn new(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().rev().collect()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedChat {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn chat(&self, _messages: &[ChatMessage], format: ResponseFormat) -> Result<String> {
            self.seen.lock().unwrap().push(format);
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(anyhow!("script exhausted")))
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            jitter: false,
        }
    }

    #[test]
    fn test_parse_chat_response() {
        let json = serde_json::json!({
            "model": "gemma3:4b",
            "message": { "role": "assistant", "content": "Hello" },
            "done": true
        });
        assert_eq!(parse_chat_response(&json).unwrap(), "Hello");
    }

    #[test]
    fn test_parse_chat_response_error() {
        let json = serde_json::json!({ "error": "model 'x' not found" });
        let err = parse_chat_response(&json).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_task_retries_unparseable_reply() {
        let chat = ScriptedChat::new(vec![
            Ok("   ".to_string()),
            Err(anyhow!("connection reset")),
            Ok("What is light?\nWhy is the sky blue?".to_string()),
        ]);
        let task = ChatTask::text("seed test", "prompt".to_string());
        let questions = run_chat_task(&chat, &fast_policy(3), &task, crate::parse::parse_questions)
            .await
            .unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(chat.seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_task_exhaustion_returns_error() {
        let chat = ScriptedChat::new(vec![Ok("no json".to_string()), Ok("still none".to_string())]);
        let task = ChatTask::json("eval test", "prompt".to_string());
        let result =
            run_chat_task(&chat, &fast_policy(2), &task, crate::parse::parse_evaluation).await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("eval test"));
        assert_eq!(
            *chat.seen.lock().unwrap(),
            vec![ResponseFormat::Json, ResponseFormat::Json]
        );
    }
}
