use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::{ChatClient, ChatMessage, ChatResponse, TokenUsage};

/// Chat client speaking the OpenAI-compatible completions dialect
/// (OpenAI, Groq, llama.cpp server and friends).
pub struct OpenAiChatClient {
    api_key: String,
    model: String,
    api_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

impl OpenAiChatClient {
    pub fn new(api_key: String, model: String, api_url: String) -> Self {
        Self {
            api_key,
            model,
            api_url,
            client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatClient for OpenAiChatClient {
    async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<serde_json::Value>,
    ) -> Result<ChatResponse> {
        let mut request = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.2,
        });
        if !tools.is_empty() {
            request["tools"] = serde_json::Value::Array(tools);
            request["tool_choice"] = serde_json::Value::String("auto".to_string());
        }

        tracing::debug!(model = %self.model, messages = messages_len(&request), "chat request");

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .context("chat request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("chat API error: {} - {}", status, error_text);
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .context("failed to parse chat response")?;

        let message = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .unwrap_or_else(|| ChatMessage::assistant("No response generated"));

        Ok(ChatResponse {
            message,
            usage: completion.usage,
        })
    }
}

fn messages_len(request: &serde_json::Value) -> usize {
    request["messages"].as_array().map(|a| a.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_response_parses() {
        let json = r#"{
            "choices": [{"message": {"role": "assistant", "content": "done"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }"#;
        let parsed: CompletionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices[0].message.content, "done");
        assert_eq!(parsed.usage.as_ref().unwrap().total_tokens, 15);
    }

    #[test]
    fn empty_choices_fall_back_gracefully() {
        let json = r#"{"choices": [], "usage": null}"#;
        let parsed: CompletionResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.choices.is_empty());
    }
}
