use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use shellbridge_api::{ChatClient, ChatMessage};
use shellbridge_tracker::OutputAnalyzer;

const ANALYSIS_SYSTEM_PROMPT: &str = "You are reviewing the output of a shell command that was \
run on a remote host on an operator's behalf. Summarize what the output shows, call out \
errors or anything surprising, and suggest a next step if one is warranted. Be concise.";

/// Analyzer that asks the language model to interpret command output.
pub struct ChatOutputAnalyzer {
    client: Arc<dyn ChatClient>,
    max_output_chars: usize,
}

impl ChatOutputAnalyzer {
    pub fn new(client: Arc<dyn ChatClient>) -> Self {
        Self {
            client,
            max_output_chars: 16_000,
        }
    }

    pub fn with_max_output_chars(mut self, max_output_chars: usize) -> Self {
        self.max_output_chars = max_output_chars;
        self
    }
}

#[async_trait]
impl OutputAnalyzer for ChatOutputAnalyzer {
    async fn analyze(&self, command: &str, output: &str) -> Result<String> {
        let shown = tail_chars(output, self.max_output_chars);
        let prompt = if output.is_empty() {
            format!("The command `{command}` produced no output.")
        } else {
            format!("The command `{command}` produced this output:\n\n{shown}")
        };

        let messages = vec![
            ChatMessage::system(ANALYSIS_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ];

        let response = self.client.chat(messages, Vec::new()).await?;
        if response.message.content.trim().is_empty() {
            anyhow::bail!("model returned an empty analysis");
        }
        Ok(response.message.content)
    }
}

/// Keep the last `max_chars` characters; the tail of command output is
/// where errors and prompts live.
fn tail_chars(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    if count <= max_chars {
        s.to_string()
    } else {
        s.chars().skip(count - max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use shellbridge_api::ChatResponse;

    struct CannedClient {
        reply: String,
        last_prompt: StdMutex<String>,
    }

    #[async_trait]
    impl ChatClient for CannedClient {
        async fn chat(
            &self,
            messages: Vec<ChatMessage>,
            _tools: Vec<serde_json::Value>,
        ) -> Result<ChatResponse> {
            *self.last_prompt.lock().unwrap() = messages.last().unwrap().content.clone();
            Ok(ChatResponse {
                message: ChatMessage::assistant(self.reply.clone()),
                usage: None,
            })
        }
    }

    #[tokio::test]
    async fn analysis_includes_command_and_output() {
        let client = Arc::new(CannedClient {
            reply: "looks fine".to_string(),
            last_prompt: StdMutex::new(String::new()),
        });
        let analyzer = ChatOutputAnalyzer::new(client.clone());

        let result = analyzer.analyze("df -h", "Filesystem 95% full").await.unwrap();
        assert_eq!(result, "looks fine");

        let prompt = client.last_prompt.lock().unwrap().clone();
        assert!(prompt.contains("df -h"));
        assert!(prompt.contains("95% full"));
    }

    #[tokio::test]
    async fn empty_model_reply_is_an_error() {
        let client = Arc::new(CannedClient {
            reply: "   ".to_string(),
            last_prompt: StdMutex::new(String::new()),
        });
        let analyzer = ChatOutputAnalyzer::new(client);
        assert!(analyzer.analyze("ls", "file").await.is_err());
    }

    #[test]
    fn tail_keeps_the_end_of_long_output() {
        let long = format!("{}THE-END", "x".repeat(100));
        assert_eq!(tail_chars(&long, 7), "THE-END");
        assert_eq!(tail_chars("short", 100), "short");
    }
}
