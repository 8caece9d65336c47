use anyhow::Result;

use shellbridge_api::ChatMessage;
use shellbridge_toolcore::ToolParameters;
use shellbridge_types::{AgentNotification, ConnectionId};

use crate::service::BridgeService;

pub const MAX_TOOL_ITERATIONS: usize = 25;

const SYSTEM_PROMPT: &str = "You are an operations assistant that manages a remote host through \
a terminal connection on behalf of a human operator. Use the available tools to run commands. \
Commands run asynchronously: execute_command returns an acknowledgement immediately and the \
output analysis arrives as a later message, so never wait for output in the same turn. The \
operator may be watching the terminal and the conversation live.";

/// Drive one user turn through the model, executing tool calls until the
/// model answers with plain text.
///
/// The tool context is built fresh for this turn and dropped when the turn
/// ends; failures inside tool execution come back to the model as error
/// strings rather than aborting the turn.
pub async fn run_chat_turn(
    service: &BridgeService,
    session_id: &str,
    connection_id: Option<ConnectionId>,
    content: &str,
) -> Result<()> {
    service.history.append_text(session_id, "user", content).await;

    let tool_definitions = service.tools.openai_tool_definitions();
    let mut iterations = 0;

    loop {
        let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];
        messages.extend(service.history.history(session_id).await);

        let response = service
            .chat_client
            .chat(messages, tool_definitions.clone())
            .await?;
        let assistant = response.message;
        service
            .history
            .append_message(session_id, assistant.clone())
            .await;

        let Some(tool_calls) = assistant.tool_calls.as_ref().filter(|c| !c.is_empty()) else {
            // Plain answer ends the turn
            service
                .viewers
                .send_to_session(
                    session_id,
                    AgentNotification::reply(assistant.content.clone(), true),
                )
                .await;
            return Ok(());
        };

        // Interim commentary alongside tool calls streams as an
        // incomplete reply
        if !assistant.content.trim().is_empty() {
            service
                .viewers
                .send_to_session(
                    session_id,
                    AgentNotification::reply(assistant.content.clone(), false),
                )
                .await;
        }

        iterations += 1;
        let context = service.tool_context(session_id, connection_id).await;

        for call in tool_calls {
            let params = match ToolParameters::from_json(&call.function.arguments) {
                Ok(params) => params,
                Err(e) => {
                    let text = format!("Error: invalid tool arguments: {e}");
                    service
                        .history
                        .append_message(
                            session_id,
                            ChatMessage::tool(&call.id, &call.function.name, &text),
                        )
                        .await;
                    continue;
                }
            };

            let result = service
                .tools
                .execute_tool(&call.function.name, params, &context)
                .await;
            let text = if result.success {
                result.content
            } else {
                format!("Error: {}", result.error.unwrap_or_default())
            };

            service
                .viewers
                .send_to_session(
                    session_id,
                    AgentNotification::chat(format!("[{}] {}", call.function.name, text)),
                )
                .await;
            service
                .history
                .append_message(
                    session_id,
                    ChatMessage::tool(&call.id, &call.function.name, &text),
                )
                .await;
        }

        if iterations >= MAX_TOOL_ITERATIONS {
            let warning = format!("Maximum tool iterations ({MAX_TOOL_ITERATIONS}) reached");
            tracing::warn!(session = %session_id, "{}", warning);
            service
                .viewers
                .send_to_session(session_id, AgentNotification::reply(warning, true))
                .await;
            return Ok(());
        }
    }
}
