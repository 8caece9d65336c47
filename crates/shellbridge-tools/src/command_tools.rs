use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use shellbridge_toolcore::{param, ParameterDefinition, Tool, ToolContext, ToolParameters, ToolResult};

/// Tool for running a shell command on the conversation's terminal
/// connection.
///
/// The call is fire-and-forget by design: the command is written to the
/// remote input stream, registered with the tracker, and an acknowledgement
/// is returned immediately. The analysis of the output arrives later as a
/// separate conversation message, because shell commands have unbounded
/// duration and the model must not block on them.
pub struct ExecuteCommandTool;

#[async_trait]
impl Tool for ExecuteCommandTool {
    fn name(&self) -> &str {
        "execute_command"
    }

    fn description(&self) -> &str {
        "Execute a shell command on the remote terminal connection. The command runs asynchronously: this call returns an acknowledgement immediately, and an analysis of the command's output is delivered as a later message once the command completes or times out."
    }

    fn parameters(&self) -> HashMap<String, ParameterDefinition> {
        HashMap::from([
            param!("command", "string", "Shell command to execute on the remote host", required),
            param!(
                "timeout_seconds",
                "integer",
                "Seconds to wait before the command is considered timed out (default: 60)",
                optional
            ),
        ])
    }

    async fn execute(&self, params: ToolParameters, context: &ToolContext) -> ToolResult {
        let command = match params.get_required::<String>("command") {
            Ok(c) => c,
            Err(e) => return ToolResult::error(e.to_string()),
        };
        let timeout = match params.get_optional::<u64>("timeout_seconds") {
            Ok(secs) => secs.map(Duration::from_secs),
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let Some(connection_id) = context.connection_id else {
            return ToolResult::error(
                "No terminal connection is bound to this conversation".to_string(),
            );
        };

        // Register before writing so the first output chunk is not missed
        let command_id = context
            .tracker
            .register_command(&context.agent_session_id, connection_id, &command, timeout)
            .await;

        let mut line = command.clone();
        if !line.ends_with('\n') {
            line.push('\n');
        }

        match context.connections.send_input(connection_id, line.as_bytes()).await {
            Ok(()) => ToolResult::success(format!(
                "Command sent to {}. It is running asynchronously; the output and its analysis will arrive as a separate message (command id {}).",
                context.target_label(),
                command_id
            )),
            Err(e) => {
                context.tracker.cleanup(command_id).await;
                ToolResult::error(format!("Failed to send command: {}", e))
            }
        }
    }
}

/// Tool reporting which host the conversation's terminal is connected to.
pub struct ConnectionTargetTool;

#[async_trait]
impl Tool for ConnectionTargetTool {
    fn name(&self) -> &str {
        "current_connection_target"
    }

    fn description(&self) -> &str {
        "Get the identifier of the host the current terminal connection points at"
    }

    fn parameters(&self) -> HashMap<String, ParameterDefinition> {
        HashMap::new()
    }

    async fn execute(&self, _params: ToolParameters, context: &ToolContext) -> ToolResult {
        match &context.target_host {
            Some(target) => ToolResult::success(target.clone()),
            None => ToolResult::error(
                "No terminal connection is bound to this conversation".to_string(),
            ),
        }
    }
}

/// Tool probing whether the terminal connection can accept commands.
pub struct ProbeAvailabilityTool;

#[async_trait]
impl Tool for ProbeAvailabilityTool {
    fn name(&self) -> &str {
        "probe_availability"
    }

    fn description(&self) -> &str {
        "Check whether the current terminal connection is alive and able to accept commands"
    }

    fn parameters(&self) -> HashMap<String, ParameterDefinition> {
        HashMap::new()
    }

    async fn execute(&self, _params: ToolParameters, context: &ToolContext) -> ToolResult {
        let Some(connection_id) = context.connection_id else {
            return ToolResult::success(
                "No terminal connection is bound to this conversation".to_string(),
            );
        };

        match context.connections.get(connection_id).await {
            Some(conn) if conn.is_alive() => ToolResult::success(format!(
                "Terminal connection to {} is available",
                context.target_label()
            )),
            Some(_) => ToolResult::success(format!(
                "Terminal connection to {} is closed; reconnect before running commands",
                context.target_label()
            )),
            None => ToolResult::success(format!(
                "Terminal connection {} no longer exists",
                connection_id
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::sync::mpsc as std_mpsc;
    use std::sync::{Arc, Mutex as StdMutex};
    use std::time::Duration;

    use shellbridge_terminal::{
        ConnectionRegistry, Credentials, HostTarget, OutputSink, ShellChannel, ShellProcess,
        ShellTransport,
    };
    use shellbridge_tracker::{AnalysisPool, CommandTracker, ConversationSink, OutputAnalyzer};
    use shellbridge_types::ConnectionId;
    use shellbridge_viewers::ViewerRegistry;

    // Simulates a quiet remote shell: the read blocks until the process
    // exits so the bridge does not see a premature EOF.
    struct BlockingReader {
        _keep_alive: std_mpsc::Sender<()>,
        rx: std_mpsc::Receiver<()>,
    }

    impl BlockingReader {
        fn new() -> Self {
            let (tx, rx) = std_mpsc::channel();
            Self { _keep_alive: tx, rx }
        }
    }

    impl Read for BlockingReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            let _ = self.rx.recv();
            Ok(0)
        }
    }

    struct ChannelWriter {
        tx: std_mpsc::Sender<Vec<u8>>,
    }

    impl Write for ChannelWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let _ = self.tx.send(buf.to_vec());
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct NoopProcess;

    impl ShellProcess for NoopProcess {
        fn kill(&mut self) -> anyhow::Result<()> {
            Ok(())
        }

        fn try_wait(&mut self) -> Option<i32> {
            None
        }
    }

    struct CapturingTransport {
        inputs: Arc<StdMutex<Vec<std_mpsc::Receiver<Vec<u8>>>>>,
    }

    #[async_trait]
    impl ShellTransport for CapturingTransport {
        async fn open(
            &self,
            _target: &HostTarget,
            _credentials: &Credentials,
        ) -> anyhow::Result<ShellChannel> {
            let (tx, rx) = std_mpsc::channel();
            self.inputs.lock().unwrap().push(rx);
            Ok(ShellChannel {
                reader: Box::new(BlockingReader::new()),
                writer: Box::new(ChannelWriter { tx }),
                process: Box::new(NoopProcess),
            })
        }

        fn name(&self) -> &str {
            "capturing"
        }
    }

    struct NullSink;

    #[async_trait]
    impl OutputSink for NullSink {
        async fn append_output(&self, _connection_id: ConnectionId, _chunk: &str) {}
        async fn connection_lost(&self, _connection_id: ConnectionId) {}
    }

    struct NullAnalyzer;

    #[async_trait]
    impl OutputAnalyzer for NullAnalyzer {
        async fn analyze(&self, _command: &str, _output: &str) -> anyhow::Result<String> {
            Ok("noop".to_string())
        }
    }

    struct NullConversation;

    #[async_trait]
    impl ConversationSink for NullConversation {
        async fn append(&self, _session_id: &str, _role: &str, _content: &str) {}
    }

    async fn connected_context() -> (ToolContext, std_mpsc::Receiver<Vec<u8>>) {
        let inputs = Arc::new(StdMutex::new(Vec::new()));
        let transport = CapturingTransport {
            inputs: Arc::clone(&inputs),
        };
        let viewers = Arc::new(ViewerRegistry::new());
        let tracker = Arc::new(CommandTracker::new(
            Arc::clone(&viewers),
            AnalysisPool::new(Arc::new(NullAnalyzer), 1),
            Arc::new(NullConversation),
        ));
        let connections = Arc::new(ConnectionRegistry::new(
            Arc::new(transport),
            viewers,
            Arc::new(NullSink),
        ));

        let connection_id = connections
            .connect(HostTarget::new("db01").with_username("ops"), Credentials::default())
            .await
            .unwrap();
        let input_rx = inputs.lock().unwrap().remove(0);

        let context = ToolContext::new("ai1", connections, tracker)
            .with_connection(connection_id, "ops@db01");
        (context, input_rx)
    }

    #[tokio::test]
    async fn execute_command_registers_and_sends_with_newline() {
        let (context, input_rx) = connected_context().await;

        let params = ToolParameters::from_json(r#"{"command": "uptime"}"#).unwrap();
        let result = ExecuteCommandTool.execute(params, &context).await;

        assert!(result.success, "unexpected error: {:?}", result.error);
        assert!(result.content.contains("ops@db01"));
        assert!(result.content.contains("asynchronously"));

        let written = input_rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(written, b"uptime\n");

        let connection_id = context.connection_id.unwrap();
        let active = context.tracker.active_command_id(connection_id).await;
        assert!(active.is_some());
        let snapshot = context.tracker.command(active.unwrap()).await.unwrap();
        assert_eq!(snapshot.command_text, "uptime");
        assert_eq!(snapshot.agent_session_id, "ai1");
    }

    #[tokio::test]
    async fn execute_command_without_connection_is_an_error_string() {
        let (context, _input_rx) = connected_context().await;
        let unbound = ToolContext::new("ai1", Arc::clone(&context.connections), Arc::clone(&context.tracker));

        let params = ToolParameters::from_json(r#"{"command": "ls"}"#).unwrap();
        let result = ExecuteCommandTool.execute(params, &unbound).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("No terminal connection"));
    }

    #[tokio::test]
    async fn execute_command_cleans_up_registration_when_send_fails() {
        let (context, _input_rx) = connected_context().await;
        let connection_id = context.connection_id.unwrap();
        context.connections.disconnect(connection_id).await.unwrap();

        let params = ToolParameters::from_json(r#"{"command": "ls"}"#).unwrap();
        let result = ExecuteCommandTool.execute(params, &context).await;
        assert!(!result.success);
        assert_eq!(context.tracker.command_count().await, 0);
        assert_eq!(context.tracker.active_command_id(connection_id).await, None);
    }

    #[tokio::test]
    async fn target_and_probe_tools_report_connection_state() {
        let (context, _input_rx) = connected_context().await;

        let result = ConnectionTargetTool
            .execute(ToolParameters::default(), &context)
            .await;
        assert!(result.success);
        assert_eq!(result.content, "ops@db01");

        let result = ProbeAvailabilityTool
            .execute(ToolParameters::default(), &context)
            .await;
        assert!(result.success);
        assert!(result.content.contains("available"));

        let connection_id = context.connection_id.unwrap();
        context.connections.disconnect(connection_id).await.unwrap();
        let result = ProbeAvailabilityTool
            .execute(ToolParameters::default(), &context)
            .await;
        assert!(result.success);
        assert!(result.content.contains("no longer exists"));
    }
}
