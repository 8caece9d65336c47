// LLM tool implementations for operating the remote shell

mod command_tools;

pub use command_tools::{ConnectionTargetTool, ExecuteCommandTool, ProbeAvailabilityTool};

use shellbridge_toolcore::ToolRegistry;

/// Register the standard shell-operation tool set.
pub fn register_shell_tools(registry: &mut ToolRegistry) {
    registry.register(ExecuteCommandTool);
    registry.register(ConnectionTargetTool);
    registry.register(ProbeAvailabilityTool);
}
