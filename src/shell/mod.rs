//! External process execution.

mod command;

pub use command::{
    is_executable, parse_system_path, probe_tool, resolve_tool_path, run, run_streaming,
    CommandOptions, CommandResult, OutputLine,
};
