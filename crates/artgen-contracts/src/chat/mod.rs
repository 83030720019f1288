mod command_registry;
mod intent_parser;

pub use command_registry::{help_lines, CommandSpec, COMMANDS};
pub use intent_parser::{parse_command, ComposeCommand};
