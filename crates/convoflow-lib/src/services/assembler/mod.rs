// Message Assembly Services
// Turns raw stored or buffered messages into the user-facing sequence:
// - Tool payload parsing (request vs response vs unparseable)
// - Tool-call correlation by id
// - Grouping of tool entries into assistant messages

pub mod correlator;
pub mod grouping;
pub mod parser;

pub use correlator::{ToolCallCorrelator, DEFAULT_TOOL_NAME, SYNTHETIC_MESSAGE_PREFIX};
pub use grouping::{assemble_history, group_tool_messages_with_assistant};
pub use parser::{parse_tool_payload, ToolEventDescriptor, ToolPayload};
