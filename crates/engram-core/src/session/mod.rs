//! Session-scoped memory

mod working;

pub use working::{SessionMessage, ToolCallRecord, WorkingMemory};
