//! Working Memory - session-scoped short-term memory
//!
//! Message history, tool-call log and a metadata map for the current
//! session. Single-session by construction, so no locking; discarded on
//! session end, never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One message in the session log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    pub role: String,
    pub content: Value,
    pub timestamp: DateTime<Utc>,
}

/// One tool invocation in the session log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub input: Value,
    pub result: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

/// Short-term memory for the current session
#[derive(Debug, Default)]
pub struct WorkingMemory {
    messages: Vec<SessionMessage>,
    tool_calls: Vec<ToolCallRecord>,
    metadata: Map<String, Value>,
    created_at: Option<DateTime<Utc>>,
}

impl WorkingMemory {
    pub fn new() -> Self {
        Self {
            created_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    // ========================================================================
    // MESSAGES
    // ========================================================================

    pub fn add_message(&mut self, role: impl Into<String>, content: impl Into<Value>) {
        self.messages.push(SessionMessage {
            role: role.into(),
            content: content.into(),
            timestamp: Utc::now(),
        });
    }

    /// Message history, optionally only the last `n`
    pub fn get_messages(&self, last_n: Option<usize>) -> &[SessionMessage] {
        match last_n {
            Some(n) if n < self.messages.len() => &self.messages[self.messages.len() - n..],
            _ => &self.messages,
        }
    }

    pub fn clear_messages(&mut self) {
        self.messages.clear();
    }

    // ========================================================================
    // TOOL CALLS
    // ========================================================================

    pub fn add_tool_call(
        &mut self,
        tool: impl Into<String>,
        input: impl Into<Value>,
        result: Option<Value>,
    ) {
        self.tool_calls.push(ToolCallRecord {
            tool: tool.into(),
            input: input.into(),
            result,
            timestamp: Utc::now(),
        });
    }

    pub fn get_tool_history(&self, last_n: Option<usize>) -> &[ToolCallRecord] {
        match last_n {
            Some(n) if n < self.tool_calls.len() => &self.tool_calls[self.tool_calls.len() - n..],
            _ => &self.tool_calls,
        }
    }

    pub fn clear_tool_history(&mut self) {
        self.tool_calls.clear();
    }

    // ========================================================================
    // METADATA
    // ========================================================================

    pub fn update_metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Metadata value as a string, with a default for absent keys
    pub fn get_metadata_str<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.metadata
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or(default)
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn clear_metadata(&mut self) {
        self.metadata.clear();
    }

    // ========================================================================
    // GENERAL
    // ========================================================================

    /// Drop everything
    pub fn clear(&mut self) {
        self.messages.clear();
        self.tool_calls.clear();
        self.metadata.clear();
        tracing::debug!("working memory cleared");
    }

    /// Serialise to a plain document
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "messages": self.messages,
            "tool_calls": self.tool_calls,
            "metadata": self.metadata,
            "created_at": self.created_at,
        })
    }

    pub fn summary(&self) -> String {
        format!(
            "WorkingMemory(messages={}, tool_calls={}, metadata_keys={:?})",
            self.messages.len(),
            self.tool_calls.len(),
            self.metadata.keys().collect::<Vec<_>>(),
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================
