//! Prompt-section formatter
//!
//! Renders a ranked memory list into the bilingual block injected into the
//! system prompt. Formatting stays separate from storage: this code never
//! touches the store.

use crate::memory::RetrievedMemory;

/// Output language of the rendered section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    Zh,
    En,
}

/// Rendering knobs
#[derive(Debug, Clone)]
pub struct FormatOptions {
    pub language: Language,
    /// Entries scoring below this are dropped
    pub min_score: f32,
    /// Hard cap on rendered entries
    pub max_memories: usize,
    /// Suffix each line with its relevance score
    pub show_score: bool,
    /// Suffix each line with its creation date
    pub show_date: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            language: Language::Zh,
            min_score: 0.0,
            max_memories: 5,
            show_score: false,
            show_date: false,
        }
    }
}

/// Render ranked memories to a prompt section.
///
/// Empty `memory` texts are skipped, low scores dropped, the list capped at
/// `max_memories`. Returns `None` when nothing survives - callers then omit
/// the section entirely.
pub fn format_memories_for_prompt(
    memories: &[RetrievedMemory],
    options: &FormatOptions,
) -> Option<String> {
    let survivors: Vec<&RetrievedMemory> = memories
        .iter()
        .filter(|m| !m.memory.trim().is_empty())
        .filter(|m| m.score >= options.min_score)
        .take(options.max_memories)
        .collect();
    if survivors.is_empty() {
        return None;
    }

    let header = match options.language {
        Language::Zh => "## 用户相关记忆\n以下是与当前对话相关的用户历史记忆：",
        Language::En => "## Relevant user memories\nHistorical facts about this user relevant to the current conversation:",
    };

    let mut lines = vec![header.to_string()];
    for memory in survivors {
        let mut suffix_parts = Vec::new();
        if options.show_score {
            suffix_parts.push(match options.language {
                Language::Zh => format!("相关度: {:.2}", memory.score),
                Language::En => format!("relevance: {:.2}", memory.score),
            });
        }
        if options.show_date {
            if let Some(created_at) = memory.created_at {
                suffix_parts.push(created_at.format("%Y-%m-%d").to_string());
            }
        }
        let suffix = if suffix_parts.is_empty() {
            String::new()
        } else {
            match options.language {
                Language::Zh => format!("（{}）", suffix_parts.join(", ")),
                Language::En => format!(" ({})", suffix_parts.join(", ")),
            }
        };
        lines.push(format!("- {}{suffix}", memory.memory));
    }

    Some(lines.join("\n"))
}

// ============================================================================
// TESTS
// ============================================================================
