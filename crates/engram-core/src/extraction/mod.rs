//! LM-driven extraction
//!
//! Fact extraction over a conversation turn and 11-slot fragment extraction
//! over a single utterance. Both recover from LM failures with empty
//! results; semantic judgement stays in the model, format checks stay here.

mod facts;
mod fragment;

pub use facts::{FactExtractor, FACT_EXTRACTION_PROMPT};
pub use fragment::{resolve_deadline, FragmentExtractor};

/// Strip a Markdown code fence around a JSON reply, when present
pub(crate) fn unwrap_json_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(inner) = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
    else {
        return trimmed;
    };
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_json_fence() {
        assert_eq!(unwrap_json_fence("[1, 2]"), "[1, 2]");
        assert_eq!(unwrap_json_fence("```json\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(unwrap_json_fence("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
    }
}
