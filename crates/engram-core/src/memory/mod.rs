//! Memory data model
//!
//! The persisted record shape (payload + metadata), user-authored memory
//! cards, and the fragment extracted from a single utterance.

mod card;
mod fragment;
mod record;

pub use card::{CardDraft, MemoryCard, MemoryCardCategory};
pub use fragment::{
    ConstraintHint, DayOfWeek, EmotionHint, Fragment, GoalHint, IdentityHint, LongTermCategory,
    LongTermMemory, PreferenceHint, RelationHint, TaskHint, TimeHint, TimeSlot, TodoHint, ToolHint,
    TopicHint,
};
pub use record::{
    MemoryMetadata, MemoryPayload, MemorySource, MemoryType, MemoryVisibility, RetrievedMemory,
};
