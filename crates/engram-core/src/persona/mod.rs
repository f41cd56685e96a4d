//! User persona
//!
//! Aggregates behaviour, emotion, fragments, plans and explicit cards into
//! one bounded prompt-injection block.

mod builder;
mod types;

pub use builder::{HeuristicTokenOracle, PersonaBuilder, TokenOracle};
pub use types::{
    BehaviorSummary, EmotionSnapshot, PlanSummary, ReminderSummary, RoutineTask, UserPersona,
    WorkStyleSummary,
};
