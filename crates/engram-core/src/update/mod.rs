//! Write-time quality control
//!
//! The update decider rules ADD / UPDATE / DELETE / NONE for every new fact
//! against its nearest existing memories; the quality controller wraps it
//! with conflict detection, policy resolution and TTL sweeping.

mod decider;
mod quality;

pub use decider::{
    DecisionEntry, ExistingMemory, MemoryEvent, UpdateDecider, UpdateDecision, MAX_EXISTING,
};
pub use quality::{
    ConflictKind, ConflictPolicy, ConflictResolution, MemoryConflict, QualityController, TtlStatus,
    TtlTypeCounts, UpdateActions,
};
