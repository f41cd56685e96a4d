//! Process-wide system memory

mod cache;
mod skill;

pub use cache::CacheMemory;
pub use skill::{SkillEntry, SkillMemory};
