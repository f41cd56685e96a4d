//! Test support for the end-to-end suite
//!
//! Deterministic provider fakes and a temp-store harness. The fakes stand
//! in for the opaque embedding / language-model services so scenarios run
//! hermetically and reproducibly.

pub mod harness;
pub mod providers;

pub use harness::TestHarness;
pub use providers::{BrokenEmbedder, ConceptEmbedder, RoutedLm};
