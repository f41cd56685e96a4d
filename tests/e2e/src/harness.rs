//! Temp-store test harness
//!
//! One isolated store root per test, torn down on drop.

use std::sync::Arc;

use engram_core::{
    EnvSnapshot, MemoryConfig, MemoryManager, MemoryPool, QualityController,
};
use engram_core::providers::{Embedder, LanguageModel};
use tempfile::TempDir;

/// Isolated pool + controller over a temp directory
pub struct TestHarness {
    pub pool: Arc<MemoryPool>,
    pub quality: Arc<QualityController>,
    /// Kept alive so the store root survives the test body
    pub dir: TempDir,
}

impl TestHarness {
    /// Build with explicit provider fakes
    pub fn new(embedder: Arc<dyn Embedder>, llm: Arc<dyn LanguageModel>) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let mut config = MemoryConfig::from_snapshot(&EnvSnapshot::from_pairs([
            ("OPENAI_API_KEY", "sk-test"),
            ("ENGRAM_STORE_ROOT", dir.path().to_str().expect("utf8 path")),
            ("AGENT_INSTANCE", "e2e"),
        ]))
        .expect("config");
        config.dimensions = embedder.dimensions();

        let pool = Arc::new(MemoryPool::new(config, embedder, llm.clone()));
        let quality = Arc::new(QualityController::new(pool.clone(), llm));
        Self { pool, quality, dir }
    }

    /// A manager bound to one user with per-user storage under the same root
    pub fn manager(&self, user_id: &str) -> MemoryManager {
        MemoryManager::new(
            self.pool.clone(),
            self.quality.clone(),
            Some(user_id),
            Some(self.dir.path().join("storage")),
        )
    }
}
