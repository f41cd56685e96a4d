//! Process-scope registry
//!
//! The pool, quality controller, rerank service and persona builder are
//! process-wide singletons. Instead of ambient globals scattered per
//! module, one explicit registry owns every shared handle with an init /
//! get / reset contract - configuration reload calls `reset()` and the next
//! access rebuilds everything from the current environment.

use std::sync::{Arc, Mutex, OnceLock};

use crate::config::{ConfigError, MemoryConfig};
use crate::persona::PersonaBuilder;
use crate::pool::MemoryPool;
use crate::providers::{build_embedder, build_language_model};
use crate::retrieval::RerankService;
use crate::update::QualityController;

/// Default `top_k` for the process-wide rerank service
const RERANK_TOP_K: usize = 5;

#[derive(Default)]
struct RegistryInner {
    pool: Option<Arc<MemoryPool>>,
    quality: Option<Arc<QualityController>>,
    rerank: Option<Arc<RerankService>>,
    persona: Option<Arc<PersonaBuilder>>,
}

/// Registry of process-wide singletons
pub struct ProcessRegistry {
    inner: Mutex<RegistryInner>,
}

static REGISTRY: OnceLock<ProcessRegistry> = OnceLock::new();

/// The process registry
pub fn registry() -> &'static ProcessRegistry {
    REGISTRY.get_or_init(|| ProcessRegistry {
        inner: Mutex::new(RegistryInner::default()),
    })
}

impl ProcessRegistry {
    /// Install a pre-built pool (embedding hosts, tests). Replaces any
    /// cached one and drops the handles derived from it.
    pub fn install_pool(&self, pool: Arc<MemoryPool>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.pool = Some(pool);
            inner.quality = None;
            inner.rerank = None;
        }
    }

    /// The process pool, built from the environment on first access
    pub fn pool(&self) -> Result<Arc<MemoryPool>, ConfigError> {
        let mut inner = self.lock();
        if let Some(pool) = &inner.pool {
            return Ok(pool.clone());
        }
        let config = MemoryConfig::from_env()?;
        let embedder = build_embedder(&config.providers.embedding, config.dimensions);
        let llm = build_language_model(&config.providers.llm);
        let pool = Arc::new(MemoryPool::new(config, embedder, llm));
        inner.pool = Some(pool.clone());
        tracing::info!("memory pool constructed");
        Ok(pool)
    }

    /// The process quality controller
    pub fn quality_controller(&self) -> Result<Arc<QualityController>, ConfigError> {
        {
            let inner = self.lock();
            if let Some(quality) = &inner.quality {
                return Ok(quality.clone());
            }
        }
        let pool = self.pool()?;
        let llm = build_language_model(&pool.config().providers.llm);
        let quality = Arc::new(QualityController::new(pool, llm));
        self.lock().quality = Some(quality.clone());
        Ok(quality)
    }

    /// The process rerank service
    pub fn rerank_service(&self) -> Result<Arc<RerankService>, ConfigError> {
        {
            let inner = self.lock();
            if let Some(rerank) = &inner.rerank {
                return Ok(rerank.clone());
            }
        }
        let pool = self.pool()?;
        let llm = build_language_model(&pool.config().providers.llm);
        let rerank = Arc::new(RerankService::new(llm, RERANK_TOP_K));
        self.lock().rerank = Some(rerank.clone());
        Ok(rerank)
    }

    /// The process persona builder
    pub fn persona_builder(&self) -> Arc<PersonaBuilder> {
        let mut inner = self.lock();
        inner
            .persona
            .get_or_insert_with(|| Arc::new(PersonaBuilder::new()))
            .clone()
    }

    /// Drop every cached handle. The pool's own sticky unavailability flag
    /// dies with it, so the next access retries construction with the
    /// current environment.
    pub fn reset(&self) {
        let mut inner = self.lock();
        if let Some(pool) = &inner.pool {
            pool.reset();
        }
        *inner = RegistryInner::default();
        tracing::info!("process registry reset");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ============================================================================
// TESTS
// ============================================================================
