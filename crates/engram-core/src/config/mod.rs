//! Configuration
//!
//! A validated, immutable configuration record built once by a loader step.
//! Provider auto-detect is a pure function over a captured environment
//! snapshot, so a fixed environment always resolves to the same providers.

use std::collections::HashMap;
use std::path::PathBuf;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Configuration error
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Auto-detect walked the full candidate list without finding credentials
    #[error("no provider credentials found for {role} (set OPENAI_API_KEY / ANTHROPIC_API_KEY / GOOGLE_API_KEY, or OLLAMA_BASE_URL for local models)")]
    NoProviderCredentials { role: &'static str },
    /// An explicitly selected provider is missing its credential
    #[error("provider '{provider}' selected for {role} but {credential} is not set")]
    MissingCredential {
        provider: &'static str,
        role: &'static str,
        credential: &'static str,
    },
    /// Unrecognised provider name in the environment
    #[error("unknown provider '{0}' (expected auto/openai/google/ollama/anthropic/gemini)")]
    UnknownProvider(String),
}

// ============================================================================
// ENVIRONMENT SNAPSHOT
// ============================================================================

/// Immutable snapshot of the variables configuration reads.
///
/// Capturing the environment once keeps provider detection pure and lets
/// tests construct arbitrary environments without mutating the process.
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    /// Capture from the process environment
    pub fn from_env() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Build from explicit pairs (tests, embedding hosts)
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|s| s.as_str()).filter(|s| !s.is_empty())
    }
}

// ============================================================================
// PROVIDER SELECTION
// ============================================================================

/// Provider family named in the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Auto,
    OpenAi,
    /// `google` and `gemini` are aliases for the same family
    Gemini,
    Ollama,
    Anthropic,
}

impl ProviderKind {
    pub fn parse_name(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_lowercase().as_str() {
            "" | "auto" => Ok(ProviderKind::Auto),
            "openai" => Ok(ProviderKind::OpenAi),
            "google" | "gemini" => Ok(ProviderKind::Gemini),
            "ollama" => Ok(ProviderKind::Ollama),
            "anthropic" => Ok(ProviderKind::Anthropic),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

/// A concrete provider after auto-detect resolved `auto`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedKind {
    OpenAi,
    Anthropic,
    Gemini,
    Ollama,
}

impl ResolvedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolvedKind::OpenAi => "openai",
            ResolvedKind::Anthropic => "anthropic",
            ResolvedKind::Gemini => "gemini",
            ResolvedKind::Ollama => "ollama",
        }
    }
}

/// A resolved provider: family, model name, credential, base-url override
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProvider {
    pub kind: ResolvedKind,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

/// The full provider selection for one deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSelection {
    pub llm: ResolvedProvider,
    pub embedding: ResolvedProvider,
}

const DEFAULT_OPENAI_LLM: &str = "gpt-4o-mini";
const DEFAULT_ANTHROPIC_LLM: &str = "claude-3-5-haiku-latest";
const DEFAULT_GEMINI_LLM: &str = "gemini-2.0-flash";
const DEFAULT_OLLAMA_LLM: &str = "qwen2.5";

const DEFAULT_OPENAI_EMBED: &str = "text-embedding-3-small";
const DEFAULT_GEMINI_EMBED: &str = "text-embedding-004";
const DEFAULT_OLLAMA_EMBED: &str = "nomic-embed-text";

/// Default vector dimension per embedding model
fn embedding_dimensions(model: &str) -> usize {
    match model {
        "text-embedding-3-small" | "text-embedding-3-large" => 1536,
        "text-embedding-004" => 768,
        "nomic-embed-text" => 768,
        "bge-m3" => 1024,
        _ => 1536,
    }
}

fn openai(env: &EnvSnapshot, model: String) -> Option<ResolvedProvider> {
    env.get("OPENAI_API_KEY").map(|key| ResolvedProvider {
        kind: ResolvedKind::OpenAi,
        model,
        api_key: Some(key.to_string()),
        base_url: env.get("OPENAI_BASE_URL").map(String::from),
    })
}

fn anthropic(env: &EnvSnapshot, model: String) -> Option<ResolvedProvider> {
    env.get("ANTHROPIC_API_KEY").map(|key| ResolvedProvider {
        kind: ResolvedKind::Anthropic,
        model,
        api_key: Some(key.to_string()),
        base_url: env.get("ANTHROPIC_BASE_URL").map(String::from),
    })
}

fn gemini(env: &EnvSnapshot, model: String) -> Option<ResolvedProvider> {
    env.get("GOOGLE_API_KEY")
        .or_else(|| env.get("GEMINI_API_KEY"))
        .map(|key| ResolvedProvider {
            kind: ResolvedKind::Gemini,
            model,
            api_key: Some(key.to_string()),
            base_url: env.get("GEMINI_BASE_URL").map(String::from),
        })
}

fn ollama(env: &EnvSnapshot, model: String) -> ResolvedProvider {
    ResolvedProvider {
        kind: ResolvedKind::Ollama,
        model,
        api_key: None,
        base_url: env.get("OLLAMA_BASE_URL").map(String::from),
    }
}

/// Ollama joins the auto walk only when a base URL is configured
fn ollama_auto(env: &EnvSnapshot, model: String) -> Option<ResolvedProvider> {
    env.get("OLLAMA_BASE_URL")?;
    Some(ollama(env, model))
}

/// Resolve the LM provider.
///
/// Auto priority: openai -> anthropic -> gemini -> ollama (ollama only
/// participates in auto when `OLLAMA_BASE_URL` is set; selecting it
/// explicitly falls back to localhost).
fn resolve_llm(env: &EnvSnapshot) -> Result<ResolvedProvider, ConfigError> {
    let kind = ProviderKind::parse_name(env.get("MEM0_LLM_PROVIDER").unwrap_or("auto"))?;
    let model_override = env.get("MEM0_LLM_MODEL").map(String::from);
    let model = |default: &str| model_override.clone().unwrap_or_else(|| default.to_string());

    match kind {
        ProviderKind::OpenAi => openai(env, model(DEFAULT_OPENAI_LLM)).ok_or(
            ConfigError::MissingCredential {
                provider: "openai",
                role: "llm",
                credential: "OPENAI_API_KEY",
            },
        ),
        ProviderKind::Anthropic => anthropic(env, model(DEFAULT_ANTHROPIC_LLM)).ok_or(
            ConfigError::MissingCredential {
                provider: "anthropic",
                role: "llm",
                credential: "ANTHROPIC_API_KEY",
            },
        ),
        ProviderKind::Gemini => {
            gemini(env, model(DEFAULT_GEMINI_LLM)).ok_or(ConfigError::MissingCredential {
                provider: "gemini",
                role: "llm",
                credential: "GOOGLE_API_KEY",
            })
        }
        ProviderKind::Ollama => Ok(ollama(env, model(DEFAULT_OLLAMA_LLM))),
        ProviderKind::Auto => openai(env, model(DEFAULT_OPENAI_LLM))
            .or_else(|| anthropic(env, model(DEFAULT_ANTHROPIC_LLM)))
            .or_else(|| gemini(env, model(DEFAULT_GEMINI_LLM)))
            .or_else(|| ollama_auto(env, model(DEFAULT_OLLAMA_LLM)))
            .ok_or(ConfigError::NoProviderCredentials { role: "llm" }),
    }
}

/// Resolve the embedding provider.
///
/// Auto priority: openai -> gemini -> ollama. Anthropic exposes no
/// embedding API so it never appears in the embedding walk.
fn resolve_embedding(env: &EnvSnapshot) -> Result<ResolvedProvider, ConfigError> {
    let kind = ProviderKind::parse_name(env.get("EMBEDDING_PROVIDER").unwrap_or("auto"))?;
    let model_override = env.get("EMBEDDING_MODEL").map(String::from);
    let model = |default: &str| model_override.clone().unwrap_or_else(|| default.to_string());

    match kind {
        ProviderKind::OpenAi => openai(env, model(DEFAULT_OPENAI_EMBED)).ok_or(
            ConfigError::MissingCredential {
                provider: "openai",
                role: "embedding",
                credential: "OPENAI_API_KEY",
            },
        ),
        ProviderKind::Gemini => {
            gemini(env, model(DEFAULT_GEMINI_EMBED)).ok_or(ConfigError::MissingCredential {
                provider: "gemini",
                role: "embedding",
                credential: "GOOGLE_API_KEY",
            })
        }
        ProviderKind::Ollama => Ok(ollama(env, model(DEFAULT_OLLAMA_EMBED))),
        ProviderKind::Anthropic => Err(ConfigError::UnknownProvider(
            "anthropic has no embedding API".to_string(),
        )),
        ProviderKind::Auto => openai(env, model(DEFAULT_OPENAI_EMBED))
            .or_else(|| gemini(env, model(DEFAULT_GEMINI_EMBED)))
            .or_else(|| ollama_auto(env, model(DEFAULT_OLLAMA_EMBED)))
            .ok_or(ConfigError::NoProviderCredentials { role: "embedding" }),
    }
}

/// Pure provider detection over a captured environment
pub fn detect_providers(env: &EnvSnapshot) -> Result<ProviderSelection, ConfigError> {
    Ok(ProviderSelection {
        llm: resolve_llm(env)?,
        embedding: resolve_embedding(env)?,
    })
}

// ============================================================================
// MEMORY CONFIG
// ============================================================================

/// Validated configuration for one deployment instance.
///
/// Immutable after the loader builds it; configuration reload goes through
/// the process registry's reset.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Isolation key; every persistent artefact is prefixed with it
    pub instance: String,
    /// Root directory for the instance's databases
    pub store_root: PathBuf,
    /// Logical collection name, prior to instance prefixing
    pub collection: String,
    /// Fixed embedding dimension of the collection
    pub dimensions: usize,
    /// Default result count for hybrid search
    pub default_search_limit: usize,
    /// Weight of the vector side in hybrid merge
    pub vector_weight: f32,
    /// Weight of the keyword side in hybrid merge
    pub keyword_weight: f32,
    /// Resolved providers
    pub providers: ProviderSelection,
}

impl MemoryConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_snapshot(&EnvSnapshot::from_env())
    }

    /// Load from a captured environment snapshot
    pub fn from_snapshot(env: &EnvSnapshot) -> Result<Self, ConfigError> {
        let providers = detect_providers(env)?;
        let dimensions = embedding_dimensions(&providers.embedding.model);
        let store_root = env
            .get("ENGRAM_STORE_ROOT")
            .map(PathBuf::from)
            .or_else(default_store_root)
            .unwrap_or_else(|| PathBuf::from("data/local_store"));

        Ok(Self {
            instance: env.get("AGENT_INSTANCE").unwrap_or("default").to_string(),
            store_root,
            collection: env
                .get("MEM0_COLLECTION_NAME")
                .unwrap_or("mem0_memories")
                .to_string(),
            dimensions,
            default_search_limit: 5,
            vector_weight: 0.6,
            keyword_weight: 0.4,
            providers,
        })
    }

    /// Collection name with the instance prefix applied exactly once
    pub fn collection_name(&self) -> String {
        let prefix = format!("{}_", self.instance);
        if self.collection.starts_with(&prefix) {
            self.collection.clone()
        } else {
            format!("{prefix}{}", self.collection)
        }
    }

    /// Instance directory holding every database of this deployment
    pub fn instance_dir(&self) -> PathBuf {
        self.store_root.join(&self.instance)
    }

    /// Main vector database
    pub fn vectors_db_path(&self) -> PathBuf {
        self.instance_dir().join("mem0_vectors.db")
    }

    /// Update-pipeline audit log
    pub fn history_db_path(&self) -> PathBuf {
        self.instance_dir()
            .join(format!("{}_mem0_history.db", self.instance))
    }

    /// Reserved: playbook subsystem shares the store format in its own file
    pub fn playbook_db_path(&self) -> PathBuf {
        self.instance_dir().join("playbook_vectors.db")
    }
}

fn default_store_root() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "engram", "core")
        .map(|dirs| dirs.data_dir().to_path_buf())
}

// ============================================================================
// TESTS
// ============================================================================
