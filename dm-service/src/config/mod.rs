use secrecy::Secret;
use service_core::config::{self as core_config, get_env, get_optional_env, get_parsed_env};
use service_core::error::AppError;

const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
const DEFAULT_PINECONE_CONTROL_PLANE: &str = "https://api.pinecone.io";

const DEFAULT_SYSTEM_PROMPT: &str = "You are the Dungeon Master for a Dungeons & Dragons 5th edition \
campaign. Narrate vividly, adjudicate actions fairly using the rules provided, and keep the story \
consistent with the campaign history.";

const DEFAULT_SUMMARIZER_PROMPT: &str = "You condense reference material for a Dungeon Master. \
Keep every rule, statistic, name and event that bears on the player's action. Drop everything else.";

#[derive(Debug, Clone)]
pub struct DmConfig {
    pub common: core_config::Config,
    pub llm: LlmConfig,
    pub embeddings: EmbeddingConfig,
    pub vector_store: VectorStoreConfig,
    pub context: ContextConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProviderKind {
    OpenAi,
    Ollama,
    Mock,
}

impl LlmProviderKind {
    /// Resolve the backend from `LLM_CLIENT_TYPE` and, for the `langchain`
    /// client type, `LANGCHAIN_PROVIDER`.
    pub fn resolve(client_type: &str, langchain_provider: &str) -> Result<Self, AppError> {
        match client_type.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "mock" => Ok(Self::Mock),
            "langchain" => match langchain_provider.to_lowercase().as_str() {
                "openai" => Ok(Self::OpenAi),
                "ollama" => Ok(Self::Ollama),
                other => Err(AppError::ConfigError(anyhow::anyhow!(
                    "Unsupported provider: {}. Supported providers: openai, ollama",
                    other
                ))),
            },
            other => Err(AppError::ConfigError(anyhow::anyhow!(
                "{} client type is not supported. Available client types: openai, langchain",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProviderKind,
    pub api_key: Option<Secret<String>>,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// System prompt for every DM reply.
    pub system_prompt: String,
    /// System prompt for the context summarization call.
    pub summarizer_prompt: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProviderKind {
    Ollama,
    OpenAi,
    Hash,
}

impl std::str::FromStr for EmbeddingProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            "hash" => Ok(Self::Hash),
            _ => Err(format!("Invalid embedding provider: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProviderKind,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<Secret<String>>,
    /// Vector width of the hashing embedder.
    pub dimensions: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorStoreBackend {
    Pinecone,
    Memory,
}

impl std::str::FromStr for VectorStoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pinecone" => Ok(Self::Pinecone),
            "memory" => Ok(Self::Memory),
            _ => Err(format!("Invalid vector store backend: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    pub backend: VectorStoreBackend,
    pub api_key: Option<Secret<String>>,
    pub control_plane_url: String,
    pub namespace: Option<String>,
    /// Passages retrieved per index.
    pub top_k: usize,
}

#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Upper bound on merged passage text placed in the prompt.
    pub max_context_chars: usize,
    /// Summarize merged context whenever it exceeds `max_context_chars`.
    pub summarize_oversized: bool,
    /// Recent turns from the in-memory log included in the prompt.
    pub recent_turns: usize,
    pub session_log_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
}

impl Default for DmConfig {
    fn default() -> Self {
        Self {
            common: core_config::Config { port: 5000 },
            llm: LlmConfig {
                provider: LlmProviderKind::OpenAi,
                api_key: None,
                model: DEFAULT_OPENAI_MODEL.to_string(),
                base_url: DEFAULT_OPENAI_URL.to_string(),
                temperature: 0.7,
                max_tokens: 2048,
                system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
                summarizer_prompt: DEFAULT_SUMMARIZER_PROMPT.to_string(),
            },
            embeddings: EmbeddingConfig {
                provider: EmbeddingProviderKind::Ollama,
                model: "nomic-embed-text".to_string(),
                base_url: DEFAULT_OLLAMA_URL.to_string(),
                api_key: None,
                dimensions: 384,
            },
            vector_store: VectorStoreConfig {
                backend: VectorStoreBackend::Pinecone,
                api_key: None,
                control_plane_url: DEFAULT_PINECONE_CONTROL_PLANE.to_string(),
                namespace: None,
                top_k: 3,
            },
            context: ContextConfig {
                max_context_chars: 6000,
                summarize_oversized: false,
                recent_turns: 5,
                session_log_capacity: 50,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                otlp_endpoint: None,
            },
        }
    }
}

impl DmConfig {
    pub fn load() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let is_prod = core_config::is_production();
        let defaults = Self::default();

        let provider = LlmProviderKind::resolve(
            &get_env("LLM_CLIENT_TYPE", Some("openai"), is_prod)?,
            &get_env("LANGCHAIN_PROVIDER", Some("openai"), is_prod)?,
        )?;

        let inference_key = get_optional_env("INFERENCE_API_KEY").or_else(|| get_optional_env("OPENAI_API_KEY"));
        let inference_url = get_optional_env("INFERENCE_BASE_URL").or_else(|| get_optional_env("OPENAI_BASE_URL"));
        let inference_model = get_optional_env("INFERENCE_MODEL_NAME").or_else(|| get_optional_env("OPENAI_MODEL_NAME"));

        let llm = LlmConfig {
            provider,
            api_key: inference_key.clone().map(Secret::new),
            model: inference_model.unwrap_or_else(|| match provider {
                LlmProviderKind::Ollama => DEFAULT_OLLAMA_MODEL.to_string(),
                _ => DEFAULT_OPENAI_MODEL.to_string(),
            }),
            base_url: inference_url.unwrap_or_else(|| match provider {
                LlmProviderKind::Ollama => DEFAULT_OLLAMA_URL.to_string(),
                _ => DEFAULT_OPENAI_URL.to_string(),
            }),
            temperature: get_parsed_env("INFERENCE_TEMPERATURE", defaults.llm.temperature)?,
            max_tokens: get_parsed_env("INFERENCE_MAX_TOKENS", defaults.llm.max_tokens)?,
            system_prompt: get_env("SUMMARY_PROMPT", Some(DEFAULT_SYSTEM_PROMPT), is_prod)?,
            summarizer_prompt: get_env("DM_SUMMARIZER_PROMPT", Some(DEFAULT_SUMMARIZER_PROMPT), is_prod)?,
        };

        let embedding_provider: EmbeddingProviderKind = get_env("EMBEDDING_PROVIDER", Some("ollama"), is_prod)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;
        let embeddings = EmbeddingConfig {
            provider: embedding_provider,
            model: get_optional_env("EMBEDDING_MODEL").unwrap_or_else(|| match embedding_provider {
                EmbeddingProviderKind::OpenAi => "text-embedding-3-small".to_string(),
                _ => defaults.embeddings.model.clone(),
            }),
            base_url: get_optional_env("EMBEDDING_BASE_URL").unwrap_or_else(|| match embedding_provider {
                EmbeddingProviderKind::OpenAi => DEFAULT_OPENAI_URL.to_string(),
                _ => DEFAULT_OLLAMA_URL.to_string(),
            }),
            api_key: get_optional_env("EMBEDDING_API_KEY").or(inference_key).map(Secret::new),
            dimensions: get_parsed_env("EMBEDDING_DIMENSIONS", defaults.embeddings.dimensions)?,
        };

        let vector_store = VectorStoreConfig {
            backend: get_env("VECTOR_STORE", Some("pinecone"), is_prod)?
                .parse()
                .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            api_key: get_optional_env("PINECONE_API_KEY").map(Secret::new),
            control_plane_url: get_env(
                "PINECONE_CONTROL_PLANE_URL",
                Some(DEFAULT_PINECONE_CONTROL_PLANE),
                is_prod,
            )?,
            namespace: get_optional_env("PINECONE_NAMESPACE"),
            top_k: get_parsed_env("DM_RETRIEVAL_TOP_K", defaults.vector_store.top_k)?,
        };

        let context = ContextConfig {
            max_context_chars: get_parsed_env("DM_MAX_CONTEXT_CHARS", defaults.context.max_context_chars)?,
            summarize_oversized: parse_flag(
                &get_env("DM_SUMMARIZE_CONTEXT", Some("false"), is_prod)?,
                "DM_SUMMARIZE_CONTEXT",
            )?,
            recent_turns: get_parsed_env("DM_RECENT_TURNS", defaults.context.recent_turns)?,
            session_log_capacity: get_parsed_env(
                "DM_SESSION_LOG_CAPACITY",
                defaults.context.session_log_capacity,
            )?,
        };

        let observability = ObservabilityConfig {
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: get_optional_env("OTLP_ENDPOINT"),
        };

        Ok(DmConfig {
            common,
            llm,
            embeddings,
            vector_store,
            context,
            observability,
        })
    }
}

fn parse_flag(value: &str, key: &str) -> Result<bool, AppError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(AppError::ConfigError(anyhow::anyhow!(
            "Invalid boolean value for {}: {}",
            key,
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_client_type_selects_openai() {
        assert_eq!(
            LlmProviderKind::resolve("openai", "ollama").unwrap(),
            LlmProviderKind::OpenAi
        );
    }

    #[test]
    fn langchain_client_type_defers_to_langchain_provider() {
        assert_eq!(
            LlmProviderKind::resolve("langchain", "Ollama").unwrap(),
            LlmProviderKind::Ollama
        );
        assert_eq!(
            LlmProviderKind::resolve("langchain", "openai").unwrap(),
            LlmProviderKind::OpenAi
        );
    }

    #[test]
    fn unsupported_client_type_is_rejected() {
        let err = LlmProviderKind::resolve("None", "openai").unwrap_err();
        assert!(err.to_string().contains("client type is not supported"));

        let err = LlmProviderKind::resolve("langchain", "bedrock").unwrap_err();
        assert!(err.to_string().contains("Unsupported provider: bedrock"));
    }

    #[test]
    fn parse_flag_accepts_common_spellings() {
        assert!(parse_flag("True", "X").unwrap());
        assert!(!parse_flag("0", "X").unwrap());
        assert!(parse_flag("maybe", "X").is_err());
    }

    #[test]
    fn backend_names_parse_case_insensitively() {
        assert_eq!("Memory".parse::<VectorStoreBackend>().unwrap(), VectorStoreBackend::Memory);
        assert_eq!("HASH".parse::<EmbeddingProviderKind>().unwrap(), EmbeddingProviderKind::Hash);
        assert!("chroma".parse::<VectorStoreBackend>().is_err());
    }
}
