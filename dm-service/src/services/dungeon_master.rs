//! Context assembly and turn handling for the Dungeon Master.
//!
//! Every chat turn follows the same pipeline: embed the player's prompt,
//! query the indexes named by the action's [`ContextPolicy`], merge the
//! passages into prompt sections, optionally condense them with a summarizer
//! call, ask the LLM for the DM's reply, then write that reply back into
//! `campaign-history` so later turns can retrieve it.

use crate::config::{ContextConfig, DmConfig};
use crate::models::{Action, ContextPolicy, IndexName, SessionLog, Turn};
use crate::services::embeddings::{build_embedder, Embedder, EmbeddingError};
use crate::services::metrics;
use crate::services::providers::{
    build_provider, ChatMessage, GenerationParams, LlmProvider, ProviderError, ProviderStream,
};
use crate::services::vector_store::{
    build_vector_store, Passage, VectorRecord, VectorStore, VectorStoreError, SOURCE_KEY,
};
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// `source_file` recorded on replies written to campaign history.
const SESSION_SOURCE: &str = "session";

#[derive(Error, Debug)]
pub enum DmError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    VectorStore(#[from] VectorStoreError),
}

/// Prompts and limits fixed at startup.
struct Settings {
    system_prompt: String,
    summarizer_prompt: String,
    params: GenerationParams,
    top_k: usize,
    context: ContextConfig,
}

/// The Dungeon Master. Cheap to clone; clones share backends and the turn log.
#[derive(Clone)]
pub struct DungeonMaster {
    llm: Arc<dyn LlmProvider>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    log: SessionLog,
    settings: Arc<Settings>,
}

/// Passages retrieved for one turn, grouped by index in policy order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RetrievedContext {
    pub sections: Vec<(IndexName, Vec<Passage>)>,
}

impl RetrievedContext {
    /// Group passages by index, dropping empty and repeated texts.
    pub fn merge(policy: &ContextPolicy, passages: Vec<Passage>) -> Self {
        let mut seen = HashSet::new();
        let mut sections: Vec<(IndexName, Vec<Passage>)> =
            policy.indexes.iter().map(|index| (*index, Vec::new())).collect();

        for passage in passages {
            let text = passage.text.trim();
            if text.is_empty() || !seen.insert(text.to_string()) {
                continue;
            }
            if let Some((_, bucket)) = sections.iter_mut().find(|(index, _)| *index == passage.index) {
                bucket.push(passage);
            }
        }

        sections.retain(|(_, passages)| !passages.is_empty());
        Self { sections }
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn total_chars(&self) -> usize {
        self.sections
            .iter()
            .flat_map(|(_, passages)| passages)
            .map(|p| p.text.trim().chars().count())
            .sum()
    }

    /// Render as markdown sections. Passages that would push the total past
    /// `max_chars` are left out; `None` renders everything.
    pub fn render(&self, max_chars: Option<usize>) -> String {
        let mut budget = max_chars.unwrap_or(usize::MAX);
        let mut out = String::new();

        for (index, passages) in &self.sections {
            let mut body = String::new();
            for passage in passages {
                let text = passage.text.trim();
                let len = text.chars().count();
                if len > budget {
                    continue;
                }
                budget -= len;
                body.push_str("- ");
                body.push_str(text);
                body.push('\n');
            }
            if body.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("## {}\n", index.heading()));
            out.push_str(&body);
        }
        out
    }
}

/// Messages ready for the LLM, plus what the turn needs afterwards.
struct PreparedTurn {
    action: Action,
    prompt: String,
    messages: Vec<ChatMessage>,
}

impl DungeonMaster {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        config: &DmConfig,
    ) -> Self {
        Self {
            llm,
            embedder,
            store,
            log: SessionLog::new(config.context.session_log_capacity),
            settings: Arc::new(Settings {
                system_prompt: config.llm.system_prompt.clone(),
                summarizer_prompt: config.llm.summarizer_prompt.clone(),
                params: GenerationParams::from(&config.llm),
                top_k: config.vector_store.top_k,
                context: config.context.clone(),
            }),
        }
    }

    /// Build every backend named in configuration.
    pub fn from_config(config: &DmConfig) -> Result<Self, DmError> {
        let llm = build_provider(&config.llm)?;
        let embedder = build_embedder(&config.embeddings)?;
        let store = build_vector_store(&config.vector_store)?;

        tracing::info!(
            llm = llm.name(),
            model = llm.model(),
            embedder = embedder.name(),
            vector_store = store.name(),
            "Dungeon Master backends ready"
        );
        Ok(Self::new(llm, embedder, store, config))
    }

    pub fn session_log(&self) -> &SessionLog {
        &self.log
    }

    pub fn provider_name(&self) -> &'static str {
        self.llm.name()
    }

    /// Answer a turn and return the full reply.
    #[tracing::instrument(skip_all, fields(action = %action))]
    pub async fn respond(&self, action: Action, prompt: &str) -> Result<String, DmError> {
        let turn = self.prepare(action, prompt).await?;

        let started = Instant::now();
        let reply = self
            .llm
            .complete(&turn.messages, &self.settings.params)
            .await
            .inspect_err(|e| self.record_llm_error(e))?;
        metrics::record_llm_latency(self.llm.name(), "reply", started.elapsed().as_secs_f64());

        tracing::info!(reply_chars = reply.len(), "DM reply generated");
        self.finish(turn, reply.clone()).await?;
        Ok(reply)
    }

    /// Answer a turn as a stream of text deltas.
    ///
    /// Retrieval and the opening of the LLM stream happen before this
    /// returns, so their failures surface as errors here. The reply is
    /// persisted once the stream completes without error; failures at that
    /// point are logged because the client already has the text.
    #[tracing::instrument(skip_all, fields(action = %action))]
    pub async fn respond_stream(
        &self,
        action: Action,
        prompt: &str,
    ) -> Result<ProviderStream, DmError> {
        let turn = self.prepare(action, prompt).await?;

        let started = Instant::now();
        let mut deltas = self
            .llm
            .stream(&turn.messages, &self.settings.params)
            .await
            .inspect_err(|e| self.record_llm_error(e))?;

        let (tx, rx) = mpsc::channel(32);
        let dm = self.clone();

        tokio::spawn(async move {
            let mut reply = String::new();

            while let Some(delta) = deltas.next().await {
                match delta {
                    Ok(text) => {
                        reply.push_str(&text);
                        if tx.send(Ok(text)).await.is_err() {
                            tracing::warn!(action = %turn.action, "Client went away mid-stream, reply not saved");
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::error!(action = %turn.action, error = %e, "Error in provider stream");
                        dm.record_llm_error(&e);
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }

            metrics::record_llm_latency(dm.llm.name(), "reply", started.elapsed().as_secs_f64());
            tracing::info!(action = %turn.action, reply_chars = reply.len(), "DM reply streamed");

            if let Err(e) = dm.finish(turn, reply).await {
                tracing::warn!(error = %e, "Failed to save streamed reply to campaign history");
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    /// Forget the campaign: empty `campaign-history` and the turn log.
    #[tracing::instrument(skip_all)]
    pub async fn reset_campaign(&self) -> Result<(), DmError> {
        self.store
            .clear(IndexName::CampaignHistory)
            .await
            .inspect_err(|_| {
                metrics::record_vector_store_error(IndexName::CampaignHistory.as_str(), "clear")
            })?;
        self.log.clear().await;

        tracing::info!("Campaign history reset");
        Ok(())
    }

    /// Retrieve context for a prompt according to the action's policy.
    pub async fn retrieve(&self, action: Action, prompt: &str) -> Result<RetrievedContext, DmError> {
        let policy = action.policy();
        if policy.indexes.is_empty() {
            return Ok(RetrievedContext::default());
        }

        let vector = self.embedder.embed_one(prompt).await?;
        let mut passages = Vec::new();

        for index in policy.indexes {
            let hits = self
                .store
                .query(*index, &vector, self.settings.top_k)
                .await
                .inspect_err(|e| {
                    tracing::error!(index = %index, error = %e, "Vector store query failed");
                    metrics::record_vector_store_error(index.as_str(), "query");
                })?;

            tracing::debug!(index = %index, hits = hits.len(), "Retrieved passages");
            metrics::record_passages(index.as_str(), hits.len());
            passages.extend(hits);
        }

        Ok(RetrievedContext::merge(&policy, passages))
    }

    async fn prepare(&self, action: Action, prompt: &str) -> Result<PreparedTurn, DmError> {
        let policy = action.policy();
        let context = self.retrieve(action, prompt).await?;
        let limits = &self.settings.context;

        let oversized = context.total_chars() > limits.max_context_chars;
        let rendered = if !context.is_empty()
            && (policy.summarize || (limits.summarize_oversized && oversized))
        {
            self.summarize(prompt, &context.render(None)).await?
        } else {
            context.render(Some(limits.max_context_chars))
        };

        let recent = self.log.recent(limits.recent_turns).await;
        let messages = vec![
            ChatMessage::system(self.settings.system_prompt.clone()),
            ChatMessage::user(build_turn_prompt(&policy, &rendered, &recent, action, prompt)),
        ];

        Ok(PreparedTurn {
            action,
            prompt: prompt.to_string(),
            messages,
        })
    }

    /// Condense retrieved context with a second LLM call.
    async fn summarize(&self, prompt: &str, context: &str) -> Result<String, DmError> {
        let messages = [
            ChatMessage::system(self.settings.summarizer_prompt.clone()),
            ChatMessage::user(format!("Player request: {}\n\n{}", prompt, context)),
        ];

        let started = Instant::now();
        let summary = self
            .llm
            .complete(&messages, &self.settings.params)
            .await
            .inspect_err(|e| self.record_llm_error(e))?;
        metrics::record_llm_latency(self.llm.name(), "summary", started.elapsed().as_secs_f64());

        tracing::debug!(
            context_chars = context.len(),
            summary_chars = summary.len(),
            "Context summarized"
        );
        Ok(format!("## Summary of retrieved context\n{}\n", summary.trim()))
    }

    /// Persist the reply (when the policy says so) and log the turn.
    async fn finish(&self, turn: PreparedTurn, reply: String) -> Result<(), DmError> {
        if turn.action.policy().persist && !reply.trim().is_empty() {
            self.persist(turn.action, &turn.prompt, &reply).await?;
        }
        self.log.record(Turn::new(turn.action, turn.prompt, reply)).await;
        Ok(())
    }

    async fn persist(&self, action: Action, prompt: &str, reply: &str) -> Result<(), DmError> {
        let values = self.embedder.embed_one(reply).await?;
        let record = VectorRecord::new(values, reply)
            .with_metadata(SOURCE_KEY, SESSION_SOURCE)
            .with_metadata("action", action.as_str())
            .with_metadata("prompt", prompt)
            .with_metadata("created_at", chrono::Utc::now().to_rfc3339());

        self.store
            .upsert(IndexName::CampaignHistory, vec![record])
            .await
            .inspect_err(|_| {
                metrics::record_vector_store_error(IndexName::CampaignHistory.as_str(), "upsert")
            })?;

        tracing::debug!(action = %action, "Reply saved to campaign history");
        Ok(())
    }

    fn record_llm_error(&self, error: &ProviderError) {
        let kind = match error {
            ProviderError::NotConfigured(_) => "not_configured",
            ProviderError::ApiError(_) => "api_error",
            ProviderError::InvalidResponse(_) => "invalid_response",
            ProviderError::RateLimited => "rate_limited",
            ProviderError::NetworkError(_) => "network_error",
        };
        metrics::record_llm_error(self.llm.name(), kind);
    }
}

/// Compose the user message for a turn.
fn build_turn_prompt(
    policy: &ContextPolicy,
    context: &str,
    recent: &[Turn],
    action: Action,
    prompt: &str,
) -> String {
    let mut out = String::new();

    if !policy.instruction.is_empty() {
        out.push_str(policy.instruction);
        out.push_str("\n\n");
    }

    if !context.trim().is_empty() {
        out.push_str(context.trim_end());
        out.push_str("\n\n");
    }

    if !recent.is_empty() {
        out.push_str("## Recent turns\n");
        for turn in recent {
            out.push_str(&format!(
                "Player ({}): {}\nDM: {}\n",
                turn.action,
                turn.prompt,
                turn.response.trim()
            ));
        }
        out.push('\n');
    }

    out.push_str(&format!("Player ({}): {}", action, prompt));
    out
}
