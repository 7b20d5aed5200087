//! Knowledge ingestion and retrieval.
//!
//! Documents are stored whole in the `documents` table and as embedded
//! fragments in the `knowledge` table. Embedding calls go through the
//! runtime's knowledge semaphore.

use anyhow::{Context, Result};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use super::AgentRuntime;
use crate::types::agent::KnowledgeItem;
use crate::types::database::SearchMemoriesParams;
use crate::types::memory::{table, Memory, MemoryMetadata, MemoryScope, MemoryType};
use crate::types::model::ModelType;
use crate::types::primitives::{string_to_uuid, Content, UUID};

const SEARCH_THRESHOLD: f32 = 0.1;
const SEARCH_COUNT: usize = 5;

/// Chunking parameters, in words.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeOptions {
    pub target_tokens: usize,
    pub overlap: usize,
    pub model_context_size: usize,
}

impl Default for KnowledgeOptions {
    fn default() -> Self {
        KnowledgeOptions {
            target_tokens: 3000,
            overlap: 200,
            model_context_size: 4096,
        }
    }
}

/// A document to ingest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeDocument {
    pub id: UUID,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub shared: bool,
}

impl KnowledgeDocument {
    /// A document whose id is derived from its text
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        KnowledgeDocument {
            id: string_to_uuid(&text),
            text,
            source: None,
            shared: false,
        }
    }
}

/// Split `text` into word chunks of at most `size` words, each starting
/// `size - overlap` words after the previous one.
pub(crate) fn split_chunks(text: &str, options: &KnowledgeOptions) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }
    let size = options.target_tokens.min(options.model_context_size).max(1);
    let step = size - options.overlap.min(size - 1);

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(words.len());
        chunks.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start += step;
    }
    chunks
}

impl AgentRuntime {
    /// Ingest a document. Returns the number of fragments stored, zero when
    /// the document already exists. Nothing is stored when embedding fails,
    /// so a failed ingest can be retried.
    pub async fn add_knowledge(
        &self,
        document: &KnowledgeDocument,
        options: KnowledgeOptions,
    ) -> Result<usize> {
        let adapter = self.require_adapter()?;
        if adapter.get_memory_by_id(&document.id).await?.is_some() {
            debug!(document_id = %document.id, "Knowledge document already stored");
            return Ok(0);
        }

        let scope = if document.shared {
            MemoryScope::Shared
        } else {
            MemoryScope::Private
        };
        let now = chrono::Utc::now().timestamp_millis();

        let mut doc_metadata = MemoryMetadata::of_type(MemoryType::Document);
        doc_metadata.timestamp = Some(now);
        doc_metadata.scope = Some(scope);
        doc_metadata.source = document.source.clone();
        let doc_memory = Memory {
            id: Some(document.id.clone()),
            agent_id: Some(self.agent_id.clone()),
            metadata: Some(doc_metadata),
            ..Memory::new(
                self.agent_id.clone(),
                self.agent_id.clone(),
                Content::text(document.text.clone()),
            )
        };

        let chunks = split_chunks(&document.text, &options);
        let mut embeddings = Vec::with_capacity(chunks.len());
        for (position, chunk) in chunks.iter().enumerate() {
            embeddings.push(self.embed(chunk).await.with_context(|| {
                format!("Failed to embed fragment {position} of {}", document.id)
            })?);
        }

        for (position, (chunk, embedding)) in chunks.iter().zip(embeddings).enumerate() {
            let mut metadata = MemoryMetadata::of_type(MemoryType::Fragment);
            metadata.timestamp = Some(now);
            metadata.scope = Some(scope);
            metadata.source = document.source.clone();
            metadata.document_id = Some(document.id.clone());
            metadata.position = Some(position);

            let fragment = Memory {
                id: Some(string_to_uuid(format!("{}-fragment-{position}", document.id))),
                agent_id: Some(self.agent_id.clone()),
                embedding: Some(embedding),
                metadata: Some(metadata),
                ..Memory::new(
                    self.agent_id.clone(),
                    self.agent_id.clone(),
                    Content::text(chunk.clone()),
                )
            };
            adapter
                .create_memory(&fragment, table::KNOWLEDGE, false)
                .await?;
        }
        // Stored last: its presence marks the ingest as complete.
        adapter
            .create_memory(&doc_memory, table::DOCUMENTS, false)
            .await?;

        debug!(document_id = %document.id, fragments = chunks.len(), "Stored knowledge");
        Ok(chunks.len())
    }

    /// Ingest the character's knowledge entries concurrently. Failures are
    /// logged per entry.
    pub async fn process_character_knowledge(&self, items: &[KnowledgeItem]) {
        info!(count = items.len(), "Processing character knowledge");

        let results = join_all(items.iter().map(|item| async move {
            let document = match item {
                KnowledgeItem::Text(text) => KnowledgeDocument::from_text(text.clone()),
                KnowledgeItem::File { path, shared } => {
                    let text = tokio::fs::read_to_string(path)
                        .await
                        .with_context(|| format!("Failed to read knowledge file {path}"))?;
                    KnowledgeDocument {
                        id: string_to_uuid(path),
                        text,
                        source: Some(path.clone()),
                        shared: *shared,
                    }
                }
            };
            self.add_knowledge(&document, KnowledgeOptions::default())
                .await
        }))
        .await;

        for (item, result) in items.iter().zip(results) {
            if let Err(e) = result {
                warn!(item = ?item, error = %format!("{e:#}"), "Failed to ingest knowledge");
            }
        }
    }

    /// Fragments relevant to the message, most similar first.
    pub async fn get_knowledge(&self, message: &Memory) -> Result<Vec<Memory>> {
        let text = message.text().trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let embedding = self.embed(text).await?;
        self.require_adapter()?
            .search_memories(SearchMemoriesParams {
                table_name: table::KNOWLEDGE.to_string(),
                embedding,
                match_threshold: Some(SEARCH_THRESHOLD),
                count: Some(SEARCH_COUNT),
                ..Default::default()
            })
            .await
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let _permit = self.knowledge_semaphore.acquire_guard().await?;
        let value = self
            .use_model(ModelType::TextEmbedding, json!({ "text": text }))
            .await?;
        serde_json::from_value(value).context("Embedding model returned a non-numeric vector")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn options(size: usize, overlap: usize) -> KnowledgeOptions {
        KnowledgeOptions {
            target_tokens: size,
            overlap,
            model_context_size: 4096,
        }
    }

    #[test]
    fn test_split_chunks_overlaps() {
        let chunks = split_chunks("a b c d e f g", &options(3, 1));
        assert_eq!(chunks, vec!["a b c", "c d e", "e f g"]);
    }

    #[test]
    fn test_split_chunks_short_text_is_single_chunk() {
        assert_eq!(split_chunks("  one two ", &options(3000, 200)), vec!["one two"]);
        assert!(split_chunks("   ", &options(3000, 200)).is_empty());
    }

    #[test]
    fn test_split_chunks_clamps_overlap_and_context() {
        let chunks = split_chunks("a b c", &options(2, 5));
        assert_eq!(chunks, vec!["a b", "b c"]);

        let capped = KnowledgeOptions {
            target_tokens: 10,
            overlap: 0,
            model_context_size: 2,
        };
        assert_eq!(split_chunks("a b c d", &capped), vec!["a b", "c d"]);
    }

    #[test]
    fn test_document_id_derives_from_text() {
        let doc = KnowledgeDocument::from_text("The sky is blue");
        assert_eq!(doc.id, string_to_uuid("The sky is blue"));
    }
}
