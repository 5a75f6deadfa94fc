//! Document indexes: embedding-backed similarity search over chunks.
//!
//! The [`IndexService`] trait is the seam between ingestion/chat and the
//! vector store. [`InMemoryIndexService`] keeps each index in a keyed
//! cache (`id → index`) behind a `RwLock`, searches by brute-force cosine
//! similarity, and drops indexes older than a TTL when swept. Chunks with
//! the same content hash are embedded once per call.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use async_trait::async_trait;
use uuid::Uuid;

use crate::embedding::{cosine_similarity, Embedder};
use crate::models::{Chunk, ScoredChunk};

/// Opaque handle to a built index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexId(String);

impl IndexId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for IndexId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for IndexId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for IndexId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for IndexId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds and queries similarity indexes over document chunks.
#[async_trait]
pub trait IndexService: Send + Sync {
    /// Embeds `chunks` and registers a new index holding them.
    async fn build(&self, chunks: &[Chunk]) -> Result<IndexId>;

    /// Embeds `chunks` and appends them to an existing index.
    async fn add(&self, id: &IndexId, chunks: &[Chunk]) -> Result<()>;

    /// Returns up to `k` chunk texts ordered by descending similarity.
    async fn similarity_search(&self, id: &IndexId, query: &str, k: usize)
        -> Result<Vec<ScoredChunk>>;

    /// Drops an index. Returns whether it existed.
    async fn remove(&self, id: &IndexId) -> bool;

    fn contains(&self, id: &IndexId) -> bool;
}

struct StoredVector {
    chunk_index: i64,
    text: String,
    vector: Vec<f32>,
}

struct DocumentIndex {
    created_at: Instant,
    entries: Vec<StoredVector>,
}

/// In-process index cache.
pub struct InMemoryIndexService {
    embedder: Arc<dyn Embedder>,
    indexes: RwLock<HashMap<IndexId, DocumentIndex>>,
}

impl InMemoryIndexService {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            indexes: RwLock::new(HashMap::new()),
        }
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<StoredVector>> {
        let mut slot_by_hash: HashMap<&str, usize> = HashMap::new();
        let mut texts: Vec<String> = Vec::new();
        let mut slots = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let slot = *slot_by_hash.entry(chunk.hash.as_str()).or_insert_with(|| {
                texts.push(chunk.text.clone());
                texts.len() - 1
            });
            slots.push(slot);
        }

        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != texts.len() {
            bail!(
                "embedder returned {} vectors for {} distinct chunks",
                vectors.len(),
                texts.len()
            );
        }
        if texts.len() < chunks.len() {
            tracing::debug!(
                chunks = chunks.len(),
                distinct = texts.len(),
                "reused embeddings for repeated chunks"
            );
        }
        Ok(chunks
            .iter()
            .zip(slots)
            .map(|(chunk, slot)| StoredVector {
                chunk_index: chunk.chunk_index,
                text: chunk.text.clone(),
                vector: vectors[slot].clone(),
            })
            .collect())
    }

    /// Number of cached indexes.
    pub fn len(&self) -> usize {
        self.indexes.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of chunks held by one index.
    pub fn chunk_count(&self, id: &IndexId) -> Option<usize> {
        self.indexes
            .read()
            .ok()
            .and_then(|m| m.get(id).map(|idx| idx.entries.len()))
    }

    /// Removes indexes created more than `max_age` ago. Returns how many
    /// were dropped.
    pub fn sweep_expired(&self, max_age: Duration) -> usize {
        let Ok(mut indexes) = self.indexes.write() else {
            return 0;
        };
        let before = indexes.len();
        indexes.retain(|_, idx| idx.created_at.elapsed() < max_age);
        before - indexes.len()
    }
}

#[async_trait]
impl IndexService for InMemoryIndexService {
    async fn build(&self, chunks: &[Chunk]) -> Result<IndexId> {
        let entries = self.embed_chunks(chunks).await?;
        let id = IndexId::new();
        let mut indexes = self
            .indexes
            .write()
            .map_err(|_| anyhow::anyhow!("index cache lock poisoned"))?;
        indexes.insert(
            id.clone(),
            DocumentIndex {
                created_at: Instant::now(),
                entries,
            },
        );
        Ok(id)
    }

    async fn add(&self, id: &IndexId, chunks: &[Chunk]) -> Result<()> {
        if !self.contains(id) {
            bail!("index not found: {}", id);
        }
        let entries = self.embed_chunks(chunks).await?;
        let mut indexes = self
            .indexes
            .write()
            .map_err(|_| anyhow::anyhow!("index cache lock poisoned"))?;
        match indexes.get_mut(id) {
            Some(idx) => {
                idx.entries.extend(entries);
                Ok(())
            }
            None => bail!("index not found: {}", id),
        }
    }

    async fn similarity_search(
        &self,
        id: &IndexId,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        if !self.contains(id) {
            bail!("index not found: {}", id);
        }
        let query_vec = self.embedder.embed_query(query).await?;

        let indexes = self
            .indexes
            .read()
            .map_err(|_| anyhow::anyhow!("index cache lock poisoned"))?;
        let idx = indexes
            .get(id)
            .ok_or_else(|| anyhow::anyhow!("index not found: {}", id))?;

        let mut scored: Vec<ScoredChunk> = idx
            .entries
            .iter()
            .map(|e| ScoredChunk {
                chunk_index: e.chunk_index,
                text: e.text.clone(),
                score: cosine_similarity(&query_vec, &e.vector),
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }

    async fn remove(&self, id: &IndexId) -> bool {
        self.indexes
            .write()
            .map(|mut m| m.remove(id).is_some())
            .unwrap_or(false)
    }

    fn contains(&self, id: &IndexId) -> bool {
        self.indexes
            .read()
            .map(|m| m.contains_key(id))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunk_text;

    /// Embeds text as counts of a few marker words.
    struct KeywordEmbedder;

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        fn model_name(&self) -> &str {
            "keyword"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let t = t.to_lowercase();
                    ["cell", "river", "planet"]
                        .iter()
                        .map(|w| t.matches(w).count() as f32)
                        .collect()
                })
                .collect())
        }
    }

    fn service() -> InMemoryIndexService {
        InMemoryIndexService::new(Arc::new(KeywordEmbedder))
    }

    fn chunks(texts: &[&str]) -> Vec<Chunk> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let mut chunk = chunk_text(t, 1000, 0).remove(0);
                chunk.chunk_index = i as i64;
                chunk
            })
            .collect()
    }

    #[tokio::test]
    async fn search_orders_by_similarity() {
        let svc = service();
        let id = svc
            .build(&chunks(&["The cell membrane", "The Niger river", "Planet Mars"]))
            .await
            .unwrap();
        let hits = svc.similarity_search(&id, "river basins", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "The Niger river");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn add_extends_existing_index() {
        let svc = service();
        let id = svc.build(&chunks(&["cell one"])).await.unwrap();
        svc.add(&id, &chunks(&["planet two", "river three"]))
            .await
            .unwrap();
        assert_eq!(svc.chunk_count(&id), Some(3));
        let hits = svc.similarity_search(&id, "planet", 1).await.unwrap();
        assert_eq!(hits[0].text, "planet two");
    }

    /// Records how many texts each `embed` call receives.
    struct CountingEmbedder(std::sync::Mutex<Vec<usize>>);

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.0.lock().unwrap().push(texts.len());
            KeywordEmbedder.embed(texts).await
        }
    }

    #[tokio::test]
    async fn repeated_chunks_are_embedded_once() {
        let embedder = Arc::new(CountingEmbedder(std::sync::Mutex::new(Vec::new())));
        let svc = InMemoryIndexService::new(embedder.clone());
        let id = svc
            .build(&chunks(&["Page footer: cell notes", "The Niger river", "Page footer: cell notes"]))
            .await
            .unwrap();
        assert_eq!(*embedder.0.lock().unwrap(), vec![2]);
        assert_eq!(svc.chunk_count(&id), Some(3));

        let hits = svc.similarity_search(&id, "cell", 3).await.unwrap();
        let footer: Vec<i64> = hits
            .iter()
            .filter(|h| h.text.starts_with("Page footer"))
            .map(|h| h.chunk_index)
            .collect();
        assert_eq!(footer.len(), 2);
        assert!(footer.contains(&0) && footer.contains(&2));
    }

    #[tokio::test]
    async fn hits_carry_their_document_position() {
        let svc = service();
        let id = svc
            .build(&chunks(&["The cell membrane", "The Niger river", "Planet Mars"]))
            .await
            .unwrap();
        let hits = svc.similarity_search(&id, "planet", 1).await.unwrap();
        assert_eq!(hits[0].chunk_index, 2);
    }

    #[tokio::test]
    async fn unknown_index_is_an_error() {
        let svc = service();
        let missing = IndexId::from("missing");
        assert!(svc.similarity_search(&missing, "q", 2).await.is_err());
        assert!(svc.add(&missing, &chunks(&["cell"])).await.is_err());
        assert!(!svc.remove(&missing).await);
    }

    #[tokio::test]
    async fn sweep_drops_only_old_indexes() {
        let svc = service();
        let id = svc.build(&chunks(&["cell"])).await.unwrap();
        assert_eq!(svc.sweep_expired(Duration::from_secs(3600)), 0);
        assert!(svc.contains(&id));
        assert_eq!(svc.sweep_expired(Duration::ZERO), 1);
        assert!(!svc.contains(&id));
        assert!(svc.is_empty());
    }
}
