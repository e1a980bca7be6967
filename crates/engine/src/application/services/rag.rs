//! Retrieval layer: chunking, embedding with a two-level cache, cosine
//! retrieval with a short-lived query cache.

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::infrastructure::cache::{EmbeddingMemoryCache, TtlCache};
use crate::infrastructure::embeddings::{cosine_similarity, text_hash};
use crate::infrastructure::persistence::{EmbeddingRepo, RagChunk};
use crate::infrastructure::ports::{EmbedError, EmbeddingPort};
use storyforge_domain::ProjectId;

/// Sliding-window size in characters.
const CHUNK_CHARS: usize = 800;
/// Overlap between adjacent windows.
const CHUNK_OVERLAP: usize = 200;
/// Retrieval results are reused for an hour.
const QUERY_CACHE_TTL: Duration = Duration::from_secs(3600);
/// Default retrieval threshold.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.35;

/// One retrieval hit.
#[derive(Debug, Clone)]
pub struct RetrievedSnippet {
    pub chapter_number: u32,
    pub content: String,
    pub similarity: f32,
}

pub struct RagService {
    embedder: Arc<dyn EmbeddingPort>,
    repo: EmbeddingRepo,
    memory_cache: Arc<EmbeddingMemoryCache>,
    query_cache: TtlCache<String, Vec<RetrievedSnippet>>,
    model: String,
}

impl RagService {
    pub fn new(
        embedder: Arc<dyn EmbeddingPort>,
        repo: EmbeddingRepo,
        memory_cache: Arc<EmbeddingMemoryCache>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            repo,
            memory_cache,
            query_cache: TtlCache::new(QUERY_CACHE_TTL),
            model: model.into(),
        }
    }

    /// Chunk and index one chapter's prose.
    pub async fn index_chapter(
        &self,
        project: ProjectId,
        chapter: u32,
        content: &str,
    ) -> Result<u32, EmbedError> {
        // Replacing an existing index for the chapter, if any.
        if let Err(e) = self.repo.delete_chunks_for_chapter(project, chapter).await {
            tracing::warn!(error = %e, chapter, "Failed to clear old chunks before indexing");
        }

        let chunks = chunk_text(content);
        let mut stored = 0u32;
        for (idx, chunk) in chunks.iter().enumerate() {
            let vector = self.embed_cached(project, chunk).await?;
            let row = RagChunk {
                id: Uuid::new_v4(),
                project_id: project,
                chapter_number: chapter,
                chunk_index: idx as u32,
                content: chunk.clone(),
                vector,
            };
            if let Err(e) = self.repo.insert_chunk(&row).await {
                tracing::warn!(error = %e, chapter, "Failed to store RAG chunk");
                continue;
            }
            stored += 1;
        }
        Ok(stored)
    }

    /// Top-k snippets above the similarity threshold for a query.
    pub async fn retrieve(
        &self,
        project: ProjectId,
        query: &str,
        k: usize,
        threshold: f32,
    ) -> Result<Vec<RetrievedSnippet>, EmbedError> {
        let cache_key = format!("{project}:{}", text_hash(query));
        if let Some(cached) = self.query_cache.get(&cache_key).await {
            return Ok(cached);
        }

        let query_vector = self.embed_cached(project, query).await?;
        let chunks = match self.repo.list_chunks(project).await {
            Ok(chunks) => chunks,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load RAG chunks");
                return Ok(vec![]);
            }
        };

        let mut scored: Vec<RetrievedSnippet> = chunks
            .into_iter()
            .map(|c| RetrievedSnippet {
                similarity: cosine_similarity(&query_vector, &c.vector),
                chapter_number: c.chapter_number,
                content: c.content,
            })
            .filter(|s| s.similarity >= threshold)
            .collect();
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);

        self.query_cache.insert(cache_key, scored.clone()).await;
        Ok(scored)
    }

    /// Rebuild a project's chunk index from scratch.
    pub async fn reindex(
        &self,
        project: ProjectId,
        chapters: &[(u32, String)],
    ) -> Result<u32, EmbedError> {
        if let Err(e) = self.repo.delete_all_chunks(project).await {
            tracing::warn!(error = %e, "Failed to clear chunks for reindex");
        }
        let mut total = 0;
        for (number, content) in chapters {
            total += self.index_chapter(project, *number, content).await?;
        }
        Ok(total)
    }

    pub async fn rollback_chapter(&self, project: ProjectId, chapter: u32) {
        if let Err(e) = self.repo.delete_chunks_for_chapter(project, chapter).await {
            tracing::warn!(error = %e, chapter, "Failed to roll back RAG chunks");
        }
    }

    /// Embed through the two-level cache: in-memory LRU first, then the
    /// persistent store, then the provider. Identical text always yields
    /// the identical cached vector.
    pub async fn embed_cached(
        &self,
        project: ProjectId,
        text: &str,
    ) -> Result<Vec<f32>, EmbedError> {
        let hash = text_hash(text);

        if let Some(vector) = self.memory_cache.get(&hash).await {
            return Ok(vector);
        }

        match self.repo.get_cached(project, &hash).await {
            Ok(Some(vector)) => {
                self.memory_cache.insert(hash, vector.clone()).await;
                return Ok(vector);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Persistent embedding cache read failed"),
        }

        let vectors = self.embedder.embed(&[text.to_string()], &self.model).await?;
        let vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::InvalidResponse("empty embedding batch".to_string()))?;

        if let Err(e) = self
            .repo
            .put_cached(project, &hash, &self.model, &vector)
            .await
        {
            tracing::warn!(error = %e, "Persistent embedding cache write failed");
        }
        self.memory_cache.insert(hash, vector.clone()).await;
        Ok(vector)
    }
}

/// Sliding windows over characters, preferring paragraph boundaries.
pub fn chunk_text(content: &str) -> Vec<String> {
    let chars: Vec<char> = content.chars().collect();
    if chars.is_empty() {
        return vec![];
    }
    if chars.len() <= CHUNK_CHARS {
        return vec![content.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < chars.len() {
        let mut end = (start + CHUNK_CHARS).min(chars.len());
        // Pull the cut back to the nearest paragraph break when one is close.
        if end < chars.len() {
            let window: String = chars[start..end].iter().collect();
            if let Some(break_at) = window.rfind("\n\n") {
                let break_chars = window[..break_at].chars().count();
                if break_chars > CHUNK_CHARS / 2 {
                    end = start + break_chars;
                }
            }
        }
        chunks.push(chars[start..end].iter().collect());
        if end >= chars.len() {
            break;
        }
        start = end.saturating_sub(CHUNK_OVERLAP);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::infrastructure::cache::{EMBEDDING_CACHE_CAPACITY, EMBEDDING_CACHE_TTL};
    use crate::infrastructure::persistence::Database;

    /// Deterministic mock embedder counting provider calls.
    struct CountingEmbedder {
        calls: AtomicU32,
    }

    #[async_trait]
    impl EmbeddingPort for CountingEmbedder {
        async fn embed(
            &self,
            texts: &[String],
            _model: &str,
        ) -> Result<Vec<Vec<f32>>, EmbedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| {
                    // Cheap deterministic vector from character counts.
                    let len = t.chars().count() as f32;
                    let vowels = t.chars().filter(|c| "aeiouơưâă".contains(*c)).count() as f32;
                    vec![len, vowels, 1.0]
                })
                .collect())
        }
    }

    async fn service() -> (RagService, Arc<CountingEmbedder>, ProjectId) {
        let db = Database::in_memory().await.expect("db");
        db.initialize_schema().await.expect("schema");
        let embedder = Arc::new(CountingEmbedder {
            calls: AtomicU32::new(0),
        });
        let service = RagService::new(
            embedder.clone(),
            EmbeddingRepo::new(db.pool().clone()),
            Arc::new(EmbeddingMemoryCache::new(
                EMBEDDING_CACHE_CAPACITY,
                EMBEDDING_CACHE_TTL,
            )),
            "test-embed",
        );
        (service, embedder, ProjectId::new())
    }

    #[tokio::test]
    async fn identical_text_embeds_once() {
        let (service, embedder, project) = service().await;
        let first = service.embed_cached(project, "linh khí").await.expect("embed");
        let second = service.embed_cached(project, "linh khí").await.expect("embed");
        assert_eq!(first, second, "cached vector is identical");
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retrieval_returns_similar_chunks() {
        let (service, _, project) = service().await;
        service
            .index_chapter(project, 1, "Hàn Phong luyện kiếm dưới thác nước.")
            .await
            .expect("index");
        service
            .index_chapter(project, 2, "Phiên đấu giá tại Vạn Bảo Lâu mở màn.")
            .await
            .expect("index");

        let hits = service
            .retrieve(project, "Hàn Phong luyện kiếm dưới thác nước.", 5, 0.9)
            .await
            .expect("retrieve");
        assert!(!hits.is_empty());
        assert_eq!(hits[0].chapter_number, 1);
    }

    #[tokio::test]
    async fn reindex_rebuilds_all_chunks() {
        let (service, _, project) = service().await;
        service
            .index_chapter(project, 1, "nội dung cũ")
            .await
            .expect("index");

        let chapters = vec![
            (1u32, "chương một bản mới".to_string()),
            (2u32, "chương hai bản mới".to_string()),
        ];
        let total = service.reindex(project, &chapters).await.expect("reindex");
        assert_eq!(total, 2);
    }

    #[test]
    fn chunking_covers_text_with_overlap() {
        let paragraph = "câu chuyện dài ".repeat(200); // ~3000 chars
        let chunks = chunk_text(&paragraph);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= CHUNK_CHARS);
        }
        // Every character of the source appears in some chunk.
        let rejoined: usize = chunks.iter().map(|c| c.chars().count()).sum();
        assert!(rejoined >= paragraph.chars().count());
    }

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(chunk_text("ngắn").len(), 1);
        assert!(chunk_text("").is_empty());
    }
}
