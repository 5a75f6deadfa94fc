//! Document ingestion pipeline.
//!
//! Validates an upload, stages it in a scoped scratch file, extracts text,
//! chunks it with overlap, and hands the chunks to an [`IndexService`] in
//! fixed-size batches: the first batch builds the index, later batches are
//! added to it. The scratch file is a [`tempfile::NamedTempFile`], so it is
//! removed on every exit path, including failures.

use anyhow::Context;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;


use crate::chunk::chunk_text;
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::extract::{extract_text, DocumentFormat};
use crate::index::{InMemoryIndexService, IndexId, IndexService};
use crate::progress::{IngestProgressEvent, IngestProgressReporter, NoProgress, ProgressMode};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("file size {size} bytes exceeds the {max} byte limit")]
    OversizeFile { size: u64, max: u64 },
    #[error("unsupported file format '{0}'; upload a PDF, DOCX, or TXT file")]
    UnsupportedFormat(String),
    #[error("could not extract text: {0}")]
    ExtractionFailure(String),
    #[error("indexing failed: {0}")]
    IndexingFailure(String),
    #[error("could not stage upload: {0}")]
    Storage(#[from] std::io::Error),
}

/// Result of a successful ingestion.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub index_id: IndexId,
    pub format: DocumentFormat,
    pub chunk_count: usize,
}

pub struct DocumentIngestor {
    index: Arc<dyn IndexService>,
    max_file_size: u64,
    chunk_size: usize,
    chunk_overlap: usize,
    batch_size: usize,
    scratch_dir: PathBuf,
    progress: Box<dyn IngestProgressReporter>,
}

impl DocumentIngestor {
    pub fn new(index: Arc<dyn IndexService>, config: &Config) -> Self {
        Self {
            index,
            max_file_size: config.upload.max_file_size,
            chunk_size: config.chunking.chunk_size,
            chunk_overlap: config.chunking.chunk_overlap,
            batch_size: config.index.batch_size.max(1),
            scratch_dir: config.upload.scratch_dir(),
            progress: Box::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn IngestProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Ingests one uploaded file and returns the handle of its index.
    pub async fn ingest(&self, filename: &str, bytes: &[u8]) -> Result<IngestOutcome, IngestError> {
        let size = bytes.len() as u64;
        if size > self.max_file_size {
            return Err(IngestError::OversizeFile {
                size,
                max: self.max_file_size,
            });
        }

        let format = DocumentFormat::from_filename(filename)
            .ok_or_else(|| IngestError::UnsupportedFormat(filename.to_string()))?;

        // Dropped at the end of this function, deleting the file.
        let staged = self.stage(bytes, format)?;
        tracing::debug!(file = filename, path = %staged.path().display(), "staged upload");

        self.progress.report(IngestProgressEvent::Extracting {
            file: filename.to_string(),
        });
        let path = staged.path().to_path_buf();
        let text = tokio::task::spawn_blocking(move || -> Result<String, IngestError> {
            let data = std::fs::read(&path)?;
            extract_text(&data, format).map_err(|e| IngestError::ExtractionFailure(e.to_string()))
        })
        .await
        .map_err(|e| IngestError::ExtractionFailure(e.to_string()))??;

        if text.trim().is_empty() {
            return Err(IngestError::ExtractionFailure(
                "document contains no extractable text".to_string(),
            ));
        }

        let chunks = chunk_text(&text, self.chunk_size, self.chunk_overlap);
        let total = chunks.len() as u64;

        let mut index_id: Option<IndexId> = None;
        let mut done = 0u64;
        for batch in chunks.chunks(self.batch_size) {
            let result = match index_id.clone() {
                None => match self.index.build(batch).await {
                    Ok(id) => {
                        index_id = Some(id);
                        Ok(())
                    }
                    Err(e) => Err(e),
                },
                Some(id) => self.index.add(&id, batch).await,
            };
            if let Err(e) = result {
                if let Some(id) = &index_id {
                    self.index.remove(id).await;
                }
                tracing::warn!(file = filename, error = %e, "indexing failed");
                return Err(IngestError::IndexingFailure(e.to_string()));
            }
            done += batch.len() as u64;
            self.progress.report(IngestProgressEvent::Indexing {
                file: filename.to_string(),
                n: done,
                total,
            });
        }

        let index_id = index_id.ok_or_else(|| {
            IngestError::ExtractionFailure("document produced no chunks".to_string())
        })?;

        tracing::info!(
            file = filename,
            index = %index_id,
            chunks = chunks.len(),
            "document ingested"
        );

        Ok(IngestOutcome {
            index_id,
            format,
            chunk_count: chunks.len(),
        })
    }

    fn stage(
        &self,
        bytes: &[u8],
        format: DocumentFormat,
    ) -> Result<tempfile::NamedTempFile, IngestError> {
        std::fs::create_dir_all(&self.scratch_dir)?;
        let suffix = format!(".{}", format.extension());
        let mut staged = tempfile::Builder::new()
            .prefix("efiko-upload-")
            .suffix(&suffix)
            .tempfile_in(&self.scratch_dir)?;
        staged.write_all(bytes)?;
        staged.flush()?;
        Ok(staged)
    }
}

/// CLI entry point for `efiko ingest <file>`: ingests one file into a fresh
/// in-process index and prints the handle and chunk count.
pub async fn run_ingest(config: &Config, path: &Path, progress: ProgressMode) -> anyhow::Result<()> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let embedder = create_embedder(&config.embedding)?;
    let index = Arc::new(InMemoryIndexService::new(embedder));
    let ingestor = DocumentIngestor::new(index, config).with_progress(progress.reporter());

    let outcome = ingestor.ingest(&filename, &bytes).await?;
    println!("Ingested {} ({})", filename, outcome.format.extension());
    println!("  chunks: {}", outcome.chunk_count);
    println!("  vectorstore_id: {}", outcome.index_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, ScoredChunk};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records the batch sizes it receives; fails on the batch numbered `fail_on`.
    #[derive(Default)]
    struct RecordingIndex {
        batches: Mutex<Vec<usize>>,
        removed: Mutex<bool>,
        fail_on: Option<usize>,
    }

    impl RecordingIndex {
        fn record(&self, n: usize) -> Result<()> {
            let mut batches = self.batches.lock().unwrap();
            if self.fail_on == Some(batches.len()) {
                anyhow::bail!("embedding service unavailable");
            }
            batches.push(n);
            Ok(())
        }
    }

    #[async_trait]
    impl IndexService for RecordingIndex {
        async fn build(&self, chunks: &[Chunk]) -> Result<IndexId> {
            self.record(chunks.len())?;
            Ok(IndexId::from("idx"))
        }

        async fn add(&self, _id: &IndexId, chunks: &[Chunk]) -> Result<()> {
            self.record(chunks.len())
        }

        async fn similarity_search(
            &self,
            _id: &IndexId,
            _query: &str,
            _k: usize,
        ) -> Result<Vec<ScoredChunk>> {
            Ok(Vec::new())
        }

        async fn remove(&self, _id: &IndexId) -> bool {
            *self.removed.lock().unwrap() = true;
            true
        }

        fn contains(&self, _id: &IndexId) -> bool {
            true
        }
    }

    fn ingestor(index: Arc<RecordingIndex>, scratch: &TempDir) -> DocumentIngestor {
        DocumentIngestor::new(index, &Config::default()).with_scratch_dir(scratch.path())
    }

    fn scratch_is_empty(dir: &TempDir) -> bool {
        std::fs::read_dir(dir.path()).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn oversize_rejected_before_staging() {
        let scratch = TempDir::new().unwrap();
        let index = Arc::new(RecordingIndex::default());
        let bytes = vec![b'a'; 16 * 1024 * 1024];
        let err = ingestor(index.clone(), &scratch)
            .ingest("big.txt", &bytes)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::OversizeFile { .. }));
        assert!(index.batches.lock().unwrap().is_empty());
        assert!(scratch_is_empty(&scratch));
    }

    #[tokio::test]
    async fn unsupported_extension_rejected() {
        let scratch = TempDir::new().unwrap();
        let err = ingestor(Arc::new(RecordingIndex::default()), &scratch)
            .ingest("slides.pptx", b"data")
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedFormat(_)));
    }

    #[tokio::test]
    async fn success_cleans_scratch_file() {
        let scratch = TempDir::new().unwrap();
        let index = Arc::new(RecordingIndex::default());
        let outcome = ingestor(index.clone(), &scratch)
            .ingest("notes.txt", b"Photosynthesis converts light into chemical energy.")
            .await
            .unwrap();
        assert_eq!(outcome.index_id.as_str(), "idx");
        assert_eq!(outcome.chunk_count, 1);
        assert!(scratch_is_empty(&scratch));
    }

    #[tokio::test]
    async fn chunks_are_submitted_in_batches() {
        let scratch = TempDir::new().unwrap();
        let index = Arc::new(RecordingIndex::default());
        let mut config = Config::default();
        config.chunking.chunk_size = 10;
        config.chunking.chunk_overlap = 0;
        config.index.batch_size = 4;
        let ingestor =
            DocumentIngestor::new(index.clone(), &config).with_scratch_dir(scratch.path());

        let text = (0..10).map(|i| format!("word{:05}", i)).collect::<Vec<_>>().join(" ");
        let outcome = ingestor.ingest("words.txt", text.as_bytes()).await.unwrap();
        assert_eq!(outcome.chunk_count, 10);
        assert_eq!(*index.batches.lock().unwrap(), vec![4, 4, 2]);
    }

    #[tokio::test]
    async fn indexing_failure_cleans_scratch_and_partial_index() {
        let scratch = TempDir::new().unwrap();
        let index = Arc::new(RecordingIndex {
            fail_on: Some(1),
            ..RecordingIndex::default()
        });
        let mut config = Config::default();
        config.chunking.chunk_size = 10;
        config.chunking.chunk_overlap = 0;
        config.index.batch_size = 2;
        let ingestor =
            DocumentIngestor::new(index.clone(), &config).with_scratch_dir(scratch.path());

        let text = (0..6).map(|i| format!("word{:05}", i)).collect::<Vec<_>>().join(" ");
        let err = ingestor.ingest("words.txt", text.as_bytes()).await.unwrap_err();
        assert!(matches!(err, IngestError::IndexingFailure(_)));
        assert!(*index.removed.lock().unwrap());
        assert!(scratch_is_empty(&scratch));
    }

    #[tokio::test]
    async fn corrupt_pdf_is_extraction_failure() {
        let scratch = TempDir::new().unwrap();
        let err = ingestor(Arc::new(RecordingIndex::default()), &scratch)
            .ingest("broken.pdf", b"%PDF-garbage")
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::ExtractionFailure(_)));
        assert!(scratch_is_empty(&scratch));
    }

    #[tokio::test]
    async fn blank_text_is_extraction_failure() {
        let scratch = TempDir::new().unwrap();
        let err = ingestor(Arc::new(RecordingIndex::default()), &scratch)
            .ingest("blank.txt", b"   \n\n ")
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::ExtractionFailure(_)));
    }
}
