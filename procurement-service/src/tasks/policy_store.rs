use anyhow::{Result, anyhow};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::utils::{Embedder, cosine_similarity};

struct PolicyPassage {
    text: String,
    embedding: Vec<f32>,
}

/// A retrieved passage and its similarity to the query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPassage {
    pub text: String,
    pub score: f32,
}

/// In-memory vector index over the policy document.
///
/// The whole document is embedded as one passage; the index is immutable
/// once built.
pub struct PolicyIndex {
    passages: Vec<PolicyPassage>,
    embedder: Arc<dyn Embedder>,
}

impl PolicyIndex {
    pub async fn from_text(text: String, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let embedding = embedder
            .embed(vec![text.clone()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("embedder returned no vector for the policy text"))?;

        Ok(Self {
            passages: vec![PolicyPassage { text, embedding }],
            embedder,
        })
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Total characters of indexed text
    pub fn text_len(&self) -> usize {
        self.passages.iter().map(|p| p.text.chars().count()).sum()
    }

    /// The `top_k` passages most similar to `query`, best first
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<ScoredPassage>> {
        let query_embedding = self
            .embedder
            .embed(vec![query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("embedder returned no vector for the query"))?;

        let mut scored: Vec<ScoredPassage> = self
            .passages
            .iter()
            .map(|passage| ScoredPassage {
                text: passage.text.clone(),
                score: cosine_similarity(&query_embedding, &passage.embedding),
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        Ok(scored)
    }
}

/// Lazily built, process-wide handle to the policy index.
///
/// The first call to [`PolicyStore::index`] reads the PDF and builds the
/// index; every later call returns the same `Arc`.
pub struct PolicyStore {
    pdf_path: PathBuf,
    embedder: Arc<dyn Embedder>,
    index: OnceCell<Arc<PolicyIndex>>,
}

impl PolicyStore {
    pub fn new(pdf_path: impl Into<PathBuf>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            pdf_path: pdf_path.into(),
            embedder,
            index: OnceCell::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.index.initialized()
    }

    pub async fn index(&self) -> Result<Arc<PolicyIndex>> {
        let index = self.index.get_or_try_init(|| self.build()).await?;
        Ok(Arc::clone(index))
    }

    async fn build(&self) -> Result<Arc<PolicyIndex>> {
        info!(path = %self.pdf_path.display(), "Building policy index");
        let text = read_policy_text(&self.pdf_path).await;
        let index = PolicyIndex::from_text(text, Arc::clone(&self.embedder)).await?;
        info!(
            passages = index.len(),
            characters = index.text_len(),
            "Policy index ready"
        );
        Ok(Arc::new(index))
    }
}

/// Text layer of every page joined by newlines. An unreadable document
/// yields an empty string.
pub async fn read_policy_text(path: &Path) -> String {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        warn!(path = %path.display(), "Policy document not found, indexing empty text");
        return String::new();
    }

    let owned = path.to_path_buf();
    match tokio::task::spawn_blocking(move || extract_pdf_text(&owned)).await {
        Ok(Ok(text)) => {
            if text.trim().is_empty() {
                warn!(path = %path.display(), "Policy document has no text layer");
            }
            text
        }
        Ok(Err(e)) => {
            warn!(path = %path.display(), error = %e, "Could not read policy document, indexing empty text");
            String::new()
        }
        Err(e) => {
            warn!(error = %e, "Policy extraction task failed, indexing empty text");
            String::new()
        }
    }
}

fn extract_pdf_text(path: &Path) -> Result<String> {
    let bindings = Pdfium::bind_to_system_library()
        .map_err(|e| anyhow!("pdfium library unavailable: {}", e))?;
    let pdfium = Pdfium::new(bindings);
    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| anyhow!("failed to load PDF: {}", e))?;

    // Image-only pages have no text layer and contribute an empty line
    let pages: Vec<String> = document
        .pages()
        .iter()
        .map(|page| page.text().map(|text| text.all()).unwrap_or_default())
        .collect();

    Ok(pages.join("\n"))
}
