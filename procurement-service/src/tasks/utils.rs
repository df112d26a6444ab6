use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use fastembed::{
    EmbeddingModel, InitOptions, InitOptionsUserDefined, Pooling, TextEmbedding, TokenizerFiles,
    UserDefinedEmbeddingModel,
};
use rig::completion::Prompt;
use rig::prelude::*;
use rig::providers::gemini;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// A hosted model answering a single prompt with free text
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Gemini through rig's provider client
pub struct GeminiModel {
    agent: rig::agent::Agent<gemini::completion::CompletionModel>,
    model: String,
}

impl GeminiModel {
    pub fn new(api_key: &str, model: &str) -> Self {
        let client = gemini::Client::new(api_key);
        Self {
            agent: client.agent(model).build(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl LanguageModel for GeminiModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        info!(
            model = %self.model,
            prompt_chars = prompt.chars().count(),
            "Calling language model"
        );
        let answer = self
            .agent
            .prompt(prompt.to_string())
            .await
            .map_err(|e| anyhow!("{} completion failed: {}", self.model, e))?;
        Ok(answer)
    }
}

/// Turns text into vectors for the policy index
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;
}

const TOKENIZER_FILES: [&str; 4] = [
    "tokenizer.json",
    "config.json",
    "special_tokens_map.json",
    "tokenizer_config.json",
];
const ONNX_CANDIDATES: [&str; 2] = ["model.onnx", "onnx/model.onnx"];

/// The ONNX file of a complete sentence-transformers export in `dir`
fn local_onnx_file(dir: &Path) -> Option<PathBuf> {
    if !TOKENIZER_FILES.iter().all(|name| dir.join(name).is_file()) {
        return None;
    }
    ONNX_CANDIDATES
        .iter()
        .map(|candidate| dir.join(candidate))
        .find(|path| path.is_file())
}

fn load_local_model(dir: &Path, onnx_file: &Path) -> Result<TextEmbedding> {
    let read = |path: PathBuf| {
        std::fs::read(&path).with_context(|| format!("reading {}", path.display()))
    };
    let tokenizer_files = TokenizerFiles {
        tokenizer_file: read(dir.join("tokenizer.json"))?,
        config_file: read(dir.join("config.json"))?,
        special_tokens_map_file: read(dir.join("special_tokens_map.json"))?,
        tokenizer_config_file: read(dir.join("tokenizer_config.json"))?,
    };
    let model = UserDefinedEmbeddingModel::new(read(onnx_file.to_path_buf())?, tokenizer_files)
        .with_pooling(Pooling::Mean);
    let embedding = TextEmbedding::try_new_from_user_defined(model, InitOptionsUserDefined::default())?;
    Ok(embedding)
}

/// Prefer a local export in `dir`; otherwise fetch all-MiniLM-L6-v2 into it
fn load_embedding_model(dir: PathBuf) -> Result<TextEmbedding> {
    if let Some(onnx_file) = local_onnx_file(&dir) {
        info!(onnx = %onnx_file.display(), "Loading local embedding model");
        return load_local_model(&dir, &onnx_file);
    }

    warn!(
        model_dir = %dir.display(),
        "No local embedding model export, downloading all-MiniLM-L6-v2 into the model directory"
    );
    let embedding = TextEmbedding::try_new(
        InitOptions::new(EmbeddingModel::AllMiniLML6V2)
            .with_cache_dir(dir)
            .with_show_download_progress(false),
    )?;
    Ok(embedding)
}

/// fastembed model, loaded from `model_dir` on first use
pub struct FastEmbedder {
    model_dir: PathBuf,
    model: OnceCell<Arc<Mutex<TextEmbedding>>>,
}

impl FastEmbedder {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            model: OnceCell::new(),
        }
    }

    async fn model(&self) -> Result<Arc<Mutex<TextEmbedding>>> {
        let model = self
            .model
            .get_or_try_init(|| async {
                let model_dir = self.model_dir.clone();
                info!(model_dir = %model_dir.display(), "Loading embedding model");
                let model =
                    tokio::task::spawn_blocking(move || load_embedding_model(model_dir)).await??;
                Ok::<_, anyhow::Error>(Arc::new(Mutex::new(model)))
            })
            .await?;
        Ok(Arc::clone(model))
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let model = self.model().await?;
        let count = texts.len();

        // Off-load the ONNX inference to a blocking thread so we don't
        // obstruct Tokio's async scheduler.
        let embeddings = tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| anyhow!("embedding model lock poisoned"))?;
            let embeddings = model.embed(texts, None)?;
            Ok::<Vec<Vec<f32>>, anyhow::Error>(embeddings)
        })
        .await??;

        info!(texts = count, "Embedded texts");
        Ok(embeddings)
    }
}

/// Cosine similarity of two vectors; zero when either has no magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
