// Embedding generation for the similarity index

pub mod ollama;

pub use ollama::{ModelInfo, OllamaClient};

/// Turns texts into fixed-dimension vectors, one per input, in input order.
///
/// Implementations block; async callers run them under `spawn_blocking`.
pub trait Embedder: Send + Sync {
    fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}
