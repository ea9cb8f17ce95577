//! Model collaborators: embeddings (feature hashing, ONNX Runtime), the
//! language-model seam with its Claude and OpenAI clients, and review prompts.

mod hash;
pub use hash::{DEFAULT_HASH_DIM, HashEmbedder};

pub mod json;
pub use json::extract_json;

mod llm;
pub use llm::{LanguageModel, LlmError, ResponseSchema};

pub mod prompts;

#[cfg(feature = "onnx")]
mod embedder;
#[cfg(feature = "onnx")]
pub use embedder::Embedder;

#[cfg(feature = "http")]
mod claude;
#[cfg(feature = "http")]
pub use claude::{ClaudeClient, ClaudeConfig, DEFAULT_MODEL};

#[cfg(feature = "http")]
mod openai;
#[cfg(feature = "http")]
pub use openai::{
    DEFAULT_OPENAI_EMBEDDING_MODEL, DEFAULT_OPENAI_MODEL, OpenAiClient, OpenAiConfig, OpenAiEmbedder,
};
