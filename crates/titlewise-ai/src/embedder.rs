//! ONNX Runtime sentence embeddings (all-MiniLM-L6-v2 or compatible).
//!
//! The model directory must contain `model.onnx` and `tokenizer.json`.
//! Inference is blocking, so [`Embed::embed`] runs it on the blocking pool.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::info;

use titlewise_core::Embed;

/// Mean-pooled, L2-normalized sentence embeddings.
#[derive(Clone)]
pub struct Embedder {
    model: Arc<Mutex<Model>>,
    dim: usize,
}

struct Model {
    session: Session,
    tokenizer: Tokenizer,
    dim: usize,
}

impl Embedder {
    pub fn load(model_dir: &Path) -> anyhow::Result<Self> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        anyhow::ensure!(model_path.exists(), "model.onnx not found in {model_dir:?}");
        anyhow::ensure!(
            tokenizer_path.exists(),
            "tokenizer.json not found in {model_dir:?}"
        );

        let session = Session::builder()?.commit_from_file(&model_path)?;
        let dim = infer_dim(session.outputs()[0].dtype()).unwrap_or(384);

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("load tokenizer: {e}"))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: 256,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("set truncation: {e}"))?;
        tokenizer.with_padding(Some(tokenizers::PaddingParams::default()));

        info!(dim, model = %model_path.display(), "loaded embedding model");
        Ok(Self {
            model: Arc::new(Mutex::new(Model {
                session,
                tokenizer,
                dim,
            })),
            dim,
        })
    }

    pub fn embed_batch(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        let mut model = self
            .model
            .lock()
            .map_err(|_| anyhow::anyhow!("embedding model lock poisoned"))?;
        model.embed_batch(texts)
    }
}

impl Model {
    fn embed_batch(&mut self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("tokenize: {e}"))?;
        let inputs = PaddedInputs::new(&encodings);
        let shape = [inputs.rows as i64, inputs.width as i64];

        let outputs = self.session.run(ort::inputs![
            "input_ids" => Tensor::from_array((shape, inputs.ids.into_boxed_slice()))?,
            "attention_mask" => Tensor::from_array((shape, inputs.mask.clone().into_boxed_slice()))?,
            "token_type_ids" => Tensor::from_array((shape, inputs.type_ids.into_boxed_slice()))?,
        ])?;

        // [rows, tokens, dim]
        let (output_shape, hidden) = outputs[0].try_extract_tensor::<f32>()?;
        let dims: &[i64] = output_shape;
        anyhow::ensure!(
            dims.len() == 3 && dims[0] as usize == inputs.rows && dims[2] as usize == self.dim,
            "unexpected output shape {dims:?} for {} texts of dim {}",
            inputs.rows,
            self.dim
        );
        let tokens = dims[1] as usize;

        Ok((0..inputs.rows)
            .map(|row| {
                let mask = &inputs.mask[row * inputs.width..][..tokens.min(inputs.width)];
                let states = &hidden[row * tokens * self.dim..][..tokens * self.dim];
                mean_pool(states, mask, self.dim)
            })
            .collect())
    }
}

/// Tokenizer output flattened to row-major `[rows, width]` tensors.
struct PaddedInputs {
    rows: usize,
    width: usize,
    ids: Vec<i64>,
    mask: Vec<i64>,
    type_ids: Vec<i64>,
}

impl PaddedInputs {
    fn new(encodings: &[tokenizers::Encoding]) -> Self {
        let rows = encodings.len();
        let width = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);
        let mut inputs = Self {
            rows,
            width,
            ids: vec![0; rows * width],
            mask: vec![0; rows * width],
            type_ids: vec![0; rows * width],
        };
        for (row, encoding) in encodings.iter().enumerate() {
            let at = row * width;
            let fill = |dst: &mut [i64], src: &[u32]| {
                for (d, &s) in dst.iter_mut().zip(src) {
                    *d = i64::from(s);
                }
            };
            fill(&mut inputs.ids[at..at + width], encoding.get_ids());
            fill(&mut inputs.mask[at..at + width], encoding.get_attention_mask());
            fill(&mut inputs.type_ids[at..at + width], encoding.get_type_ids());
        }
        inputs
    }
}

/// Average the token states the attention mask keeps, then L2-normalize.
fn mean_pool(states: &[f32], mask: &[i64], dim: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; dim];
    let mut kept = 0usize;
    for (token, _) in mask.iter().enumerate().filter(|(_, m)| **m > 0) {
        for (p, s) in pooled.iter_mut().zip(&states[token * dim..(token + 1) * dim]) {
            *p += s;
        }
        kept += 1;
    }
    if kept > 0 {
        pooled.iter_mut().for_each(|p| *p /= kept as f32);
    }
    let norm = pooled.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        pooled.iter_mut().for_each(|p| *p /= norm);
    }
    pooled
}

#[async_trait]
impl Embed for Embedder {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let this = self.clone();
        let text = text.to_string();
        let mut vectors =
            tokio::task::spawn_blocking(move || this.embed_batch(&[text.as_str()])).await??;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("model returned no embedding"))
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

/// Last dimension of the model's first output, when static.
fn infer_dim(output_type: &ort::value::ValueType) -> Option<usize> {
    match output_type {
        ort::value::ValueType::Tensor { shape, .. } => shape
            .last()
            .and_then(|&d| if d > 0 { Some(d as usize) } else { None }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn model_dir() -> Option<PathBuf> {
        let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("models")
            .join("all-MiniLM-L6-v2");
        if dir.join("model.onnx").exists() {
            Some(dir)
        } else {
            eprintln!("skipping: model not found at {}", dir.display());
            None
        }
    }

    #[tokio::test]
    async fn embeds_unit_vectors() {
        let Some(dir) = model_dir() else { return };
        let embedder = Embedder::load(&dir).unwrap();
        let v = embedder.embed("Sale deed registered at SRO Kapra").await.unwrap();
        assert_eq!(v.len(), embedder.dim());
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "expected unit norm, got {norm}");
    }

    #[test]
    fn similar_texts_closer() {
        let Some(dir) = model_dir() else { return };
        let embedder = Embedder::load(&dir).unwrap();
        let vecs = embedder
            .embed_batch(&[
                "boundary mismatch between deed and report",
                "the east boundary in the deed differs from the report",
                "property tax receipt for 2023",
            ])
            .unwrap();
        let sim = |a: &[f32], b: &[f32]| -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() };
        assert!(sim(&vecs[0], &vecs[1]) > sim(&vecs[0], &vecs[2]));
    }

    #[test]
    fn mean_pool_skips_padding() {
        // Two tokens of dim 2; the second is padding.
        let pooled = mean_pool(&[3.0, 4.0, 100.0, 100.0], &[1, 0], 2);
        assert!((pooled[0] - 0.6).abs() < 1e-6);
        assert!((pooled[1] - 0.8).abs() < 1e-6);
        assert_eq!(mean_pool(&[0.0, 0.0], &[0], 2), vec![0.0, 0.0]);
    }

    #[test]
    fn empty_batch() {
        let Some(dir) = model_dir() else { return };
        let embedder = Embedder::load(&dir).unwrap();
        assert!(embedder.embed_batch(&[]).unwrap().is_empty());
    }
}
