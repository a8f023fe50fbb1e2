//! Embedding generators for movie extracts and query text.
//!
//! Both the backfill worker (stored extracts) and the search engine
//! (similarity text) embed through the same service, so stored vectors and
//! query vectors share one space and one dimension.
//!
//! - `OnnxEmbeddingService` runs a sentence-transformer exported to ONNX
//!   (all-MiniLM-L6-v2 and similar). Long extracts are truncated to the
//!   model's sequence limit; backfill batches run as one padded inference.
//! - `HashEmbedding` produces deterministic unit vectors without a model.

use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use marquee_core::error::MarqueeError;
use marquee_core::schema::VectorSpec;
use ort::session::Session;
use ort::value::TensorRef;
use tokenizers::{PaddingParams, Tokenizer, TruncationParams};
use tracing::{debug, info};

type BoxedEmbedding<'a, T> = Pin<Box<dyn Future<Output = Result<T, MarqueeError>> + Send + 'a>>;

/// Service for generating text embeddings.
pub trait EmbeddingService: Send + Sync {
    /// Embed one text.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, MarqueeError>> + Send;

    /// Embed several texts, returning one vector per input in input order.
    ///
    /// Fails as a whole if any text cannot be embedded.
    fn embed_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, MarqueeError>> + Send {
        async move {
            let mut vectors = Vec::with_capacity(texts.len());
            for text in texts {
                vectors.push(self.embed(text).await?);
            }
            Ok(vectors)
        }
    }

    /// Dimensionality of the produced vectors.
    fn dimensions(&self) -> usize;
}

/// Object-safe form of [`EmbeddingService`].
///
/// The search engine and the backfill worker share one
/// `Arc<dyn DynEmbeddingService>`; every `EmbeddingService` gets this
/// through the blanket impl below.
pub trait DynEmbeddingService: Send + Sync {
    fn embed_boxed<'a>(&'a self, text: &'a str) -> BoxedEmbedding<'a, Vec<f32>>;

    fn embed_batch_boxed<'a>(&'a self, texts: &'a [String]) -> BoxedEmbedding<'a, Vec<Vec<f32>>>;

    fn dimensions(&self) -> usize;
}

impl<T: EmbeddingService> DynEmbeddingService for T {
    fn embed_boxed<'a>(&'a self, text: &'a str) -> BoxedEmbedding<'a, Vec<f32>> {
        Box::pin(self.embed(text))
    }

    fn embed_batch_boxed<'a>(&'a self, texts: &'a [String]) -> BoxedEmbedding<'a, Vec<Vec<f32>>> {
        Box::pin(self.embed_batch(texts))
    }

    fn dimensions(&self) -> usize {
        EmbeddingService::dimensions(self)
    }
}

fn unavailable(context: &str) -> impl Fn(String) -> MarqueeError + '_ {
    move |reason| MarqueeError::EmbeddingUnavailable(format!("{}: {}", context, reason))
}

fn reject_blank<S: AsRef<str>>(texts: &[S]) -> Result<(), MarqueeError> {
    if texts.iter().any(|t| t.as_ref().trim().is_empty()) {
        return Err(MarqueeError::EmbeddingUnavailable(
            "Cannot embed empty text".to_string(),
        ));
    }
    Ok(())
}

/// Scale `vector` to unit length. Zero vectors are left as they are.
fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for val in vector.iter_mut() {
            *val /= norm;
        }
    }
}

/// Masked mean over the token axis of a `[batch, seq_len, hidden]` tensor.
///
/// `mask` is the `[batch, seq_len]` attention mask; padding tokens do not
/// contribute. Each pooled row is L2-normalised.
fn mean_pool(tokens: &[f32], mask: &[i64], seq_len: usize, hidden: usize) -> Vec<Vec<f32>> {
    mask.chunks(seq_len)
        .enumerate()
        .map(|(row, row_mask)| {
            let mut pooled = vec![0.0f32; hidden];
            let mut count = 0.0f32;
            for (tok, _) in row_mask.iter().enumerate().filter(|(_, m)| **m > 0) {
                let offset = (row * seq_len + tok) * hidden;
                for (acc, value) in pooled.iter_mut().zip(&tokens[offset..offset + hidden]) {
                    *acc += value;
                }
                count += 1.0;
            }
            if count > 0.0 {
                pooled.iter_mut().for_each(|v| *v /= count);
            }
            l2_normalize(&mut pooled);
            pooled
        })
        .collect()
}

// ---------------------------------------------------------------------------
// OnnxEmbeddingService
// ---------------------------------------------------------------------------

/// Tokenizer and session shared with blocking inference tasks.
struct OnnxModel {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    dimensions: usize,
    token_types: bool,
}

/// Sentence-transformer embeddings through ONNX Runtime.
///
/// The model directory holds `model.onnx` and `tokenizer.json`. The model
/// takes `input_ids`, `attention_mask` and, when it declares a third input,
/// `token_type_ids`, and returns token embeddings that are mean-pooled.
#[derive(Clone)]
pub struct OnnxEmbeddingService {
    model: Arc<OnnxModel>,
    max_sequence_length: usize,
}

impl std::fmt::Debug for OnnxEmbeddingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbeddingService")
            .field("dimensions", &self.model.dimensions)
            .field("max_sequence_length", &self.max_sequence_length)
            .finish()
    }
}

impl OnnxEmbeddingService {
    /// Load the model for the catalog's vector field.
    ///
    /// Fails with `Config` when the model's hidden size does not match the
    /// field's dimension, since the store would reject every vector.
    pub fn load(
        model_dir: &Path,
        field: &VectorSpec,
        max_sequence_length: usize,
    ) -> Result<Self, MarqueeError> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");
        for path in [&model_path, &tokenizer_path] {
            if !path.exists() {
                return Err(MarqueeError::EmbeddingUnavailable(format!(
                    "Missing model file {}",
                    path.display()
                )));
            }
        }
        if max_sequence_length == 0 {
            return Err(MarqueeError::Config(
                "embedding.max_sequence_length must be at least 1".to_string(),
            ));
        }

        let session = Session::builder()
            .map_err(|e| unavailable("ONNX session builder")(e.to_string()))?
            .with_intra_threads(1)
            .map_err(|e| unavailable("ONNX set threads")(e.to_string()))?
            .commit_from_file(&model_path)
            .map_err(|e| unavailable("ONNX load model")(e.to_string()))?;

        // Output is [batch, seq_len, hidden]; a dynamic hidden axis is
        // checked on the first inference instead.
        let declared = session
            .outputs()
            .first()
            .and_then(|out| out.dtype().tensor_shape())
            .and_then(|shape| shape.last().copied())
            .filter(|&d| d > 0)
            .map(|d| d as usize);
        if let Some(declared) = declared {
            if declared != field.dimension {
                return Err(MarqueeError::Config(format!(
                    "Model produces {}-dimensional vectors but the catalog stores {}",
                    declared, field.dimension
                )));
            }
        }
        let token_types = session.inputs().len() > 2;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| unavailable("Failed to load tokenizer")(e.to_string()))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: max_sequence_length,
                ..Default::default()
            }))
            .map_err(|e| unavailable("Failed to configure truncation")(e.to_string()))?;
        tokenizer.with_padding(Some(PaddingParams::default()));

        info!(
            model = %model_path.display(),
            dimensions = field.dimension,
            max_sequence_length,
            token_types,
            "Loaded ONNX embedding model"
        );

        Ok(Self {
            model: Arc::new(OnnxModel {
                session: Mutex::new(session),
                tokenizer,
                dimensions: field.dimension,
                token_types,
            }),
            max_sequence_length,
        })
    }

    async fn run_blocking(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, MarqueeError> {
        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || model.infer(&texts))
            .await
            .map_err(|e| unavailable("Embedding task panicked")(e.to_string()))?
    }
}

impl OnnxModel {
    /// Tokenize `texts` into one padded batch, run it, and pool each row.
    fn infer(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MarqueeError> {
        reject_blank(texts)?;
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let encodings = self
            .tokenizer
            .encode_batch(inputs, true)
            .map_err(|e| unavailable("Tokenization failed")(e.to_string()))?;

        let batch = encodings.len();
        let seq_len = encodings.first().map(|e| e.len()).unwrap_or(0);
        if seq_len == 0 || encodings.iter().any(|e| e.len() != seq_len) {
            return Err(MarqueeError::EmbeddingUnavailable(
                "Tokenizer produced an unpadded batch".to_string(),
            ));
        }

        let mut ids = Vec::with_capacity(batch * seq_len);
        let mut mask = Vec::with_capacity(batch * seq_len);
        let mut types = Vec::with_capacity(batch * seq_len);
        for encoding in &encodings {
            ids.extend(encoding.get_ids().iter().map(|&v| v as i64));
            mask.extend(encoding.get_attention_mask().iter().map(|&v| v as i64));
            types.extend(encoding.get_type_ids().iter().map(|&v| v as i64));
        }

        let shaped = |name: &str, values: Vec<i64>| {
            ndarray::Array2::from_shape_vec((batch, seq_len), values)
                .map_err(|e| unavailable(name)(e.to_string()))
        };
        let ids = shaped("input_ids", ids)?;
        let attention = shaped("attention_mask", mask.clone())?;
        let types = shaped("token_type_ids", types)?;

        fn tensor<'a>(
            array: &'a ndarray::Array2<i64>,
        ) -> Result<TensorRef<'a, i64>, MarqueeError> {
            TensorRef::from_array_view(array).map_err(|e| unavailable("Input tensor")(e.to_string()))
        }
        let (ids, attention, types) = (tensor(&ids)?, tensor(&attention)?, tensor(&types)?);

        let mut session = self
            .session
            .lock()
            .map_err(|e| unavailable("Session lock poisoned")(e.to_string()))?;
        let outputs = if self.token_types {
            session.run(ort::inputs![ids, attention, types])
        } else {
            session.run(ort::inputs![ids, attention])
        }
        .map_err(|e| unavailable("ONNX inference failed")(e.to_string()))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| unavailable("Extract embeddings")(e.to_string()))?;
        let dims: Vec<i64> = shape.iter().copied().collect();
        if dims != [batch as i64, seq_len as i64, self.dimensions as i64] {
            return Err(MarqueeError::EmbeddingUnavailable(format!(
                "Unexpected output shape {:?}, expected [{}, {}, {}]",
                dims, batch, seq_len, self.dimensions
            )));
        }

        debug!(batch, seq_len, "Embedded batch");
        Ok(mean_pool(data, &mask, seq_len, self.dimensions))
    }
}

impl EmbeddingService for OnnxEmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MarqueeError> {
        self.run_blocking(vec![text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| MarqueeError::EmbeddingUnavailable("Model returned no vector".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MarqueeError> {
        self.run_blocking(texts.to_vec()).await
    }

    fn dimensions(&self) -> usize {
        self.model.dimensions
    }
}

// ---------------------------------------------------------------------------
// HashEmbedding
// ---------------------------------------------------------------------------

/// Deterministic unit vectors derived from a hash of the text.
///
/// Identical texts map to identical vectors, so an extract searched for
/// verbatim comes back at distance zero. Unrelated texts are scattered
/// arbitrarily.
#[derive(Debug, Clone)]
pub struct HashEmbedding {
    dimensions: usize,
}

impl HashEmbedding {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn hash_to_vector(&self, text: &str) -> Vec<f32> {
        let mut vector: Vec<f32> = (0..self.dimensions)
            .map(|i| {
                let mut hasher = DefaultHasher::new();
                text.hash(&mut hasher);
                i.hash(&mut hasher);
                ((hasher.finish() as f64 / u64::MAX as f64) * 2.0 - 1.0) as f32
            })
            .collect();
        l2_normalize(&mut vector);
        vector
    }
}

impl Default for HashEmbedding {
    fn default() -> Self {
        Self::new(384)
    }
}

impl EmbeddingService for HashEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MarqueeError> {
        reject_blank(&[text])?;
        Ok(self.hash_to_vector(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MarqueeError> {
        reject_blank(texts)?;
        Ok(texts.iter().map(|t| self.hash_to_vector(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
