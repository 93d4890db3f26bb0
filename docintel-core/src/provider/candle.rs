//! Local model backends on `candle`.
//!
//! Every backend loads from a model directory holding `config.json`,
//! `tokenizer.json` and one or more `*.safetensors` files, and runs on the CPU.

use super::hf_tokenizer::HfTokenizer;
use super::types::*;
use async_trait::async_trait;
use candle_core::{DType, Device, IndexOp, Module, Tensor};
use candle_nn::{Linear, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use candle_transformers::models::qwen2;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::info;

impl From<candle_core::Error> for ProviderError {
    fn from(e: candle_core::Error) -> Self {
        ProviderError::Model(e.to_string())
    }
}

/// The parts of a Hugging Face `config.json` read directly.
#[derive(Debug, Deserialize)]
struct ModelLimits {
    max_position_embeddings: usize,
    #[serde(default)]
    hidden_size: usize,
    #[serde(default)]
    id2label: HashMap<String, String>,
}

fn read_config<T: for<'de> Deserialize<'de>>(dir: &Path) -> Result<T> {
    let path = dir.join("config.json");
    let contents = fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Safetensors files of a model directory, sorted so shards load in order.
fn weight_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "safetensors"))
        .collect();
    if files.is_empty() {
        return Err(ProviderError::Model(format!(
            "No .safetensors weights in {}",
            dir.display()
        )));
    }
    files.sort();
    Ok(files)
}

fn var_builder(dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let files = weight_files(dir)?;
    // Safety: the weight files are not modified while the model is loaded.
    let vb = unsafe { VarBuilder::from_mmaped_safetensors(&files, DType::F32, device)? };
    Ok(vb)
}

/// BERT encoder with its tokenizer.
struct BertEncoder {
    model: BertModel,
    tokenizer: HfTokenizer,
    device: Device,
    max_len: usize,
}

impl BertEncoder {
    fn load(dir: &Path, vb: VarBuilder) -> Result<(Self, ModelLimits)> {
        let config: BertConfig = read_config(dir)?;
        let limits: ModelLimits = read_config(dir)?;
        let tokenizer = HfTokenizer::from_dir(dir)?;
        let device = vb.device().clone();
        let model = BertModel::load(vb, &config)?;

        let encoder = Self {
            model,
            tokenizer,
            device,
            max_len: limits.max_position_embeddings,
        };
        Ok((encoder, limits))
    }

    /// Last hidden state, shape `(1, seq_len, hidden)`.
    fn hidden_states(&self, text: &str) -> Result<Tensor> {
        let encoding = self
            .tokenizer
            .inner()
            .encode(text, true)
            .map_err(|e| ProviderError::Tokenizer(e.to_string()))?;

        let ids = encoding.get_ids();
        let ids = &ids[..ids.len().min(self.max_len)];

        let input_ids = Tensor::new(ids, &self.device)?.unsqueeze(0)?;
        let token_type_ids = input_ids.zeros_like()?;
        let attention_mask = input_ids.ones_like()?;
        Ok(self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?)
    }
}

/// Sentence embeddings from a BERT encoder (e.g. all-MiniLM-L6-v2): mean
/// pooling over tokens, then L2 normalisation.
pub struct BertEmbedder {
    encoder: Arc<BertEncoder>,
    name: String,
}

impl BertEmbedder {
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        info!("Loading embedding model from {}", dir.display());

        let vb = var_builder(dir, &Device::Cpu)?;
        let (encoder, _) = BertEncoder::load(dir, vb)?;
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "bert".to_string());

        Ok(Self {
            encoder: Arc::new(encoder),
            name,
        })
    }

    fn embed_blocking(encoder: &BertEncoder, text: &str) -> Result<Vec<f32>> {
        let hidden = encoder.hidden_states(text)?;
        let pooled = hidden.mean(1)?;
        let norm = pooled.sqr()?.sum_keepdim(1)?.sqrt()?.clamp(1e-12, f64::INFINITY)?;
        Ok(pooled.broadcast_div(&norm)?.squeeze(0)?.to_vec1::<f32>()?)
    }
}

#[async_trait]
impl EmbeddingProvider for BertEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let encoder = self.encoder.clone();
        let text = text.to_string();
        tokio::task::spawn_blocking(move || Self::embed_blocking(&encoder, &text))
            .await
            .map_err(|e| ProviderError::Model(format!("Embedding task failed: {}", e)))?
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

/// `BertForSequenceClassification`: encoder, pooler, linear head, softmax.
pub struct BertClassifier {
    encoder: BertEncoder,
    pooler: Linear,
    classifier: Linear,
    num_labels: usize,
}

impl BertClassifier {
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        info!("Loading classification model from {}", dir.display());

        let vb = var_builder(dir, &Device::Cpu)?;
        let (encoder, limits) = BertEncoder::load(dir, vb.clone())?;

        let num_labels = limits.id2label.len();
        if num_labels == 0 || limits.hidden_size == 0 {
            return Err(ProviderError::Model(format!(
                "{} lacks hidden_size or id2label",
                dir.join("config.json").display()
            )));
        }

        let hidden = limits.hidden_size;
        let pooler = candle_nn::linear(hidden, hidden, vb.pp("bert.pooler.dense"))?;
        let classifier = candle_nn::linear(hidden, num_labels, vb.pp("classifier"))?;

        Ok(Self {
            encoder,
            pooler,
            classifier,
            num_labels,
        })
    }
}

impl ClassificationModel for BertClassifier {
    fn forward(&self, text: &str) -> Result<LabelScore> {
        let hidden = self.encoder.hidden_states(text)?;
        let cls = hidden.i((.., 0))?;
        let pooled = self.pooler.forward(&cls)?.tanh()?;
        let logits = self.classifier.forward(&pooled)?;
        let probabilities = candle_nn::ops::softmax(&logits, 1)?
            .squeeze(0)?
            .to_vec1::<f32>()?;

        probabilities
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1).then(b.0.cmp(&a.0)))
            .map(|(label_id, &score)| LabelScore { label_id, score })
            .ok_or_else(|| ProviderError::Model("Classifier produced no labels".to_string()))
    }

    fn num_labels(&self) -> Option<usize> {
        Some(self.num_labels)
    }
}

struct GeneratorState {
    model: qwen2::ModelForCausalLM,
    /// Tokens whose keys and values are in the model's cache.
    cached: Vec<u32>,
}

/// Qwen2 causal language model.
///
/// Consecutive calls that extend the previous context reuse the key/value
/// cache; any other context starts from an empty cache.
pub struct Qwen2Generator {
    state: Mutex<GeneratorState>,
    device: Device,
    max_context_tokens: usize,
}

impl Qwen2Generator {
    /// Loads the model; `max_context_tokens` is capped at the model's own window.
    pub fn load(dir: impl AsRef<Path>, max_context_tokens: usize) -> Result<Self> {
        let dir = dir.as_ref();
        info!("Loading generator from {}", dir.display());

        let config: qwen2::Config = read_config(dir)?;
        let limits: ModelLimits = read_config(dir)?;
        let device = Device::Cpu;
        let vb = var_builder(dir, &device)?;
        let model = qwen2::ModelForCausalLM::new(&config, vb)?;

        Ok(Self {
            state: Mutex::new(GeneratorState {
                model,
                cached: Vec::new(),
            }),
            device,
            max_context_tokens: max_context_tokens.min(limits.max_position_embeddings),
        })
    }
}

impl LanguageModel for Qwen2Generator {
    fn next_token_logits(&self, context: &[u32]) -> Result<Vec<f32>> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ProviderError::Model("Generator state poisoned".to_string()))?;

        let reuse = !state.cached.is_empty()
            && context.len() > state.cached.len()
            && context.starts_with(&state.cached);
        let offset = if reuse {
            state.cached.len()
        } else {
            state.model.clear_kv_cache();
            0
        };
        state.cached.clear();

        let input = Tensor::new(&context[offset..], &self.device)?.unsqueeze(0)?;
        let logits = state
            .model
            .forward(&input, offset)?
            .squeeze(0)?
            .squeeze(0)?
            .to_dtype(DType::F32)?
            .to_vec1::<f32>()?;

        state.cached = context.to_vec();
        Ok(logits)
    }

    fn max_context_tokens(&self) -> usize {
        self.max_context_tokens
    }
}
