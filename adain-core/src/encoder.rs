//! Pretrained VGG19 feature extractor backed by `tract-onnx`.
//!
//! The ONNX graph is parsed once; runnable plans are specialised per input shape on first
//! use and cached.

use std::{
    collections::HashMap,
    fmt::Write,
    path::Path,
    sync::{Arc, Mutex},
};

use adain_utils::{TensorLayout, config::EncoderSettings, timing_guard};
use anyhow::{Context, Result, anyhow};
use log::{debug, warn};
use ndarray::Array4;
use tract_onnx::{
    pb,
    prelude::{
        Datum, Framework, Graph, InferenceModel, InferenceModelExt, IntoTensor, SimplePlan, Tensor,
        TypedFact, TypedOp, tvec,
    },
};

type RunnableModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Graph input shape in the graph's own layout.
type PlanKey = [usize; 4];

/// Something that maps an NCHW image batch to a list of NCHW feature maps.
pub trait FeatureExtractor: Send + Sync + std::fmt::Debug {
    /// One feature map per layer, in the order of [`layer_names`](Self::layer_names).
    fn extract(&self, input: &Array4<f32>) -> Result<Vec<Array4<f32>>>;

    fn layer_names(&self) -> &[String];
}

/// Which activations to expose and how the graph lays out its tensors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderConfig {
    /// Layer tokens, shallowest first.
    pub layers: Vec<String>,
    pub layout: TensorLayout,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        EncoderSettings::default().into()
    }
}

impl From<EncoderSettings> for EncoderConfig {
    fn from(settings: EncoderSettings) -> Self {
        Self {
            layers: settings.layers,
            layout: settings.layout,
        }
    }
}

impl From<&EncoderSettings> for EncoderConfig {
    fn from(settings: &EncoderSettings) -> Self {
        settings.clone().into()
    }
}

/// VGG19 encoder exposing intermediate activations.
#[derive(Debug)]
pub struct VggEncoder {
    model: InferenceModel,
    /// Graph node feeding each requested layer.
    output_nodes: Vec<String>,
    layers: Vec<String>,
    layout: TensorLayout,
    label: String,
    plans: Mutex<HashMap<PlanKey, Arc<RunnableModel>>>,
}

impl VggEncoder {
    /// Parse the encoder graph at `model_path`.
    pub fn load<P: AsRef<Path>>(model_path: P, config: EncoderConfig) -> Result<Self> {
        let path = model_path.as_ref();
        anyhow::ensure!(!config.layers.is_empty(), "no encoder layers configured");
        anyhow::ensure!(path.exists(), "model file not found: {}", path.display());

        let model = tract_onnx::onnx()
            .model_for_path(path)
            .with_context(|| format!("failed to parse ONNX graph from {}", path.display()))?;
        Self::from_inference_model(model, config, path.display().to_string())
    }

    /// Build an encoder from an in-memory ONNX model.
    pub fn from_proto_model(proto: &pb::ModelProto, config: EncoderConfig) -> Result<Self> {
        anyhow::ensure!(!config.layers.is_empty(), "no encoder layers configured");
        let model = tract_onnx::onnx()
            .model_for_proto_model(proto)
            .context("failed to parse ONNX graph from in-memory model")?;
        let label = proto
            .graph
            .as_ref()
            .map(|graph| graph.name.clone())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "<in-memory>".to_string());
        Self::from_inference_model(model, config, label)
    }

    fn from_inference_model(model: InferenceModel, config: EncoderConfig, label: String) -> Result<Self> {
        let output_nodes = config
            .layers
            .iter()
            .map(|layer| resolve_layer(&model, layer))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("while resolving encoder layers in {label}"))?;

        for (layer, node) in config.layers.iter().zip(&output_nodes) {
            debug!("Encoder layer '{layer}' reads node '{node}'");
        }

        Ok(Self {
            model,
            output_nodes,
            layers: config.layers,
            layout: config.layout,
            label,
            plans: Mutex::new(HashMap::new()),
        })
    }

    pub fn layout(&self) -> TensorLayout {
        self.layout
    }

    /// Graph nodes backing each configured layer.
    pub fn output_nodes(&self) -> &[String] {
        &self.output_nodes
    }

    /// Number of input shapes with a ready plan.
    pub fn cached_plans(&self) -> usize {
        self.plans.lock().map(|plans| plans.len()).unwrap_or(0)
    }

    fn plan(&self, key: PlanKey) -> Result<Arc<RunnableModel>> {
        let mut plans = self
            .plans
            .lock()
            .map_err(|_| anyhow!("encoder plan cache lock poisoned"))?;
        if let Some(plan) = plans.get(&key) {
            return Ok(Arc::clone(plan));
        }

        let _guard = timing_guard("adain_core::encoder_plan", log::Level::Debug);
        let plan = Arc::new(self.build_plan(key)?);
        plans.insert(key, Arc::clone(&plan));
        Ok(plan)
    }

    fn build_plan(&self, key: PlanKey) -> Result<RunnableModel> {
        match self.runnable_for(key, true) {
            Ok(plan) => {
                debug!("Encoder {} optimized for input {:?}", self.label, key);
                Ok(plan)
            }
            Err(opt_err) => {
                let optimize_msg = format!("{opt_err}");
                let mut chain_msg = String::new();
                for cause in opt_err.chain() {
                    let _ = writeln!(&mut chain_msg, "  - {cause}");
                }
                warn!(
                    "Encoder {} failed optimized load for input {:?} ({}); falling back to decluttered graph.\nError chain:\n{}",
                    self.label,
                    key,
                    optimize_msg,
                    chain_msg.trim_end()
                );
                let plan = self.runnable_for(key, false).with_context(|| {
                    format!("fallback to decluttered encoder graph failed after optimize error: {optimize_msg}")
                })?;
                debug!("Encoder {} running in decluttered mode for input {:?}", self.label, key);
                Ok(plan)
            }
        }
    }

    fn runnable_for(&self, key: PlanKey, optimized: bool) -> Result<RunnableModel> {
        let mut model = self
            .model
            .clone()
            .with_input_fact(0, TypedFact::dt_shape(f32::datum_type(), key).into())
            .map_err(|e| anyhow!("unable to set encoder input shape {key:?}: {e}"))?;
        model
            .set_output_names(&self.output_nodes)
            .map_err(|e| anyhow!("unable to select encoder outputs: {e}"))?;

        if optimized {
            model
                .into_optimized()
                .map_err(|e| anyhow!("unable to optimize encoder graph: {e}"))?
                .into_runnable()
                .map_err(|e| anyhow!("unable to make encoder graph runnable: {e}"))
        } else {
            model
                .into_typed()
                .map_err(|e| anyhow!("unable to type-check encoder graph: {e}"))?
                .into_decluttered()
                .map_err(|e| anyhow!("unable to declutter encoder graph: {e}"))?
                .into_runnable()
                .map_err(|e| anyhow!("unable to make encoder graph runnable: {e}"))
        }
    }

    fn to_graph_tensor(&self, input: &Array4<f32>) -> Result<(PlanKey, Tensor)> {
        let (n, c, h, w) = input.dim();
        let (key, data): (PlanKey, Vec<f32>) = match self.layout {
            TensorLayout::Nchw => ([n, c, h, w], input.iter().copied().collect()),
            TensorLayout::Nhwc => (
                [n, h, w, c],
                input.view().permuted_axes([0, 2, 3, 1]).iter().copied().collect(),
            ),
        };
        let tensor = Tensor::from_shape(&key, &data)
            .map_err(|e| anyhow!("failed to build encoder input tensor: {e}"))?;
        Ok((key, tensor))
    }

    fn from_graph_tensor(&self, layer: &str, tensor: &Tensor) -> Result<Array4<f32>> {
        let &[a, b, c, d] = tensor.shape() else {
            anyhow::bail!(
                "encoder layer '{layer}' produced shape {:?}, expected rank 4",
                tensor.shape()
            );
        };
        let data = tensor
            .as_slice::<f32>()
            .map_err(|e| anyhow!("encoder layer '{layer}' output not f32: {e}"))?
            .to_vec();
        let array = Array4::from_shape_vec((a, b, c, d), data)
            .with_context(|| format!("encoder layer '{layer}' output has inconsistent shape"))?;
        Ok(match self.layout {
            TensorLayout::Nchw => array,
            TensorLayout::Nhwc => array
                .permuted_axes([0, 3, 1, 2])
                .as_standard_layout()
                .into_owned(),
        })
    }
}

impl FeatureExtractor for VggEncoder {
    fn extract(&self, input: &Array4<f32>) -> Result<Vec<Array4<f32>>> {
        let _guard = timing_guard("adain_core::encoder_extract", log::Level::Debug);
        let (n, c, h, w) = input.dim();
        anyhow::ensure!(c == 3, "encoder expects 3 input channels, got {c}");
        anyhow::ensure!(
            n > 0 && h > 0 && w > 0,
            "encoder input has an empty dimension ({n}x{c}x{h}x{w})"
        );

        let (key, tensor) = self.to_graph_tensor(input)?;
        let plan = self.plan(key)?;
        let outputs = plan
            .run(tvec![tensor.into()])
            .map_err(|e| anyhow!("encoder execution failed: {e}"))?;

        anyhow::ensure!(
            outputs.len() == self.layers.len(),
            "encoder produced {} outputs for {} layers",
            outputs.len(),
            self.layers.len()
        );
        outputs
            .into_iter()
            .zip(&self.layers)
            .map(|(value, layer)| self.from_graph_tensor(layer, &value.into_tensor()))
            .collect()
    }

    fn layer_names(&self) -> &[String] {
        &self.layers
    }
}

/// Exact node name first, then the last node whose name contains `layer`.
fn resolve_layer(model: &InferenceModel, layer: &str) -> Result<String> {
    let nodes = model.nodes();
    if nodes.iter().any(|node| node.name == layer) {
        return Ok(layer.to_string());
    }
    nodes
        .iter()
        .rev()
        .find(|node| node.name.contains(layer))
        .map(|node| node.name.clone())
        .with_context(|| format!("encoder layer '{layer}' not found in graph"))
}
