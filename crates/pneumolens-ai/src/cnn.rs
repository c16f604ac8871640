//! Native convolutional classifier, inference behaviour only.
//!
//! Five blocks of `conv3x3 → ReLU → [dropout] → batch norm → maxpool 2x2`
//! followed by `flatten → linear → ReLU → dropout → linear(1)`. Dropout is the
//! identity at inference and batch norm uses its running statistics, so the
//! forward pass is a pure function of the frozen parameters.
//!
//! Parameter names follow the state-dict of the equivalent sequential network
//! (`conv_layers.N.*`, `fc_layers.N.*`), where `N` counts every layer,
//! including the parameterless ones. Layers are candle modules built from a
//! `VarBuilder`; `ndarray` stays at the boundary.

use candle_core::{Device, Tensor};
use candle_nn::{BatchNorm, Conv2d, Conv2dConfig, Linear, Module, ModuleT, VarBuilder};
use ndarray::{Array2, ArrayView4};

use crate::error::PipelineError;
use crate::weights::ParameterFile;

const KERNEL: usize = 3;
const BN_EPS: f64 = 1e-5;

/// Architecture description. The flattened width is derived, never declared.
#[derive(Debug, Clone, PartialEq)]
pub struct CnnSpec {
    /// Square input resolution.
    pub input_size: usize,
    /// Channel widths, input first: one block per adjacent pair.
    pub channels: Vec<usize>,
    /// Dropout probability after each block's activation, if any.
    pub block_dropout: Vec<Option<f32>>,
    /// Width of the hidden fully connected layer.
    pub hidden: usize,
}

impl Default for CnnSpec {
    fn default() -> Self {
        Self {
            input_size: 64,
            channels: vec![1, 32, 64, 64, 128, 256],
            block_dropout: vec![None, Some(0.2), None, Some(0.4), Some(0.4)],
            hidden: 128,
        }
    }
}

impl CnnSpec {
    pub fn blocks(&self) -> usize {
        self.channels.len().saturating_sub(1)
    }

    pub fn in_channels(&self) -> usize {
        self.channels.first().copied().unwrap_or(0)
    }

    /// Spatial size after every block has halved the resolution.
    pub fn final_spatial(&self) -> usize {
        self.input_size >> self.blocks()
    }

    /// Input width of the first fully connected layer.
    pub fn flat_features(&self) -> usize {
        let last = self.channels.last().copied().unwrap_or(0);
        last * self.final_spatial() * self.final_spatial()
    }

    /// Expected input tensor shape `[1, C, H, W]`.
    pub fn input_shape(&self) -> [usize; 4] {
        [1, self.in_channels(), self.input_size, self.input_size]
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let blocks = self.blocks();
        if blocks == 0 {
            return Err(PipelineError::ShapeMismatch(
                "architecture needs at least one convolution block".into(),
            ));
        }
        if self.block_dropout.len() != blocks {
            return Err(PipelineError::ShapeMismatch(format!(
                "{} dropout entries for {blocks} blocks",
                self.block_dropout.len()
            )));
        }
        let factor = 1usize << blocks;
        if self.input_size == 0 || self.input_size % factor != 0 {
            return Err(PipelineError::ShapeMismatch(format!(
                "input size {} is not divisible by 2^{blocks}",
                self.input_size
            )));
        }
        if self.channels.contains(&0) || self.hidden == 0 {
            return Err(PipelineError::ShapeMismatch(
                "layer widths must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Sequential indices of the convolution and batch norm of each block.
    fn block_layer_indices(&self) -> Vec<(usize, usize)> {
        let mut next = 0;
        self.block_dropout
            .iter()
            .map(|dropout| {
                let conv = next;
                // conv, relu, [dropout], bn, pool
                let bn = conv + 2 + usize::from(dropout.is_some());
                next = bn + 2;
                (conv, bn)
            })
            .collect()
    }

    /// Every parameter the network needs, with its shape, in state-dict naming.
    pub fn parameter_shapes(&self) -> Vec<(String, Vec<usize>)> {
        let mut params = Vec::new();
        for (block, (conv, bn)) in self.block_layer_indices().into_iter().enumerate() {
            let (cin, cout) = (self.channels[block], self.channels[block + 1]);
            params.push((
                format!("conv_layers.{conv}.weight"),
                vec![cout, cin, KERNEL, KERNEL],
            ));
            params.push((format!("conv_layers.{conv}.bias"), vec![cout]));
            for field in ["weight", "bias", "running_mean", "running_var"] {
                params.push((format!("conv_layers.{bn}.{field}"), vec![cout]));
            }
        }
        params.push((
            "fc_layers.1.weight".into(),
            vec![self.hidden, self.flat_features()],
        ));
        params.push(("fc_layers.1.bias".into(), vec![self.hidden]));
        params.push(("fc_layers.4.weight".into(), vec![1, self.hidden]));
        params.push(("fc_layers.4.bias".into(), vec![1]));
        params
    }
}

/// Anything that maps a `[N, C, H, W]` batch to `[N, outputs]` logits.
pub trait Forward: Send + Sync {
    fn forward(&self, input: ArrayView4<'_, f32>) -> Result<Array2<f32>, PipelineError>;

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;
}

fn inference(e: candle_core::Error) -> PipelineError {
    PipelineError::Inference(e.to_string())
}

struct Block {
    conv: Conv2d,
    bn: BatchNorm,
}

impl Block {
    /// `conv → ReLU → batch norm (running stats) → maxpool 2x2`.
    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let x = self.conv.forward(x)?.relu()?;
        self.bn.forward_t(&x, false)?.max_pool2d(2)
    }
}

/// The pneumonia classifier network with frozen weights.
pub struct PneumoniaCnn {
    spec: CnnSpec,
    device: Device,
    blocks: Vec<Block>,
    fc1: Linear,
    fc2: Linear,
}

impl PneumoniaCnn {
    /// Check a parameter file against the architecture, then build the layers on CPU.
    pub fn load(spec: CnnSpec, params: ParameterFile) -> anyhow::Result<Self> {
        spec.validate()?;
        params.check(&spec.parameter_shapes())?;
        let device = Device::Cpu;
        let vb = params.into_var_builder(&device)?;
        Self::from_var_builder(spec, vb, device)
    }

    pub fn from_var_builder(spec: CnnSpec, vb: VarBuilder<'_>, device: Device) -> anyhow::Result<Self> {
        spec.validate()?;
        let conv_cfg = Conv2dConfig {
            padding: 1,
            ..Default::default()
        };

        let mut blocks = Vec::with_capacity(spec.blocks());
        for (block, (conv, bn)) in spec.block_layer_indices().into_iter().enumerate() {
            let (cin, cout) = (spec.channels[block], spec.channels[block + 1]);
            blocks.push(Block {
                conv: candle_nn::conv2d(cin, cout, KERNEL, conv_cfg, vb.pp(format!("conv_layers.{conv}")))?,
                bn: candle_nn::batch_norm(cout, BN_EPS, vb.pp(format!("conv_layers.{bn}")))?,
            });
        }
        let fc1 = candle_nn::linear(spec.flat_features(), spec.hidden, vb.pp("fc_layers.1"))?;
        let fc2 = candle_nn::linear(spec.hidden, 1, vb.pp("fc_layers.4"))?;

        Ok(Self {
            spec,
            device,
            blocks,
            fc1,
            fc2,
        })
    }

    pub fn spec(&self) -> &CnnSpec {
        &self.spec
    }

    /// Convolution stack, flattened in `C, H, W` order.
    fn features(&self, x: Tensor) -> candle_core::Result<Tensor> {
        let mut x = x;
        for block in &self.blocks {
            x = block.forward(&x)?;
        }
        x.flatten_from(1)
    }

    fn head(&self, flat: &Tensor) -> candle_core::Result<Tensor> {
        let hidden = self.fc1.forward(flat)?.relu()?;
        self.fc2.forward(&hidden)
    }
}

impl Forward for PneumoniaCnn {
    fn forward(&self, input: ArrayView4<'_, f32>) -> Result<Array2<f32>, PipelineError> {
        let (n, c, h, w) = input.dim();
        let [_, ec, eh, ew] = self.spec.input_shape();
        if (c, h, w) != (ec, eh, ew) {
            return Err(PipelineError::ShapeMismatch(format!(
                "input [{n}, {c}, {h}, {w}], expected [N, {ec}, {eh}, {ew}]"
            )));
        }

        let data: Vec<f32> = input.iter().copied().collect();
        let x = Tensor::from_vec(data, (n, c, h, w), &self.device).map_err(inference)?;
        let flat = self.features(x).map_err(inference)?;
        let width = flat.dim(1).map_err(inference)?;
        if width != self.spec.flat_features() {
            return Err(PipelineError::ShapeMismatch(format!(
                "flattened {width} features, expected {}",
                self.spec.flat_features()
            )));
        }

        let logits = self.head(&flat).map_err(inference)?;
        let rows = logits.to_vec2::<f32>().map_err(inference)?;
        let outputs = rows.first().map_or(0, Vec::len);
        Array2::from_shape_vec((n, outputs), rows.concat())
            .map_err(|e| PipelineError::ShapeMismatch(e.to_string()))
    }

    fn backend(&self) -> &'static str {
        "native"
    }
}
