use std::path::Path;

use anyhow::{anyhow, bail, Result};
use burn::{
    module::{Module, Param},
    nn::Linear,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::{
        activation::{relu, sigmoid},
        backend::Backend,
        Tensor, TensorData,
    },
};
use rand::{rngs::StdRng, Rng};

use crate::data::INPUT_DIM;

pub const HIDDEN_DIM: usize = 256;
pub const CODE_DIM: usize = 64;

/// One stage of a layer stack.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Step {
    /// Apply the next `Linear` layer of the stack.
    Affine,
    /// ReLU.
    Rectify,
    /// Sigmoid, bounding the output to [0, 1].
    Saturate,
}

pub const ENCODER_STEPS: [Step; 4] = [Step::Affine, Step::Rectify, Step::Affine, Step::Rectify];
pub const DECODER_STEPS: [Step; 4] = [Step::Affine, Step::Rectify, Step::Affine, Step::Saturate];
/// Decoder plan without its final squashing, for losses computed on logits.
const DECODER_LOGIT_STEPS: [Step; 3] = [Step::Affine, Step::Rectify, Step::Affine];

const ENCODER_WIDTHS: [usize; 3] = [INPUT_DIM, HIDDEN_DIM, CODE_DIM];
const DECODER_WIDTHS: [usize; 3] = [CODE_DIM, HIDDEN_DIM, INPUT_DIM];

const fn affine_stages(steps: &[Step]) -> usize {
    let mut count = 0;
    let mut i = 0;
    while i < steps.len() {
        if matches!(steps[i], Step::Affine) {
            count += 1;
        }
        i += 1;
    }
    count
}

const fn is_prefix(prefix: &[Step], steps: &[Step]) -> bool {
    if prefix.len() > steps.len() {
        return false;
    }
    let mut i = 0;
    while i < prefix.len() {
        if prefix[i] as u8 != steps[i] as u8 {
            return false;
        }
        i += 1;
    }
    true
}

// Every affine stage owns exactly one layer, and the decoder ends in [0, 1].
const _: () = assert!(affine_stages(&ENCODER_STEPS) == ENCODER_WIDTHS.len() - 1);
const _: () = assert!(affine_stages(&DECODER_STEPS) == DECODER_WIDTHS.len() - 1);
const _: () = assert!(matches!(DECODER_STEPS[DECODER_STEPS.len() - 1], Step::Saturate));
const _: () = assert!(
    DECODER_LOGIT_STEPS.len() + 1 == DECODER_STEPS.len()
        && is_prefix(&DECODER_LOGIT_STEPS, &DECODER_STEPS)
);

/// 784 → 256 → 64 → 256 → 784 fully-connected autoencoder.
#[derive(Module, Debug)]
pub struct Autoencoder<B: Backend> {
    encoder: Vec<Linear<B>>,
    decoder: Vec<Linear<B>>,
}

impl<B: Backend> Autoencoder<B> {
    pub fn init(device: &B::Device, rng: &mut StdRng) -> Self {
        let encoder = stack_from_rng::<B>(rng, device, &ENCODER_WIDTHS);
        let decoder = stack_from_rng::<B>(rng, device, &DECODER_WIDTHS);

        Self { encoder, decoder }
    }

    pub fn encode(&self, inputs: Tensor<B, 2>) -> Tensor<B, 2> {
        run_steps(&self.encoder, &ENCODER_STEPS, inputs)
    }

    pub fn decode(&self, codes: Tensor<B, 2>) -> Tensor<B, 2> {
        run_steps(&self.decoder, &DECODER_STEPS, codes)
    }

    pub fn forward(&self, inputs: Tensor<B, 2>) -> Tensor<B, 2> {
        self.decode(self.encode(inputs))
    }

    /// Reconstruction before the final sigmoid; `sigmoid(forward_logits(x)) == forward(x)`.
    pub fn forward_logits(&self, inputs: Tensor<B, 2>) -> Tensor<B, 2> {
        run_steps(&self.decoder, &DECODER_LOGIT_STEPS, self.encode(inputs))
    }

    /// First-layer encoder weights as `[HIDDEN_DIM, INPUT_DIM]`, one 28x28 filter per row.
    pub fn encoder_filters(&self) -> Tensor<B, 2> {
        // Linear stores weights as [d_input, d_output].
        self.encoder[0].weight.val().transpose()
    }

    /// Every weight and bias, flattened layer by layer.
    pub fn parameter_values(&self) -> Result<Vec<f32>> {
        let mut values = Vec::with_capacity(self.num_params());
        for layer in self.encoder.iter().chain(&self.decoder) {
            values.extend(tensor_values(layer.weight.val())?);
            if let Some(bias) = &layer.bias {
                values.extend(tensor_values(bias.val())?);
            }
        }
        Ok(values)
    }

    /// Fails if any parameter became NaN or infinite.
    pub fn ensure_finite(&self) -> Result<()> {
        let values = self.parameter_values()?;
        let bad = values.iter().filter(|v| !v.is_finite()).count();
        if bad > 0 {
            bail!("{bad} of {} parameters are not finite", values.len());
        }
        Ok(())
    }
}

/// Apply `steps`, consuming one layer per `Affine` stage.
fn run_steps<B: Backend>(layers: &[Linear<B>], steps: &[Step], inputs: Tensor<B, 2>) -> Tensor<B, 2> {
    let mut segments = steps.split(|step| *step == Step::Affine);
    let leading = segments.next().unwrap_or_default();

    layers
        .iter()
        .zip(segments)
        .fold(activate(inputs, leading), |x, (layer, activations)| {
            activate(layer.forward(x), activations)
        })
}

fn activate<B: Backend>(x: Tensor<B, 2>, steps: &[Step]) -> Tensor<B, 2> {
    steps.iter().fold(x, |x, step| match step {
        Step::Rectify => relu(x),
        Step::Saturate => sigmoid(x),
        Step::Affine => x,
    })
}

fn stack_from_rng<B: Backend>(rng: &mut StdRng, device: &B::Device, widths: &[usize]) -> Vec<Linear<B>> {
    widths
        .windows(2)
        .map(|pair| linear_from_rng::<B>(rng, device, pair[0], pair[1]))
        .collect()
}

fn linear_from_rng<B: Backend>(
    rng: &mut StdRng,
    device: &B::Device,
    fan_in: usize,
    fan_out: usize,
) -> Linear<B> {
    let limit = (1.0f32 / fan_in as f32).sqrt();
    let weight = random_tensor::<B, 2>(rng, [fan_in, fan_out], limit, device);
    let bias = random_tensor::<B, 1>(rng, [fan_out], limit, device);

    Linear {
        weight: Param::from_tensor(weight),
        bias: Some(Param::from_tensor(bias)),
    }
}

fn random_tensor<B: Backend, const D: usize>(
    rng: &mut StdRng,
    shape: [usize; D],
    limit: f32,
    device: &B::Device,
) -> Tensor<B, D> {
    let total: usize = shape.iter().product();
    let values: Vec<f32> = (0..total)
        .map(|_| rng.gen::<f32>() * 2.0 * limit - limit)
        .collect();

    Tensor::<B, D>::from_floats(TensorData::new(values, shape), device)
}

type ModelRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// Persist parameters to `path` (the recorder appends `.mpk`).
pub fn save_model<B: Backend>(model: &Autoencoder<B>, path: &Path) -> Result<()> {
    model
        .clone()
        .save_file(path.to_path_buf(), &ModelRecorder::new())
        .map_err(|err| anyhow!("failed to save model to {}: {err:?}", path.display()))
}

pub fn load_model<B: Backend>(path: &Path, device: &B::Device, rng: &mut StdRng) -> Result<Autoencoder<B>> {
    Autoencoder::init(device, rng)
        .load_file(path.to_path_buf(), &ModelRecorder::new(), device)
        .map_err(|err| anyhow!("failed to load model from {}: {err:?}", path.display()))
}

/// Copy a tensor's values out as a flat row-major vector.
pub fn tensor_values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|err| anyhow!("failed to read tensor values: {err:?}"))
}
