//! A single model's interpreter: the seam between the gateway's tensor
//! representation and whatever inference backend actually runs the graph.
//!
//! The trait covers the surface a backend needs: `from_bytes`, `allocate`,
//! `input_details`/`output_details`, `resize_input`, `set_input`, `invoke`,
//! `get_output`. It is grounded in `model_store.py`'s use of
//! `tf.lite.Interpreter`. `TractInterpreter` is the concrete backend,
//! grounded in a `tract_tflite` usage pattern.

use tract_core::prelude::*;
use tract_tflite::prelude::*;

use crate::error::GatewayError;
use crate::tensor::{Dtype, Tensor as GwTensor, TensorData};

/// An input or output slot's declared signature. `None` shape entries are
/// dynamic dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub dtype: Dtype,
    pub shape: Vec<Option<u64>>,
}

/// The abstraction boundary between the core and the underlying ML
/// runtime.
pub trait Interpreter: Send {
    fn input_signatures(&self) -> &[Signature];
    fn output_count(&self) -> usize;

    /// Validate that `shape` can be run against input slot `index`.
    ///
    /// tract's runnable models are immutable once optimized, so this does
    /// not mutate backend state the way a mutable `resize_tensor_input`
    /// would — it only checks `shape` against the model's static
    /// dimensions, returning an error for any fixed-dimension mismatch so
    /// the caller's batching fallback can kick in.
    fn resize_input(&mut self, index: usize, shape: &[u64]) -> Result<(), GatewayError>;

    /// Stage a tensor to be fed to input slot `index` on the next `invoke`.
    fn set_input(&mut self, index: usize, tensor: GwTensor) -> Result<(), GatewayError>;

    /// Run the model against whatever was staged with `set_input`.
    fn invoke(&mut self) -> Result<(), GatewayError>;

    /// Read back output slot `index` produced by the last `invoke`.
    fn get_output(&self, index: usize) -> Result<GwTensor, GatewayError>;
}

pub struct TractInterpreter {
    runner: TypedRunnableModel<TypedModel>,
    input_signatures: Vec<Signature>,
    output_count: usize,
    pending_inputs: Vec<Option<GwTensor>>,
    last_outputs: Vec<GwTensor>,
}

impl TractInterpreter {
    /// Build an interpreter from raw TFLite flatbuffer bytes.
    ///
    /// Loading from a file path is covered by `LoadedModel` reading the
    /// bytes off disk and passing them through this same constructor — the
    /// gateway never leaves a loaded model's bytes unread on the filesystem
    /// for the interpreter to open directly, since the canonical model is
    /// always materialized in memory once converted.
    pub fn from_flatbuffer(bytes: &[u8]) -> Result<Self, GatewayError> {
        let mut cursor = std::io::Cursor::new(bytes);
        let model = tract_tflite::tflite()
            .model_for_read(&mut cursor)
            .map_err(|e| GatewayError::ModelLoadError(format!("failed to load the model: {e}")))?;

        let input_count = model.inputs.len();
        let mut input_signatures = Vec::with_capacity(input_count);
        for i in 0..input_count {
            let fact = model
                .input_fact(i)
                .map_err(|e| {
                    GatewayError::ModelLoadError(format!("failed to load the model: {e}"))
                })?
                .clone();
            input_signatures.push(Signature {
                dtype: fact_dtype(&fact)?,
                shape: fact_shape(&fact),
            });
        }
        let output_count = model.outputs.len();

        let runner = model
            .into_optimized()
            .map_err(|e| GatewayError::ModelLoadError(format!("failed to load the model: {e}")))?
            .into_runnable()
            .map_err(|e| GatewayError::ModelLoadError(format!("failed to load the model: {e}")))?;

        Ok(Self {
            runner,
            input_signatures,
            output_count,
            pending_inputs: vec![None; input_count],
            last_outputs: Vec::new(),
        })
    }
}

fn fact_shape(fact: &InferenceFact) -> Vec<Option<u64>> {
    match fact.shape.concretize() {
        Some(dims) => dims
            .iter()
            .map(|d| d.to_i64().ok().map(|v| v as u64))
            .collect(),
        None => Vec::new(),
    }
}

fn fact_dtype(fact: &InferenceFact) -> Result<Dtype, GatewayError> {
    match fact.datum_type.concretize() {
        Some(dt) if dt == f32::datum_type() => Ok(Dtype::F32),
        Some(dt) if dt == i32::datum_type() => Ok(Dtype::I32),
        Some(dt) if dt == bool::datum_type() => Ok(Dtype::Bool),
        Some(other) => Err(GatewayError::ModelLoadError(format!(
            "model declares an input dtype this gateway doesn't support yet: {other:?}"
        ))),
        None => Ok(Dtype::F32),
    }
}

fn gw_to_tract(tensor: &GwTensor) -> Result<Tensor, GatewayError> {
    let shape: Vec<usize> = tensor.shape.clone();
    match &tensor.data {
        TensorData::F32(v) => tract_ndarray::ArrayD::from_shape_vec(shape, v.clone())
            .map(Tensor::from)
            .map_err(|e| GatewayError::TensorTypeError(format!("bad tensor shape: {e}"))),
        TensorData::I32(v) => tract_ndarray::ArrayD::from_shape_vec(shape, v.clone())
            .map(Tensor::from)
            .map_err(|e| GatewayError::TensorTypeError(format!("bad tensor shape: {e}"))),
        TensorData::Bool(v) => tract_ndarray::ArrayD::from_shape_vec(shape, v.clone())
            .map(Tensor::from)
            .map_err(|e| GatewayError::TensorTypeError(format!("bad tensor shape: {e}"))),
        other => Err(GatewayError::TensorTypeError(format!(
            "this interpreter only runs f32/i32/bool inputs, got {:?}",
            other.dtype()
        ))),
    }
}

fn tract_to_gw(tensor: &Tensor) -> Result<GwTensor, GatewayError> {
    let shape: Vec<usize> = tensor.shape().to_vec();
    if let Ok(view) = tensor.to_array_view::<f32>() {
        return Ok(GwTensor::new(
            shape,
            TensorData::F32(view.iter().copied().collect()),
        ));
    }
    if let Ok(view) = tensor.to_array_view::<i32>() {
        return Ok(GwTensor::new(
            shape,
            TensorData::I32(view.iter().copied().collect()),
        ));
    }
    if let Ok(view) = tensor.to_array_view::<bool>() {
        return Ok(GwTensor::new(
            shape,
            TensorData::Bool(view.iter().copied().collect()),
        ));
    }
    Err(GatewayError::TensorTypeError(
        "model produced an output dtype this gateway doesn't support yet".into(),
    ))
}

impl Interpreter for TractInterpreter {
    fn input_signatures(&self) -> &[Signature] {
        &self.input_signatures
    }

    fn output_count(&self) -> usize {
        self.output_count
    }

    fn resize_input(&mut self, index: usize, shape: &[u64]) -> Result<(), GatewayError> {
        let declared = &self.input_signatures[index].shape;
        if declared.len() != shape.len() {
            return Err(GatewayError::TensorTypeError(format!(
                "unable to resize the model's input tensor to match the given tensor; \
                 expected rank {}, got rank {}",
                declared.len(),
                shape.len()
            )));
        }
        for (fixed, requested) in declared.iter().zip(shape.iter()) {
            if let Some(fixed) = fixed {
                if fixed != requested {
                    return Err(GatewayError::TensorTypeError(format!(
                        "unable to resize the model's input tensor to match the given tensor; \
                         attempted `{shape:?}` and got a fixed dimension mismatch at `{fixed}`"
                    )));
                }
            }
        }
        Ok(())
    }

    fn set_input(&mut self, index: usize, tensor: GwTensor) -> Result<(), GatewayError> {
        self.pending_inputs[index] = Some(tensor);
        Ok(())
    }

    fn invoke(&mut self) -> Result<(), GatewayError> {
        let mut inputs = TVec::new();
        for (i, slot) in self.pending_inputs.iter_mut().enumerate() {
            let staged = slot.take().ok_or_else(|| {
                GatewayError::TensorTypeError(format!("input {i} was never staged"))
            })?;
            inputs.push(gw_to_tract(&staged)?.into());
        }

        let outputs = self.runner.run(inputs).map_err(|e| {
            GatewayError::Other(anyhow::anyhow!(
                "encountered an error while trying to run inference: {e}"
            ))
        })?;

        self.last_outputs = outputs
            .iter()
            .map(|t| tract_to_gw(t))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(())
    }

    fn get_output(&self, index: usize) -> Result<GwTensor, GatewayError> {
        self.last_outputs
            .get(index)
            .cloned()
            .ok_or_else(|| GatewayError::Other(anyhow::anyhow!("invoke was never called")))
    }
}
