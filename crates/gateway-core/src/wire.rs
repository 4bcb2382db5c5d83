//! Wire-level message shapes. These are the already-decoded JSON payloads
//! the transport layer hands to the core, and the payloads the core hands
//! back.

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// The closed set of interchange formats a model descriptor may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelFormat {
    TfliteFlatBuffer,
    TfSavedModel,
    KerasHdf5,
    KerasSavedModel,
    KerasOther,
    TfjsLayers,
    TfjsGraph,
    TfHub,
    GraphDefs,
}

/// Tagged union over the three ways a model's bytes can be supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ModelSource {
    Data { data: Vec<u8> },
    Url { url: String },
    File { file: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    #[serde(flatten)]
    pub source: ModelSource,
    #[serde(rename = "type")]
    pub format: ModelFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadModelRequest {
    pub model: ModelDescriptor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadModelResponse {
    Handle { id: i64 },
    Error(WireError),
}

/// Wire representation of a dense tensor: a shape plus exactly one payload
/// variant. `payload` is `None` only for malformed input (decode rejects
/// that with `InvalidTensorMessage`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireTensor {
    pub dimensions: Vec<u64>,
    pub payload: Option<TensorPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "array", rename_all = "snake_case")]
pub enum TensorPayload {
    FloatArray(Vec<f32>),
    IntArray(Vec<i32>),
    BoolArray(Vec<bool>),
    /// Alternating real/imag, as paired int32s (the wire has no native
    /// complex type).
    ComplexArray(Vec<i32>),
    StringArray(Vec<Vec<u8>>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub handle: i64,
    pub tensor: Vec<WireTensor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceResponse {
    Ok {
        tensors: Vec<WireTensor>,
        metrics: WireMetrics,
    },
    Error(WireError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMetrics {
    pub time_to_execute_us: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    pub kind: ErrorKind,
    pub message: String,
}
