//! The closed error taxonomy and its mapping onto wire error codes.
//!
//! Every failure mode the core can produce is one of these variants.
//! `ErrorKind` is the wire-facing projection; `GatewayError::kind()` is the
//! total function from internal error to that projection (unmapped foreign
//! errors fall through to `ErrorKind::Other`).

use thiserror::Error;

/// Closed taxonomy of core failure modes.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("encode rejects a non-representable runtime dtype: {0}")]
    TensorConversionError(String),

    #[error("decode saw no payload variant set")]
    InvalidTensorMessage,

    #[error("shape product does not match payload length: {0}")]
    MisshapenTensor(String),

    #[error("{0}")]
    ModelRegisterError(String),

    #[error("{0}")]
    ModelAcquireError(String),

    #[error("{0}")]
    ModelDataError(String),

    #[error("{0}")]
    ModelConversionError(String),

    #[error("the model store is full")]
    ModelStoreFullError,

    #[error("{0}")]
    ModelLoadError(String),

    #[error("handle {handle} does not exist; {registered} handles are currently registered")]
    InvalidHandleError { handle: i64, registered: usize },

    #[error("{0}")]
    TensorTypeError(String),

    #[error("{0}")]
    InvalidDelegateLibrary(String),

    #[error("{0}")]
    NCoreNotPresent(String),

    /// Anything that doesn't fit the taxonomy above; still wrapped once so a
    /// message survives to the wire boundary.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Wire-facing error code. A total projection of `GatewayError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    TensorConversionError,
    InvalidTensorMessage,
    MisshapenTensor,
    ModelRegisterError,
    ModelAcquireError,
    ModelDataError,
    ModelConversionError,
    ModelStoreFullError,
    ModelLoadError,
    InvalidHandleError,
    TensorTypeError,
    InvalidDelegateLibrary,
    NCoreNotPresent,
    Other,
}

impl GatewayError {
    /// The wire error kind this error maps to. Total: every variant (and the
    /// catch-all `Other`) has a mapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::TensorConversionError(_) => ErrorKind::TensorConversionError,
            GatewayError::InvalidTensorMessage => ErrorKind::InvalidTensorMessage,
            GatewayError::MisshapenTensor(_) => ErrorKind::MisshapenTensor,
            GatewayError::ModelRegisterError(_) => ErrorKind::ModelRegisterError,
            GatewayError::ModelAcquireError(_) => ErrorKind::ModelAcquireError,
            GatewayError::ModelDataError(_) => ErrorKind::ModelDataError,
            GatewayError::ModelConversionError(_) => ErrorKind::ModelConversionError,
            GatewayError::ModelStoreFullError => ErrorKind::ModelStoreFullError,
            GatewayError::ModelLoadError(_) => ErrorKind::ModelLoadError,
            GatewayError::InvalidHandleError { .. } => ErrorKind::InvalidHandleError,
            GatewayError::TensorTypeError(_) => ErrorKind::TensorTypeError,
            GatewayError::InvalidDelegateLibrary(_) => ErrorKind::InvalidDelegateLibrary,
            GatewayError::NCoreNotPresent(_) => ErrorKind::NCoreNotPresent,
            GatewayError::Other(_) => ErrorKind::Other,
        }
    }

    /// The variant name split on CamelCase boundaries, e.g.
    /// `TensorTypeError` -> `Tensor Type Error`. Used to build the wire
    /// message prefix, matching `original_source/server/types/error.py`'s
    /// `into_error`.
    fn split_name(&self) -> &'static str {
        match self {
            GatewayError::TensorConversionError(_) => "Tensor Conversion Error",
            GatewayError::InvalidTensorMessage => "Invalid Tensor Message",
            GatewayError::MisshapenTensor(_) => "Misshapen Tensor",
            GatewayError::ModelRegisterError(_) => "Model Register Error",
            GatewayError::ModelAcquireError(_) => "Model Acquire Error",
            GatewayError::ModelDataError(_) => "Model Data Error",
            GatewayError::ModelConversionError(_) => "Model Conversion Error",
            GatewayError::ModelStoreFullError => "Model Store Full Error",
            GatewayError::ModelLoadError(_) => "Model Load Error",
            GatewayError::InvalidHandleError { .. } => "Invalid Handle Error",
            GatewayError::TensorTypeError(_) => "Tensor Type Error",
            GatewayError::InvalidDelegateLibrary(_) => "Invalid Delegate Library",
            GatewayError::NCoreNotPresent(_) => "NCore Not Present",
            GatewayError::Other(_) => "Other",
        }
    }

    /// Render `(kind, message)` for the wire `Error` type.
    pub fn into_wire(self) -> (ErrorKind, String) {
        let kind = self.kind();
        let prefix = self.split_name();
        let message = format!("[{prefix}] {self}");
        (kind, message)
    }
}
