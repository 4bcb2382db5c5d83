//! The handle-keyed model registry. Grounded in `model_store.py`'s
//! `ModelStore`/`LocalModel` pair, generalized to add: a dense index into
//! an append-only vector, a dedup map keyed by identity, and a capacity
//! policy gated on accelerator presence.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::accelerator::Accelerator;
use crate::convert::{self, PermittedRoots};
use crate::engine::{self, Metrics};
use crate::error::GatewayError;
use crate::interpreter::{Interpreter, TractInterpreter};
use crate::tensor::Tensor;
use crate::wire::ModelDescriptor;

pub type Handle = i64;

/// `(optional canonical bytes, optional source path)` — the identity key
/// two loads are deduplicated on. Bytes are compared by value, not by
/// digest; see DESIGN.md for why.
type IdentityKey = (Option<Vec<u8>>, Option<String>);

enum ModelBytes {
    Inline(Vec<u8>),
    Path(PathBuf),
}

impl ModelBytes {
    fn identity_key(&self) -> IdentityKey {
        match self {
            ModelBytes::Inline(bytes) => (Some(bytes.clone()), None),
            ModelBytes::Path(path) => (None, Some(path.display().to_string())),
        }
    }

    async fn read(&self) -> Result<Vec<u8>, GatewayError> {
        match self {
            ModelBytes::Inline(bytes) => Ok(bytes.clone()),
            ModelBytes::Path(path) => tokio::fs::read(path).await.map_err(|e| {
                GatewayError::ModelLoadError(format!(
                    "failed to load the model: couldn't read `{}`: {e}",
                    path.display()
                ))
            }),
        }
    }
}

/// One registered model: its canonical bytes (or a path to them) plus a
/// lazily materialized interpreter. Predict calls against the same handle
/// are serialized by `interp`'s mutex; different handles run concurrently.
pub struct LoadedModel {
    bytes: ModelBytes,
    interp: Mutex<Option<Box<dyn Interpreter>>>,
}

impl LoadedModel {
    async fn interpreter(&self) -> Result<(), GatewayError> {
        let mut slot = self.interp.lock().await;
        if slot.is_none() {
            let raw = self.bytes.read().await?;
            let built = TractInterpreter::from_flatbuffer(&raw)?;
            *slot = Some(Box::new(built));
        }
        Ok(())
    }

    /// Materialize the interpreter on first use, then reconcile and run
    /// `inputs` against it.
    pub async fn predict(&self, inputs: Vec<Tensor>) -> Result<(Vec<Tensor>, Metrics), GatewayError> {
        self.interpreter().await?;
        let mut slot = self.interp.lock().await;
        let interp = slot
            .as_deref_mut()
            .expect("interpreter() just materialized this slot");
        engine::predict(interp, inputs)
    }
}

pub struct ModelStore {
    accelerator: Accelerator,
    models: RwLock<Vec<Arc<LoadedModel>>>,
    dedup: RwLock<std::collections::HashMap<IdentityKey, Handle>>,
}

impl ModelStore {
    pub fn new(accelerator: Accelerator) -> Self {
        Self {
            accelerator,
            models: RwLock::new(Vec::new()),
            dedup: RwLock::new(std::collections::HashMap::new()),
        }
    }

    /// Whether the accelerator delegate is available.
    pub fn accelerator_present(&self) -> bool {
        self.accelerator.is_present()
    }

    /// Number of models currently registered.
    pub async fn model_count(&self) -> usize {
        self.models.read().await.len()
    }

    /// Register model bytes already converted to the canonical format.
    pub async fn load(&self, canonical_bytes: Vec<u8>) -> Result<Handle, GatewayError> {
        if canonical_bytes.is_empty() {
            return Err(GatewayError::ModelRegisterError(
                "provided model was empty.".into(),
            ));
        }
        self.admit(ModelBytes::Inline(canonical_bytes)).await
    }

    /// Register a model that lives on disk as a `.tflite` file.
    pub async fn load_from_file(&self, path: PathBuf) -> Result<Handle, GatewayError> {
        if !path.exists() {
            return Err(GatewayError::ModelRegisterError(format!(
                "model path ({}) doesn't exist.",
                path.display()
            )));
        }
        if !path.is_file() {
            return Err(GatewayError::ModelRegisterError(format!(
                "model path ({}) isn't a file.",
                path.display()
            )));
        }
        if path.extension().and_then(|e| e.to_str()) != Some("tflite") {
            return Err(GatewayError::ModelRegisterError(format!(
                "file ({}) doesn't seem to be a tflite model.",
                path.display()
            )));
        }
        self.admit(ModelBytes::Path(path)).await
    }

    async fn admit(&self, bytes: ModelBytes) -> Result<Handle, GatewayError> {
        let key = bytes.identity_key();

        if let Some(&existing) = self.dedup.read().await.get(&key) {
            return Ok(existing);
        }

        let mut dedup = self.dedup.write().await;
        // Re-check under the write lock: another caller may have admitted
        // the same identity while we waited.
        if let Some(&existing) = dedup.get(&key) {
            return Ok(existing);
        }

        let mut models = self.models.write().await;
        if self.accelerator.is_present() && !models.is_empty() {
            return Err(GatewayError::ModelStoreFullError);
        }

        let handle = models.len() as Handle;
        models.push(Arc::new(LoadedModel {
            bytes,
            interp: Mutex::new(None),
        }));
        dedup.insert(key, handle);
        Ok(handle)
    }

    /// Fetch, unpack, and convert a wire model descriptor, then admit the
    /// resulting canonical bytes. This is the entry point the load-model
    /// request handler drives.
    pub async fn register(
        &self,
        descriptor: &ModelDescriptor,
        permitted: &PermittedRoots,
        delete_after_conversion: bool,
    ) -> Result<Handle, GatewayError> {
        let canonical = convert::convert_model(
            &descriptor.source,
            descriptor.format,
            permitted,
            delete_after_conversion,
        )
        .await?;
        self.load(canonical).await
    }

    /// Fetch the model registered under `handle`, bounds-checked.
    pub async fn get(&self, handle: Handle) -> Result<Arc<LoadedModel>, GatewayError> {
        let models = self.models.read().await;
        let idx = usize::try_from(handle).ok().filter(|&i| i < models.len());
        match idx {
            Some(i) => Ok(Arc::clone(&models[i])),
            None => Err(GatewayError::InvalidHandleError {
                handle,
                registered: models.len(),
            }),
        }
    }
}
