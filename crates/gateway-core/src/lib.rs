//! Model ingestion, conversion, storage, and inference for the remote
//! inference gateway. This crate is the core described at the top of the
//! workspace: everything in here is transport-agnostic — the HTTP layer in
//! `gateway-server` is the only thing that knows about wire framing.

pub mod accelerator;
pub mod convert;
pub mod engine;
pub mod error;
pub mod interpreter;
pub mod store;
pub mod tensor;
pub mod wire;

pub use accelerator::Accelerator;
pub use error::{ErrorKind, GatewayError};
pub use store::{Handle, ModelStore};
