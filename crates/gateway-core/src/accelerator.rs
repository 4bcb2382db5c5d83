//! Probing for the NCore accelerator delegate at process startup.
//!
//! Grounded in `ncore.py`: presence is controlled by the `NCORE` env var
//! (its value is the path to a `.so` delegate library), gated on
//! `/dev/ncore_pci` existing and being a block device.

use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

use crate::error::GatewayError;

pub const NCORE_DEVICE_PATH: &str = "/dev/ncore_pci";

/// Process-wide accelerator presence, decided once at startup and never
/// re-probed.
#[derive(Debug, Clone)]
pub enum Accelerator {
    Absent,
    Present { delegate_lib_path: PathBuf },
}

impl Accelerator {
    pub fn is_present(&self) -> bool {
        matches!(self, Accelerator::Present { .. })
    }

    /// The store capacity this accelerator allows: a single resident model
    /// when present, unbounded (`None`) otherwise.
    pub fn capacity(&self) -> Option<usize> {
        match self {
            Accelerator::Present { .. } => Some(1),
            Accelerator::Absent => None,
        }
    }

    pub fn delegate_lib_path(&self) -> Option<&Path> {
        match self {
            Accelerator::Present { delegate_lib_path } => Some(delegate_lib_path),
            Accelerator::Absent => None,
        }
    }
}

/// Probe for NCore presence from the process environment.
///
/// Mirrors `check_for_ncore`: absent `NCORE` env var means no accelerator,
/// present-but-unusable device raises `NCoreNotPresent`, and an `NCORE`
/// value that isn't an existing `.so` file raises `InvalidDelegateLibrary`.
pub fn probe() -> Result<Accelerator, GatewayError> {
    probe_at(NCORE_DEVICE_PATH)
}

fn probe_at(device_path: &str) -> Result<Accelerator, GatewayError> {
    let lib_path = match std::env::var("NCORE") {
        Ok(v) => v,
        Err(_) => return Ok(Accelerator::Absent),
    };

    let device = Path::new(device_path);
    let exists = device.exists();
    let is_block_device = exists
        && std::fs::metadata(device)
            .map(|m| m.file_type().is_block_device())
            .unwrap_or(false);

    if !(exists && is_block_device) {
        return Err(GatewayError::NCoreNotPresent(format!(
            "`{device_path}`: exists: {exists}, block device: {is_block_device}."
        )));
    }

    let lib = Path::new(&lib_path);
    if !(lib.exists() && lib.is_file()) {
        return Err(GatewayError::InvalidDelegateLibrary(format!(
            "`{lib_path}` doesn't seem to exist."
        )));
    }
    if lib.extension().and_then(|e| e.to_str()) != Some("so") {
        return Err(GatewayError::InvalidDelegateLibrary(format!(
            "`{lib_path}` doesn't appear to be a shared object."
        )));
    }

    Ok(Accelerator::Present {
        delegate_lib_path: lib.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // NCORE is process env; serialize the tests that touch it.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn absent_without_ncore_env() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("NCORE");
        let acc = probe().unwrap();
        assert!(!acc.is_present());
        assert_eq!(acc.capacity(), None);
    }

    #[test]
    fn rejects_missing_device_when_ncore_set() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("NCORE", "/nonexistent/delegate.so");
        let err = probe_at("/dev/definitely-not-a-real-ncore-device").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NCoreNotPresent);
        std::env::remove_var("NCORE");
    }
}
