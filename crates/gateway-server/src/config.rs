//! Process configuration, read once at startup from the environment
//! (`HOST`, `PORT`, `DEBUG`, `NCORE`, `DELETE_MODELS_AFTER_CONVERSION`,
//! `MODEL_DIR`). This system is entirely env-var driven rather than
//! file-configured.

use std::path::PathBuf;

use anyhow::{Context, Result};

fn is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn env_truthy(name: &str) -> bool {
    std::env::var(name).map(|v| is_truthy(&v)).unwrap_or(false)
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub debug: bool,
    pub ncore_delegate: Option<PathBuf>,
    pub delete_models_after_conversion: bool,
    pub model_dir: Option<PathBuf>,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = match std::env::var("PORT") {
            Ok(v) => v.parse::<u16>().with_context(|| format!("PORT={v} isn't a valid port"))?,
            Err(_) => 5000,
        };

        Ok(Self {
            host,
            port,
            debug: env_truthy("DEBUG"),
            ncore_delegate: std::env::var("NCORE").ok().map(PathBuf::from),
            delete_models_after_conversion: env_truthy("DELETE_MODELS_AFTER_CONVERSION"),
            model_dir: std::env::var("MODEL_DIR").ok().map(PathBuf::from),
        })
    }

    /// Roots a `file` model source may resolve under, as the conversion
    /// pipeline's path-safety check expects.
    pub fn permitted_model_roots(&self) -> gateway_core::convert::PermittedRoots {
        gateway_core::convert::PermittedRoots(self.model_dir.iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_truthy_accepts_common_spellings() {
        for v in ["1", "true", "TRUE", "yes", "on"] {
            assert!(is_truthy(v), "expected `{v}` to be truthy");
        }
        for v in ["0", "false", "", "off"] {
            assert!(!is_truthy(v), "expected `{v}` to be falsy");
        }
    }
}
