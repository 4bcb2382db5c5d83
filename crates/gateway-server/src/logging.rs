//! Structured logging for wide-format log lines. Adapted from the
//! teacher's event-module pattern: each function wraps a single
//! `tracing` call carrying an `event` field plus the fields specific to
//! that event, so every canonical log line is self-contained.

/// Server lifecycle events.
pub mod lifecycle {
    pub fn server_startup(version: &str) {
        tracing::info!(event = "server_startup", version = %version, "Server starting");
    }

    pub fn config_loaded(host: &str, port: u16, debug: bool) {
        tracing::info!(
            event = "config_loaded",
            host = %host,
            port = port,
            debug = debug,
            "Configuration loaded"
        );
    }

    pub fn server_binding(address: &str) {
        tracing::info!(event = "server_binding", address = %address, "Server binding");
    }

    pub fn server_shutdown(signal: &str) {
        tracing::info!(event = "server_shutdown", signal = %signal, "Server shutting down");
    }
}

/// Accelerator probe events.
pub mod accelerator {
    pub fn present(delegate_lib_path: &str) {
        tracing::info!(
            event = "accelerator_present",
            delegate_lib_path = %delegate_lib_path,
            "NCore accelerator detected"
        );
    }

    pub fn absent() {
        tracing::info!(event = "accelerator_absent", "No accelerator configured");
    }
}

/// Model lifecycle events.
pub mod model {
    pub fn model_register(format: &str, source: &str) {
        tracing::info!(
            event = "model_register",
            format = %format,
            source = %source,
            "Registering model"
        );
    }

    pub fn model_registered(handle: i64, deduped: bool) {
        tracing::info!(
            event = "model_registered",
            handle = handle,
            deduped = deduped,
            "Model registered"
        );
    }

    pub fn model_conversion_failed(format: &str, message: &str) {
        tracing::warn!(
            event = "model_conversion_failed",
            format = %format,
            message = %message,
            "Model conversion failed"
        );
    }

    pub fn interpreter_materialized(handle: i64) {
        tracing::info!(
            event = "interpreter_materialized",
            handle = handle,
            "Interpreter materialized"
        );
    }
}

/// Inference events.
pub mod inference {
    pub fn predict(handle: i64, input_count: usize) {
        tracing::debug!(
            event = "predict",
            handle = handle,
            input_count = input_count,
            "Running inference"
        );
    }

    pub fn predict_completed(handle: i64, time_to_execute_us: u64) {
        tracing::info!(
            event = "predict_completed",
            handle = handle,
            time_to_execute_us = time_to_execute_us,
            "Inference completed"
        );
    }

    pub fn predict_failed(handle: i64, kind: &str, message: &str) {
        tracing::warn!(
            event = "predict_failed",
            handle = handle,
            kind = %kind,
            message = %message,
            "Inference failed"
        );
    }
}

/// Install the process-wide tracing subscriber. Verbosity is gated by
/// `debug` (the `DEBUG` environment variable enables verbose logging).
pub fn init(debug: bool) {
    let default_directive = if debug { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .json()
        .init();
}
