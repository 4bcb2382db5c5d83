//! HTTP surface for the remote inference gateway. Everything that knows
//! about wire framing lives here; `gateway_core` never imports from this
//! crate.

pub mod api;
pub mod config;
pub mod logging;

use std::sync::Arc;

use salvo::prelude::*;

use config::GatewayConfig;
use gateway_core::{Accelerator, ModelStore};

/// Build the affixed router the binary serves: the API routes with the
/// shared `ModelStore` and `GatewayConfig` available to every handler via
/// the depot.
pub fn build_service(config: GatewayConfig, accelerator: Accelerator) -> Router {
    let store = Arc::new(ModelStore::new(accelerator));
    let config = Arc::new(config);

    api::router()
        .hoop(affix_state::inject(store))
        .hoop(affix_state::inject(config))
}
