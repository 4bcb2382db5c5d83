//! Request handlers: glue wire messages to `gateway_core` operations.
//! One `#[handler]` function per route: `/api/model`, `/api/inference`,
//! and a `/healthz` liveness check.

use std::sync::Arc;

use salvo::prelude::*;

use gateway_core::tensor;
use gateway_core::wire::{InferenceRequest, InferenceResponse, LoadModelRequest, LoadModelResponse, WireMetrics};
use gateway_core::ModelStore;

use crate::api::error::into_wire_error;
use crate::config::GatewayConfig;
use crate::logging;

#[handler]
pub async fn load_model(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    let store = depot.obtain::<Arc<ModelStore>>().expect("ModelStore is affixed");
    let config = depot.obtain::<Arc<GatewayConfig>>().expect("GatewayConfig is affixed");

    let body: LoadModelRequest = match req.parse_json().await {
        Ok(b) => b,
        Err(e) => {
            res.render(Json(LoadModelResponse::Error(into_wire_error(
                gateway_core::GatewayError::ModelDataError(format!("malformed request body: {e}")),
            ))));
            return;
        }
    };

    logging::model::model_register(
        &format!("{:?}", body.model.format),
        source_label(&body.model.source),
    );

    let permitted = config.permitted_model_roots();
    let response = match store
        .register(&body.model, &permitted, config.delete_models_after_conversion)
        .await
    {
        Ok(id) => {
            logging::model::model_registered(id, false);
            LoadModelResponse::Handle { id }
        }
        Err(e) => LoadModelResponse::Error(into_wire_error(e)),
    };

    res.render(Json(response));
}

fn source_label(source: &gateway_core::wire::ModelSource) -> &'static str {
    match source {
        gateway_core::wire::ModelSource::Data { .. } => "data",
        gateway_core::wire::ModelSource::Url { .. } => "url",
        gateway_core::wire::ModelSource::File { .. } => "file",
    }
}

#[handler]
pub async fn infer(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    let store = depot.obtain::<Arc<ModelStore>>().expect("ModelStore is affixed");

    let body: InferenceRequest = match req.parse_json().await {
        Ok(b) => b,
        Err(_) => {
            res.render(Json(InferenceResponse::Error(into_wire_error(
                gateway_core::GatewayError::InvalidTensorMessage,
            ))));
            return;
        }
    };

    let handle = body.handle;
    logging::inference::predict(handle, body.tensor.len());

    let response = run_inference(&store, body).await;

    match &response {
        InferenceResponse::Ok { metrics, .. } => {
            logging::inference::predict_completed(handle, metrics.time_to_execute_us);
        }
        InferenceResponse::Error(e) => {
            logging::inference::predict_failed(handle, &format!("{:?}", e.kind), &e.message);
        }
    }

    res.render(Json(response));
}

async fn run_inference(store: &ModelStore, body: InferenceRequest) -> InferenceResponse {
    let model = match store.get(body.handle).await {
        Ok(m) => m,
        Err(e) => return InferenceResponse::Error(into_wire_error(e)),
    };

    let mut inputs = Vec::with_capacity(body.tensor.len());
    for wire_tensor in &body.tensor {
        match tensor::decode(wire_tensor) {
            Ok(t) => inputs.push(t),
            Err(e) => return InferenceResponse::Error(into_wire_error(e)),
        }
    }

    match model.predict(inputs).await {
        Ok((outputs, metrics)) => {
            let mut wire_outputs = Vec::with_capacity(outputs.len());
            for output in &outputs {
                match tensor::encode(output) {
                    Ok(w) => wire_outputs.push(w),
                    Err(e) => return InferenceResponse::Error(into_wire_error(e)),
                }
            }
            InferenceResponse::Ok {
                tensors: wire_outputs,
                metrics: WireMetrics {
                    time_to_execute_us: metrics.time_to_execute_us,
                    trace_url: metrics.trace_url,
                },
            }
        }
        Err(e) => InferenceResponse::Error(into_wire_error(e)),
    }
}

#[handler]
pub async fn healthz(depot: &mut Depot, res: &mut Response) {
    let store = depot.obtain::<Arc<ModelStore>>().expect("ModelStore is affixed");
    res.render(Json(serde_json::json!({
        "status": "ok",
        "accelerator_present": store.accelerator_present(),
        "models_loaded": store.model_count().await,
    })));
}
