pub mod error;
pub mod handlers;
pub mod request_id;

use salvo::prelude::*;

/// Build the service router: the two operational routes plus a health
/// check.
pub fn router() -> Router {
    Router::new()
        .hoop(request_id::request_id_handler)
        .push(Router::with_path("/api/model").post(handlers::load_model))
        .push(Router::with_path("/api/inference").post(handlers::infer))
        .push(Router::with_path("/healthz").get(handlers::healthz))
}
