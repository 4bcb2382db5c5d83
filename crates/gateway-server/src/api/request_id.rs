//! Request ID middleware for correlating a request across log lines.
//!
//! Extracts `X-Request-Id` from incoming requests or generates a new UUID.
//! The request ID is added to the depot for downstream handlers and
//! mirrored onto the response.

use salvo::prelude::*;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[handler]
pub async fn request_id_handler(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| RequestId(s.to_string()))
        .unwrap_or_else(RequestId::new);

    depot.insert("request_id", request_id.clone());

    if let Ok(value) = request_id.as_str().parse() {
        res.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(RequestId::new().0, RequestId::new().0);
    }

    #[test]
    fn ids_are_valid_uuids() {
        assert!(uuid::Uuid::parse_str(RequestId::new().as_str()).is_ok());
    }

    #[test]
    fn display_prints_the_inner_string() {
        let id = RequestId("abc-123".to_string());
        assert_eq!(format!("{id}"), "abc-123");
    }
}
