//! Translating a core `GatewayError` into the wire `Error` shape.
//!
//! Unlike a typical REST error path, every core failure comes back as a
//! normal `200 OK` response carrying a `{"error": {...}}` body — the HTTP
//! status line never encodes the error kind. `into_wire_error` is the one
//! conversion site; handlers never construct a `WireError` by hand.

use gateway_core::wire::WireError;
use gateway_core::GatewayError;

pub fn into_wire_error(err: GatewayError) -> WireError {
    let (kind, message) = err.into_wire();
    WireError { kind, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::ErrorKind;

    #[test]
    fn invalid_handle_maps_to_its_kind_with_a_prefixed_message() {
        let err = GatewayError::InvalidHandleError {
            handle: 7,
            registered: 2,
        };
        let wire = into_wire_error(err);
        assert_eq!(wire.kind, ErrorKind::InvalidHandleError);
        assert!(wire.message.starts_with("[Invalid Handle Error]"));
    }

    #[test]
    fn tensor_type_error_round_trips_its_message() {
        let err = GatewayError::TensorTypeError("shape mismatch".into());
        let wire = into_wire_error(err);
        assert_eq!(wire.kind, ErrorKind::TensorTypeError);
        assert!(wire.message.contains("shape mismatch"));
    }
}
