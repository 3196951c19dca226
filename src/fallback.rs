//! Synthesized responses for requests that neither cache nor network can
//! satisfy. Nothing here can fail; every function returns a response.

use serde_json::{json, Value};

use crate::net::Response;

/// Canned payload for a known offline API path.
///
/// These mirror the read endpoints the kiosk needs to keep answering with
/// no connectivity at all.
pub fn offline_dataset(path: &str) -> Option<Value> {
  let payload = match path {
    "/api/patients" => json!({
      "success": true,
      "data": {
        "name": "ਰਮਨਜੀਤ ਸਿੰਘ",
        "age": 45,
        "lastVisit": "2025-01-10",
        "conditions": ["ਹਾਈ ਬਲੱਡ ਪ੍ਰੈਸ਼ਰ", "ਡਾਇਬੀਟਿਸ"]
      }
    }),
    "/api/medicines" => json!({
      "success": true,
      "data": [
        { "name": "Paracetamol", "stock": true, "pharmacy": "Nabha Medical Store" },
        { "name": "Metformin", "stock": true, "pharmacy": "Punjab Pharmacy" },
        { "name": "Amlodipine", "stock": false, "pharmacy": "Village Clinic" }
      ]
    }),
    "/api/consultation" => json!({
      "success": true,
      "data": {
        "status": "queued",
        "message": "Your consultation request has been queued and will be processed when connection is restored"
      }
    }),
    _ => return None,
  };

  Some(payload)
}

/// Offline fallback for an API request: the canned payload for known paths,
/// or a payload-level failure at status 200 for unknown ones.
pub fn api_fallback(path: &str) -> Response {
  let payload = offline_dataset(path).unwrap_or_else(|| {
    json!({
      "success": false,
      "error": "Resource not available offline"
    })
  });

  Response::json(200, &payload)
}

/// Generic unavailable response.
pub fn unavailable() -> Response {
  Response::text(503, "Offline")
}

/// Acceptance response for a write that was queued for later replay.
pub fn queued() -> Response {
  Response::json(
    202,
    &json!({
      "success": false,
      "queued": true,
      "message": "Request queued for when online"
    }),
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_known_api_paths_have_payloads() {
    for path in ["/api/patients", "/api/medicines", "/api/consultation"] {
      assert!(offline_dataset(path).is_some(), "{}", path);
    }
  }

  #[test]
  fn test_unknown_api_path_is_payload_level_failure() {
    let response = api_fallback("/api/unknown");
    assert_eq!(response.status, 200);

    let payload: Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(payload["success"], false);
    assert_eq!(payload["error"], "Resource not available offline");
  }

  #[test]
  fn test_medicines_payload_shape() {
    let response = api_fallback("/api/medicines");
    let payload: Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(payload["success"], true);
    assert_eq!(payload["data"].as_array().unwrap().len(), 3);
    assert_eq!(payload["data"][0]["name"], "Paracetamol");
  }

  #[test]
  fn test_queued_acceptance_response() {
    let response = queued();
    assert_eq!(response.status, 202);

    let payload: Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(payload["success"], false);
    assert_eq!(payload["queued"], true);
    assert_eq!(payload["message"], "Request queued for when online");
  }

  #[test]
  fn test_unavailable_is_503() {
    let response = unavailable();
    assert_eq!(response.status, 503);
    assert_eq!(response.body_string(), "Offline");
  }
}
