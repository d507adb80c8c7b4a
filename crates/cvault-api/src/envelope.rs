//! The uniform JSON envelope every endpoint responds with.

use serde::Deserialize;

/// `{"status": bool, "message": ..., "code": ..., "data": ...}`
///
/// `status == true` means the operation succeeded and `data` carries
/// the payload; `status == false` carries a machine-readable `code`
/// plus a human-readable `message`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope {
    pub status: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Error codes that mean the API key is dead and the session must be
/// torn down rather than retried.
pub const SESSION_INVALID_CODES: &[&str] = &["api_key_not_found", "invalid_api_key"];

/// Error codes worth retrying: the server failed transiently rather
/// than rejecting the request.
pub const RETRYABLE_CODES: &[&str] = &["internal_error"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_success_envelope() {
        let env: ApiEnvelope = serde_json::from_str(
            r#"{"status":true,"message":"OK","code":"success","data":{"uuid":"abc"}}"#,
        )
        .unwrap();
        assert!(env.status);
        assert_eq!(env.data["uuid"], "abc");
    }

    #[test]
    fn parses_failure_without_data() {
        let env: ApiEnvelope = serde_json::from_str(
            r#"{"status":false,"message":"Folder not found.","code":"folder_not_found"}"#,
        )
        .unwrap();
        assert!(!env.status);
        assert_eq!(env.code, "folder_not_found");
        assert!(env.data.is_null());
    }
}
