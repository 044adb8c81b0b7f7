use serde::{Deserialize, Serialize};

use crate::constants::{CODE_OK, CODE_UNAUTHORIZED};

/// Response envelope shared by every API endpoint.
///
/// `data` is absent (or `null`) on failures, and some successful calls
/// return it empty as well.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
    #[serde(rename = "x-traceID", default, skip_serializing_if = "String::is_empty")]
    pub trace_id: String,
}

impl<T> Envelope<T> {
    /// Creates a successful envelope around `data`.
    pub fn ok(data: T) -> Self {
        Self {
            code: CODE_OK,
            message: "ok".into(),
            data: Some(data),
            trace_id: String::new(),
        }
    }

    /// Creates a failure envelope with the given code and message.
    pub fn failure(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
            trace_id: String::new(),
        }
    }

    /// Returns `true` if the remote reported success.
    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }

    /// Returns `true` if the remote rejected the access token.
    pub fn is_unauthorized(&self) -> bool {
        self.code == CODE_UNAUTHORIZED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::CreateFileResponse;

    #[test]
    fn parses_success_envelope() {
        let json = r#"{
            "code": 0,
            "message": "ok",
            "data": {"fileID": 0, "preuploadID": "abc", "reuse": false, "sliceSize": 16777216},
            "x-traceID": "trace-1"
        }"#;
        let env: Envelope<CreateFileResponse> = serde_json::from_str(json).unwrap();
        assert!(env.is_ok());
        assert_eq!(env.trace_id, "trace-1");
        let data = env.data.unwrap();
        assert_eq!(data.preupload_id, "abc");
        assert_eq!(data.slice_size, 16_777_216);
    }

    #[test]
    fn parses_failure_with_null_data() {
        let json = r#"{"code": 401, "message": "tokens number has exceeded the limit", "data": null}"#;
        let env: Envelope<CreateFileResponse> = serde_json::from_str(json).unwrap();
        assert!(!env.is_ok());
        assert!(env.is_unauthorized());
        assert!(env.data.is_none());
        assert_eq!(env.message, "tokens number has exceeded the limit");
    }

    #[test]
    fn parses_failure_without_data() {
        let json = r#"{"code": 5113, "message": "quota exceeded"}"#;
        let env: Envelope<CreateFileResponse> = serde_json::from_str(json).unwrap();
        assert_eq!(env.code, 5113);
        assert!(env.data.is_none());
    }

    #[test]
    fn payload_needs_no_default() {
        #[derive(Debug, Deserialize)]
        struct Dir {
            #[serde(rename = "dirID")]
            dir_id: i64,
        }

        let env: Envelope<Dir> =
            serde_json::from_str(r#"{"code": 0, "message": "ok", "data": {"dirID": 9}}"#).unwrap();
        assert_eq!(env.data.unwrap().dir_id, 9);
        let env: Envelope<Dir> = serde_json::from_str(r#"{"code": 2, "message": "no"}"#).unwrap();
        assert!(env.data.is_none());
    }

    #[test]
    fn failure_constructor_serializes_without_trace() {
        let env = Envelope::<()>::failure(1, "bad");
        let json = serde_json::to_string(&env).unwrap();
        assert!(!json.contains("x-traceID"));
        assert!(json.contains("\"code\":1"));
    }
}
