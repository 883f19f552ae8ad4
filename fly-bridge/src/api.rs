//! Request kinds and the response envelope.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A read-only request, sent through the native `query` entry point.
pub trait Query: Serialize {
    type Response: DeserializeOwned + Send + 'static;
}

/// A mutating request, sent through the native `command` entry point.
pub trait Command: Serialize {
    type Response: DeserializeOwned + Send + 'static;
}

/// Error description carried inside an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Some(kind) => write!(f, "{kind}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ApiError {}

/// What the native core answers to every query or command.
/// Wire shape: `{"ok": <payload>}` or `{"err": {"message": ..., "kind": ...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiResponse<T> {
    Ok(T),
    Err(ApiError),
}

impl<T> ApiResponse<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, ApiResponse::Ok(_))
    }

    pub fn into_result(self) -> Result<T, ApiError> {
        match self {
            ApiResponse::Ok(v) => Ok(v),
            ApiResponse::Err(e) => Err(e),
        }
    }

    pub fn ok(self) -> Option<T> {
        self.into_result().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Codec;

    #[test]
    fn ok_envelope_wire_shape() {
        let codec = Codec::default();
        let raw = codec.encode(&ApiResponse::Ok(vec![1u8, 2])).unwrap();
        assert_eq!(raw, r#"{"ok":[1,2]}"#);
    }

    #[test]
    fn err_envelope_decodes() {
        let codec = Codec::default();
        let got: ApiResponse<u32> = codec
            .decode(r#"{"err": {"message": "no such peer", "kind": "not_found"}}"#)
            .unwrap();
        let err = got.into_result().unwrap_err();
        assert_eq!(err.message, "no such peer");
        assert_eq!(err.to_string(), "not_found: no such peer");
    }

    #[test]
    fn envelope_without_tag_is_rejected() {
        let codec = Codec::default();
        assert!(codec.decode::<ApiResponse<u32>>("5").is_err());
        assert!(codec.decode::<ApiResponse<u32>>(r#"{"ok": "five"}"#).is_err());
    }
}
