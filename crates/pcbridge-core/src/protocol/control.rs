//! Control channel request/response/push envelopes.
//!
//! `ControlRequest` is a tagged sum (`#[serde(tag = "type")]`) decoded once
//! at the framing boundary: one variant per message with payload-specific
//! fields, rather than dispatching dynamically on a string `type` field
//! inside each handler. `ControlResponse` stays a single flexible shape
//! (`{ok, ...}`) because every handler only ever needs to add a handful
//! of optional fields to the same envelope, not branch on a response
//! type.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlRequest {
    Ping,
    Hello {
        agent: String,
        version: String,
    },
    GetSystemInfo,
    GetResolution,
    SetCaptureParams {
        fps: Option<u32>,
        quality: Option<u8>,
    },
    ListFiles {
        folder: String,
    },
    DeleteFile {
        folder: String,
        filename: String,
    },
    VerifyFile {
        folder: String,
        filename: String,
        sha256: String,
    },
    PlaceStaged {
        session_id: String,
        filename: String,
        destination: String,
    },
    GetStagingSha256 {
        session_id: String,
        filename: String,
    },
    CleanupStaging {
        session_id: String,
    },
    OpenBridgeFolder {
        session_id: String,
    },
    ListShared,
    DeleteShared {
        filename: String,
    },
    OpenSharedDrive,
    OpenPath {
        path: String,
    },
    TypeText {
        text: String,
    },
    GetServiceStatus,
    Shutdown,
    /// File upload header; once accepted the socket is handed to the
    /// file-bridge streaming loop until the size-declared payload and the
    /// trailing checksum response have been exchanged.
    FileSend {
        folder: String,
        size: u64,
        sha256: Option<String>,
        metadata: FileSendMetadata,
    },
    /// File download header; once accepted the server streams `size`
    /// raw bytes followed by a checksum envelope.
    FileGet {
        folder: String,
        filename: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSendMetadata {
    pub name: String,
    #[serde(default)]
    pub permissions: Option<String>,
}

/// Generic `{ok, ...}` response envelope. Handlers populate only the
/// fields relevant to the request they answered; everything else stays
/// `None` and is omitted from the serialized form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matches: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl ControlResponse {
    pub fn ok() -> Self {
        Self {
            ok: true,
            ..Default::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Unsolicited server-initiated pushes, interleaved with request/response
/// pairs on the same control socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlPush {
    CursorShape { shape: String },
    ResolutionChanged { width: u32, height: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_tagged_request_by_type_field() {
        let json = r#"{"type":"set_capture_params","fps":60,"quality":null}"#;
        let req: ControlRequest = serde_json::from_str(json).unwrap();
        match req {
            ControlRequest::SetCaptureParams { fps, quality } => {
                assert_eq!(fps, Some(60));
                assert_eq!(quality, None);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn error_response_omits_unset_optional_fields() {
        let resp = ControlResponse::error("file not found");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"ok\":false"));
        assert!(json.contains("file not found"));
        assert!(!json.contains("\"width\""));
    }
}
