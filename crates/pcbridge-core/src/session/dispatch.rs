//! Control-channel request handlers (spec.md §4.3).
//!
//! One function per request kind, all returning `ControlResponse` rather
//! than propagating errors across the socket — a single bad request must
//! never kill the session (spec.md §7 kind-2). A tagged-sum decode already
//! routes the request to its handler, so there's no string-keyed lookup
//! to mirror here.

use crate::capture::CaptureJob;
use crate::filebridge::{verify_declared, FileBridge};
use crate::input_injector::InputInjector;
use crate::protocol::control::{ControlRequest, ControlResponse, FileSendMetadata};

pub struct HandlerContext<'a> {
    pub session_id: &'a str,
    pub hostname: &'a str,
    pub agent_version: &'a str,
    pub file_bridge: &'a FileBridge,
    pub injector: &'a InputInjector,
    pub capture: &'a CaptureJob,
}

/// Handles every request except the two file-transfer headers, which the
/// session loop intercepts before reaching here because they hand the
/// socket over to raw byte streaming (spec.md §4.4).
pub fn handle(ctx: &HandlerContext, request: ControlRequest) -> ControlResponse {
    match request {
        ControlRequest::Ping => {
            let mut resp = ControlResponse::ok();
            resp.kind = Some("pong".to_string());
            resp
        }
        ControlRequest::Hello { agent, version } => {
            log::info!("hello from {agent} {version}");
            let (width, height) = ctx.capture.current_resolution();
            ControlResponse {
                ok: true,
                kind: Some("hello_ack".to_string()),
                agent: Some(ctx.agent_version.to_string()),
                version: Some(version),
                width: Some(width),
                height: Some(height),
                fps: Some(ctx.capture.fps()),
                hostname: Some(ctx.hostname.to_string()),
                ..Default::default()
            }
        }
        ControlRequest::GetSystemInfo | ControlRequest::GetResolution => {
            let (width, height) = ctx.capture.current_resolution();
            ControlResponse {
                ok: true,
                width: Some(width),
                height: Some(height),
                hostname: Some(ctx.hostname.to_string()),
                ..Default::default()
            }
        }
        ControlRequest::SetCaptureParams { fps, quality } => {
            ctx.capture.set_params(fps, quality);
            ControlResponse::ok()
        }
        ControlRequest::ListFiles { folder } => match ctx.file_bridge.list_files(&folder, ctx.session_id) {
            Ok(entries) => ControlResponse {
                ok: true,
                files: Some(entries.into_iter().map(|e| e.name).collect()),
                ..Default::default()
            },
            Err(e) => ControlResponse::error(e.to_string()),
        },
        ControlRequest::DeleteFile { folder, filename } => {
            match ctx.file_bridge.delete_file(&folder, &filename, ctx.session_id) {
                Ok(()) => ControlResponse::ok(),
                Err(e) => ControlResponse::error(e.to_string()),
            }
        }
        ControlRequest::VerifyFile {
            folder,
            filename,
            sha256,
        } => match ctx.file_bridge.verify_file(&folder, &filename, &sha256, ctx.session_id) {
            Ok((matches, computed)) => ControlResponse {
                ok: true,
                sha256: Some(computed),
                matches: Some(matches),
                ..Default::default()
            },
            Err(e) => ControlResponse::error(e.to_string()),
        },
        ControlRequest::PlaceStaged {
            session_id,
            filename,
            destination,
        } => match ctx.file_bridge.staging().place_staged(&session_id, &filename, &destination) {
            Ok(dest) => ControlResponse {
                ok: true,
                destination: Some(dest.to_string_lossy().into_owned()),
                ..Default::default()
            },
            Err(e) => ControlResponse::error(e.to_string()),
        },
        ControlRequest::GetStagingSha256 { session_id, filename } => {
            match ctx.file_bridge.staging().staging_sha256(&session_id, &filename) {
                Ok(sha256) => ControlResponse {
                    ok: true,
                    sha256: Some(sha256),
                    ..Default::default()
                },
                Err(e) => ControlResponse::error(e.to_string()),
            }
        }
        ControlRequest::CleanupStaging { session_id } => {
            match ctx.file_bridge.staging().cleanup(&session_id) {
                Ok(()) => ControlResponse::ok(),
                Err(e) => ControlResponse::error(e.to_string()),
            }
        }
        ControlRequest::OpenBridgeFolder { session_id } => {
            match ctx.file_bridge.open_bridge_folder(&session_id) {
                Ok(()) => ControlResponse::ok(),
                Err(e) => ControlResponse::error(e.to_string()),
            }
        }
        ControlRequest::ListShared => match ctx.file_bridge.list_shared() {
            Ok(entries) => ControlResponse {
                ok: true,
                files: Some(entries.into_iter().map(|e| e.name).collect()),
                ..Default::default()
            },
            Err(e) => ControlResponse::error(e.to_string()),
        },
        ControlRequest::DeleteShared { filename } => match ctx.file_bridge.delete_shared(&filename) {
            Ok(()) => ControlResponse::ok(),
            Err(e) => ControlResponse::error(e.to_string()),
        },
        ControlRequest::OpenSharedDrive => match ctx.file_bridge.open_shared_drive() {
            Ok(()) => ControlResponse::ok(),
            Err(e) => ControlResponse::error(e.to_string()),
        },
        ControlRequest::OpenPath { path } => match ctx.file_bridge.open_path(&path) {
            Ok(()) => ControlResponse::ok(),
            Err(e) => ControlResponse::error(e.to_string()),
        },
        ControlRequest::TypeText { text } => match ctx.injector.type_text(&text) {
            Ok(()) => ControlResponse::ok(),
            Err(e) => ControlResponse::error(e.to_string()),
        },
        ControlRequest::GetServiceStatus => {
            let (width, height) = ctx.capture.current_resolution();
            ControlResponse {
                ok: true,
                status: Some(if ctx.capture.is_running() { "running" } else { "stopped" }.to_string()),
                width: Some(width),
                height: Some(height),
                fps: Some(ctx.capture.fps()),
                ..Default::default()
            }
        }
        ControlRequest::Shutdown => ControlResponse::ok(),
        ControlRequest::FileSend { .. } | ControlRequest::FileGet { .. } => {
            ControlResponse::error("file transfer requests are handled by the streaming loop")
        }
    }
}

/// Applies a declared octal permission string to a just-written file, per
/// spec.md §4.4 step 5. No-op if `permissions` is absent.
#[cfg(unix)]
pub fn apply_permissions(path: &std::path::Path, metadata: &FileSendMetadata) -> crate::error::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    if let Some(octal) = &metadata.permissions {
        let mode = u32::from_str_radix(octal, 8)
            .map_err(|_| crate::error::BridgeError::operation(format!("invalid permissions: {octal}")))?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    }
    Ok(())
}

/// Used by the file-send handler to decide whether the declared checksum
/// (if any) matches what was actually written; wraps `verify_declared` so
/// the caller doesn't need to reach into `filebridge` directly.
pub fn check_upload_integrity(declared: Option<&str>, computed: &str) -> bool {
    verify_declared(declared, computed).is_ok()
}
