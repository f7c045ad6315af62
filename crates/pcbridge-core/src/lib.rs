//! Shared engine for the pcbridge remote-desktop link.
//!
//! This crate holds everything that spans both the server and the client:
//! discovery/negotiation, the three-channel session protocol, the video
//! pump, the input pipeline, and the file-bridge state machine. The two
//! binaries (`pcbridge-server`, `pcbridge-client`) wire these pieces
//! together for their respective role.

pub mod capture;
pub mod config;
pub mod discovery;
pub mod encode;
pub mod error;
pub mod filebridge;
pub mod input_injector;
pub mod protocol;
pub mod session;

pub use error::{BridgeError, Result};

