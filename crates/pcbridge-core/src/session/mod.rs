//! The fused three-channel session: request dispatch, server-initiated
//! pushes, the `Session` itself, and the `Supervisor` that enforces the
//! single-session invariant across all three data ports (spec.md §4.2,
//! §4.3).

mod dispatch;
mod pollers;
mod session;
mod supervisor;

pub use dispatch::HandlerContext;
pub use session::{CaptureFactory, Session, SessionParams};
pub use supervisor::{SessionBuilder, Supervisor};
